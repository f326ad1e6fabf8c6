//! Minimal leveled logging to stderr.
//!
//! Used by the command-line tools and the program-load path; the interpreter
//! hot path never logs.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use std::{fmt::Display, sync::OnceLock};

/// Log level for filtering messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Debug => write!(f, "DEBUG"),
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Warn as u8);
static START: OnceLock<Instant> = OnceLock::new();

/// Sets the minimum level that gets logged.
pub fn init(level: Level) {
    START.get_or_init(Instant::now);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// True when the given level should be logged.
#[inline]
pub fn enabled(level: Level) -> bool {
    level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

fn log(level: Level, message: &str) {
    if enabled(level) {
        let elapsed = START.get_or_init(Instant::now).elapsed();
        eprintln!("[{:9.3}s] [{:5}] {}", elapsed.as_secs_f64(), level, message);
    }
}

/// Logs a debug-level message.
pub fn debug(message: &str) {
    log(Level::Debug, message);
}

/// Logs an info-level message.
pub fn info(message: &str) {
    log(Level::Info, message);
}

/// Logs a warning-level message.
pub fn warn(message: &str) {
    log(Level::Warn, message);
}

/// Logs an error-level message.
pub fn error(message: &str) {
    log(Level::Error, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn level_display() {
        assert_eq!(format!("{}", Level::Info), "INFO");
        assert_eq!(format!("{}", Level::Error), "ERROR");
    }

    #[test]
    fn init_sets_threshold() {
        init(Level::Error);
        assert!(!enabled(Level::Info));
        assert!(!enabled(Level::Warn));
        assert!(enabled(Level::Error));

        init(Level::Warn);
        assert!(enabled(Level::Warn));
    }
}
