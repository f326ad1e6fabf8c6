//! Execution tracing for debugging.
//!
//! A [`Tracer`] records the program counter, instruction, A, X and the
//! termination flag after each dispatched instruction. It starts disabled and
//! costs nothing on the hot path until enabled: the entry vector is only
//! touched by [`record`](Tracer::record) calls while enabled.

use crate::insn::Instruction;
use std::fmt;

/// One executed instruction.
#[derive(Clone, Debug)]
pub struct TraceEntry {
    pub pc: usize,
    pub insn: Instruction,
    pub a: u64,
    pub x: u64,
    pub terminated: bool,
}

/// Step recorder handed to
/// [`Interpreter::execute_traced`](crate::interp::Interpreter::execute_traced).
#[derive(Debug, Default)]
pub struct Tracer {
    enabled: bool,
    entries: Vec<TraceEntry>,
}

impl Tracer {
    /// Creates a disabled tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracer that records immediately.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            entries: Vec::new(),
        }
    }

    /// Turns recording on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// True when recording.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records one step. A disabled tracer does nothing and allocates
    /// nothing.
    pub fn record(&mut self, pc: usize, insn: Instruction, a: u64, x: u64, terminated: bool) {
        if !self.enabled {
            return;
        }
        self.entries.push(TraceEntry {
            pc,
            insn,
            a,
            x,
            terminated,
        });
    }

    /// The recorded steps.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Discards recorded steps.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Display for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "execution trace, {} steps:", self.entries.len())?;
        for entry in &self.entries {
            writeln!(
                f,
                "{:04}: {:<40}  A=0x{:08x}  X=0x{:08x}{}",
                entry.pc,
                format!("{:?}", entry.insn),
                entry.a,
                entry.x,
                if entry.terminated { "  [terminated]" } else { "" }
            )?;
        }
        Ok(())
    }
}
