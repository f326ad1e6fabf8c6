//! BPF program format converter CLI.
//!
//! Reads a filter program in `-d` text, `-dd` hex or raw binary form,
//! validates it, and writes it out in any of the three forms.
//!
//! # Usage
//! ```text
//! assembler <input> [OPTIONS]
//! ```
//!
//! # Options
//! - `-o, --output <file>`: output path (defaults to stdout)
//! - `-e, --emit <text|hex|bin>`: output format (defaults to `text`)
//! - `--no-verify`: skip validation
//! - `--analyze`: print the control-flow analysis report to stderr
//! - `-v`: verbose logging

use bpfvm::analyzer;
use bpfvm::assembler::parse_auto;
use bpfvm::errors::ParseError;
use bpfvm::dumper::{dump_hex, dump_text};
use bpfvm::program::Program;
use bpfvm::util::log;
use bpfvm::verifier;
use std::env;
use std::fs;
use std::path::Path;
use std::process;

enum Emit {
    Text,
    Hex,
    Bin,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut emit = Emit::Text;
    let mut verify = true;
    let mut analyze = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    eprintln!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            k @ ("--emit" | "-e") => {
                i += 1;
                if i >= args.len() {
                    eprintln!("{k} requires an argument");
                    process::exit(1);
                }
                emit = match args[i].as_str() {
                    "text" => Emit::Text,
                    "hex" => Emit::Hex,
                    "bin" => Emit::Bin,
                    other => {
                        eprintln!("Unknown emit format: {other}");
                        process::exit(1);
                    }
                };
                i += 1;
            }
            "--no-verify" => {
                verify = false;
                i += 1;
            }
            "--analyze" => {
                analyze = true;
                i += 1;
            }
            "-v" => {
                log::init(log::Level::Debug);
                i += 1;
            }
            other => {
                eprintln!("Unexpected argument: {other}\n");
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !Path::new(input_path).exists() {
        eprintln!("Input file does not exist: {input_path}");
        process::exit(1);
    }

    let program = match read_program(input_path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to read program: {e}");
            process::exit(1);
        }
    };
    log::debug(&format!("parsed {} instructions", program.len()));

    if verify {
        if let Err(e) = verifier::verify(&program) {
            eprintln!("Validation failed: {e}");
            process::exit(1);
        }
        log::debug("program validated");
    }

    if analyze {
        eprint!("{}", analyzer::analyze(&program));
    }

    let output = match emit {
        Emit::Text => dump_text(&program).into_bytes(),
        Emit::Hex => dump_hex(&program).into_bytes(),
        Emit::Bin => program.to_bytes(),
    };

    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(&path, &output) {
                eprintln!("Failed to write {path}: {e}");
                process::exit(1);
            }
            println!("Wrote {} ({} bytes)", path, output.len());
        }
        None => {
            let mut stdout = String::new();
            match String::from_utf8(output) {
                Ok(text) => stdout.push_str(&text),
                Err(raw) => {
                    // Binary output on a terminal helps nobody; hex-dump it.
                    stdout.push_str(&bpfvm::util::hex::format_hex(raw.as_bytes()));
                    stdout.push('\n');
                }
            }
            print!("{stdout}");
        }
    }
}

/// Text inputs go through format auto-detection; anything else (or UTF-8
/// bytes that detect as neither text format) loads as raw binary.
fn read_program(path: &str) -> Result<Program, String> {
    let raw = fs::read(path).map_err(|e| e.to_string())?;
    match String::from_utf8(raw) {
        Ok(text) => match parse_auto(&text) {
            Ok(program) => Ok(program),
            Err(ParseError::UnknownFormat) => {
                Program::from_bytes(text.as_bytes()).map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        },
        Err(not_text) => Program::from_bytes(not_text.as_bytes()).map_err(|e| e.to_string()),
    }
}

const USAGE: &str = "\
BPF Program Converter

USAGE:
    {program} <input> [OPTIONS]

ARGS:
    <input>    Program in -d text, -dd hex, or raw binary form

OPTIONS:
    -o, --output <file>       Output file path (defaults to stdout)
    -e, --emit <text|hex|bin> Output format (default: text)
    --no-verify               Skip program validation
    --analyze                 Print control-flow analysis to stderr
    -v                        Verbose logging
    -h, --help                Print this help message

EXAMPLES:
    # Disassemble a tcpdump -dd capture to readable text
    {program} filter.dd

    # Assemble text to the raw 64-bit binary form
    {program} filter.txt -e bin -o filter.bin
";

fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
