//! Classic BPF (cBPF) packet-filter virtual machine.
//!
//! Executes verifier-checked filter bytecode against single packets and
//! returns a 32-bit verdict. Compatible with the programs `tcpdump -d` and
//! `tcpdump -dd` emit, extended with a small family of `chk_*` opcodes for
//! CRC, layer-3/4 checksum, truncation, frame-length and protocol-location
//! checks.
//!
//! # Modules
//!
//! - [`vm`]: the top-level VM facade
//! - [`isa`], [`insn`], [`program`]: the instruction set and its containers
//! - [`verifier`], [`interp`]: static checking and execution
//! - [`memory`], [`registers`], [`context`]: per-run state
//! - [`extension`], [`checks`]: the pluggable opcode surface
//! - [`assembler`], [`dumper`]: the `-d`/`-dd` text formats
//! - [`analyzer`], [`tracer`]: diagnostics tooling
//!
//! ```
//! use bpfvm::vm::BpfVm;
//!
//! // { 0x06, 0, 0, 0x00040000 }  -- accept, returning 256 KiB snap length
//! let mut vm = BpfVm::new();
//! vm.load_raw(&[0x0600_0000_0004_0000]).unwrap();
//! assert_eq!(vm.execute(&[0u8; 64]).unwrap(), 0x0004_0000);
//! ```

pub mod analyzer;
pub mod assembler;
pub mod checks;
pub mod context;
pub mod dumper;
pub mod errors;
pub mod extension;
pub mod insn;
pub mod interp;
pub mod isa;
pub mod memory;
pub mod program;
pub mod registers;
pub mod tracer;
pub mod util;
pub mod verifier;
pub mod vm;
