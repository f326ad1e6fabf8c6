//! Text-to-program parsing: the `tcpdump -d` and `-dd` formats.
//!
//! [`parse_text`] consumes the `(NNN) mnemonic operands` listing, with the
//! context-dependent mnemonics disambiguated by operand shape: `ld len`,
//! `ld M[k]`, `ld #k`, `ld [k]` and `ld [x + k]` are five different opcodes.
//! [`parse_hex`] consumes `{ 0xOP, JT, JF, 0xK },` lines. [`parse_auto`]
//! detects the format from the first significant line. Blank lines and lines
//! starting with `Warning:` are ignored throughout, since libpcap prepends
//! such warnings to its output.

use crate::errors::ParseError;
use crate::insn::Instruction;
use crate::isa::BpfOpcode;
use crate::program::{MAX_PROGRAM_LENGTH, Program};

/// Parses `-d` text format.
pub fn parse_text(input: &str) -> Result<Program, ParseError> {
    let mut insns = Vec::new();
    for (line_no, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if skip_line(line) {
            continue;
        }
        insns.push(parse_text_line(line_no + 1, line)?);
    }
    build_program(insns)
}

/// Parses `-dd` hex format.
pub fn parse_hex(input: &str) -> Result<Program, ParseError> {
    let mut insns = Vec::new();
    for (line_no, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if skip_line(line) {
            continue;
        }
        insns.push(parse_hex_line(line_no + 1, line)?);
    }
    build_program(insns)
}

/// Detects the input format from the first significant line and parses
/// accordingly: `{` means hex, `(` means text.
pub fn parse_auto(input: &str) -> Result<Program, ParseError> {
    for raw in input.lines() {
        let line = raw.trim();
        if skip_line(line) {
            continue;
        }
        if line.starts_with('{') {
            return parse_hex(input);
        }
        if line.starts_with('(') {
            return parse_text(input);
        }
        return Err(ParseError::UnknownFormat);
    }
    Err(ParseError::NoInstructions)
}

fn skip_line(line: &str) -> bool {
    line.is_empty() || line.starts_with("Warning:")
}

fn build_program(insns: Vec<Instruction>) -> Result<Program, ParseError> {
    if insns.is_empty() {
        return Err(ParseError::NoInstructions);
    }
    let len = insns.len();
    Program::from_instructions(insns).map_err(|_| ParseError::TooManyInstructions {
        len,
        max: MAX_PROGRAM_LENGTH,
    })
}

// ---------------------------------------------------------------------------
// Text format
// ---------------------------------------------------------------------------

fn parse_text_line(line_no: usize, line: &str) -> Result<Instruction, ParseError> {
    let bad = || ParseError::BadInstruction {
        line: line_no,
        text: line.to_string(),
    };

    // `(NNN)` index prefix. The index itself is decorative.
    let rest = line.strip_prefix('(').ok_or_else(bad)?;
    let close = rest.find(')').ok_or_else(bad)?;
    if close == 0 || !rest[..close].bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let rest = rest[close + 1..].trim();

    let (mnemonic, operands) = match rest.split_once(char::is_whitespace) {
        Some((m, ops)) => (m, ops.trim()),
        None => (rest, ""),
    };
    if mnemonic.is_empty() {
        return Err(bad());
    }

    parse_instruction(line_no, mnemonic, operands)
}

fn parse_instruction(
    line_no: usize,
    mnemonic: &str,
    operands: &str,
) -> Result<Instruction, ParseError> {
    let bad_operands = || ParseError::BadOperands {
        line: line_no,
        mnemonic: mnemonic.to_string(),
        operands: operands.to_string(),
    };

    let insn = match mnemonic {
        "ld" | "ldh" | "ldb" | "ldx" | "ldxb" => {
            return parse_load(line_no, mnemonic, operands);
        }
        "st" => Instruction::from_opcode(BpfOpcode::St, 0, 0, parse_scratch(line_no, operands)?),
        "stx" => Instruction::from_opcode(BpfOpcode::Stx, 0, 0, parse_scratch(line_no, operands)?),

        "add" | "sub" | "mul" | "div" | "or" | "and" | "lsh" | "rsh" | "mod" | "xor" => {
            let (k_op, x_op) = alu_opcodes(mnemonic);
            if operands == "x" {
                Instruction::from_opcode(x_op, 0, 0, 0)
            } else if let Some(value) = operands.strip_prefix('#') {
                Instruction::from_opcode(k_op, 0, 0, parse_u32(line_no, value)?)
            } else {
                return Err(bad_operands());
            }
        }
        "neg" => {
            if !operands.is_empty() {
                return Err(bad_operands());
            }
            Instruction::from_opcode(BpfOpcode::Neg, 0, 0, 0)
        }

        "ja" => {
            let offset = if let Some(value) = operands.strip_prefix('+') {
                parse_i32(line_no, value)?
            } else {
                parse_i32(line_no, operands)?
            };
            Instruction::from_opcode(BpfOpcode::Ja, 0, 0, offset as u32)
        }
        "jeq" | "jgt" | "jge" | "jset" => {
            return parse_cond_jump(line_no, mnemonic, operands);
        }

        "ret" => {
            if operands == "a" {
                Instruction::from_opcode(BpfOpcode::RetA, 0, 0, 0)
            } else if let Some(value) = operands.strip_prefix('#') {
                Instruction::from_opcode(BpfOpcode::RetK, 0, 0, parse_u32(line_no, value)?)
            } else {
                return Err(bad_operands());
            }
        }
        "tax" => Instruction::from_opcode(BpfOpcode::Tax, 0, 0, 0),
        "txa" => Instruction::from_opcode(BpfOpcode::Txa, 0, 0, 0),

        "chk_crc" => {
            let (offset, len) = parse_key_values(line_no, operands, "offset", "len")?;
            let len = u8::try_from(len).map_err(|_| ParseError::BadNumber {
                line: line_no,
                value: len.to_string(),
            })?;
            Instruction::from_opcode(BpfOpcode::ChkCrc, 0, len, offset)
        }
        "chk_l3_csum" | "chk_l4_csum" | "chk_trunc" => {
            let opcode = match mnemonic {
                "chk_l3_csum" => BpfOpcode::ChkL3Csum,
                "chk_l4_csum" => BpfOpcode::ChkL4Csum,
                _ => BpfOpcode::ChkTrunc,
            };
            let k = if operands.is_empty() {
                0
            } else if let Some(value) = operands.strip_prefix('#') {
                parse_u32(line_no, value)?
            } else {
                return Err(bad_operands());
            };
            Instruction::from_opcode(opcode, 0, 0, k)
        }
        "chk_frame_len" => {
            let value = operands.strip_prefix(">=").ok_or_else(bad_operands)?;
            Instruction::from_opcode(BpfOpcode::ChkFrameLen, 0, 0, parse_u32(line_no, value)?)
        }
        "chk_proto_loc" => {
            let (layer, offset) = parse_key_values(line_no, operands, "layer", "offset")?;
            let layer = u8::try_from(layer).map_err(|_| ParseError::BadNumber {
                line: line_no,
                value: layer.to_string(),
            })?;
            Instruction::from_opcode(BpfOpcode::ChkProtoLoc, layer, 0, offset)
        }

        _ => {
            // `ext[0xNN]`: the generic spelling for registered opcodes.
            if let Some(inner) = mnemonic.strip_prefix("ext[").and_then(|m| m.strip_suffix(']')) {
                let opcode = parse_u32(line_no, inner)?;
                let (jt, jf, k) = parse_ext_operands(line_no, mnemonic, operands)?;
                if opcode > 0xFF {
                    return Err(ParseError::BadNumber {
                        line: line_no,
                        value: inner.to_string(),
                    });
                }
                Instruction::new(opcode as u8, jt, jf, k)
            } else {
                return Err(ParseError::UnknownMnemonic {
                    line: line_no,
                    mnemonic: mnemonic.to_string(),
                });
            }
        }
    };

    Ok(insn)
}

/// The five spellings behind `ld`-family mnemonics.
fn parse_load(line_no: usize, mnemonic: &str, operands: &str) -> Result<Instruction, ParseError> {
    let bad_operands = || ParseError::BadOperands {
        line: line_no,
        mnemonic: mnemonic.to_string(),
        operands: operands.to_string(),
    };

    // `4*([k]&0xf)`: the IPv4 header-length idiom.
    if let Some(inner) = operands
        .strip_prefix("4*([")
        .and_then(|o| o.strip_suffix("]&0xf)"))
    {
        let k = parse_u32(line_no, inner.trim())?;
        let opcode = match mnemonic {
            "ld" => BpfOpcode::LdMsh,
            "ldx" => BpfOpcode::LdxMsh,
            "ldxb" => BpfOpcode::LdxMshB,
            _ => return Err(bad_operands()),
        };
        return Ok(Instruction::from_opcode(opcode, 0, 0, k));
    }

    if operands == "len" {
        let opcode = match mnemonic {
            "ld" => BpfOpcode::LdLen,
            "ldx" => BpfOpcode::LdxLen,
            _ => return Err(bad_operands()),
        };
        return Ok(Instruction::from_opcode(opcode, 0, 0, 0));
    }

    if operands.starts_with("M[") {
        let slot = parse_scratch(line_no, operands)?;
        let opcode = match mnemonic {
            "ld" => BpfOpcode::LdMem,
            "ldx" => BpfOpcode::LdxMem,
            _ => return Err(bad_operands()),
        };
        return Ok(Instruction::from_opcode(opcode, 0, 0, slot));
    }

    if let Some(value) = operands.strip_prefix('#') {
        let opcode = match mnemonic {
            "ld" => BpfOpcode::LdImm,
            "ldx" => BpfOpcode::LdxImm,
            _ => return Err(bad_operands()),
        };
        return Ok(Instruction::from_opcode(
            opcode,
            0,
            0,
            parse_u32(line_no, value)?,
        ));
    }

    if let Some(inner) = operands.strip_prefix('[').and_then(|o| o.strip_suffix(']')) {
        let inner = inner.trim();
        let (indirect, offset_text) = match inner.strip_prefix('x') {
            Some(rest) => {
                let rest = rest.trim_start();
                let rest = rest.strip_prefix('+').ok_or_else(bad_operands)?;
                (true, rest.trim())
            }
            None => (false, inner),
        };
        let k = parse_u32(line_no, offset_text)?;
        let opcode = match (mnemonic, indirect) {
            ("ld", false) => BpfOpcode::LdAbsW,
            ("ldh", false) => BpfOpcode::LdAbsH,
            ("ldb", false) => BpfOpcode::LdAbsB,
            ("ld", true) => BpfOpcode::LdIndW,
            ("ldh", true) => BpfOpcode::LdIndH,
            ("ldb", true) => BpfOpcode::LdIndB,
            _ => return Err(bad_operands()),
        };
        return Ok(Instruction::from_opcode(opcode, 0, 0, k));
    }

    Err(bad_operands())
}

/// `#k jt N jf N` or `x jt N jf N`.
fn parse_cond_jump(
    line_no: usize,
    mnemonic: &str,
    operands: &str,
) -> Result<Instruction, ParseError> {
    let bad_operands = || ParseError::BadOperands {
        line: line_no,
        mnemonic: mnemonic.to_string(),
        operands: operands.to_string(),
    };

    let tokens: Vec<&str> = operands.split_whitespace().collect();
    let [value, jt_kw, jt, jf_kw, jf] = tokens.as_slice() else {
        return Err(bad_operands());
    };
    if *jt_kw != "jt" || *jf_kw != "jf" {
        return Err(bad_operands());
    }

    let jt = parse_u8(line_no, jt)?;
    let jf = parse_u8(line_no, jf)?;

    let (k_op, x_op) = jump_opcodes(mnemonic);
    if *value == "x" {
        Ok(Instruction::from_opcode(x_op, jt, jf, 0))
    } else if let Some(k) = value.strip_prefix('#') {
        Ok(Instruction::from_opcode(
            k_op,
            jt,
            jf,
            parse_u32(line_no, k)?,
        ))
    } else {
        Err(bad_operands())
    }
}

/// `jt N jf N #K` after an `ext[0xNN]` mnemonic.
fn parse_ext_operands(
    line_no: usize,
    mnemonic: &str,
    operands: &str,
) -> Result<(u8, u8, u32), ParseError> {
    let bad_operands = || ParseError::BadOperands {
        line: line_no,
        mnemonic: mnemonic.to_string(),
        operands: operands.to_string(),
    };

    let tokens: Vec<&str> = operands.split_whitespace().collect();
    let [jt_kw, jt, jf_kw, jf, k] = tokens.as_slice() else {
        return Err(bad_operands());
    };
    if *jt_kw != "jt" || *jf_kw != "jf" {
        return Err(bad_operands());
    }
    let k = k.strip_prefix('#').ok_or_else(bad_operands)?;
    Ok((
        parse_u8(line_no, jt)?,
        parse_u8(line_no, jf)?,
        parse_u32(line_no, k)?,
    ))
}

/// `M[k]`.
fn parse_scratch(line_no: usize, operands: &str) -> Result<u32, ParseError> {
    let inner = operands
        .strip_prefix("M[")
        .and_then(|o| o.strip_suffix(']'))
        .ok_or_else(|| ParseError::BadNumber {
            line: line_no,
            value: operands.to_string(),
        })?;
    parse_u32(line_no, inner.trim())
}

/// `key1=N key2=N`.
fn parse_key_values(
    line_no: usize,
    operands: &str,
    key1: &str,
    key2: &str,
) -> Result<(u32, u32), ParseError> {
    let bad = || ParseError::BadNumber {
        line: line_no,
        value: operands.to_string(),
    };

    let tokens: Vec<&str> = operands.split_whitespace().collect();
    let [first, second] = tokens.as_slice() else {
        return Err(bad());
    };
    let v1 = first
        .strip_prefix(key1)
        .and_then(|t| t.strip_prefix('='))
        .ok_or_else(bad)?;
    let v2 = second
        .strip_prefix(key2)
        .and_then(|t| t.strip_prefix('='))
        .ok_or_else(bad)?;
    Ok((parse_u32(line_no, v1)?, parse_u32(line_no, v2)?))
}

fn alu_opcodes(mnemonic: &str) -> (BpfOpcode, BpfOpcode) {
    match mnemonic {
        "add" => (BpfOpcode::AddK, BpfOpcode::AddX),
        "sub" => (BpfOpcode::SubK, BpfOpcode::SubX),
        "mul" => (BpfOpcode::MulK, BpfOpcode::MulX),
        "div" => (BpfOpcode::DivK, BpfOpcode::DivX),
        "or" => (BpfOpcode::OrK, BpfOpcode::OrX),
        "and" => (BpfOpcode::AndK, BpfOpcode::AndX),
        "lsh" => (BpfOpcode::LshK, BpfOpcode::LshX),
        "rsh" => (BpfOpcode::RshK, BpfOpcode::RshX),
        "mod" => (BpfOpcode::ModK, BpfOpcode::ModX),
        _ => (BpfOpcode::XorK, BpfOpcode::XorX),
    }
}

fn jump_opcodes(mnemonic: &str) -> (BpfOpcode, BpfOpcode) {
    match mnemonic {
        "jeq" => (BpfOpcode::JeqK, BpfOpcode::JeqX),
        "jgt" => (BpfOpcode::JgtK, BpfOpcode::JgtX),
        "jge" => (BpfOpcode::JgeK, BpfOpcode::JgeX),
        _ => (BpfOpcode::JsetK, BpfOpcode::JsetX),
    }
}

// ---------------------------------------------------------------------------
// Hex format
// ---------------------------------------------------------------------------

fn parse_hex_line(line_no: usize, line: &str) -> Result<Instruction, ParseError> {
    let bad = || ParseError::BadHexInstruction {
        line: line_no,
        text: line.to_string(),
    };

    let line = line.strip_suffix(',').unwrap_or(line).trim();
    let inner = line
        .strip_prefix('{')
        .and_then(|l| l.strip_suffix('}'))
        .ok_or_else(bad)?;

    let fields: Vec<&str> = inner.split(',').map(str::trim).collect();
    let [opcode, jt, jf, k] = fields.as_slice() else {
        return Err(bad());
    };

    let opcode = parse_u32(line_no, opcode)?;
    if opcode > 0xFF {
        return Err(bad());
    }
    let jt = parse_u8(line_no, jt)?;
    let jf = parse_u8(line_no, jf)?;
    let k = parse_u32(line_no, k)?;

    Ok(Instruction::from_classic(opcode as u8, jt, jf, k))
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Decimal or `0x` hex, unsigned 32-bit.
fn parse_u32(line_no: usize, text: &str) -> Result<u32, ParseError> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    };
    parsed.map_err(|_| ParseError::BadNumber {
        line: line_no,
        value: text.to_string(),
    })
}

/// Signed 32-bit, for `ja` offsets.
fn parse_i32(line_no: usize, text: &str) -> Result<i32, ParseError> {
    let text = text.trim();
    text.parse::<i32>().map_err(|_| ParseError::BadNumber {
        line: line_no,
        value: text.to_string(),
    })
}

fn parse_u8(line_no: usize, text: &str) -> Result<u8, ParseError> {
    let value = parse_u32(line_no, text)?;
    u8::try_from(value).map_err(|_| ParseError::BadNumber {
        line: line_no,
        value: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dumper::{dump_hex, dump_text};

    /// The `tcp and dst port 80` filter as libpcap emits it.
    const TCP_PORT_80_DD: &str = "\
{ 0x28, 0, 0, 0x0000000c },
{ 0x15, 0, 12, 0x00000800 },
{ 0x20, 0, 0, 0x0000001a },
{ 0x15, 0, 10, 0xc0a80101 },
{ 0x30, 0, 0, 0x00000017 },
{ 0x15, 2, 0, 0x00000084 },
{ 0x15, 1, 0, 0x00000006 },
{ 0x15, 0, 6, 0x00000011 },
{ 0x28, 0, 0, 0x00000014 },
{ 0x45, 4, 0, 0x00001fff },
{ 0xb1, 0, 0, 0x0000000e },
{ 0x48, 0, 0, 0x00000010 },
{ 0x15, 0, 1, 0x00000050 },
{ 0x6, 0, 0, 0x00040000 },
{ 0x6, 0, 0, 0x00000000 },
";

    #[test]
    fn parses_hex_filter() {
        let program = parse_hex(TCP_PORT_80_DD).unwrap();
        assert_eq!(program.len(), 15);
        assert_eq!(program.insn(0).unwrap().opcode(), 0x28);
        assert_eq!(program.insn(10).unwrap().opcode(), 0xB1);
        assert_eq!(program.insn(13).unwrap().immediate(), 0x0004_0000);
    }

    #[test]
    fn hex_tolerates_warnings_blanks_and_no_trailing_comma() {
        let input = "\
Warning: some libpcap note

{ 0x28, 0, 0, 0x0000000c }
{ 0x6, 0, 0, 0x00000000 },
";
        let program = parse_hex(input).unwrap();
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(matches!(
            parse_hex("{ 0x28, 0, 0 },"),
            Err(ParseError::BadHexInstruction { line: 1, .. })
        ));
        assert!(matches!(
            parse_hex("0x28 0 0 12"),
            Err(ParseError::BadHexInstruction { .. })
        ));
        assert!(matches!(
            parse_hex("{ 0x128, 0, 0, 0x0 },"),
            Err(ParseError::BadHexInstruction { .. })
        ));
    }

    #[test]
    fn parses_text_listing() {
        let input = "\
(000) ldh [12]
(001) jeq #2048 jt 0 jf 1
(002) ret #262144
(003) ret #0
";
        let program = parse_text(input).unwrap();
        assert_eq!(program.len(), 4);
        assert_eq!(program.insn(1).unwrap().opcode(), 0x15);
        assert_eq!(program.insn(1).unwrap().src(), 1);
    }

    #[test]
    fn text_accepts_hex_immediates() {
        let program = parse_text("(000) jeq #0x800 jt 0 jf 1\n(001) ret #0\n").unwrap();
        assert_eq!(program.insn(0).unwrap().immediate(), 0x800);
    }

    #[test]
    fn text_disambiguates_ld_family() {
        let cases = [
            ("(000) ld len", 0x80),
            ("(000) ld M[3]", 0x60),
            ("(000) ld #7", 0x00),
            ("(000) ld [20]", 0x20),
            ("(000) ld [x + 2]", 0x40),
            ("(000) ld 4*([14]&0xf)", 0xA0),
            ("(000) ldx len", 0x81),
            ("(000) ldx M[3]", 0x61),
            ("(000) ldx #7", 0x01),
            ("(000) ldx 4*([14]&0xf)", 0xA1),
            ("(000) ldxb 4*([14]&0xf)", 0xB1),
        ];
        for (line, opcode) in cases {
            let program = parse_text(&format!("{line}\n(001) ret #0\n")).unwrap();
            assert_eq!(program.insn(0).unwrap().opcode(), opcode, "{line}");
        }
    }

    #[test]
    fn text_disambiguates_ret() {
        let program = parse_text("(000) ret a\n").unwrap();
        assert_eq!(program.insn(0).unwrap().opcode(), 0x16);
        let program = parse_text("(000) ret #1\n").unwrap();
        assert_eq!(program.insn(0).unwrap().opcode(), 0x06);
    }

    #[test]
    fn text_rejects_unknown_mnemonic() {
        assert!(matches!(
            parse_text("(000) frobnicate #1\n"),
            Err(ParseError::UnknownMnemonic { line: 1, .. })
        ));
    }

    #[test]
    fn text_rejects_missing_index() {
        assert!(matches!(
            parse_text("ldh [12]\n"),
            Err(ParseError::BadInstruction { line: 1, .. })
        ));
    }

    #[test]
    fn text_rejects_bad_jump_shape() {
        assert!(matches!(
            parse_text("(000) jeq #1 jt 0\n"),
            Err(ParseError::BadOperands { .. })
        ));
    }

    #[test]
    fn auto_detects_both_formats() {
        assert_eq!(parse_auto(TCP_PORT_80_DD).unwrap().len(), 15);
        assert_eq!(parse_auto("(000) ret #0\n").unwrap().len(), 1);
        assert!(matches!(
            parse_auto("ldh [12]\n"),
            Err(ParseError::UnknownFormat)
        ));
        assert!(matches!(parse_auto("\n\n"), Err(ParseError::NoInstructions)));
    }

    /// Every opcode in the table, plus a registered-extension word: dump and
    /// re-parse must reproduce the instruction stream bit for bit.
    #[test]
    fn text_roundtrip_covers_every_opcode() {
        let mut records: Vec<(u8, u8, u8, u32)> = vec![
            (0x00, 0, 0, 0xFFFF_FFFF),
            (0x20, 0, 0, 26),
            (0x28, 0, 0, 12),
            (0x30, 0, 0, 23),
            (0x40, 0, 0, 4),
            (0x48, 0, 0, 16),
            (0x50, 0, 0, 1),
            (0x60, 0, 0, 5),
            (0x80, 0, 0, 0),
            (0xA0, 0, 0, 14),
            (0x01, 0, 0, 99),
            (0x61, 0, 0, 15),
            (0x81, 0, 0, 0),
            (0xA1, 0, 0, 14),
            (0xB1, 0, 0, 14),
            (0x02, 0, 0, 3),
            (0x03, 0, 0, 9),
            (0x04, 0, 0, 1),
            (0x14, 0, 0, 2),
            (0x24, 0, 0, 3),
            (0x34, 0, 0, 4),
            (0x44, 0, 0, 5),
            (0x54, 0, 0, 6),
            (0x64, 0, 0, 7),
            (0x74, 0, 0, 8),
            (0x84, 0, 0, 0),
            (0x94, 0, 0, 9),
            (0xA4, 0, 0, 10),
            (0x0C, 0, 0, 0),
            (0x1C, 0, 0, 0),
            (0x2C, 0, 0, 0),
            (0x3C, 0, 0, 0),
            (0x4C, 0, 0, 0),
            (0x5C, 0, 0, 0),
            (0x6C, 0, 0, 0),
            (0x7C, 0, 0, 0),
            (0x9C, 0, 0, 0),
            (0xAC, 0, 0, 0),
            (0x05, 0, 0, 2),
            (0x15, 1, 2, 0x800),
            (0x25, 3, 4, 64),
            (0x35, 5, 6, 128),
            (0x45, 7, 8, 0x1FFF),
            (0x1D, 1, 2, 0),
            (0x2D, 3, 4, 0),
            (0x3D, 5, 6, 0),
            (0x4D, 7, 8, 0),
            (0x07, 0, 0, 0),
            (0x87, 0, 0, 0),
            (0xE0, 0, 4, 14),
            (0xE1, 0, 0, 0),
            (0xE2, 0, 0, 0),
            (0xE3, 0, 0, 64),
            (0xE4, 0, 0, 60),
            (0xE5, 3, 0, 14),
            (0x88, 1, 2, 77), // registered-extension form
            (0x16, 0, 0, 0),
            (0x06, 0, 0, 0x0004_0000),
        ];
        // `ja -2` exercises the negative-offset spelling.
        records.push((0x05, 0, 0, (-2_i32) as u32));

        let program = Program::from_classic(&records).unwrap();
        let text = dump_text(&program);
        let reparsed = parse_text(&text).unwrap();
        assert_eq!(reparsed, program, "text roundtrip diverged:\n{text}");
    }

    #[test]
    fn hex_roundtrip_matches() {
        let program = parse_hex(TCP_PORT_80_DD).unwrap();
        let hex = dump_hex(&program);
        let reparsed = parse_hex(&hex).unwrap();
        assert_eq!(reparsed, program);
    }

    #[test]
    fn text_roundtrip_of_real_filter() {
        let program = parse_hex(TCP_PORT_80_DD).unwrap();
        let text = dump_text(&program);
        let reparsed = parse_text(&text).unwrap();
        assert_eq!(reparsed, program);
    }
}
