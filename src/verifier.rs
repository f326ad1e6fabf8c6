//! Static program verification.
//!
//! Runs once per program, before execution. A program that passes cannot
//! crash the interpreter, jump outside itself, divide by a zero immediate, or
//! loop forever: conditional branches are forward-only by encoding, and the
//! one backward-capable instruction (`ja`) is rejected if it closes a
//! reachable control-flow cycle.
//!
//! The verifier does not attempt per-packet safety; packet loads are
//! bounds-checked at runtime and fail soft (see [`memory`](crate::memory)).

use crate::errors::ValidationError;
use crate::isa::{BpfOpcode, OperandFormat};
use crate::memory::MAX_PACKET_SIZE;
use crate::program::{MAX_PROGRAM_LENGTH, Program};
use crate::registers::NUM_REGISTERS;

/// Verifies a program against the core instruction table only.
pub fn verify(program: &Program) -> Result<(), ValidationError> {
    verify_with_registry(program, |_| false)
}

/// Verifies a program, additionally accepting opcode bytes claimed in an
/// extension registry. Registered opcodes are treated as straight-line
/// instructions with opcode-specific operands.
pub fn verify_with_registry(
    program: &Program,
    is_registered: impl Fn(u8) -> bool,
) -> Result<(), ValidationError> {
    let len = program.len();
    if len == 0 {
        return Err(ValidationError::EmptyProgram);
    }
    if len > MAX_PROGRAM_LENGTH {
        return Err(ValidationError::TooManyInstructions {
            len,
            max: MAX_PROGRAM_LENGTH,
        });
    }

    for (index, insn) in program.instructions().iter().enumerate() {
        if !insn.reserved_bits_clear() {
            return Err(ValidationError::ReservedBits { index });
        }

        let opcode = match insn.decode() {
            Ok(op) => op,
            Err(_) if is_registered(insn.opcode()) => continue,
            Err(_) => {
                return Err(ValidationError::UnknownOpcode {
                    index,
                    opcode: insn.opcode(),
                });
            }
        };

        if matches!(opcode, BpfOpcode::DivK | BpfOpcode::ModK) && insn.immediate() == 0 {
            return Err(ValidationError::DivisionByZeroImmediate { index });
        }

        match opcode.format() {
            OperandFormat::MemoryAbs | OperandFormat::MemoryInd => {
                let offset = i64::from(insn.signed_immediate());
                if offset < 0 || offset >= MAX_PACKET_SIZE as i64 {
                    return Err(ValidationError::OffsetOutOfRange {
                        index,
                        offset,
                        max: MAX_PACKET_SIZE,
                    });
                }
            }
            OperandFormat::MemoryReg => {
                let slot = insn.immediate();
                if slot as usize >= NUM_REGISTERS {
                    return Err(ValidationError::ScratchOutOfRange {
                        index,
                        slot,
                        max: NUM_REGISTERS,
                    });
                }
            }
            OperandFormat::JumpUncond => {
                let target = index as i64 + 1 + i64::from(insn.signed_immediate());
                if target < 0 || target >= len as i64 {
                    return Err(ValidationError::JumpOutOfRange {
                        index,
                        target,
                        len,
                    });
                }
            }
            OperandFormat::JumpCond => {
                for branch in [insn.dst(), insn.src()] {
                    let target = index as i64 + 1 + i64::from(branch);
                    if target >= len as i64 {
                        return Err(ValidationError::JumpOutOfRange {
                            index,
                            target,
                            len,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    let last = len - 1;
    let last_is_return = program
        .insn(last)
        .and_then(|insn| insn.decode().ok())
        .is_some_and(BpfOpcode::is_return);
    if !last_is_return {
        return Err(ValidationError::MissingReturn { index: last });
    }

    check_termination(program)
}

/// Depth-first search over the control-flow graph from instruction 0,
/// rejecting any reachable cycle. Assumes jump targets are already in range.
fn check_termination(program: &Program) -> Result<(), ValidationError> {
    #[derive(Copy, Clone, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    let len = program.len();
    let mut marks = vec![Mark::Unvisited; len];
    // Explicit stack; (index, next successor position) frames.
    let mut stack: Vec<(usize, usize)> = vec![(0, 0)];
    marks[0] = Mark::OnStack;

    while let Some(frame) = stack.last_mut() {
        let (index, cursor) = *frame;
        let succ = successors(program, index);
        if cursor >= succ.len() {
            marks[index] = Mark::Done;
            stack.pop();
            continue;
        }
        frame.1 += 1;
        let target = succ[cursor];

        match marks[target] {
            Mark::OnStack => return Err(ValidationError::CycleDetected { index }),
            Mark::Unvisited => {
                marks[target] = Mark::OnStack;
                stack.push((target, 0));
            }
            Mark::Done => {}
        }
    }

    Ok(())
}

/// Successor instruction indices for the instruction at `index`. Registered
/// extension opcodes and anything undecodable fall through.
pub(crate) fn successors(program: &Program, index: usize) -> Vec<usize> {
    let Some(insn) = program.insn(index) else {
        return Vec::new();
    };

    match insn.decode() {
        Ok(op) if op.is_return() => Vec::new(),
        Ok(BpfOpcode::Ja) => {
            let target = index as i64 + 1 + i64::from(insn.signed_immediate());
            vec![target as usize]
        }
        Ok(op) if op.is_jump() => {
            let t = index + 1 + insn.dst() as usize;
            let f = index + 1 + insn.src() as usize;
            if t == f { vec![t] } else { vec![t, f] }
        }
        _ => {
            if index + 1 < program.len() {
                vec![index + 1]
            } else {
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classic(records: &[(u8, u8, u8, u32)]) -> Program {
        Program::from_classic(records).unwrap()
    }

    #[test]
    fn accepts_minimal_return() {
        let program = classic(&[(0x06, 0, 0, 0x0004_0000)]);
        assert_eq!(verify(&program), Ok(()));
    }

    #[test]
    fn accepts_ethertype_filter() {
        let program = classic(&[
            (0x28, 0, 0, 0x0000_000C),
            (0x15, 0, 1, 0x0000_0800),
            (0x06, 0, 0, 0x0004_0000),
            (0x06, 0, 0, 0x0000_0000),
        ]);
        assert_eq!(verify(&program), Ok(()));
    }

    #[test]
    fn rejects_empty_program() {
        let program = Program::from_raw(&[]).unwrap();
        assert_eq!(verify(&program), Err(ValidationError::EmptyProgram));
    }

    #[test]
    fn rejects_unknown_opcode() {
        let program = classic(&[(0xFE, 0, 0, 0), (0x06, 0, 0, 0)]);
        assert_eq!(
            verify(&program),
            Err(ValidationError::UnknownOpcode {
                index: 0,
                opcode: 0xFE
            })
        );
    }

    #[test]
    fn accepts_registered_opcode() {
        let program = classic(&[(0x88, 0, 0, 0), (0x06, 0, 0, 0)]);
        assert!(verify(&program).is_err());
        assert_eq!(verify_with_registry(&program, |op| op == 0x88), Ok(()));
    }

    #[test]
    fn rejects_conditional_jump_past_end() {
        // jeq #0 jt 5 jf 0; ret #0  -- true branch targets instruction 6 of 2.
        let program = classic(&[(0x15, 5, 0, 0), (0x06, 0, 0, 0)]);
        assert_eq!(
            verify(&program),
            Err(ValidationError::JumpOutOfRange {
                index: 0,
                target: 6,
                len: 2
            })
        );
    }

    #[test]
    fn rejects_ja_before_start() {
        let program = classic(&[(0x05, 0, 0, (-5_i32) as u32), (0x06, 0, 0, 0)]);
        assert_eq!(
            verify(&program),
            Err(ValidationError::JumpOutOfRange {
                index: 0,
                target: -4,
                len: 2
            })
        );
    }

    #[test]
    fn rejects_div_by_zero_immediate() {
        let program = classic(&[(0x34, 0, 0, 0), (0x06, 0, 0, 0)]);
        assert_eq!(
            verify(&program),
            Err(ValidationError::DivisionByZeroImmediate { index: 0 })
        );
        let program = classic(&[(0x94, 0, 0, 0), (0x06, 0, 0, 0)]);
        assert_eq!(
            verify(&program),
            Err(ValidationError::DivisionByZeroImmediate { index: 0 })
        );
    }

    #[test]
    fn accepts_div_by_zero_with_x() {
        // Runtime rule handles X = 0; only the immediate form is static.
        let program = classic(&[(0x3C, 0, 0, 0), (0x06, 0, 0, 0)]);
        assert_eq!(verify(&program), Ok(()));
    }

    #[test]
    fn rejects_missing_return() {
        let program = classic(&[(0x00, 0, 0, 7)]);
        assert_eq!(
            verify(&program),
            Err(ValidationError::MissingReturn { index: 0 })
        );
    }

    #[test]
    fn rejects_huge_absolute_offset() {
        let program = classic(&[(0x20, 0, 0, 0x7FFF_FFFF), (0x06, 0, 0, 0)]);
        assert!(matches!(
            verify(&program),
            Err(ValidationError::OffsetOutOfRange { index: 0, .. })
        ));
    }

    #[test]
    fn rejects_scratch_slot_out_of_range() {
        let program = classic(&[(0x02, 0, 0, 16), (0x06, 0, 0, 0)]);
        assert_eq!(
            verify(&program),
            Err(ValidationError::ScratchOutOfRange {
                index: 0,
                slot: 16,
                max: 16
            })
        );
    }

    #[test]
    fn rejects_reserved_bits() {
        let mut raw = vec![0x0600_0000_0000_0000_u64];
        raw[0] |= 1 << 35;
        let program = Program::from_raw(&raw).unwrap();
        assert_eq!(
            verify(&program),
            Err(ValidationError::ReservedBits { index: 0 })
        );
    }

    #[test]
    fn rejects_self_loop() {
        // ja -1 jumps to itself.
        let program = classic(&[(0x05, 0, 0, (-1_i32) as u32), (0x06, 0, 0, 0)]);
        assert!(matches!(
            verify(&program),
            Err(ValidationError::CycleDetected { .. })
        ));
    }

    #[test]
    fn rejects_two_instruction_cycle() {
        // 0: ja +1 -> 2;  1: ret;  2: ja -3 -> 0.
        let program = classic(&[
            (0x05, 0, 0, 1),
            (0x06, 0, 0, 0),
            (0x05, 0, 0, (-3_i32) as u32),
            (0x06, 0, 0, 0),
        ]);
        assert!(matches!(
            verify(&program),
            Err(ValidationError::CycleDetected { .. })
        ));
    }

    #[test]
    fn accepts_backward_ja_without_cycle() {
        // 0: ja +1 -> 2;  1: ret #1;  2: ja -2 -> 1. Backward edge, no cycle.
        let program = classic(&[
            (0x05, 0, 0, 1),
            (0x06, 0, 0, 1),
            (0x05, 0, 0, (-2_i32) as u32),
            (0x06, 0, 0, 0),
        ]);
        assert_eq!(verify(&program), Ok(()));
    }

    #[test]
    fn unreachable_cycle_is_tolerated() {
        // 1: ja -1 loops on itself but is unreachable from instruction 0,
        // so the reachability-scoped termination check does not see it.
        let program = classic(&[
            (0x06, 0, 0, 0),
            (0x05, 0, 0, (-1_i32) as u32),
            (0x06, 0, 0, 0),
        ]);
        assert_eq!(verify(&program), Ok(()));
    }
}
