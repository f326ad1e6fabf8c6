//! The instruction interpreter.
//!
//! Stateless: all mutable state lives in the [`ExecutionContext`] passed to
//! each call, so one interpreter may drive any number of contexts and a
//! validated program may run on several threads at once.
//!
//! The program counter is advanced before an instruction executes; jumps then
//! adjust it. Conditional jump offsets are relative to the *following*
//! instruction: target = `pc + 1 + jt` (or `jf`). Failed packet loads do not
//! abort the run; they zero the destination register and set the `TRUNCATED`
//! error bit, in the BPF tradition of silent loads.

use crate::context::ExecutionContext;
use crate::errors::ExecutionError;
use crate::extension::ExtensionRegistry;
use crate::insn::Instruction;
use crate::isa::BpfOpcode;
use crate::registers::{ERROR_TRUNCATED, REG_FRAME_LEN};
use crate::program::Program;
use crate::tracer::Tracer;


/// Instruction budget for one execution. Defence in depth: the verifier's
/// termination check makes this unreachable for accepted programs.
pub const MAX_EXECUTION_STEPS: u64 = 1024 * 1024;

/// Width of a packet load.
#[derive(Copy, Clone)]
enum Width {
    Byte,
    Half,
    Word,
}

/// ALU operation selector shared by the `*_K` and `*_X` forms.
#[derive(Copy, Clone)]
enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Or,
    And,
    Lsh,
    Rsh,
    Mod,
    Xor,
}

/// The opcode dispatcher.
#[derive(Debug, Default)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }

    /// Executes a validated program against the context's loaded packet and
    /// returns the 32-bit verdict.
    pub fn execute(
        &self,
        program: &Program,
        ctx: &mut ExecutionContext,
        registry: &ExtensionRegistry,
    ) -> Result<u32, ExecutionError> {
        self.execute_traced(program, ctx, registry, None)
    }

    /// Like [`execute`](Self::execute), optionally recording each step into a
    /// tracer. With `None` no tracing work happens at all.
    pub fn execute_traced(
        &self,
        program: &Program,
        ctx: &mut ExecutionContext,
        registry: &ExtensionRegistry,
        mut tracer: Option<&mut Tracer>,
    ) -> Result<u32, ExecutionError> {
        if !program.is_validated() {
            return Err(ExecutionError::InterpreterInvariant {
                pc: 0,
                detail: "program not validated",
            });
        }

        ctx.reset_execution_state();
        let frame_len = ctx.memory().original_len() as u64;
        set_reg(ctx, 0, REG_FRAME_LEN, frame_len)?;

        let mut steps: u64 = 0;
        while !ctx.is_terminated() {
            let pc = ctx.pc();
            let Some(insn) = program.insn(pc) else {
                return Err(ExecutionError::NoTerminatingReturn { pc });
            };

            steps += 1;
            if steps > MAX_EXECUTION_STEPS {
                return Err(ExecutionError::Timeout {
                    steps: MAX_EXECUTION_STEPS,
                });
            }

            ctx.set_pc(pc + 1);
            self.step(insn, pc, program.len(), ctx, registry)?;

            if let Some(t) = tracer.as_deref_mut() {
                t.record(
                    pc,
                    insn,
                    ctx.registers().a(),
                    ctx.registers().x(),
                    ctx.is_terminated(),
                );
            }
        }

        Ok(ctx.result())
    }

    /// Executes one instruction. The context's PC already points at the next
    /// instruction.
    fn step(
        &self,
        insn: Instruction,
        pc: usize,
        program_len: usize,
        ctx: &mut ExecutionContext,
        registry: &ExtensionRegistry,
    ) -> Result<(), ExecutionError> {
        let opcode = match insn.decode() {
            Ok(op) => op,
            // Not in the core table: a registered extension opcode, or junk.
            Err(_) => return self.dispatch_extension(insn, pc, ctx, registry),
        };

        let k = insn.immediate();
        match opcode {
            // Loads into A
            BpfOpcode::LdImm => ctx.registers_mut().set_a(u64::from(k)),
            BpfOpcode::LdAbsW => {
                let v = checked_load(ctx, u64::from(k), Width::Word);
                ctx.registers_mut().set_a(v);
            }
            BpfOpcode::LdAbsH => {
                let v = checked_load(ctx, u64::from(k), Width::Half);
                ctx.registers_mut().set_a(v);
            }
            BpfOpcode::LdAbsB => {
                let v = checked_load(ctx, u64::from(k), Width::Byte);
                ctx.registers_mut().set_a(v);
            }
            BpfOpcode::LdIndW => {
                let offset = ctx.registers().x().wrapping_add(u64::from(k));
                let v = checked_load(ctx, offset, Width::Word);
                ctx.registers_mut().set_a(v);
            }
            BpfOpcode::LdIndH => {
                let offset = ctx.registers().x().wrapping_add(u64::from(k));
                let v = checked_load(ctx, offset, Width::Half);
                ctx.registers_mut().set_a(v);
            }
            BpfOpcode::LdIndB => {
                let offset = ctx.registers().x().wrapping_add(u64::from(k));
                let v = checked_load(ctx, offset, Width::Byte);
                ctx.registers_mut().set_a(v);
            }
            BpfOpcode::LdLen => {
                let len = ctx.memory().packet_len() as u64 & 0xFFFF_FFFF;
                ctx.registers_mut().set_a(len);
            }
            BpfOpcode::LdMem => {
                let v = get_reg(ctx, pc, k as usize)?;
                ctx.registers_mut().set_a(v);
            }
            BpfOpcode::LdMsh => {
                let v = checked_load(ctx, u64::from(k), Width::Byte);
                ctx.registers_mut().set_a((v & 0x0F) << 2);
            }

            // Loads into X
            BpfOpcode::LdxImm => ctx.registers_mut().set_x(u64::from(k)),
            BpfOpcode::LdxLen => {
                let len = ctx.memory().packet_len() as u64 & 0xFFFF_FFFF;
                ctx.registers_mut().set_x(len);
            }
            BpfOpcode::LdxMem => {
                let v = get_reg(ctx, pc, k as usize)?;
                ctx.registers_mut().set_x(v);
            }
            BpfOpcode::LdxMsh | BpfOpcode::LdxMshB => {
                let v = checked_load(ctx, u64::from(k), Width::Byte);
                ctx.registers_mut().set_x((v & 0x0F) << 2);
            }

            // Scratch stores
            BpfOpcode::St => {
                let a = ctx.registers().a();
                set_reg(ctx, pc, k as usize, a)?;
            }
            BpfOpcode::Stx => {
                let x = ctx.registers().x();
                set_reg(ctx, pc, k as usize, x)?;
            }

            // ALU, immediate operand
            BpfOpcode::AddK => alu_k(ctx, AluOp::Add, k),
            BpfOpcode::SubK => alu_k(ctx, AluOp::Sub, k),
            BpfOpcode::MulK => alu_k(ctx, AluOp::Mul, k),
            BpfOpcode::DivK => alu_k(ctx, AluOp::Div, k),
            BpfOpcode::OrK => alu_k(ctx, AluOp::Or, k),
            BpfOpcode::AndK => alu_k(ctx, AluOp::And, k),
            BpfOpcode::LshK => alu_k(ctx, AluOp::Lsh, k),
            BpfOpcode::RshK => alu_k(ctx, AluOp::Rsh, k),
            BpfOpcode::ModK => alu_k(ctx, AluOp::Mod, k),
            BpfOpcode::XorK => alu_k(ctx, AluOp::Xor, k),
            BpfOpcode::Neg => {
                let a = ctx.registers().a() as u32;
                ctx.registers_mut().set_a(u64::from(a.wrapping_neg()));
            }

            // ALU, X operand
            BpfOpcode::AddX => alu_x(ctx, AluOp::Add),
            BpfOpcode::SubX => alu_x(ctx, AluOp::Sub),
            BpfOpcode::MulX => alu_x(ctx, AluOp::Mul),
            BpfOpcode::DivX => alu_x(ctx, AluOp::Div),
            BpfOpcode::OrX => alu_x(ctx, AluOp::Or),
            BpfOpcode::AndX => alu_x(ctx, AluOp::And),
            BpfOpcode::LshX => alu_x(ctx, AluOp::Lsh),
            BpfOpcode::RshX => alu_x(ctx, AluOp::Rsh),
            BpfOpcode::ModX => alu_x(ctx, AluOp::Mod),
            BpfOpcode::XorX => alu_x(ctx, AluOp::Xor),

            // Jumps
            BpfOpcode::Ja => {
                let target = ctx.pc() as i64 + i64::from(insn.signed_immediate());
                if target < 0 || target >= program_len as i64 {
                    // The verifier bounds every target; reaching this means a
                    // stale or tampered program.
                    return Err(ExecutionError::InterpreterInvariant {
                        pc,
                        detail: "jump target out of range",
                    });
                }
                ctx.set_pc(target as usize);
            }
            BpfOpcode::JeqK => {
                let taken = ctx.registers().a() == u64::from(k);
                branch(ctx, insn, taken);
            }
            BpfOpcode::JgtK => {
                let taken = ctx.registers().a() > u64::from(k);
                branch(ctx, insn, taken);
            }
            BpfOpcode::JgeK => {
                let taken = ctx.registers().a() >= u64::from(k);
                branch(ctx, insn, taken);
            }
            BpfOpcode::JsetK => {
                let taken = ctx.registers().a() & u64::from(k) != 0;
                branch(ctx, insn, taken);
            }
            BpfOpcode::JeqX => {
                let taken = ctx.registers().a() == ctx.registers().x();
                branch(ctx, insn, taken);
            }
            BpfOpcode::JgtX => {
                let taken = ctx.registers().a() > ctx.registers().x();
                branch(ctx, insn, taken);
            }
            BpfOpcode::JgeX => {
                let taken = ctx.registers().a() >= ctx.registers().x();
                branch(ctx, insn, taken);
            }
            BpfOpcode::JsetX => {
                let taken = ctx.registers().a() & ctx.registers().x() != 0;
                branch(ctx, insn, taken);
            }

            // Returns
            BpfOpcode::RetK => ctx.set_result(k),
            BpfOpcode::RetA => {
                let a = ctx.registers().a() as u32;
                ctx.set_result(a);
            }

            // Misc
            BpfOpcode::Tax => {
                let a = ctx.registers().a();
                ctx.registers_mut().set_x(a);
            }
            BpfOpcode::Txa => {
                let x = ctx.registers().x();
                ctx.registers_mut().set_a(x);
            }

            // Check opcodes go through the registry like any extension.
            op if op.is_extension() => {
                return self.dispatch_extension(insn, pc, ctx, registry);
            }

            _ => {
                return Err(ExecutionError::UnknownOpcode {
                    pc,
                    opcode: insn.opcode(),
                });
            }
        }

        Ok(())
    }

    fn dispatch_extension(
        &self,
        insn: Instruction,
        pc: usize,
        ctx: &mut ExecutionContext,
        registry: &ExtensionRegistry,
    ) -> Result<(), ExecutionError> {
        let mut view = ctx.execution_view();
        match registry.dispatch(insn, &mut view) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ExecutionError::UnknownOpcode {
                pc,
                opcode: insn.opcode(),
            }),
            Err(source) => Err(ExecutionError::Extension { pc, source }),
        }
    }
}

/// Reads from the packet; a fault yields zero and sets `TRUNCATED`.
fn checked_load(ctx: &mut ExecutionContext, offset: u64, width: Width) -> u64 {
    let result = match width {
        Width::Byte => ctx.memory().read_u8(offset).map(u64::from),
        Width::Half => ctx.memory().read_u16(offset).map(u64::from),
        Width::Word => ctx.memory().read_u32(offset).map(u64::from),
    };
    match result {
        Ok(value) => value,
        Err(_) => {
            ctx.registers_mut().set_error(ERROR_TRUNCATED);
            0
        }
    }
}

/// Register read with the failing PC attached.
fn get_reg(ctx: &ExecutionContext, pc: usize, index: usize) -> Result<u64, ExecutionError> {
    ctx.registers()
        .get(index)
        .map_err(|_| ExecutionError::InterpreterInvariant {
            pc,
            detail: "scratch slot out of range",
        })
}

/// Register write with the failing PC attached.
fn set_reg(
    ctx: &mut ExecutionContext,
    pc: usize,
    index: usize,
    value: u64,
) -> Result<(), ExecutionError> {
    ctx.registers_mut()
        .set(index, value)
        .map_err(|_| ExecutionError::InterpreterInvariant {
            pc,
            detail: "scratch slot out of range",
        })
}

/// All ALU results are masked to 32 bits; division and modulo by zero yield
/// zero; shifts use only the low five bits of the count.
fn alu(op: AluOp, a: u64, b: u64) -> u64 {
    const MASK: u64 = 0xFFFF_FFFF;
    match op {
        AluOp::Add => a.wrapping_add(b) & MASK,
        AluOp::Sub => a.wrapping_sub(b) & MASK,
        AluOp::Mul => a.wrapping_mul(b) & MASK,
        AluOp::Div => {
            if b == 0 { 0 } else { (a / b) & MASK }
        }
        AluOp::Or => (a | b) & MASK,
        AluOp::And => a & b & MASK,
        AluOp::Lsh => (a << (b & 31)) & MASK,
        AluOp::Rsh => ((a & MASK) >> (b & 31)) & MASK,
        AluOp::Mod => {
            if b == 0 { 0 } else { (a % b) & MASK }
        }
        AluOp::Xor => (a ^ b) & MASK,
    }
}

fn alu_k(ctx: &mut ExecutionContext, op: AluOp, k: u32) {
    let a = ctx.registers().a();
    ctx.registers_mut().set_a(alu(op, a, u64::from(k)));
}

fn alu_x(ctx: &mut ExecutionContext, op: AluOp) {
    let a = ctx.registers().a();
    let x = ctx.registers().x();
    ctx.registers_mut().set_a(alu(op, a, x));
}

/// Conditional branch: both offsets are relative to the already-advanced PC.
fn branch(ctx: &mut ExecutionContext, insn: Instruction, taken: bool) {
    let offset = if taken { insn.dst() } else { insn.src() };
    ctx.set_pc(ctx.pc() + offset as usize);
}
