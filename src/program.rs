//! The program container.
//!
//! A [`Program`] is an immutable instruction sequence plus its validation
//! status. It is created from raw 64-bit words, a big-endian byte buffer, or
//! classic `(opcode, jt, jf, k)` records; validated exactly once by the
//! [`verifier`](crate::verifier) when loaded into a VM; and never mutated
//! afterwards, so any number of execution contexts may run it concurrently.

use crate::errors::ValidationError;
use crate::insn::Instruction;
use std::fmt;

/// Maximum number of instructions in one program.
pub const MAX_PROGRAM_LENGTH: usize = 4096;

/// An immutable BPF program.
#[derive(Clone, Debug)]
pub struct Program {
    insns: Vec<Instruction>,
    validated: bool,
    validation_error: Option<String>,
}

impl Program {
    /// Creates a program from decoded instructions.
    pub fn from_instructions(insns: Vec<Instruction>) -> Result<Self, ValidationError> {
        if insns.len() > MAX_PROGRAM_LENGTH {
            return Err(ValidationError::TooManyInstructions {
                len: insns.len(),
                max: MAX_PROGRAM_LENGTH,
            });
        }
        Ok(Self {
            insns,
            validated: false,
            validation_error: None,
        })
    }

    /// Creates a program from raw 64-bit instruction words.
    pub fn from_raw(raw: &[u64]) -> Result<Self, ValidationError> {
        Self::from_instructions(raw.iter().copied().map(Instruction::from_raw).collect())
    }

    /// Creates a program from a buffer of big-endian 64-bit words. The buffer
    /// carries no header or padding; its length must be a multiple of 8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        if bytes.len() % 8 != 0 {
            return Err(ValidationError::MalformedBuffer { len: bytes.len() });
        }
        let insns = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0_u8; 8];
                word.copy_from_slice(chunk);
                Instruction::from_raw(u64::from_be_bytes(word))
            })
            .collect();
        Self::from_instructions(insns)
    }

    /// Creates a program from classic `(opcode, jt, jf, k)` records, widening
    /// each into the 64-bit encoding.
    pub fn from_classic(records: &[(u8, u8, u8, u32)]) -> Result<Self, ValidationError> {
        Self::from_instructions(
            records
                .iter()
                .map(|&(opcode, jt, jf, k)| Instruction::from_classic(opcode, jt, jf, k))
                .collect(),
        )
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    /// True when the program holds no instructions.
    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// The instruction at `pc`, if in range.
    pub fn insn(&self, pc: usize) -> Option<Instruction> {
        self.insns.get(pc).copied()
    }

    /// All instructions in program order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.insns
    }

    /// Serializes to big-endian 64-bit words.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.insns.len() * 8);
        for insn in &self.insns {
            out.extend_from_slice(&insn.raw().to_be_bytes());
        }
        out
    }

    /// The raw 64-bit instruction words.
    pub fn to_raw(&self) -> Vec<u64> {
        self.insns.iter().map(|i| i.raw()).collect()
    }

    /// True once the verifier accepted this program.
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// The verifier's rejection reason, if validation failed.
    pub fn validation_error(&self) -> Option<&str> {
        self.validation_error.as_deref()
    }

    /// Records the verifier's verdict. Called once, by the loader.
    pub(crate) fn set_validation_status(&mut self, validated: bool, error: Option<String>) {
        self.validated = validated;
        self.validation_error = error;
    }
}

/// Programs compare by their instructions; validation status is metadata.
impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        self.insns == other.insns
    }
}

impl Eq for Program {}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BPF program, {} instructions:", self.len())?;
        for (i, insn) in self.insns.iter().enumerate() {
            writeln!(f, "{:4}: {:?}", i, insn)?;
        }
        match (&self.validated, &self.validation_error) {
            (false, _) => writeln!(f, "not validated"),
            (true, Some(err)) => writeln!(f, "validation failed: {err}"),
            (true, None) => writeln!(f, "validated"),
        }
    }
}
