//! Error types for program validation, execution, parsing and extensions.
//!
//! Each failure domain gets its own enum so callers can match on exactly the
//! class of failure they can handle. [`MemoryError`] is internal to the packet
//! buffer: the interpreter converts load faults into an error-register bit and
//! never propagates them (see [`memory`](crate::memory)).

use bpfvm_derive::Error;

/// Static program rejection, raised before any execution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Program contains no instructions.
    #[error("empty program")]
    EmptyProgram,
    /// Program exceeds the instruction limit.
    #[error("program has {len} instructions, limit is {max}")]
    TooManyInstructions { len: usize, max: usize },
    /// Binary buffer is not a whole number of 64-bit words.
    #[error("program buffer of {len} bytes is not a multiple of 8")]
    MalformedBuffer { len: usize },
    /// Reserved padding bits of an instruction word are set.
    #[error("instruction {index} has nonzero reserved bits")]
    ReservedBits { index: usize },
    /// Opcode byte decodes to nothing known or registered.
    #[error("instruction {index} has unknown opcode 0x{opcode:02x}")]
    UnknownOpcode { index: usize, opcode: u8 },
    /// Jump resolves outside `[0, program length)`.
    #[error("jump at instruction {index} targets {target}, program length is {len}")]
    JumpOutOfRange { index: usize, target: i64, len: usize },
    /// `div #0` or `mod #0`.
    #[error("instruction {index} divides by zero immediate")]
    DivisionByZeroImmediate { index: usize },
    /// Absolute packet offset is outside the addressable packet range.
    #[error("instruction {index} addresses packet offset {offset}, maximum is {max}")]
    OffsetOutOfRange { index: usize, offset: i64, max: usize },
    /// Scratch slot index is outside `M[0..16)`.
    #[error("instruction {index} addresses scratch slot {slot}, limit is {max}")]
    ScratchOutOfRange { index: usize, slot: u32, max: usize },
    /// Final instruction is not a return.
    #[error("last instruction (index {index}) is not a return")]
    MissingReturn { index: usize },
    /// Control flow can revisit an instruction, so execution may not terminate.
    #[error("control-flow cycle through instruction {index}")]
    CycleDetected { index: usize },
}

/// Execution failure, fatal to the current run; the context must be reset.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// `execute` called with no loaded program.
    #[error("no program loaded")]
    NoProgramLoaded,
    /// Program counter ran past the last instruction without returning.
    #[error("program counter {pc} ran past program end without a return")]
    NoTerminatingReturn { pc: usize },
    /// Opcode had no core semantics and no registered handler.
    #[error("unknown opcode 0x{opcode:02x} at instruction {pc}")]
    UnknownOpcode { pc: usize, opcode: u8 },
    /// Instruction budget exhausted.
    #[error("execution exceeded {steps} instructions")]
    Timeout { steps: u64 },
    /// A condition the verifier should have excluded was hit at runtime.
    #[error("interpreter invariant violated at instruction {pc}: {detail}")]
    InterpreterInvariant { pc: usize, detail: &'static str },
    /// Packet exceeds the memory cap and cannot be loaded.
    #[error("packet of {len} bytes exceeds the {max} byte maximum")]
    PacketTooLarge { len: usize, max: usize },
    /// An extension failed while handling its opcode.
    #[error("extension failure at instruction {pc}: {source}")]
    Extension { pc: usize, source: ExtensionError },
}

/// Invalid packet-buffer access. Converted by the interpreter into a zero
/// result plus the `TRUNCATED` error bit; callers of the VM never see it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    /// Read would cross the visible packet end.
    #[error("read of {size} bytes at offset {offset} exceeds packet length {len}")]
    OutOfBounds { offset: u64, size: usize, len: usize },
    /// No packet has been loaded.
    #[error("packet memory not initialized")]
    Uninitialized,
    /// Packet larger than the buffer cap.
    #[error("packet of {len} bytes exceeds the {max} byte maximum")]
    PacketTooLarge { len: usize, max: usize },
}

/// Malformed assembler input. Fatal to the parse call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Line does not match `(NNN) mnemonic operands`.
    #[error("line {line}: unrecognized instruction format: {text}")]
    BadInstruction { line: usize, text: String },
    /// Mnemonic is not in the instruction table.
    #[error("line {line}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic { line: usize, mnemonic: String },
    /// Operand text does not fit the instruction's format.
    #[error("line {line}: bad operands for `{mnemonic}`: {operands}")]
    BadOperands {
        line: usize,
        mnemonic: String,
        operands: String,
    },
    /// Numeric literal could not be parsed or is out of range.
    #[error("line {line}: bad numeric value `{value}`")]
    BadNumber { line: usize, value: String },
    /// Hex-format line does not match `{{ 0xOP, JT, JF, 0xK }}`.
    #[error("line {line}: unrecognized hex instruction: {text}")]
    BadHexInstruction { line: usize, text: String },
    /// Input held no instructions at all.
    #[error("no instructions found in input")]
    NoInstructions,
    /// Input holds more instructions than a program may.
    #[error("input has {len} instructions, limit is {max}")]
    TooManyInstructions { len: usize, max: usize },
    /// Neither the text nor the hex format was recognized.
    #[error("unable to detect program format")]
    UnknownFormat,
}

/// Extension lifecycle or execution failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtensionError {
    /// `initialize` called twice.
    #[error("extension `{name}` already initialized")]
    AlreadyInitialized { name: String },
    /// Extension used before `initialize`.
    #[error("extension `{name}` not initialized")]
    NotInitialized { name: String },
    /// Claimed opcode collides with the core table or a prior claim.
    #[error("opcode 0x{opcode:02x} is reserved or already claimed")]
    OpcodeUnavailable { opcode: u8 },
    /// Claimed opcode is below the extension range.
    #[error("opcode 0x{opcode:02x} is below the extension range (0x80)")]
    OpcodeOutOfRange { opcode: u8 },
    /// Opcode-specific failure inside a handler.
    #[error("extension execution failed: {reason}")]
    ExecutionFailed { reason: String },
}
