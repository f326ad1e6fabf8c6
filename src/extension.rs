//! Extension surface.
//!
//! Opcodes the core interpreter does not implement are routed through a
//! registry of [`Extension`] handlers keyed by opcode byte. The registry is
//! populated at VM construction and read-only during execution; a handler
//! sees the packet read-only, the registers read-write, the caller-supplied
//! protocol metadata, and can set error bits or terminate the run.
//!
//! An extension claims opcode values at `initialize` time. Claims must be
//! `>= 0x80` and must not shadow a core instruction; the built-in check
//! opcodes (`0xE0..=0xE5`, see [`checks`](crate::checks)) are claimed by the
//! default extension the VM registers on construction.

use crate::context::{MAX_PROTOCOL_LAYERS, ProtocolInfo};
use crate::errors::ExtensionError;
use crate::insn::Instruction;
use crate::isa::BpfOpcode;
use crate::memory::PacketMemory;
use crate::registers::RegisterFile;
use std::collections::HashMap;

/// Lowest opcode value an extension may claim.
pub const EXTENSION_OPCODE_BASE: u8 = 0x80;

/// A pluggable opcode handler.
pub trait Extension {
    /// Extension name, for diagnostics.
    fn name(&self) -> &str;

    /// Extension version string.
    fn version(&self) -> &str;

    /// Claims opcodes and reads configuration. Called once, at registration.
    fn initialize(&mut self, ctx: &mut ExtensionContext<'_>) -> Result<(), ExtensionError>;

    /// Executes one instruction. Returns `Ok(true)` when the opcode was
    /// handled (execution falls through to the next instruction unless the
    /// handler set a result), `Ok(false)` when the opcode is not this
    /// extension's.
    fn execute(
        &self,
        insn: Instruction,
        view: &mut ExecutionView<'_>,
    ) -> Result<bool, ExtensionError>;

    /// Releases extension resources. Called when the registry is dropped.
    fn cleanup(&mut self) {}
}

/// Initialization-time context handed to [`Extension::initialize`].
pub struct ExtensionContext<'a> {
    config: &'a HashMap<String, String>,
    taken: &'a HashMap<u8, usize>,
    claims: Vec<u8>,
}

impl<'a> ExtensionContext<'a> {
    fn new(config: &'a HashMap<String, String>, taken: &'a HashMap<u8, usize>) -> Self {
        Self {
            config,
            taken,
            claims: Vec::new(),
        }
    }

    /// The VM's extension configuration map.
    pub fn configuration(&self) -> &HashMap<String, String> {
        self.config
    }

    /// Looks up one configuration value.
    pub fn config(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// Claims an opcode for the initializing extension.
    pub fn register_opcode(&mut self, opcode: u8) -> Result<(), ExtensionError> {
        if opcode < EXTENSION_OPCODE_BASE {
            return Err(ExtensionError::OpcodeOutOfRange { opcode });
        }
        // Core instructions cannot be shadowed; the 0xE0 block is itself
        // extension-dispatched, so it is claimable.
        let shadows_core = BpfOpcode::try_from(opcode)
            .map(|op| !op.is_extension())
            .unwrap_or(false);
        if shadows_core || self.taken.contains_key(&opcode) || self.claims.contains(&opcode) {
            return Err(ExtensionError::OpcodeUnavailable { opcode });
        }
        self.claims.push(opcode);
        Ok(())
    }

    /// The VM version string.
    pub fn vm_version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

/// What an executing extension may see and touch.
pub struct ExecutionView<'a> {
    memory: &'a PacketMemory,
    registers: &'a mut RegisterFile,
    protocols: &'a [Option<ProtocolInfo>; MAX_PROTOCOL_LAYERS],
    result: &'a mut u32,
    terminated: &'a mut bool,
}

impl<'a> ExecutionView<'a> {
    pub(crate) fn new(
        memory: &'a PacketMemory,
        registers: &'a mut RegisterFile,
        protocols: &'a [Option<ProtocolInfo>; MAX_PROTOCOL_LAYERS],
        result: &'a mut u32,
        terminated: &'a mut bool,
    ) -> Self {
        Self {
            memory,
            registers,
            protocols,
            result,
            terminated,
        }
    }

    /// The visible packet bytes.
    pub fn packet(&self) -> &[u8] {
        self.memory.packet()
    }

    /// The packet buffer, for length and truncation queries.
    pub fn memory(&self) -> &PacketMemory {
        self.memory
    }

    /// Reads a register slot.
    pub fn register(&self, index: usize) -> Option<u64> {
        self.registers.get(index).ok()
    }

    /// Writes a register slot. Returns false when the index is out of range.
    pub fn set_register(&mut self, index: usize, value: u64) -> bool {
        self.registers.set(index, value).is_ok()
    }

    /// Sets `ERROR_*` bits in the status register.
    pub fn set_error(&mut self, bits: u64) {
        self.registers.set_error(bits);
    }

    /// The current error-status bitfield.
    pub fn error_status(&self) -> u64 {
        self.registers.error_status()
    }

    /// Sets the program result and terminates the run.
    pub fn set_result(&mut self, result: u32) {
        *self.result = result;
        *self.terminated = true;
    }

    /// Caller-supplied metadata for a protocol layer.
    pub fn protocol_info(&self, layer: usize) -> Option<&ProtocolInfo> {
        self.protocols.get(layer).and_then(Option::as_ref)
    }
}

/// The opcode-to-handler table, fixed after VM construction.
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
    handlers: HashMap<u8, usize>,
    config: HashMap<String, String>,
}

impl ExtensionRegistry {
    /// Creates an empty registry carrying the VM's extension configuration.
    pub fn new(config: HashMap<String, String>) -> Self {
        Self {
            extensions: Vec::new(),
            handlers: HashMap::new(),
            config,
        }
    }

    /// Initializes and registers an extension, recording its opcode claims.
    pub fn register(&mut self, mut extension: Box<dyn Extension>) -> Result<(), ExtensionError> {
        let mut ctx = ExtensionContext::new(&self.config, &self.handlers);
        extension.initialize(&mut ctx)?;
        let claims = ctx.claims;

        let index = self.extensions.len();
        for opcode in claims {
            self.handlers.insert(opcode, index);
        }
        self.extensions.push(extension);
        Ok(())
    }

    /// True when a handler has claimed the opcode.
    pub fn is_registered(&self, opcode: u8) -> bool {
        self.handlers.contains_key(&opcode)
    }

    /// Routes an instruction to its claimed handler. `Ok(false)` means no
    /// handler claimed the opcode (or the handler declined it).
    pub fn dispatch(
        &self,
        insn: Instruction,
        view: &mut ExecutionView<'_>,
    ) -> Result<bool, ExtensionError> {
        match self.handlers.get(&insn.opcode()) {
            Some(&index) => self.extensions[index].execute(insn, view),
            None => Ok(false),
        }
    }
}

impl Drop for ExtensionRegistry {
    fn drop(&mut self) {
        for extension in &mut self.extensions {
            extension.cleanup();
        }
    }
}
