//! The top-level virtual machine.
//!
//! [`BpfVm`] ties the pieces together: it owns one execution context, the
//! extension registry (populated at construction, read-only afterwards) and
//! the currently loaded program. Loading validates through the
//! [`verifier`](crate::verifier); executing hands the packet to the
//! [`interpreter`](crate::interp). The VM itself keeps no other state, so
//! running the same program from several VMs in parallel is race-free.

use crate::checks::ChecksExtension;
use crate::context::ExecutionContext;
use crate::errors::{ExecutionError, ExtensionError, MemoryError, ValidationError};
use crate::extension::{Extension, ExtensionRegistry};
use crate::interp::Interpreter;
use crate::program::Program;
use crate::tracer::Tracer;
use crate::util::log;
use crate::verifier;
use std::collections::HashMap;

/// A complete packet-filter VM.
pub struct BpfVm {
    context: ExecutionContext,
    interpreter: Interpreter,
    registry: ExtensionRegistry,
    program: Option<Program>,
}

impl BpfVm {
    /// Creates a VM with the default packet-buffer capacity and no extension
    /// configuration.
    pub fn new() -> Self {
        Self::with_config(HashMap::new())
    }

    /// Creates a VM with a caller-sized packet buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(ExecutionContext::with_capacity(capacity), HashMap::new())
    }

    /// Creates a VM whose extensions see the given configuration map.
    pub fn with_config(config: HashMap<String, String>) -> Self {
        Self::build(ExecutionContext::new(), config)
    }

    fn build(context: ExecutionContext, config: HashMap<String, String>) -> Self {
        let mut registry = ExtensionRegistry::new(config);
        // The built-in checks claim the 0xE0 block of a fresh registry; this
        // cannot collide.
        registry
            .register(Box::new(ChecksExtension::new()))
            .expect("builtin check registration");

        Self {
            context,
            interpreter: Interpreter::new(),
            registry,
            program: None,
        }
    }

    /// Registers an additional extension. Must happen before the extension's
    /// opcodes are loaded in a program.
    pub fn register_extension(
        &mut self,
        extension: Box<dyn Extension>,
    ) -> Result<(), ExtensionError> {
        self.registry.register(extension)
    }

    /// Validates and loads a program. On rejection the previously loaded
    /// program stays in place.
    pub fn load_program(&mut self, mut program: Program) -> Result<(), ValidationError> {
        match verifier::verify_with_registry(&program, |op| self.registry.is_registered(op)) {
            Ok(()) => {
                program.set_validation_status(true, None);
                log::debug(&format!("loaded program, {} instructions", program.len()));
                self.program = Some(program);
                Ok(())
            }
            Err(err) => {
                log::warn(&format!("program rejected: {err}"));
                Err(err)
            }
        }
    }

    /// Loads a program from raw 64-bit instruction words.
    pub fn load_raw(&mut self, raw: &[u64]) -> Result<(), ValidationError> {
        self.load_program(Program::from_raw(raw)?)
    }

    /// Loads a program from a big-endian binary buffer.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), ValidationError> {
        self.load_program(Program::from_bytes(bytes)?)
    }

    /// Runs the loaded program against one packet and returns its verdict.
    pub fn execute(&mut self, packet: &[u8]) -> Result<u32, ExecutionError> {
        self.run(packet, None)
    }

    /// Like [`execute`](Self::execute), recording each step into the tracer.
    pub fn execute_traced(
        &mut self,
        packet: &[u8],
        tracer: &mut Tracer,
    ) -> Result<u32, ExecutionError> {
        self.run(packet, Some(tracer))
    }

    fn run(&mut self, packet: &[u8], tracer: Option<&mut Tracer>) -> Result<u32, ExecutionError> {
        let Some(program) = &self.program else {
            return Err(ExecutionError::NoProgramLoaded);
        };

        self.context
            .memory_mut()
            .load_packet(packet)
            .map_err(|err| match err {
                MemoryError::PacketTooLarge { len, max } => {
                    ExecutionError::PacketTooLarge { len, max }
                }
                _ => ExecutionError::InterpreterInvariant {
                    pc: 0,
                    detail: "packet load failed",
                },
            })?;

        self.interpreter
            .execute_traced(program, &mut self.context, &self.registry, tracer)
    }

    /// The execution context, for packet metadata and register inspection.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The execution context, mutably.
    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.context
    }

    /// The loaded program, if any.
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// Unloads the program and zeroes the context. Buffer allocations are
    /// kept.
    pub fn reset(&mut self) {
        self.context.reset();
        self.program = None;
    }
}

impl Default for BpfVm {
    fn default() -> Self {
        Self::new()
    }
}
