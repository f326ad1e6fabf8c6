//! Per-thread execution state.
//!
//! An [`ExecutionContext`] owns the packet memory and register file, the
//! program counter, the termination flag and the 32-bit result, plus
//! caller-supplied protocol metadata for up to sixteen layers. One context is
//! created per thread and reset between packets; a validated program is
//! shared, never owned, so any number of contexts may execute it in parallel.

use crate::extension::ExecutionView;
use crate::memory::PacketMemory;
use crate::registers::{REG_L3_OFFSET, REG_L4_OFFSET, RegisterFile};
use std::collections::HashMap;

/// Maximum number of protocol layers tracked per packet.
pub const MAX_PROTOCOL_LAYERS: usize = 16;

/// Classified protocol, mapped from IP protocol numbers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Protocol {
    Unknown,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Icmp,
    Sctp,
}

impl Protocol {
    /// Maps an IP protocol number to its classification.
    pub fn from_ip_proto(id: u32) -> Self {
        match id {
            1 => Protocol::Icmp,
            4 => Protocol::Ipv4,
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            41 => Protocol::Ipv6,
            132 => Protocol::Sctp,
            _ => Protocol::Unknown,
        }
    }

    /// True for IPv4 or IPv6.
    pub fn is_ip(self) -> bool {
        matches!(self, Protocol::Ipv4 | Protocol::Ipv6)
    }

    /// True for transport-layer protocols.
    pub fn is_transport(self) -> bool {
        matches!(
            self,
            Protocol::Tcp | Protocol::Udp | Protocol::Sctp | Protocol::Icmp
        )
    }
}

/// Metadata for one protocol layer, supplied by the caller (typically a
/// dissector) before execution.
#[derive(Clone, Debug, Default)]
pub struct ProtocolInfo {
    /// Numeric type: EtherType for layer 3, IP protocol number for layer 4.
    pub proto_type: u32,
    /// Header offset from the start of the packet.
    pub offset: u32,
    /// Header length in bytes.
    pub header_len: u32,
    /// Protocol flag bits.
    pub flags: u64,
    fields: HashMap<u32, u64>,
}

impl ProtocolInfo {
    /// Creates layer metadata with no fields or flags.
    pub fn new(proto_type: u32, offset: u32, header_len: u32) -> Self {
        Self {
            proto_type,
            offset,
            header_len,
            flags: 0,
            fields: HashMap::new(),
        }
    }

    /// Records a field value by identifier.
    pub fn set_field(&mut self, id: u32, value: u64) {
        self.fields.insert(id, value);
    }

    /// Looks up a field value.
    pub fn field(&self, id: u32) -> Option<u64> {
        self.fields.get(&id).copied()
    }

    /// True when the field has been recorded.
    pub fn has_field(&self, id: u32) -> bool {
        self.fields.contains_key(&id)
    }
}

/// Execution state for one packet at a time.
#[derive(Debug)]
pub struct ExecutionContext {
    memory: PacketMemory,
    registers: RegisterFile,
    pc: usize,
    result: u32,
    terminated: bool,
    protocols: [Option<ProtocolInfo>; MAX_PROTOCOL_LAYERS],
}

impl ExecutionContext {
    /// Creates a context with the default packet-buffer capacity.
    pub fn new() -> Self {
        Self::with_memory(PacketMemory::new())
    }

    /// Creates a context with a caller-sized packet buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_memory(PacketMemory::with_capacity(capacity))
    }

    fn with_memory(memory: PacketMemory) -> Self {
        Self {
            memory,
            registers: RegisterFile::new(),
            pc: 0,
            result: 0,
            terminated: false,
            protocols: std::array::from_fn(|_| None),
        }
    }

    /// The packet buffer.
    pub fn memory(&self) -> &PacketMemory {
        &self.memory
    }

    /// The packet buffer, mutably.
    pub fn memory_mut(&mut self) -> &mut PacketMemory {
        &mut self.memory
    }

    /// The register file.
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// The register file, mutably.
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    /// Current program counter.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Sets the program counter.
    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// Execution result; meaningful once terminated.
    pub fn result(&self) -> u32 {
        self.result
    }

    /// Sets the result and terminates execution.
    pub fn set_result(&mut self, result: u32) {
        self.result = result;
        self.terminated = true;
    }

    /// True once a return executed (or an extension terminated the run).
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Records metadata for a protocol layer. Layers 3 and 4 are mirrored
    /// into the named offset registers for programs that read them via
    /// `ld M[k]`. Out-of-range layers are ignored.
    pub fn set_protocol_info(&mut self, layer: usize, info: ProtocolInfo) {
        if layer >= MAX_PROTOCOL_LAYERS {
            return;
        }
        if layer == 3 {
            let _ = self.registers.set(REG_L3_OFFSET, u64::from(info.offset));
        } else if layer == 4 {
            let _ = self.registers.set(REG_L4_OFFSET, u64::from(info.offset));
        }
        self.protocols[layer] = Some(info);
    }

    /// Metadata for a protocol layer, if recorded.
    pub fn protocol_info(&self, layer: usize) -> Option<&ProtocolInfo> {
        self.protocols.get(layer).and_then(Option::as_ref)
    }

    /// Clears protocol metadata for all layers.
    pub fn clear_protocol_info(&mut self) {
        self.protocols = std::array::from_fn(|_| None);
    }

    /// Resets everything to the zero state. The packet buffer allocation is
    /// retained for reuse.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.reset_execution_state();
        self.clear_protocol_info();
    }

    /// Resets only the per-run state: registers, program counter, result and
    /// termination flag. The loaded packet and protocol metadata survive, so
    /// the interpreter can call this at the start of each run.
    pub fn reset_execution_state(&mut self) {
        self.registers.reset();
        self.pc = 0;
        self.result = 0;
        self.terminated = false;
    }

    /// Borrows the pieces an extension handler may touch.
    pub fn execution_view(&mut self) -> ExecutionView<'_> {
        ExecutionView::new(
            &self.memory,
            &mut self.registers,
            &self.protocols,
            &mut self.result,
            &mut self.terminated,
        )
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
