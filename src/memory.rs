//! Packet memory with bounds-checked reads.
//!
//! Owns the bytes of the packet under inspection. Every read is checked
//! against the *visible* packet length, which may be shorter than the buffer
//! capacity (the buffer is reused across packets) and shorter than the
//! originally captured length (truncation). Reads default to network byte
//! order; little-endian can be selected per buffer for non-network uses.

use crate::errors::MemoryError;
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Maximum packet size the buffer will grow to.
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Initial buffer capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 65536;

/// Byte order applied to multi-byte reads.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ByteOrder {
    /// Network order, the default.
    #[default]
    Big,
    Little,
}

/// The packet buffer.
#[derive(Debug)]
pub struct PacketMemory {
    buffer: Vec<u8>,
    packet_len: usize,
    original_len: usize,
    truncated: bool,
    initialized: bool,
    order: ByteOrder,
}

impl PacketMemory {
    /// Creates a buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a buffer with a caller-chosen initial capacity, clamped to
    /// [`MAX_PACKET_SIZE`].
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity.min(MAX_PACKET_SIZE)),
            packet_len: 0,
            original_len: 0,
            truncated: false,
            initialized: false,
            order: ByteOrder::Big,
        }
    }

    /// Copies a packet into the buffer, growing it as needed, and resets the
    /// truncation state.
    pub fn load_packet(&mut self, data: &[u8]) -> Result<(), MemoryError> {
        if data.len() > MAX_PACKET_SIZE {
            return Err(MemoryError::PacketTooLarge {
                len: data.len(),
                max: MAX_PACKET_SIZE,
            });
        }

        self.buffer.clear();
        self.buffer.extend_from_slice(data);
        self.packet_len = data.len();
        self.original_len = data.len();
        self.truncated = false;
        self.initialized = true;
        Ok(())
    }

    /// Selects the byte order for subsequent multi-byte reads.
    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    /// Visible packet length.
    pub fn packet_len(&self) -> usize {
        self.packet_len
    }

    /// Captured length before any truncation.
    pub fn original_len(&self) -> usize {
        self.original_len
    }

    /// True once the visible length has been shrunk below the captured one.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Shrinks the visible length and marks the packet truncated. Never
    /// extends.
    pub fn set_truncated(&mut self, new_len: usize) {
        if new_len < self.packet_len {
            self.packet_len = new_len;
            self.truncated = true;
        }
    }

    /// Returns the visible packet bytes.
    pub fn packet(&self) -> &[u8] {
        &self.buffer[..self.packet_len]
    }

    /// Reads one byte at `offset`.
    pub fn read_u8(&self, offset: u64) -> Result<u8, MemoryError> {
        let slice = self.checked_slice(offset, 1)?;
        Ok(slice[0])
    }

    /// Reads a 16-bit value at `offset` in the configured byte order.
    pub fn read_u16(&self, offset: u64) -> Result<u16, MemoryError> {
        let slice = self.checked_slice(offset, 2)?;
        Ok(match self.order {
            ByteOrder::Big => BigEndian::read_u16(slice),
            ByteOrder::Little => LittleEndian::read_u16(slice),
        })
    }

    /// Reads a 32-bit value at `offset` in the configured byte order.
    pub fn read_u32(&self, offset: u64) -> Result<u32, MemoryError> {
        let slice = self.checked_slice(offset, 4)?;
        Ok(match self.order {
            ByteOrder::Big => BigEndian::read_u32(slice),
            ByteOrder::Little => LittleEndian::read_u32(slice),
        })
    }

    /// Reads a 64-bit value at `offset` in the configured byte order.
    pub fn read_u64(&self, offset: u64) -> Result<u64, MemoryError> {
        let slice = self.checked_slice(offset, 8)?;
        Ok(match self.order {
            ByteOrder::Big => BigEndian::read_u64(slice),
            ByteOrder::Little => LittleEndian::read_u64(slice),
        })
    }

    /// Clears the buffer state without releasing its allocation.
    pub fn reset(&mut self) {
        self.packet_len = 0;
        self.original_len = 0;
        self.truncated = false;
        self.initialized = false;
        self.order = ByteOrder::Big;
    }

    /// Bounds-checks `[offset, offset + size)` against the visible length.
    fn checked_slice(&self, offset: u64, size: usize) -> Result<&[u8], MemoryError> {
        if !self.initialized {
            return Err(MemoryError::Uninitialized);
        }

        let end = offset.checked_add(size as u64);
        match end {
            Some(end) if end <= self.packet_len as u64 => {
                let start = offset as usize;
                Ok(&self.buffer[start..start + size])
            }
            _ => Err(MemoryError::OutOfBounds {
                offset,
                size,
                len: self.packet_len,
            }),
        }
    }
}

impl Default for PacketMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(data: &[u8]) -> PacketMemory {
        let mut mem = PacketMemory::new();
        mem.load_packet(data).unwrap();
        mem
    }

    #[test]
    fn read_big_endian_by_default() {
        let mem = loaded(&[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(mem.read_u8(0).unwrap(), 0x12);
        assert_eq!(mem.read_u16(0).unwrap(), 0x1234);
        assert_eq!(mem.read_u32(0).unwrap(), 0x12345678);
    }

    #[test]
    fn read_little_endian_when_configured() {
        let mut mem = loaded(&[0x12, 0x34, 0x56, 0x78]);
        mem.set_byte_order(ByteOrder::Little);
        assert_eq!(mem.read_u16(0).unwrap(), 0x3412);
        assert_eq!(mem.read_u32(0).unwrap(), 0x78563412);
    }

    #[test]
    fn read_u64() {
        let mem = loaded(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(mem.read_u64(0).unwrap(), 0x0102030405060708);
    }

    #[test]
    fn out_of_bounds_read_fails() {
        let mem = loaded(&[0; 20]);
        assert!(matches!(
            mem.read_u32(17),
            Err(MemoryError::OutOfBounds {
                offset: 17,
                size: 4,
                len: 20
            })
        ));
        assert!(mem.read_u8(20).is_err());
        assert!(mem.read_u8(19).is_ok());
    }

    #[test]
    fn uninitialized_read_fails() {
        let mem = PacketMemory::new();
        assert_eq!(mem.read_u8(0), Err(MemoryError::Uninitialized));
    }

    #[test]
    fn huge_offset_does_not_overflow() {
        let mem = loaded(&[0; 4]);
        assert!(mem.read_u64(u64::MAX - 2).is_err());
    }

    #[test]
    fn truncation_shrinks_visible_length() {
        let mut mem = loaded(&[0xAA; 64]);
        mem.set_truncated(16);
        assert!(mem.is_truncated());
        assert_eq!(mem.packet_len(), 16);
        assert_eq!(mem.original_len(), 64);
        assert!(mem.read_u8(15).is_ok());
        assert!(mem.read_u8(16).is_err());
    }

    #[test]
    fn truncation_never_extends() {
        let mut mem = loaded(&[0xAA; 16]);
        mem.set_truncated(32);
        assert!(!mem.is_truncated());
        assert_eq!(mem.packet_len(), 16);
    }

    #[test]
    fn reload_resets_truncation() {
        let mut mem = loaded(&[0; 64]);
        mem.set_truncated(8);
        mem.load_packet(&[1, 2, 3]).unwrap();
        assert!(!mem.is_truncated());
        assert_eq!(mem.packet_len(), 3);
        assert_eq!(mem.original_len(), 3);
    }

    #[test]
    fn oversized_packet_rejected() {
        let mut mem = PacketMemory::new();
        let data = vec![0_u8; MAX_PACKET_SIZE + 1];
        assert!(matches!(
            mem.load_packet(&data),
            Err(MemoryError::PacketTooLarge { .. })
        ));
    }

    #[test]
    fn reads_capped_at_packet_len_not_capacity() {
        // Load a long packet, then a short one: the stale bytes beyond the
        // short packet's length must stay invisible.
        let mut mem = loaded(&[0xFF; 100]);
        mem.load_packet(&[0x01, 0x02]).unwrap();
        assert_eq!(mem.read_u16(0).unwrap(), 0x0102);
        assert!(mem.read_u8(2).is_err());
    }
}
