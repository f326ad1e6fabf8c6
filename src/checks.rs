//! Built-in check opcodes (`0xE0..=0xE5`).
//!
//! The default extension every VM registers at construction. Each check
//! verifies one structural property of the packet (CRC, layer-3/4 checksum,
//! truncation, frame length, protocol location) and reports failure by
//! setting a bit in the error-status register. Checks never abort the run:
//! execution falls through to the next instruction either way.

use crate::context::Protocol;
use crate::errors::ExtensionError;
use crate::extension::{ExecutionView, Extension, ExtensionContext};
use crate::insn::Instruction;
use crate::isa::BpfOpcode;
use crate::registers::{
    ERROR_CRC, ERROR_L3_CHECKSUM, ERROR_L4_CHECKSUM, ERROR_MALFORMED, ERROR_TRUNCATED,
};
use crate::util::checksum::{verify_ipv4_header, verify_transport_checksum};
use crc::crc32;

/// EtherType for IPv4, the one layer-3 protocol with a header checksum.
const ETHERTYPE_IPV4: u32 = 0x0800;

/// The default check-opcode handler.
pub struct ChecksExtension {
    initialized: bool,
}

impl ChecksExtension {
    pub fn new() -> Self {
        Self { initialized: false }
    }

    /// `chk_crc offset=k len=src`: CRC-32/IEEE over the range, compared
    /// against the little-endian FCS word that follows it.
    fn check_crc(&self, insn: Instruction, view: &mut ExecutionView<'_>) {
        let offset = insn.immediate() as usize;
        let len = insn.src() as usize;
        let packet = view.packet();

        let Some(data) = packet.get(offset..offset + len) else {
            view.set_error(ERROR_TRUNCATED);
            return;
        };
        let Some(fcs) = packet.get(offset + len..offset + len + 4) else {
            view.set_error(ERROR_TRUNCATED);
            return;
        };

        let computed = crc32::checksum_ieee(data);
        let stored = u32::from_le_bytes([fcs[0], fcs[1], fcs[2], fcs[3]]);
        if computed != stored {
            view.set_error(ERROR_CRC);
        }
    }

    /// `chk_l3_csum`: IPv4 header checksum at the layer-3 offset.
    fn check_l3_checksum(&self, view: &mut ExecutionView<'_>) {
        let Some(info) = view.protocol_info(3) else {
            view.set_error(ERROR_MALFORMED);
            return;
        };
        if info.proto_type != ETHERTYPE_IPV4 {
            // No header checksum to verify (IPv6 has none).
            return;
        }
        let offset = info.offset as usize;
        match verify_ipv4_header(view.packet(), offset) {
            Some(true) => {}
            Some(false) => view.set_error(ERROR_L3_CHECKSUM),
            None => view.set_error(ERROR_TRUNCATED),
        }
    }

    /// `chk_l4_csum`: TCP/UDP checksum over the IPv4 pseudo-header.
    fn check_l4_checksum(&self, view: &mut ExecutionView<'_>) {
        let (Some(l3), Some(l4)) = (view.protocol_info(3), view.protocol_info(4)) else {
            view.set_error(ERROR_MALFORMED);
            return;
        };
        if l3.proto_type != ETHERTYPE_IPV4 {
            return;
        }
        let protocol = l4.proto_type;
        if !matches!(Protocol::from_ip_proto(protocol), Protocol::Tcp | Protocol::Udp) {
            return;
        }
        let l3_offset = l3.offset as usize;
        let l4_offset = l4.offset as usize;
        match verify_transport_checksum(view.packet(), l3_offset, l4_offset, protocol as u8) {
            Some(true) => {}
            Some(false) => view.set_error(ERROR_L4_CHECKSUM),
            None => view.set_error(ERROR_TRUNCATED),
        }
    }

    /// `chk_trunc [#k]`: flags a truncated capture, or a visible length
    /// shorter than `k`.
    fn check_truncated(&self, insn: Instruction, view: &mut ExecutionView<'_>) {
        let required = insn.immediate() as usize;
        let truncated = view.memory().is_truncated()
            || (required > 0 && required > view.memory().packet_len());
        if truncated {
            view.set_error(ERROR_TRUNCATED);
        }
    }

    /// `chk_frame_len >=k`: asserts the captured frame length.
    fn check_frame_len(&self, insn: Instruction, view: &mut ExecutionView<'_>) {
        if view.memory().original_len() < insn.immediate() as usize {
            view.set_error(ERROR_MALFORMED);
        }
    }

    /// `chk_proto_loc layer=dst offset=k`: asserts where a protocol layer
    /// was located.
    fn check_proto_loc(&self, insn: Instruction, view: &mut ExecutionView<'_>) {
        let layer = insn.dst() as usize;
        let expected = insn.immediate();
        match view.protocol_info(layer) {
            Some(info) if info.offset == expected => {}
            _ => view.set_error(ERROR_MALFORMED),
        }
    }
}

impl Default for ChecksExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for ChecksExtension {
    fn name(&self) -> &str {
        "builtin-checks"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn initialize(&mut self, ctx: &mut ExtensionContext<'_>) -> Result<(), ExtensionError> {
        if self.initialized {
            return Err(ExtensionError::AlreadyInitialized {
                name: self.name().to_string(),
            });
        }
        for opcode in [
            BpfOpcode::ChkCrc,
            BpfOpcode::ChkL3Csum,
            BpfOpcode::ChkL4Csum,
            BpfOpcode::ChkTrunc,
            BpfOpcode::ChkFrameLen,
            BpfOpcode::ChkProtoLoc,
        ] {
            ctx.register_opcode(opcode as u8)?;
        }
        self.initialized = true;
        Ok(())
    }

    fn execute(
        &self,
        insn: Instruction,
        view: &mut ExecutionView<'_>,
    ) -> Result<bool, ExtensionError> {
        if !self.initialized {
            return Err(ExtensionError::NotInitialized {
                name: self.name().to_string(),
            });
        }
        match insn.decode() {
            Ok(BpfOpcode::ChkCrc) => self.check_crc(insn, view),
            Ok(BpfOpcode::ChkL3Csum) => self.check_l3_checksum(view),
            Ok(BpfOpcode::ChkL4Csum) => self.check_l4_checksum(view),
            Ok(BpfOpcode::ChkTrunc) => self.check_truncated(insn, view),
            Ok(BpfOpcode::ChkFrameLen) => self.check_frame_len(insn, view),
            Ok(BpfOpcode::ChkProtoLoc) => self.check_proto_loc(insn, view),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionContext, ProtocolInfo};
    use crate::util::hex::parse_hex;

    fn checks() -> ChecksExtension {
        let mut ext = ChecksExtension::new();
        ext.initialized = true;
        ext
    }

    fn run_check(ctx: &mut ExecutionContext, insn: Instruction) -> u64 {
        let ext = checks();
        let mut view = ctx.execution_view();
        assert_eq!(ext.execute(insn, &mut view), Ok(true));
        ctx.registers().error_status()
    }

    fn chk(op: BpfOpcode, dst: u8, src: u8, k: u32) -> Instruction {
        Instruction::from_opcode(op, dst, src, k)
    }

    #[test]
    fn crc_accepts_matching_fcs() {
        // CRC-32/IEEE of "123456789" is 0xCBF43926; FCS is little-endian.
        let mut packet = b"123456789".to_vec();
        packet.extend_from_slice(&0xCBF43926_u32.to_le_bytes());

        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&packet).unwrap();
        let status = run_check(&mut ctx, chk(BpfOpcode::ChkCrc, 0, 9, 0));
        assert_eq!(status, 0);
    }

    #[test]
    fn crc_flags_mismatch() {
        let mut packet = b"123456789".to_vec();
        packet.extend_from_slice(&0xDEADBEEF_u32.to_le_bytes());

        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&packet).unwrap();
        let status = run_check(&mut ctx, chk(BpfOpcode::ChkCrc, 0, 9, 0));
        assert_eq!(status, ERROR_CRC);
    }

    #[test]
    fn crc_out_of_range_flags_truncated() {
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&[0; 8]).unwrap();
        let status = run_check(&mut ctx, chk(BpfOpcode::ChkCrc, 0, 9, 0));
        assert_eq!(status, ERROR_TRUNCATED);
    }

    #[test]
    fn l3_checksum_verifies_good_header() {
        let header =
            parse_hex("45 00 00 3c 1c 46 40 00 40 06 b1 e6 ac 10 0a 63 ac 10 0a 0c").unwrap();
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&header).unwrap();
        ctx.set_protocol_info(3, ProtocolInfo::new(0x0800, 0, 20));

        let status = run_check(&mut ctx, chk(BpfOpcode::ChkL3Csum, 0, 0, 0));
        assert_eq!(status, 0);
    }

    #[test]
    fn l3_checksum_flags_corruption() {
        let mut header =
            parse_hex("45 00 00 3c 1c 46 40 00 40 06 b1 e6 ac 10 0a 63 ac 10 0a 0c").unwrap();
        header[16] ^= 1;
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&header).unwrap();
        ctx.set_protocol_info(3, ProtocolInfo::new(0x0800, 0, 20));

        let status = run_check(&mut ctx, chk(BpfOpcode::ChkL3Csum, 0, 0, 0));
        assert_eq!(status, ERROR_L3_CHECKSUM);
    }

    #[test]
    fn l3_checksum_without_metadata_is_malformed() {
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&[0; 20]).unwrap();
        let status = run_check(&mut ctx, chk(BpfOpcode::ChkL3Csum, 0, 0, 0));
        assert_eq!(status, ERROR_MALFORMED);
    }

    #[test]
    fn l3_checksum_skips_non_ipv4() {
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&[0; 40]).unwrap();
        ctx.set_protocol_info(3, ProtocolInfo::new(0x86DD, 0, 40));
        let status = run_check(&mut ctx, chk(BpfOpcode::ChkL3Csum, 0, 0, 0));
        assert_eq!(status, 0);
    }

    #[test]
    fn trunc_flags_truncated_capture() {
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&[0; 64]).unwrap();
        ctx.memory_mut().set_truncated(20);
        let status = run_check(&mut ctx, chk(BpfOpcode::ChkTrunc, 0, 0, 0));
        assert_eq!(status, ERROR_TRUNCATED);
    }

    #[test]
    fn trunc_flags_short_packet_against_k() {
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&[0; 20]).unwrap();
        assert_eq!(run_check(&mut ctx, chk(BpfOpcode::ChkTrunc, 0, 0, 64)), ERROR_TRUNCATED);
    }

    #[test]
    fn trunc_passes_whole_packet() {
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&[0; 64]).unwrap();
        assert_eq!(run_check(&mut ctx, chk(BpfOpcode::ChkTrunc, 0, 0, 0)), 0);
        assert_eq!(run_check(&mut ctx, chk(BpfOpcode::ChkTrunc, 0, 0, 64)), 0);
    }

    #[test]
    fn frame_len_assertion() {
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&[0; 60]).unwrap();
        assert_eq!(run_check(&mut ctx, chk(BpfOpcode::ChkFrameLen, 0, 0, 60)), 0);
        assert_eq!(
            run_check(&mut ctx, chk(BpfOpcode::ChkFrameLen, 0, 0, 61)),
            ERROR_MALFORMED
        );
    }

    #[test]
    fn proto_loc_assertion() {
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&[0; 60]).unwrap();
        ctx.set_protocol_info(3, ProtocolInfo::new(0x0800, 14, 20));

        assert_eq!(run_check(&mut ctx, chk(BpfOpcode::ChkProtoLoc, 3, 0, 14)), 0);
        assert_eq!(
            run_check(&mut ctx, chk(BpfOpcode::ChkProtoLoc, 3, 0, 18)),
            ERROR_MALFORMED
        );
    }

    #[test]
    fn proto_loc_missing_layer_is_malformed() {
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&[0; 60]).unwrap();
        assert_eq!(
            run_check(&mut ctx, chk(BpfOpcode::ChkProtoLoc, 7, 0, 0)),
            ERROR_MALFORMED
        );
    }

    #[test]
    fn unhandled_opcode_declined() {
        let ext = checks();
        let mut ctx = ExecutionContext::new();
        ctx.memory_mut().load_packet(&[0; 8]).unwrap();
        let mut view = ctx.execution_view();
        assert_eq!(
            ext.execute(Instruction::new(0x90, 0, 0, 0), &mut view),
            Ok(false)
        );
    }
}
