//! Internet checksum arithmetic (RFC 1071) and header verification.
//!
//! One's-complement 16-bit sums over big-endian byte pairs, with carry
//! folding. Verification helpers return `None` when the packet is too short
//! to evaluate, so callers can map that onto the truncation error bit.

/// Incremental one's-complement accumulator.
#[derive(Debug, Default)]
pub struct InetChecksum {
    sum: u32,
}

impl InetChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds in a 16-bit word.
    pub fn add_u16(&mut self, value: u16) {
        self.sum += u32::from(value);
    }

    /// Folds in bytes as big-endian pairs. An odd trailing byte is padded
    /// with zero, so only the final `add_bytes` call may be odd-length.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        let mut chunks = bytes.chunks_exact(2);
        for pair in &mut chunks {
            self.add_u16(u16::from_be_bytes([pair[0], pair[1]]));
        }
        if let [last] = chunks.remainder() {
            self.add_u16(u16::from(*last) << 8);
        }
    }

    /// The folded 16-bit sum.
    pub fn value(&self) -> u16 {
        let mut sum = self.sum;
        while sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        sum as u16
    }

    /// True when the summed data (checksum field included) verifies.
    pub fn verifies(&self) -> bool {
        self.value() == 0xFFFF
    }
}

/// Computes the checksum field value for `bytes` (with its checksum field
/// zeroed).
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut acc = InetChecksum::new();
    acc.add_bytes(bytes);
    !acc.value()
}

/// Verifies the IPv4 header checksum for the header at `l3_offset`.
/// `None` when the header does not fit in the packet.
pub fn verify_ipv4_header(packet: &[u8], l3_offset: usize) -> Option<bool> {
    let first = *packet.get(l3_offset)?;
    let ihl = usize::from(first & 0x0F) * 4;
    if ihl < 20 {
        return Some(false);
    }
    let header = packet.get(l3_offset..l3_offset + ihl)?;

    let mut acc = InetChecksum::new();
    acc.add_bytes(header);
    Some(acc.verifies())
}

/// Verifies a TCP or UDP checksum over the IPv4 pseudo-header. The segment
/// starts at `l4_offset`; its length comes from the IP total-length field.
/// `None` when any needed bytes are missing; UDP checksum zero means "not
/// computed" and passes.
pub fn verify_transport_checksum(
    packet: &[u8],
    l3_offset: usize,
    l4_offset: usize,
    protocol: u8,
) -> Option<bool> {
    let ip_header = packet.get(l3_offset..l3_offset + 20)?;
    let total_len = usize::from(u16::from_be_bytes([ip_header[2], ip_header[3]]));
    let header_span = l4_offset.checked_sub(l3_offset)?;
    let seg_len = total_len.checked_sub(header_span)?;
    let segment = packet.get(l4_offset..l4_offset + seg_len)?;

    if protocol == 17 {
        // UDP checksum field of zero means the sender skipped it.
        let field = segment.get(6..8)?;
        if field == [0, 0] {
            return Some(true);
        }
    }

    let mut acc = InetChecksum::new();
    acc.add_bytes(&ip_header[12..20]); // source and destination addresses
    acc.add_u16(u16::from(protocol));
    acc.add_u16(seg_len as u16);
    acc.add_bytes(segment);
    Some(acc.verifies())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex::parse_hex;

    /// A textbook IPv4 header whose checksum field (0xb1e6) is correct.
    const IPV4_HEADER: &str = "45 00 00 3c 1c 46 40 00 40 06 b1 e6 ac 10 0a 63 ac 10 0a 0c";

    #[test]
    fn known_ipv4_header_verifies() {
        let header = parse_hex(IPV4_HEADER).unwrap();
        assert_eq!(verify_ipv4_header(&header, 0), Some(true));
    }

    #[test]
    fn corrupted_ipv4_header_fails() {
        let mut header = parse_hex(IPV4_HEADER).unwrap();
        header[15] ^= 0x01;
        assert_eq!(verify_ipv4_header(&header, 0), Some(false));
    }

    #[test]
    fn recomputed_checksum_matches_known_field() {
        let mut header = parse_hex(IPV4_HEADER).unwrap();
        header[10] = 0;
        header[11] = 0;
        assert_eq!(checksum(&header), 0xB1E6);
    }

    #[test]
    fn short_header_is_none() {
        let header = parse_hex("45 00 00").unwrap();
        assert_eq!(verify_ipv4_header(&header, 0), None);
    }

    #[test]
    fn bogus_ihl_fails() {
        // IHL of 4 (16 bytes) is below the minimum header size.
        let mut header = parse_hex(IPV4_HEADER).unwrap();
        header[0] = 0x44;
        assert_eq!(verify_ipv4_header(&header, 0), Some(false));
    }

    #[test]
    fn odd_length_pads_with_zero() {
        let mut acc = InetChecksum::new();
        acc.add_bytes(&[0x01, 0x02, 0x03]);
        let mut even = InetChecksum::new();
        even.add_bytes(&[0x01, 0x02, 0x03, 0x00]);
        assert_eq!(acc.value(), even.value());
    }

    #[test]
    fn udp_zero_checksum_passes() {
        // 20-byte IP header + 8-byte UDP header with checksum zero.
        let mut packet = parse_hex("45 00 00 1c 00 00 00 00 40 11 00 00 0a 00 00 01 0a 00 00 02")
            .unwrap();
        packet.extend_from_slice(&[0x00, 0x35, 0x00, 0x35, 0x00, 0x08, 0x00, 0x00]);
        assert_eq!(verify_transport_checksum(&packet, 0, 20, 17), Some(true));
    }

    #[test]
    fn transport_checksum_roundtrip() {
        // Build a UDP packet, fill the checksum from our own arithmetic, and
        // verify the packet end-to-end; then corrupt one payload byte.
        let mut packet =
            parse_hex("45 00 00 1e 00 00 00 00 40 11 00 00 0a 00 00 01 0a 00 00 02").unwrap();
        let mut udp = vec![0x00, 0x35, 0x04, 0x00, 0x00, 0x0a, 0x00, 0x00, 0xAB, 0xCD];

        let mut acc = InetChecksum::new();
        acc.add_bytes(&packet[12..20]);
        acc.add_u16(17);
        acc.add_u16(udp.len() as u16);
        acc.add_bytes(&udp);
        let field = !acc.value();
        // RFC 768: a computed zero is transmitted as all-ones.
        let field = if field == 0 { 0xFFFF } else { field };
        udp[6..8].copy_from_slice(&field.to_be_bytes());
        packet.extend_from_slice(&udp);

        assert_eq!(verify_transport_checksum(&packet, 0, 20, 17), Some(true));

        packet[28] ^= 0xFF;
        assert_eq!(verify_transport_checksum(&packet, 0, 20, 17), Some(false));
    }

    #[test]
    fn truncated_segment_is_none() {
        // IP total length claims more payload than the packet carries.
        let packet =
            parse_hex("45 00 00 30 00 00 00 00 40 06 00 00 0a 00 00 01 0a 00 00 02").unwrap();
        assert_eq!(verify_transport_checksum(&packet, 0, 20, 6), None);
    }
}
