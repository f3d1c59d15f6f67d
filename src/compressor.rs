//! Compression Logic
//!
//! Turns an IPv6 + UDP header into a rule tag followed by the residue of
//! the fields the matched rule does not make implicit. Packets no rule
//! accepts go out behind tag 0 with their header untouched.

use tracing::{debug, trace};

use crate::device::DeviceIdentity;
use crate::error::Result;
use crate::field_id::ResidueOrder;
use crate::header::{HEADER_LEN, HeaderContext, width_mask};
use crate::matcher::{match_rule, require_rule};
use crate::rule::{CompressionAction, Field, Rule, RuleSet};

/// Tag announcing an uncompressed header.
pub const UNCOMPRESSED_TAG: u8 = 0;

// =============================================================================
// Compressed Packet
// =============================================================================

/// Final compressed packet output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPacket {
    /// Tag, residue and payload
    pub data: Vec<u8>,
    /// Matched rule, `None` for passthrough
    pub rule_id: Option<u8>,
    /// Bytes in front of the payload (tag + residue, or tag + raw header)
    pub header_len: usize,
    pub original_header_len: usize,
}

impl CompressedPacket {
    pub fn is_compressed(&self) -> bool {
        self.rule_id.is_some()
    }

    /// Header bytes saved; negative for passthrough.
    pub fn savings_bytes(&self) -> i64 {
        self.original_header_len as i64 - self.header_len as i64
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[self.header_len..]
    }
}

// =============================================================================
// Compression Functions
// =============================================================================

/// Compress a full IPv6/UDP packet. The first 48 bytes are the header,
/// the rest is carried over as payload.
pub fn compress_packet(
    packet: &[u8],
    rules: &RuleSet,
    device: &DeviceIdentity,
) -> Result<CompressedPacket> {
    let header = HeaderContext::parse(packet)?;
    let rule = match_rule(&header, rules, device);
    if rule.is_none() {
        debug!("no rule matched, sending header uncompressed");
    }
    Ok(assemble(packet, &header, rule))
}

/// Like [`compress_packet`], but fails with `NoRuleMatched` instead of
/// falling back to an uncompressed header.
pub fn compress_packet_strict(
    packet: &[u8],
    rules: &RuleSet,
    device: &DeviceIdentity,
) -> Result<CompressedPacket> {
    let header = HeaderContext::parse(packet)?;
    let rule = require_rule(&header, rules, device)?;
    Ok(assemble(packet, &header, Some(rule)))
}

/// Compress just the 48 header bytes: tag and residue on a match, tag 0
/// and the raw header otherwise.
pub fn compress_header(raw: &[u8], rules: &RuleSet, device: &DeviceIdentity) -> Result<Vec<u8>> {
    let header = HeaderContext::parse(raw)?;
    Ok(match match_rule(&header, rules, device) {
        Some(rule) => compress_with_rule(rule, &header),
        None => passthrough(&raw[..HEADER_LEN]),
    })
}

/// `packet` must already have parsed into `header`.
fn assemble(packet: &[u8], header: &HeaderContext, rule: Option<&Rule>) -> CompressedPacket {
    let mut data = match rule {
        Some(rule) => {
            debug!(rule_id = rule.rule_id(), "header matched rule");
            compress_with_rule(rule, header)
        }
        None => passthrough(&packet[..HEADER_LEN]),
    };

    let header_len = data.len();
    data.extend_from_slice(&packet[HEADER_LEN..]);

    CompressedPacket {
        data,
        rule_id: rule.map(Rule::rule_id),
        header_len,
        original_header_len: HEADER_LEN,
    }
}

/// Tag byte followed by the residue of every field in rule order.
pub fn compress_with_rule(rule: &Rule, header: &HeaderContext) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + rule.residue_len());
    out.push(rule.rule_id());

    for field in rule.fields() {
        let before = out.len();
        compress_field(&mut out, field, header.get(field.fid));
        trace!(
            fid = %field.fid,
            sent = out.len() - before,
            "field compressed"
        );
    }

    out
}

fn passthrough(raw_header: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + raw_header.len());
    out.push(UNCOMPRESSED_TAG);
    out.extend_from_slice(raw_header);
    out
}

/// Compress a single field according to its CDA
fn compress_field(out: &mut Vec<u8>, field: &Field, value: u32) {
    match field.cda {
        CompressionAction::ValueSent => {
            write_residue(out, value, field.residue_bytes(), field.fid.residue_order());
        }
        CompressionAction::Lsb => {
            let lsb_bits = field.length() - field.msb_length();
            write_residue(
                out,
                value & width_mask(lsb_bits),
                field.residue_bytes(),
                field.fid.residue_order(),
            );
        }
        // Rebuilt by the decompressor from the rule, the device or the
        // packet itself.
        CompressionAction::NotSent
        | CompressionAction::ComputeLength
        | CompressionAction::ComputeChecksum
        | CompressionAction::DeviceIid => {}
    }
}

/// Append the low `n_bytes` bytes of a value.
#[inline]
fn write_residue(out: &mut Vec<u8>, value: u32, n_bytes: usize, order: ResidueOrder) {
    match order {
        ResidueOrder::Little => out.extend_from_slice(&value.to_le_bytes()[..n_bytes]),
        ResidueOrder::Big => out.extend_from_slice(&value.to_be_bytes()[4 - n_bytes..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_id::FieldId;

    // =========================================================================
    // CompressedPacket tests
    // =========================================================================

    #[test]
    fn test_compressed_packet_savings() {
        let packet = CompressedPacket {
            data: vec![0x01, 0xAA],
            rule_id: Some(1),
            header_len: 1,
            original_header_len: 48,
        };
        assert!(packet.is_compressed());
        assert_eq!(packet.savings_bytes(), 47);
        assert_eq!(packet.payload(), &[0xAA]);
    }

    #[test]
    fn test_passthrough_negative_savings() {
        let packet = CompressedPacket {
            data: vec![0u8; 49],
            rule_id: None,
            header_len: 49,
            original_header_len: 48,
        };
        assert!(!packet.is_compressed());
        assert_eq!(packet.savings_bytes(), -1);
    }

    // =========================================================================
    // write_residue tests
    // =========================================================================

    #[test]
    fn test_write_residue_little_endian() {
        let mut out = Vec::new();
        write_residue(&mut out, 0xA8060120, 4, ResidueOrder::Little);
        assert_eq!(out, vec![0x20, 0x01, 0x06, 0xA8]);

        out.clear();
        write_residue(&mut out, 1086, 2, ResidueOrder::Little);
        assert_eq!(out, vec![0x3E, 0x04]);
    }

    #[test]
    fn test_write_residue_big_endian() {
        let mut out = Vec::new();
        write_residue(&mut out, 0x12345, 3, ResidueOrder::Big);
        assert_eq!(out, vec![0x01, 0x23, 0x45]);
    }

    // =========================================================================
    // CDA behavior tests
    // =========================================================================

    #[test]
    fn test_cda_not_sent_adds_nothing() {
        let mut out = Vec::new();
        compress_field(&mut out, &Field::equal(FieldId::Ipv6Ver, 6), 6);
        assert!(out.is_empty());
    }

    #[test]
    fn test_cda_compute_and_device_add_nothing() {
        let mut out = Vec::new();
        compress_field(
            &mut out,
            &Field::ignore(FieldId::UdpCksum, CompressionAction::ComputeChecksum),
            0x1234,
        );
        compress_field(
            &mut out,
            &Field::ignore(FieldId::UdpLen, CompressionAction::ComputeLength),
            20,
        );
        compress_field(
            &mut out,
            &Field::ignore(FieldId::Ipv6SrcIid1, CompressionAction::DeviceIid),
            0xDEADBEEF,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_cda_value_sent_sends_header_value() {
        let mut out = Vec::new();
        let field = Field::ignore(FieldId::Ipv6HopLmt, CompressionAction::ValueSent);
        compress_field(&mut out, &field, 64);
        assert_eq!(out, vec![64]);
    }

    #[test]
    fn test_cda_value_sent_flow_label() {
        let mut out = Vec::new();
        let field = Field::ignore(FieldId::Ipv6Fl, CompressionAction::ValueSent);
        compress_field(&mut out, &field, 0xABCDE);
        assert_eq!(out, vec![0x0A, 0xBC, 0xDE]);
    }

    #[test]
    fn test_cda_lsb() {
        let mut out = Vec::new();
        let field = Field::msb(FieldId::UdpDstPort, 5680, 12);
        compress_field(&mut out, &field, 5683);
        assert_eq!(out, vec![0x03]);
    }

    // =========================================================================
    // Strict compression tests
    // =========================================================================

    fn raw_header(next_header: u8) -> Vec<u8> {
        let mut header = HeaderContext::new();
        header.set(FieldId::Ipv6Ver, 6);
        header.set(FieldId::Ipv6Nxt, next_header as u32);
        let mut packet = header.to_bytes().to_vec();
        packet.extend_from_slice(b"xy");
        packet
    }

    fn udp_only_rules() -> RuleSet {
        let fields = FieldId::ALL
            .iter()
            .map(|fid| match fid {
                FieldId::Ipv6Nxt => Field::equal(*fid, 17),
                _ => Field::ignore(*fid, CompressionAction::ValueSent),
            })
            .collect();
        RuleSet::new(vec![Rule::new(1, None, fields).unwrap()]).unwrap()
    }

    #[test]
    fn test_strict_matches_like_default() {
        let device = DeviceIdentity::new([0; 8]);
        let packet = raw_header(17);
        let strict = compress_packet_strict(&packet, &udp_only_rules(), &device).unwrap();
        let default = compress_packet(&packet, &udp_only_rules(), &device).unwrap();
        assert_eq!(strict, default);
        assert_eq!(strict.payload(), b"xy");
    }

    #[test]
    fn test_strict_refuses_passthrough() {
        let device = DeviceIdentity::new([0; 8]);
        let packet = raw_header(6);
        assert!(matches!(
            compress_packet_strict(&packet, &udp_only_rules(), &device),
            Err(crate::error::SchcError::NoRuleMatched)
        ));
        let fallback = compress_packet(&packet, &udp_only_rules(), &device).unwrap();
        assert_eq!(fallback.rule_id, None);
        assert_eq!(fallback.header_len, 49);
    }

    #[test]
    fn test_cda_lsb_multi_byte() {
        let mut out = Vec::new();
        let field = Field::msb(FieldId::UdpSrcPort, 0xF000, 4);
        compress_field(&mut out, &field, 0xF0B1);
        // 12 LSBs in two little-endian bytes
        assert_eq!(out, vec![0xB1, 0x00]);
    }
}
