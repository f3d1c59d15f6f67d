//! Decompression Logic
//!
//! Rebuilds the 48-byte IPv6 + UDP header from a tag byte, the rule it
//! names and the residue that follows. Lengths and the UDP checksum are
//! resolved only once every field has been read, because they depend on
//! how many bytes the residue took.

use tracing::{debug, trace};

use crate::compressor::UNCOMPRESSED_TAG;
use crate::device::DeviceIdentity;
use crate::error::{Result, SchcError};
use crate::field_id::ResidueOrder;
use crate::header::{HeaderContext, UDP_HEADER_LEN, width_mask};
use crate::rule::{CompressionAction, Field, Rule, RuleSet};

// =============================================================================
// Decompression Result Types
// =============================================================================

/// Result of decompressing a SCHC packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressedPacket {
    /// Full IPv6 packet (header + payload)
    pub data: Vec<u8>,
    /// Rule used, `None` for an uncompressed packet
    pub rule_id: Option<u8>,
    /// Tag and residue bytes read from the compressed packet
    pub bytes_consumed: usize,
    /// Reconstructed header fields
    pub header: Option<HeaderContext>,
}

// =============================================================================
// Main Decompression Entry Point
// =============================================================================

/// Decompress a packet received from the link.
///
/// Tag 0 yields the remainder of the packet unchanged. Any other tag
/// selects rule `tag - 1`.
pub fn decompress_packet(
    compressed_data: &[u8],
    rules: &RuleSet,
    device: &DeviceIdentity,
) -> Result<DecompressedPacket> {
    let (&tag, rest) = compressed_data
        .split_first()
        .ok_or(SchcError::TruncatedBuffer {
            needed: 1,
            available: 0,
        })?;

    if tag == UNCOMPRESSED_TAG {
        debug!(len = rest.len(), "uncompressed packet");
        return Ok(DecompressedPacket {
            data: rest.to_vec(),
            rule_id: None,
            bytes_consumed: 1,
            header: None,
        });
    }

    let rule = rules.by_tag(tag).ok_or(SchcError::UnknownRuleTag(tag))?;
    let (header, consumed) = decompress_header(compressed_data, rule, device)?;
    debug!(rule_id = rule.rule_id(), residue = consumed - 1, "header rebuilt");

    let mut data = header.to_bytes().to_vec();
    data.extend_from_slice(&compressed_data[consumed..]);

    Ok(DecompressedPacket {
        data,
        rule_id: Some(rule.rule_id()),
        bytes_consumed: consumed,
        header: Some(header),
    })
}

/// Rebuild the header fields of `rule` from a compressed packet whose
/// first byte is the tag. Returns the header and the number of bytes read.
pub fn decompress_header(
    compressed_data: &[u8],
    rule: &Rule,
    device: &DeviceIdentity,
) -> Result<(HeaderContext, usize)> {
    let mut reader = ResidueReader::new(compressed_data, 1);
    let mut header = HeaderContext::new();

    for field in rule.fields() {
        if let Some(value) = decompress_field(&mut reader, field, device)? {
            trace!(fid = %field.fid, value, "field restored");
            header.set(field.fid, value);
        }
    }

    let consumed = reader.offset();

    for field in rule.fields() {
        match field.cda {
            CompressionAction::ComputeLength => {
                header.set(field.fid, computed_length(compressed_data.len(), consumed)?);
            }
            // Link-layer integrity covers the frame.
            CompressionAction::ComputeChecksum => header.set(field.fid, 0),
            _ => {}
        }
    }

    Ok((header, consumed))
}

// =============================================================================
// Field Decompression
// =============================================================================

/// Decompress a single field based on its CDA. Computed fields yield
/// `None` and are filled in afterwards.
fn decompress_field(
    reader: &mut ResidueReader<'_>,
    field: &Field,
    device: &DeviceIdentity,
) -> Result<Option<u32>> {
    let value = match field.cda {
        CompressionAction::NotSent => field.tv,
        CompressionAction::ValueSent => {
            reader.read(field.residue_bytes(), field.fid.residue_order())?
        }
        CompressionAction::Lsb => decompress_lsb(reader, field)?,
        CompressionAction::DeviceIid => match field.fid.iid_part() {
            Some(part) => device.iid_part(part),
            None => field.tv,
        },
        CompressionAction::ComputeLength | CompressionAction::ComputeChecksum => return Ok(None),
    };
    Ok(Some(value))
}

/// Combine MSB from TV + LSB from residue
fn decompress_lsb(reader: &mut ResidueReader<'_>, field: &Field) -> Result<u32> {
    let lsb_bits = field.length() - field.msb_length();
    let lsb_mask = width_mask(lsb_bits);
    let msb_mask = width_mask(field.length()) & !lsb_mask;

    let lsb_value = reader.read(field.residue_bytes(), field.fid.residue_order())?;
    Ok((field.tv & msb_mask) | (lsb_value & lsb_mask))
}

/// UDP header plus whatever follows the residue.
fn computed_length(total_len: usize, consumed: usize) -> Result<u32> {
    let len = total_len + UDP_HEADER_LEN - consumed;
    u16::try_from(len)
        .map(u32::from)
        .map_err(|_| SchcError::LengthOverflow(len))
}

// =============================================================================
// Residue Reader
// =============================================================================

/// Byte cursor over the residue of a compressed packet.
struct ResidueReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ResidueReader<'a> {
    fn new(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn read(&mut self, n_bytes: usize, order: ResidueOrder) -> Result<u32> {
        let end = self.offset + n_bytes;
        let bytes = self
            .data
            .get(self.offset..end)
            .ok_or(SchcError::TruncatedBuffer {
                needed: end,
                available: self.data.len(),
            })?;
        self.offset = end;

        let value = match order {
            ResidueOrder::Little => bytes
                .iter()
                .rev()
                .fold(0u32, |acc, b| (acc << 8) | *b as u32),
            ResidueOrder::Big => bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32),
        };
        Ok(value)
    }
}

// =============================================================================
// Tests
// =============================================================================
