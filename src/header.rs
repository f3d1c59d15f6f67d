//! Header context: the 18 field values of one IPv6 + UDP header.
//!
//! A context is built per packet, either from the raw header on the
//! compression side or from rule values and residue on the decompression
//! side. Address words are read and written little-endian, every other
//! multi-byte field in network order.

use std::net::Ipv6Addr;

use crate::bit_buffer::BitBuffer;
use crate::error::{Result, SchcError};
use crate::field_id::{FIELD_COUNT, FieldId};

pub const IPV6_HEADER_LEN: usize = 40;
pub const UDP_HEADER_LEN: usize = 8;
/// Bytes covered by compression.
pub const HEADER_LEN: usize = IPV6_HEADER_LEN + UDP_HEADER_LEN;

/// Offset of the first address word.
const ADDR_OFFSET: usize = 8;

/// Mask selecting the low `bits` bits.
#[inline]
pub fn width_mask(bits: u8) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderContext {
    values: [u32; FIELD_COUNT],
}

impl HeaderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the first 48 bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(SchcError::TruncatedBuffer {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }

        let mut ctx = Self::new();

        let mut lead = BitBuffer::from_bytes(&bytes[..4]);
        for fid in [FieldId::Ipv6Ver, FieldId::Ipv6Tc, FieldId::Ipv6Fl] {
            let value = lead
                .read_bits(fid.default_size_bits() as usize)
                .unwrap_or_default();
            ctx.set(fid, value);
        }

        ctx.set(FieldId::Ipv6Len, be16(bytes, 4));
        ctx.set(FieldId::Ipv6Nxt, bytes[6] as u32);
        ctx.set(FieldId::Ipv6HopLmt, bytes[7] as u32);

        for (i, fid) in FieldId::ALL[FieldId::Ipv6SrcPrefix1.index()..=FieldId::Ipv6DstIid2.index()]
            .iter()
            .enumerate()
        {
            let at = ADDR_OFFSET + 4 * i;
            let word = u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
            ctx.set(*fid, word);
        }

        ctx.set(FieldId::UdpSrcPort, be16(bytes, 40));
        ctx.set(FieldId::UdpDstPort, be16(bytes, 42));
        ctx.set(FieldId::UdpLen, be16(bytes, 44));
        ctx.set(FieldId::UdpCksum, be16(bytes, 46));

        Ok(ctx)
    }

    /// Encode back into the canonical 48-byte layout.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];

        let mut lead = BitBuffer::new();
        for fid in [FieldId::Ipv6Ver, FieldId::Ipv6Tc, FieldId::Ipv6Fl] {
            lead.write_bits(self.get(fid), fid.default_size_bits() as usize);
        }
        out[..4].copy_from_slice(&lead.into_vec());

        out[4..6].copy_from_slice(&(self.get(FieldId::Ipv6Len) as u16).to_be_bytes());
        out[6] = self.get(FieldId::Ipv6Nxt) as u8;
        out[7] = self.get(FieldId::Ipv6HopLmt) as u8;

        for (i, fid) in FieldId::ALL[FieldId::Ipv6SrcPrefix1.index()..=FieldId::Ipv6DstIid2.index()]
            .iter()
            .enumerate()
        {
            let at = ADDR_OFFSET + 4 * i;
            out[at..at + 4].copy_from_slice(&self.get(*fid).to_le_bytes());
        }

        for (at, fid) in [
            (40, FieldId::UdpSrcPort),
            (42, FieldId::UdpDstPort),
            (44, FieldId::UdpLen),
            (46, FieldId::UdpCksum),
        ] {
            out[at..at + 2].copy_from_slice(&(self.get(fid) as u16).to_be_bytes());
        }

        out
    }

    #[inline]
    pub fn get(&self, fid: FieldId) -> u32 {
        self.values[fid.index()]
    }

    /// Store a value, truncated to the field width.
    #[inline]
    pub fn set(&mut self, fid: FieldId, value: u32) {
        self.values[fid.index()] = value & width_mask(fid.default_size_bits());
    }

    pub fn source(&self) -> Ipv6Addr {
        self.address(ADDR_OFFSET)
    }

    pub fn destination(&self) -> Ipv6Addr {
        self.address(ADDR_OFFSET + 16)
    }

    fn address(&self, at: usize) -> Ipv6Addr {
        let bytes = self.to_bytes();
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&bytes[at..at + 16]);
        Ipv6Addr::from(octets)
    }
}

#[inline]
fn be16(bytes: &[u8], at: usize) -> u32 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]]) as u32
}
