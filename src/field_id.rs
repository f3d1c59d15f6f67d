//! Field identifier enum for the fixed IPv6 + UDP header layout.
//!
//! Every rule carries exactly one descriptor per `FieldId`, stored in an
//! array indexed by [`FieldId::index`]. The order of the variants is the
//! order in which residues appear on the wire and must never change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::device::IidPart;

/// Number of field positions in a rule.
pub const FIELD_COUNT: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldId {
    Ipv6Ver,
    Ipv6Tc,
    Ipv6Fl,
    Ipv6Len,
    Ipv6Nxt,
    Ipv6HopLmt,
    Ipv6SrcPrefix1,
    Ipv6SrcPrefix2,
    Ipv6SrcIid1,
    Ipv6SrcIid2,
    Ipv6DstPrefix1,
    Ipv6DstPrefix2,
    Ipv6DstIid1,
    Ipv6DstIid2,
    UdpSrcPort,
    UdpDstPort,
    UdpLen,
    UdpCksum,
}

/// Byte order used when a field value travels as residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidueOrder {
    Big,
    Little,
}

/// Returned by `FieldId::from_str` for names outside the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFieldId(pub String);

impl fmt::Display for UnknownFieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown field id: {}", self.0)
    }
}

impl std::error::Error for UnknownFieldId {}

impl FieldId {
    /// All positions, in wire order.
    pub const ALL: [FieldId; FIELD_COUNT] = [
        FieldId::Ipv6Ver,
        FieldId::Ipv6Tc,
        FieldId::Ipv6Fl,
        FieldId::Ipv6Len,
        FieldId::Ipv6Nxt,
        FieldId::Ipv6HopLmt,
        FieldId::Ipv6SrcPrefix1,
        FieldId::Ipv6SrcPrefix2,
        FieldId::Ipv6SrcIid1,
        FieldId::Ipv6SrcIid2,
        FieldId::Ipv6DstPrefix1,
        FieldId::Ipv6DstPrefix2,
        FieldId::Ipv6DstIid1,
        FieldId::Ipv6DstIid2,
        FieldId::UdpSrcPort,
        FieldId::UdpDstPort,
        FieldId::UdpLen,
        FieldId::UdpCksum,
    ];

    /// Position of this field within a rule.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldId::Ipv6Ver => "IPV6.VER",
            FieldId::Ipv6Tc => "IPV6.TC",
            FieldId::Ipv6Fl => "IPV6.FL",
            FieldId::Ipv6Len => "IPV6.LEN",
            FieldId::Ipv6Nxt => "IPV6.NXT",
            FieldId::Ipv6HopLmt => "IPV6.HOP_LMT",
            FieldId::Ipv6SrcPrefix1 => "IPV6.SRC_PREFIX1",
            FieldId::Ipv6SrcPrefix2 => "IPV6.SRC_PREFIX2",
            FieldId::Ipv6SrcIid1 => "IPV6.SRC_IID1",
            FieldId::Ipv6SrcIid2 => "IPV6.SRC_IID2",
            FieldId::Ipv6DstPrefix1 => "IPV6.DST_PREFIX1",
            FieldId::Ipv6DstPrefix2 => "IPV6.DST_PREFIX2",
            FieldId::Ipv6DstIid1 => "IPV6.DST_IID1",
            FieldId::Ipv6DstIid2 => "IPV6.DST_IID2",
            FieldId::UdpSrcPort => "UDP.SRC_PORT",
            FieldId::UdpDstPort => "UDP.DST_PORT",
            FieldId::UdpLen => "UDP.LEN",
            FieldId::UdpCksum => "UDP.CKSUM",
        }
    }

    /// Width of the field in the header, in bits.
    pub fn default_size_bits(self) -> u8 {
        match self {
            FieldId::Ipv6Ver => 4,
            FieldId::Ipv6Tc | FieldId::Ipv6Nxt | FieldId::Ipv6HopLmt => 8,
            FieldId::Ipv6Fl => 20,
            FieldId::Ipv6Len
            | FieldId::UdpSrcPort
            | FieldId::UdpDstPort
            | FieldId::UdpLen
            | FieldId::UdpCksum => 16,
            _ => 32,
        }
    }

    /// Flow label and payload length keep their packed network order as
    /// residue; every other multi-byte residue is little-endian.
    pub fn residue_order(self) -> ResidueOrder {
        match self {
            FieldId::Ipv6Fl | FieldId::Ipv6Len => ResidueOrder::Big,
            _ => ResidueOrder::Little,
        }
    }

    /// Which half of a device interface identifier this position holds.
    pub fn iid_part(self) -> Option<IidPart> {
        match self {
            FieldId::Ipv6SrcIid1 | FieldId::Ipv6DstIid1 => Some(IidPart::Low),
            FieldId::Ipv6SrcIid2 | FieldId::Ipv6DstIid2 => Some(IidPart::High),
            _ => None,
        }
    }

    /// Whether a computed length may stand in for this field.
    pub fn is_length(self) -> bool {
        matches!(self, FieldId::Ipv6Len | FieldId::UdpLen)
    }
}

impl FromStr for FieldId {
    type Err = UnknownFieldId;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        FieldId::ALL
            .into_iter()
            .find(|fid| fid.as_str() == s)
            .ok_or_else(|| UnknownFieldId(s.to_string()))
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FieldId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_wire_order() {
        for (i, fid) in FieldId::ALL.iter().enumerate() {
            assert_eq!(fid.index(), i);
        }
        assert_eq!(FieldId::UdpCksum.index(), FIELD_COUNT - 1);
    }

    #[test]
    fn test_field_strings() {
        assert_eq!(FieldId::Ipv6Ver.as_str(), "IPV6.VER");
        assert_eq!(FieldId::Ipv6HopLmt.as_str(), "IPV6.HOP_LMT");
        assert_eq!(FieldId::Ipv6DstIid2.as_str(), "IPV6.DST_IID2");
        assert_eq!(FieldId::UdpCksum.as_str(), "UDP.CKSUM");
    }

    #[test]
    fn test_parse_fields() {
        for fid in FieldId::ALL {
            assert_eq!(FieldId::from_str(fid.as_str()).unwrap(), fid);
        }
    }

    #[test]
    fn test_parse_unknown_field() {
        let err = FieldId::from_str("COAP.TKL").unwrap_err();
        assert_eq!(err.0, "COAP.TKL");
        assert!(FieldId::from_str("ipv6.ver").is_err());
    }

    #[test]
    fn test_field_sizes() {
        assert_eq!(FieldId::Ipv6Ver.default_size_bits(), 4);
        assert_eq!(FieldId::Ipv6Tc.default_size_bits(), 8);
        assert_eq!(FieldId::Ipv6Fl.default_size_bits(), 20);
        assert_eq!(FieldId::Ipv6Len.default_size_bits(), 16);
        assert_eq!(FieldId::Ipv6SrcPrefix1.default_size_bits(), 32);
        assert_eq!(FieldId::Ipv6DstIid2.default_size_bits(), 32);
        assert_eq!(FieldId::UdpDstPort.default_size_bits(), 16);

        let total: u32 = FieldId::ALL
            .iter()
            .map(|f| f.default_size_bits() as u32)
            .sum();
        assert_eq!(total, 48 * 8);
    }

    #[test]
    fn test_residue_order() {
        assert_eq!(FieldId::Ipv6Fl.residue_order(), ResidueOrder::Big);
        assert_eq!(FieldId::Ipv6Len.residue_order(), ResidueOrder::Big);
        assert_eq!(FieldId::UdpLen.residue_order(), ResidueOrder::Little);
        assert_eq!(FieldId::Ipv6SrcPrefix1.residue_order(), ResidueOrder::Little);
    }

    #[test]
    fn test_iid_part() {
        assert_eq!(FieldId::Ipv6SrcIid1.iid_part(), Some(IidPart::Low));
        assert_eq!(FieldId::Ipv6DstIid2.iid_part(), Some(IidPart::High));
        assert_eq!(FieldId::Ipv6SrcPrefix1.iid_part(), None);
    }

    #[test]
    fn test_serde_roundtrip() {
        let json = serde_json::to_string(&FieldId::UdpSrcPort).unwrap();
        assert_eq!(json, "\"UDP.SRC_PORT\"");
        let field: FieldId = serde_json::from_str(&json).unwrap();
        assert_eq!(field, FieldId::UdpSrcPort);

        let bad: std::result::Result<FieldId, _> = serde_json::from_str("\"UNKNOWN.FIELD\"");
        assert!(bad.is_err());
    }
}
