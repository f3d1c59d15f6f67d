//! Device identity and interface-identifier synthesis.
//!
//! A LoRaWAN device carries a fixed 8-byte EUI. Rules can mark the
//! interface-identifier words of an address as derivable from it, in which
//! case nothing is transmitted and the decompressor rebuilds them here.

use std::fmt;
use std::net::Ipv6Addr;

use crate::error::{Result, SchcError};

/// Which 32-bit half of the interface identifier a field position holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IidPart {
    /// First four EUI bytes
    Low,
    /// Last four EUI bytes
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity([u8; 8]);

impl DeviceIdentity {
    pub const fn new(eui: [u8; 8]) -> Self {
        Self(eui)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let eui: [u8; 8] = bytes
            .try_into()
            .map_err(|_| SchcError::InvalidDeviceIdentity(bytes.len()))?;
        Ok(Self(eui))
    }

    /// Parse a 16-digit hex EUI; `:` and `-` separators are accepted.
    pub fn from_hex(s: &str) -> Result<Self> {
        let cleaned: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let bytes = hex::decode(cleaned)?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Low interface-identifier word, bytes 0..4 combined little-endian.
    pub fn iid_low(&self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// High interface-identifier word, bytes 4..8 combined little-endian.
    pub fn iid_high(&self) -> u32 {
        u32::from_le_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }

    pub fn iid_part(&self, part: IidPart) -> u32 {
        match part {
            IidPart::Low => self.iid_low(),
            IidPart::High => self.iid_high(),
        }
    }

    /// Both words in header order.
    pub fn interface_identifier(&self) -> (u32, u32) {
        (self.iid_low(), self.iid_high())
    }

    /// Global address of the device under a /64 prefix.
    pub fn address(&self, prefix: &Ipv6Addr) -> Ipv6Addr {
        let mut octets = prefix.octets();
        octets[8..].copy_from_slice(&self.0);
        Ipv6Addr::from(octets)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EUI: [u8; 8] = [0x00, 0xAF, 0x00, 0x85, 0x89, 0xA1, 0x00, 0x1F];

    #[test]
    fn test_iid_words_little_endian() {
        let dev = DeviceIdentity::new(EUI);
        assert_eq!(dev.iid_low(), 0x8500AF00);
        assert_eq!(dev.iid_high(), 0x1F00A189);
        assert_eq!(dev.interface_identifier(), (0x8500AF00, 0x1F00A189));
        assert_eq!(dev.iid_part(IidPart::High), dev.iid_high());
    }

    #[test]
    fn test_words_reproduce_eui_bytes() {
        let dev = DeviceIdentity::new(EUI);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&dev.iid_low().to_le_bytes());
        bytes.extend_from_slice(&dev.iid_high().to_le_bytes());
        assert_eq!(bytes, EUI);
    }

    #[test]
    fn test_from_slice_rejects_short_identity() {
        let err = DeviceIdentity::from_slice(&EUI[..6]).unwrap_err();
        assert!(matches!(err, SchcError::InvalidDeviceIdentity(6)));
    }

    #[test]
    fn test_from_hex() {
        let dev = DeviceIdentity::from_hex("00:AF:00:85:89:A1:00:1F").unwrap();
        assert_eq!(dev.as_bytes(), &EUI);
        assert_eq!(dev.to_string(), "00AF008589A1001F");
        assert!(DeviceIdentity::from_hex("00AF").is_err());
        assert!(DeviceIdentity::from_hex("zz").is_err());
    }

    #[test]
    fn test_address_under_prefix() {
        let dev = DeviceIdentity::new(EUI);
        let prefix: Ipv6Addr = "2001:6a8:1d80:602::".parse().unwrap();
        let expected: Ipv6Addr = "2001:6a8:1d80:602:af:85:89a1:1f".parse().unwrap();
        assert_eq!(dev.address(&prefix), expected);
    }
}
