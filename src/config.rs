//! Interface configuration.
//!
//! ```json
//! { "device_eui": "00AF008589A1001F", "mtu": 255, "rules": "rules/lorawan.json" }
//! ```
//!
//! `mtu` defaults to the LoRaWAN payload limit and `rules` to the built-in
//! context.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device::DeviceIdentity;
use crate::error::Result;
use crate::interface::{BufferedLink, DEFAULT_MTU, SchcInterface};
use crate::rule::RuleSet;

fn default_mtu() -> usize {
    DEFAULT_MTU
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// 8-byte device EUI in hex
    pub device_eui: String,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    /// Rule file; the built-in context is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<PathBuf>,
}

impl InterfaceConfig {
    pub fn new(device: &DeviceIdentity) -> Self {
        Self {
            device_eui: device.to_string(),
            mtu: DEFAULT_MTU,
            rules: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: InterfaceConfig = serde_json::from_str(json)?;
        // Reject a bad EUI at load time rather than on first use.
        config.device()?;
        Ok(config)
    }

    pub fn device(&self) -> Result<DeviceIdentity> {
        DeviceIdentity::from_hex(&self.device_eui)
    }

    pub fn load_rules(&self) -> Result<RuleSet> {
        match &self.rules {
            Some(path) => RuleSet::from_file(path),
            None => RuleSet::builtin(),
        }
    }

    /// Interface over an in-memory link limited to the configured MTU.
    pub fn interface(&self) -> Result<SchcInterface<BufferedLink>> {
        Ok(SchcInterface::new(
            self.load_rules()?,
            self.device()?,
            BufferedLink::with_mtu(self.mtu),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchcError;

    #[test]
    fn test_minimal_config_defaults() {
        let config = InterfaceConfig::from_json(r#"{ "device_eui": "00AF008589A1001F" }"#).unwrap();
        assert_eq!(config.mtu, 255);
        assert!(config.rules.is_none());
        assert_eq!(config.device().unwrap().iid_low(), 0x8500AF00);
        assert_eq!(config.load_rules().unwrap().len(), 4);
    }

    #[test]
    fn test_full_config() {
        let config = InterfaceConfig::from_json(
            r#"{ "device_eui": "00-AF-00-85-89-A1-00-1F", "mtu": 51, "rules": "ctx.json" }"#,
        )
        .unwrap();
        assert_eq!(config.mtu, 51);
        assert_eq!(config.rules, Some(PathBuf::from("ctx.json")));
    }

    #[test]
    fn test_interface_uses_configured_mtu() {
        use crate::interface::LinkLayer;
        use crate::packet_builder::Ipv6UdpPacket;
        use std::net::Ipv6Addr;

        let config =
            InterfaceConfig::from_json(r#"{ "device_eui": "00AF008589A1001F", "mtu": 51 }"#)
                .unwrap();
        let mut node = config.interface().unwrap();
        assert_eq!(node.link().mtu(), 51);

        let device = config.device().unwrap();
        let prefix: Ipv6Addr = "2001:6a8:1d80:602::".parse().unwrap();
        let server: Ipv6Addr = "2001:6a8:1d80:2021:230:48ff:fe5a:3ee4".parse().unwrap();
        let build = |len: usize| {
            Ipv6UdpPacket::new(device.address(&prefix), server, 1086, 5683)
                .payload(vec![0x55; len])
                .build()
        };

        // tag plus 50 bytes fits, one more does not
        node.output(&build(50)).unwrap();
        let err = node.output(&build(51)).unwrap_err();
        assert!(matches!(err, SchcError::FrameTooLarge { len: 52, mtu: 51 }));
        assert_eq!(node.stats().xmit, 1);
        assert_eq!(node.stats().drop, 1);
    }

    #[test]
    fn test_bad_eui_rejected() {
        let err = InterfaceConfig::from_json(r#"{ "device_eui": "00AF0085" }"#).unwrap_err();
        assert!(matches!(err, SchcError::InvalidDeviceIdentity(4)));
    }

    #[test]
    fn test_missing_rules_file() {
        let mut config = InterfaceConfig::new(&DeviceIdentity::new([0; 8]));
        config.rules = Some(PathBuf::from("/nonexistent/rules.json"));
        assert!(matches!(config.load_rules(), Err(SchcError::Io(_))));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = InterfaceConfig::new(&DeviceIdentity::new([1, 2, 3, 4, 5, 6, 7, 8]));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("rules"));
        assert_eq!(InterfaceConfig::from_json(&json).unwrap(), config);
    }
}
