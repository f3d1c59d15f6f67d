//! # SCHC for LoRaWAN - Static Context Header Compression
//!
//! Compresses the 48-byte IPv6 + UDP header of packets sent over a LoRaWAN
//! link down to a one-byte rule tag plus whatever residue the rule leaves
//! on the wire, and rebuilds the full header on the other side.

pub mod bit_buffer;
pub mod error;
pub mod field_id;
pub mod rule;

// Core functional modules
pub mod compressor;
pub mod decompressor;
pub mod device;
pub mod header;
pub mod matcher;
pub mod packet_builder;

// Integration layer
pub mod config;
pub mod interface;

// Core error/result types
pub use error::{Result, SchcError};
pub use field_id::FieldId;
pub use rule::{CompressionAction, Field, MatchingOperator, Rule, RuleSet};

pub use compressor::{CompressedPacket, compress_header, compress_packet, compress_packet_strict};
pub use decompressor::{DecompressedPacket, decompress_packet};
pub use device::DeviceIdentity;
pub use header::HeaderContext;
pub use matcher::match_rule;
pub use packet_builder::Ipv6UdpPacket;

pub use config::InterfaceConfig;
pub use interface::{BufferedLink, InterfaceStats, LinkLayer, SchcInterface};
