//! Network-interface glue between an IPv6 stack and a LoRaWAN radio.
//!
//! Outbound packets are compressed and handed to a [`LinkLayer`]; inbound
//! frames are decompressed back into IPv6 packets. Nothing here blocks or
//! retries: every call runs to completion on the caller's thread.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, warn};

use crate::compressor::compress_packet;
use crate::decompressor::decompress_packet;
use crate::device::DeviceIdentity;
use crate::error::{Result, SchcError};
use crate::rule::RuleSet;

/// LoRaWAN application payload limit.
pub const DEFAULT_MTU: usize = 255;

/// Radio side of the interface.
pub trait LinkLayer {
    fn mtu(&self) -> usize {
        DEFAULT_MTU
    }

    /// Send one frame no larger than the MTU.
    fn transmit(&mut self, frame: &[u8]) -> Result<()>;

    /// Send a frame larger than the MTU. Links without a fragmentation
    /// scheme keep this default and the frame is refused.
    fn fragment(&mut self, frame: &[u8]) -> Result<()> {
        Err(SchcError::FrameTooLarge {
            len: frame.len(),
            mtu: self.mtu(),
        })
    }
}

/// Per-interface counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterfaceStats {
    pub xmit: u64,
    pub recv: u64,
    pub compressed: u64,
    pub passthrough: u64,
    pub drop: u64,
    pub bytes_saved: i64,
}

pub struct SchcInterface<L: LinkLayer> {
    rules: RuleSet,
    device: DeviceIdentity,
    link: L,
    stats: InterfaceStats,
}

impl<L: LinkLayer> SchcInterface<L> {
    pub fn new(rules: RuleSet, device: DeviceIdentity, link: L) -> Self {
        Self {
            rules,
            device,
            link,
            stats: InterfaceStats::default(),
        }
    }

    /// Compress an outbound IPv6 packet and pass it to the link.
    pub fn output(&mut self, packet: &[u8]) -> Result<()> {
        let result = self.send(packet);
        if let Err(ref e) = result {
            self.stats.drop += 1;
            warn!(error = %e, "dropping outbound packet");
        }
        result
    }

    fn send(&mut self, packet: &[u8]) -> Result<()> {
        let compressed = compress_packet(packet, &self.rules, &self.device)?;
        let mtu = self.link.mtu();

        if compressed.data.len() > mtu {
            debug!(len = compressed.data.len(), mtu, "frame exceeds MTU, fragmenting");
            self.link.fragment(&compressed.data)?;
        } else {
            self.link.transmit(&compressed.data)?;
        }

        self.stats.xmit += 1;
        if compressed.is_compressed() {
            self.stats.compressed += 1;
        } else {
            self.stats.passthrough += 1;
        }
        self.stats.bytes_saved += compressed.savings_bytes();
        debug!(
            rule_id = ?compressed.rule_id,
            len = compressed.data.len(),
            "frame handed to link"
        );
        Ok(())
    }

    /// Decompress a frame received from the link into an IPv6 packet.
    /// Frames that cannot be decompressed are counted and dropped.
    pub fn input(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        match decompress_packet(frame, &self.rules, &self.device) {
            Ok(packet) => {
                self.stats.recv += 1;
                Ok(packet.data)
            }
            Err(e) => {
                self.stats.drop += 1;
                warn!(error = %e, len = frame.len(), "dropping inbound frame");
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> InterfaceStats {
        self.stats
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

/// In-memory link that queues transmitted frames, standing in for the
/// radio's application data buffer.
#[derive(Debug, Clone)]
pub struct BufferedLink {
    frames: VecDeque<Vec<u8>>,
    mtu: usize,
}

impl BufferedLink {
    pub fn new() -> Self {
        Self::with_mtu(DEFAULT_MTU)
    }

    pub fn with_mtu(mtu: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            mtu,
        }
    }

    pub fn pop_frame(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.frames.len()
    }
}

impl Default for BufferedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkLayer for BufferedLink {
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        self.frames.push_back(frame.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_builder::Ipv6UdpPacket;
    use std::net::Ipv6Addr;

    const DEVICE: DeviceIdentity =
        DeviceIdentity::new([0x00, 0xAF, 0x00, 0x85, 0x89, 0xA1, 0x00, 0x1F]);

    fn uplink(payload: Vec<u8>) -> Vec<u8> {
        let prefix: Ipv6Addr = "2001:6a8:1d80:602::".parse().unwrap();
        let server: Ipv6Addr = "2001:6a8:1d80:2021:230:48ff:fe5a:3ee4".parse().unwrap();
        Ipv6UdpPacket::new(DEVICE.address(&prefix), server, 1086, 5683)
            .payload(payload)
            .without_checksum()
            .build()
    }

    fn interface(link: BufferedLink) -> SchcInterface<BufferedLink> {
        SchcInterface::new(RuleSet::builtin().unwrap(), DEVICE, link)
    }

    /// Splits oversized frames into MTU-sized pieces.
    struct ChunkingLink {
        inner: BufferedLink,
    }

    impl LinkLayer for ChunkingLink {
        fn mtu(&self) -> usize {
            self.inner.mtu()
        }

        fn transmit(&mut self, frame: &[u8]) -> Result<()> {
            self.inner.transmit(frame)
        }

        fn fragment(&mut self, frame: &[u8]) -> Result<()> {
            for chunk in frame.chunks(self.mtu()) {
                self.inner.transmit(chunk)?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_output_then_input() {
        let packet = uplink(b"22.4".to_vec());
        let mut node = interface(BufferedLink::new());
        node.output(&packet).unwrap();

        let frame = node.link_mut().pop_frame().unwrap();
        assert_eq!(frame, vec![0x01, b'2', b'2', b'.', b'4']);

        let mut gateway = interface(BufferedLink::new());
        let rebuilt = gateway.input(&frame).unwrap();
        assert_eq!(rebuilt, packet);

        let stats = node.stats();
        assert_eq!(stats.xmit, 1);
        assert_eq!(stats.compressed, 1);
        assert_eq!(stats.bytes_saved, 47);
        assert_eq!(gateway.stats().recv, 1);
    }

    #[test]
    fn test_output_passthrough_counted() {
        let mut packet = uplink(vec![0; 4]);
        packet[6] = 6; // TCP
        let mut node = interface(BufferedLink::new());
        node.output(&packet).unwrap();

        let frame = node.link_mut().pop_frame().unwrap();
        assert_eq!(frame[0], 0);
        assert_eq!(&frame[1..], packet.as_slice());
        assert_eq!(node.stats().passthrough, 1);
        assert_eq!(node.stats().bytes_saved, -1);
    }

    #[test]
    fn test_oversized_frame_without_fragmentation() {
        let packet = uplink(vec![0xAB; 300]);
        let mut node = interface(BufferedLink::new());
        let err = node.output(&packet).unwrap_err();
        assert!(matches!(err, SchcError::FrameTooLarge { len: 301, mtu: 255 }));
        assert_eq!(node.stats().drop, 1);
        assert_eq!(node.link().pending(), 0);
    }

    #[test]
    fn test_oversized_frame_with_fragmentation() {
        let packet = uplink(vec![0xAB; 300]);
        let link = ChunkingLink {
            inner: BufferedLink::with_mtu(100),
        };
        let mut node = SchcInterface::new(RuleSet::builtin().unwrap(), DEVICE, link);
        node.output(&packet).unwrap();
        assert_eq!(node.link().inner.pending(), 4);
        assert_eq!(node.stats().xmit, 1);
    }

    #[test]
    fn test_foreign_source_sent_uncompressed() {
        let prefix: Ipv6Addr = "2001:6a8:1d80:602::".parse().unwrap();
        let server: Ipv6Addr = "2001:6a8:1d80:2021:230:48ff:fe5a:3ee4".parse().unwrap();
        let other = DeviceIdentity::new([1, 2, 3, 4, 5, 6, 7, 8]);
        let packet = Ipv6UdpPacket::new(other.address(&prefix), server, 1086, 5683)
            .without_checksum()
            .build();

        let mut node = interface(BufferedLink::new());
        node.output(&packet).unwrap();
        let frame = node.link_mut().pop_frame().unwrap();
        assert_eq!(frame[0], 0);

        let mut gateway = interface(BufferedLink::new());
        assert_eq!(gateway.input(&frame).unwrap(), packet);
        assert_eq!(node.stats().passthrough, 1);
    }

    #[test]
    fn test_short_packet_dropped() {
        let mut node = interface(BufferedLink::new());
        assert!(node.output(&[0x60; 20]).is_err());
        assert_eq!(node.stats().drop, 1);
    }

    #[test]
    fn test_input_unknown_rule_dropped() {
        let mut gateway = interface(BufferedLink::new());
        let err = gateway.input(&[0x09, 0x00]).unwrap_err();
        assert!(matches!(err, SchcError::UnknownRuleTag(9)));
        assert_eq!(gateway.stats().drop, 1);
        assert_eq!(gateway.stats().recv, 0);
    }
}
