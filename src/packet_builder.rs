//! Packet Header Builder
//!
//! Builds complete IPv6/UDP packets with consistent length fields and an
//! RFC 768 checksum. The interface glue hands packets of this shape to the
//! compressor, so the tests, the demo and the CLI use it to produce input.

use std::net::Ipv6Addr;

use crate::header::{HEADER_LEN, UDP_HEADER_LEN};

/// Next-header value for UDP.
pub const IPPROTO_UDP: u8 = 17;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6UdpPacket {
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub traffic_class: u8,
    pub flow_label: u32,
    pub next_header: u8,
    pub hop_limit: u8,
    pub payload: Vec<u8>,
    /// Fill in the UDP checksum (otherwise left at zero)
    pub checksum: bool,
}

impl Ipv6UdpPacket {
    pub fn new(
        source: Ipv6Addr,
        destination: Ipv6Addr,
        source_port: u16,
        destination_port: u16,
    ) -> Self {
        Self {
            source,
            destination,
            source_port,
            destination_port,
            traffic_class: 0,
            flow_label: 0,
            next_header: IPPROTO_UDP,
            hop_limit: 255,
            payload: Vec::new(),
            checksum: true,
        }
    }

    pub fn hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    pub fn traffic_class(mut self, traffic_class: u8) -> Self {
        self.traffic_class = traffic_class;
        self
    }

    /// Only the low 20 bits are kept.
    pub fn flow_label(mut self, flow_label: u32) -> Self {
        self.flow_label = flow_label & 0x000F_FFFF;
        self
    }

    pub fn next_header(mut self, next_header: u8) -> Self {
        self.next_header = next_header;
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn without_checksum(mut self) -> Self {
        self.checksum = false;
        self
    }

    /// Serialize header and payload.
    pub fn build(&self) -> Vec<u8> {
        let udp_len = (UDP_HEADER_LEN + self.payload.len()) as u16;
        let mut packet = Vec::with_capacity(HEADER_LEN + self.payload.len());

        // version / traffic class / flow label
        let lead: u32 =
            (6 << 28) | ((self.traffic_class as u32) << 20) | (self.flow_label & 0x000F_FFFF);
        packet.extend_from_slice(&lead.to_be_bytes());
        packet.extend_from_slice(&udp_len.to_be_bytes());
        packet.push(self.next_header);
        packet.push(self.hop_limit);
        packet.extend_from_slice(&self.source.octets());
        packet.extend_from_slice(&self.destination.octets());

        let udp_start = packet.len();
        packet.extend_from_slice(&self.source_port.to_be_bytes());
        packet.extend_from_slice(&self.destination_port.to_be_bytes());
        packet.extend_from_slice(&udp_len.to_be_bytes());
        packet.extend_from_slice(&[0, 0]);
        packet.extend_from_slice(&self.payload);

        if self.checksum {
            let sum = udp_checksum(&self.source, &self.destination, &packet[udp_start..]);
            packet[udp_start + 6..udp_start + 8].copy_from_slice(&sum.to_be_bytes());
        }

        packet
    }
}

/// UDP checksum over the IPv6 pseudo-header and the UDP segment (whose
/// checksum field must be zero).
pub fn udp_checksum(source: &Ipv6Addr, destination: &Ipv6Addr, segment: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut add = |bytes: &[u8]| {
        for chunk in bytes.chunks(2) {
            let word = match chunk {
                [hi, lo] => u16::from_be_bytes([*hi, *lo]),
                [hi] => u16::from_be_bytes([*hi, 0]),
                _ => 0,
            };
            sum += word as u32;
        }
    };

    add(&source.octets());
    add(&destination.octets());
    add(&(segment.len() as u32).to_be_bytes());
    add(&[0, 0, 0, IPPROTO_UDP]);
    add(segment);

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    match !(sum as u16) {
        // zero means "no checksum" in UDP
        0 => 0xFFFF,
        other => other,
    }
}
