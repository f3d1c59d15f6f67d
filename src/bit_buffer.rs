//! BitBuffer Abstraction
//!
//! Position-tracked bit-level read/write buffer wrapping `bitvec`. The IPv6
//! leading word packs version, traffic class and flow label on 4/8/20 bit
//! boundaries, which is where this is used.

use bitvec::prelude::*;

pub struct BitBuffer {
    bits: BitVec<u8, Msb0>,
    position: usize,
}

impl BitBuffer {
    pub fn new() -> Self {
        Self {
            bits: BitVec::new(),
            position: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bits: BitVec::from_slice(bytes),
            position: 0,
        }
    }

    /// Read n bits (MSB first) and advance. `None` past the end or for n > 32.
    pub fn read_bits(&mut self, n: usize) -> Option<u32> {
        if n > 32 || self.position + n > self.bits.len() {
            return None;
        }
        let value = self.bits[self.position..self.position + n]
            .iter()
            .by_vals()
            .fold(0u32, |acc, bit| (acc << 1) | bit as u32);
        self.position += n;
        Some(value)
    }

    /// Append the low n bits of `value`, MSB first.
    pub fn write_bits(&mut self, value: u32, n: usize) {
        for i in (0..n).rev() {
            self.bits.push((value >> i) & 1 == 1);
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bits.len().saturating_sub(self.position)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bits.into_vec()
    }
}

impl Default for BitBuffer {
    fn default() -> Self {
        Self::new()
    }
}
