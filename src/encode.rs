extern crate alloc;

use bitvec::prelude::*;

use crate::{constraint::bits_for_range, util::octets_for_range, *};

/// Largest block of a fragmented PER length, X.691 11.9.3.8.
pub(crate) const FRAGMENT_UNIT: usize = 16384;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The number of elements handed to a SEQUENCE OF does not fit its SIZE constraint.
    #[error("cardinality violation: {0}")]
    CardinalityViolation(ConstraintError),
    /// The encoder's output limit would be exceeded.
    #[error("buffer exhausted: {needed} bits needed, {available} available")]
    BufferExhausted { needed: usize, available: usize },
    #[error("constraint violation: {0}")]
    ConstraintViolation(#[from] ConstraintError),
    /// The value does not have the shape the descriptor expects.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl EncodeError {
    pub(crate) fn mismatch(descriptor: &str, expected: &str, found: &Value) -> Self {
        Self::InvalidValue(alloc::format!(
            "{descriptor} expects a {expected} value, found {}",
            found.kind_name()
        ))
    }
}

/// Write cursor: a growing bit buffer with an optional size limit.
#[derive(Debug, Default)]
pub struct Encoder {
    bits: BitVec<u8, Msb0>,
    limit: Option<usize>,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bits: bitvec![u8, Msb0;],
            limit: None,
        }
    }

    /// An encoder that refuses to grow beyond `bytes` octets.
    #[must_use]
    pub fn with_limit(bytes: usize) -> Self {
        Self {
            bits: BitVec::with_capacity(bytes.saturating_mul(8)),
            limit: Some(bytes.saturating_mul(8)),
        }
    }

    /// Number of bits written so far.
    #[must_use]
    pub fn bit_position(&self) -> usize {
        self.bits.len()
    }

    /// Bits that can still be written, `None` when unlimited.
    #[must_use]
    pub fn remaining_bits(&self) -> Option<usize> {
        self.limit.map(|limit| limit.saturating_sub(self.bits.len()))
    }

    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.bits.len() % 8 == 0
    }

    #[must_use]
    pub fn as_bitslice(&self) -> &BitSlice<u8, Msb0> {
        &self.bits
    }

    fn reserve(&self, needed: usize) -> Result<(), EncodeError> {
        match self.remaining_bits() {
            Some(available) if available < needed => {
                Err(EncodeError::BufferExhausted { needed, available })
            }
            _ => Ok(()),
        }
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<(), EncodeError> {
        self.reserve(1)?;
        self.bits.push(bit);
        Ok(())
    }

    /// Writes the `count` least significant bits of `value`, MSB first.
    pub fn write_bits(&mut self, value: u64, count: u32) -> Result<(), EncodeError> {
        if count == 0 {
            return Ok(());
        }
        if count > 64 {
            return Err(EncodeError::Unsupported(alloc::format!(
                "bit field of {count} bits"
            )));
        }
        self.reserve(count as usize)?;
        let raw = value.to_be_bytes();
        let bits = raw.view_bits::<Msb0>();
        self.bits
            .extend_from_bitslice(&bits[(bits.len() - count as usize)..]);
        Ok(())
    }

    /// Writes whole octets at the current bit position, which need not be aligned.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        self.reserve(bytes.len().saturating_mul(8))?;
        self.bits.extend_from_bitslice(bytes.view_bits::<Msb0>());
        Ok(())
    }

    /// Pads with zero bits up to the next octet boundary.
    pub fn align(&mut self) -> Result<(), EncodeError> {
        let padding = util::padding_bits(self.bits.len());
        self.reserve(padding)?;
        self.bits.resize(self.bits.len() + padding, false);
        Ok(())
    }

    /// OER length determinant, X.696 8.6.
    ///
    /// Short form below 128, otherwise `0x80 | n` followed by `n` octets
    /// holding the length.
    pub fn write_oer_length(&mut self, length: usize) -> Result<(), EncodeError> {
        match length {
            #[allow(clippy::cast_possible_truncation)]
            len if len < 128 => self.write_bytes(&[len as u8]),
            len => {
                let raw = (len as u64).to_be_bytes();
                let mut length_bytes = raw.as_ref();
                while length_bytes.len() > 1 && length_bytes[0] == 0 {
                    length_bytes = &length_bytes[1..];
                }
                #[allow(clippy::cast_possible_truncation)]
                self.write_bytes(&[(length_bytes.len() + 128) as u8])?;
                self.write_bytes(length_bytes)
            }
        }
    }

    /// Non-fragmented PER general length, X.691 11.9.3.6 and 11.9.3.7.
    ///
    /// `length` must be below 16K; aligned PER pads before the length octets.
    pub(crate) fn write_per_length(&mut self, rules: Rules, length: usize) -> Result<(), EncodeError> {
        if rules.is_aligned() {
            self.align()?;
        }
        match length {
            len if len < 128 => self.write_bits(len as u64, 8),
            len if len < FRAGMENT_UNIT => self.write_bits(0x8000 | len as u64, 16),
            len => Err(EncodeError::Unsupported(alloc::format!(
                "length {len} needs fragmentation"
            ))),
        }
    }

    /// PER general length with fragmentation, X.691 11.9.3.8.
    ///
    /// `items` is called with the index range of the items that follow each
    /// length part, so item data interleaves with the fragment headers.
    pub(crate) fn write_per_fragmented<F>(
        &mut self,
        rules: Rules,
        count: usize,
        mut items: F,
    ) -> Result<(), EncodeError>
    where
        F: FnMut(&mut Self, core::ops::Range<usize>) -> Result<(), EncodeError>,
    {
        let mut offset = 0;
        loop {
            let remaining = count - offset;
            if remaining < FRAGMENT_UNIT {
                log::trace!("PER length: final part of {remaining} items");
                self.write_per_length(rules, remaining)?;
                return items(self, offset..count);
            }
            let blocks = (remaining / FRAGMENT_UNIT).min(4);
            log::trace!("PER length: fragment of {blocks} x 16K items");
            if rules.is_aligned() {
                self.align()?;
            }
            self.write_bits(0xC0 | blocks as u64, 8)?;
            let end = offset + blocks * FRAGMENT_UNIT;
            items(self, offset..end)?;
            offset = end;
        }
    }

    /// PER constrained whole number, X.691 11.5.7.
    ///
    /// `offset` is the value minus the lower bound, `range` the number of
    /// values in the constraint.
    pub(crate) fn write_per_constrained(
        &mut self,
        rules: Rules,
        offset: u64,
        range: u128,
    ) -> Result<(), EncodeError> {
        if range <= 1 {
            return Ok(());
        }
        if !rules.is_aligned() {
            return self.write_bits(offset, bits_for_range(range));
        }
        match range {
            r if r <= 255 => self.write_bits(offset, bits_for_range(r)),
            256 => {
                self.align()?;
                self.write_bits(offset, 8)
            }
            r if r <= 65536 => {
                self.align()?;
                self.write_bits(offset, 16)
            }
            r => {
                let octets = util::minimal_unsigned_octets(offset);
                let max_octets = octets_for_range(r);
                self.write_bits(
                    (octets.len() - 1) as u64,
                    bits_for_range(max_octets as u128),
                )?;
                self.align()?;
                self.write_bytes(&octets)
            }
        }
    }
}

impl From<Encoder> for alloc::vec::Vec<u8> {
    fn from(val: Encoder) -> Self {
        let mut bits = val.bits;
        let padding = util::padding_bits(bits.len());
        bits.resize(bits.len() + padding, false);
        bits.into_vec()
    }
}

impl From<Encoder> for bytes::Bytes {
    fn from(val: Encoder) -> Self {
        <Encoder as core::convert::Into<alloc::vec::Vec<u8>>>::into(val).into()
    }
}

impl From<Encoder> for BitVec<u8, Msb0> {
    fn from(val: Encoder) -> Self {
        val.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(encoder: Encoder) -> Vec<u8> {
        encoder.into()
    }

    #[test]
    fn writes_bit_fields_msb_first() {
        let mut encoder = Encoder::new();
        encoder.write_bit(true).unwrap();
        encoder.write_bits(2, 3).unwrap();
        encoder.write_bits(0xABCD, 16).unwrap();
        assert_eq!(20, encoder.bit_position());
        assert_eq!(&[0xAA, 0xBC, 0xD0], bytes(encoder).as_slice());
    }

    #[test]
    fn aligns_with_zero_padding() {
        let mut encoder = Encoder::new();
        encoder.write_bit(true).unwrap();
        encoder.align().unwrap();
        encoder.write_bytes(&[0x7F]).unwrap();
        assert!(encoder.is_aligned());
        assert_eq!(&[0x80, 0x7F], bytes(encoder).as_slice());
    }

    #[test]
    fn encodes_oer_length() {
        let mut encoder = Encoder::new();
        encoder.write_oer_length(3).unwrap();
        assert_eq!(&[3], bytes(encoder).as_slice());

        let mut encoder = Encoder::new();
        encoder.write_oer_length(128).unwrap();
        assert_eq!(&[0x81, 0x80], bytes(encoder).as_slice());

        let mut encoder = Encoder::new();
        encoder.write_oer_length(65535).unwrap();
        assert_eq!(&[0x82, 0xFF, 0xFF], bytes(encoder).as_slice());
    }

    #[test]
    fn encodes_per_length() {
        let mut encoder = Encoder::new();
        encoder.write_per_length(Rules::UnalignedPer, 127).unwrap();
        encoder.write_per_length(Rules::UnalignedPer, 128).unwrap();
        assert_eq!(&[0x7F, 0x80, 0x80], bytes(encoder).as_slice());

        let mut encoder = Encoder::new();
        encoder.write_bit(true).unwrap();
        encoder.write_per_length(Rules::AlignedPer, 16383).unwrap();
        assert_eq!(&[0x80, 0xBF, 0xFF], bytes(encoder).as_slice());
    }

    #[test]
    fn fragments_long_per_lengths() {
        let mut encoder = Encoder::new();
        let mut parts = vec![];
        encoder
            .write_per_fragmented(Rules::UnalignedPer, 16384 * 5 + 2, |_, range| {
                parts.push(range);
                Ok(())
            })
            .unwrap();
        assert_eq!(
            vec![0..65536, 65536..81920, 81920..81922],
            parts
        );
        assert_eq!(&[0xC4, 0xC1, 0x02], bytes(encoder).as_slice());

        let mut encoder = Encoder::new();
        encoder
            .write_per_fragmented(Rules::UnalignedPer, 16384, |_, _| Ok(()))
            .unwrap();
        assert_eq!(&[0xC1, 0x00], bytes(encoder).as_slice());
    }

    #[test]
    fn encodes_constrained_whole_numbers() {
        let mut encoder = Encoder::new();
        encoder.write_per_constrained(Rules::UnalignedPer, 2, 65535).unwrap();
        assert_eq!(&[0x00, 0x02], bytes(encoder).as_slice());

        let mut encoder = Encoder::new();
        encoder.write_bit(true).unwrap();
        encoder.write_per_constrained(Rules::AlignedPer, 5, 256).unwrap();
        assert_eq!(&[0x80, 0x05], bytes(encoder).as_slice());

        let mut encoder = Encoder::new();
        encoder.write_per_constrained(Rules::AlignedPer, 3, 7).unwrap();
        assert_eq!(3, encoder.bit_position());

        // range 2^32: octet count 1..=4 in 2 bits, then aligned octets
        let mut encoder = Encoder::new();
        encoder
            .write_per_constrained(Rules::AlignedPer, 0x0102, 1 << 32)
            .unwrap();
        assert_eq!(&[0x40, 0x01, 0x02], bytes(encoder).as_slice());
    }

    #[test]
    fn refuses_to_grow_past_limit() {
        let mut encoder = Encoder::with_limit(1);
        encoder.write_bits(0, 6).unwrap();
        assert_eq!(
            Err(EncodeError::BufferExhausted {
                needed: 8,
                available: 2
            }),
            encoder.write_bytes(&[1])
        );
        assert_eq!(6, encoder.bit_position());
        encoder.align().unwrap();
        assert_eq!(Some(0), encoder.remaining_bits());
    }
}
