extern crate alloc;

use bitvec::prelude::*;
use nom::{
    bytes::streaming::take,
    error::{ErrorKind, FromExternalError, ParseError},
    Needed,
};
use nom_bitvec::BSlice;

use crate::{
    constraint::bits_for_range,
    encode::FRAGMENT_UNIT,
    util::{load_uint, load_unsigned, octets_for_range},
    *,
};

type DecodeIn<'input> = BSlice<'input, u8, Msb0>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The count on the wire does not fit the SIZE constraint.
    #[error("cardinality violation: {0}")]
    CardinalityViolation(ConstraintError),
    /// The bits do not form a valid encoding of the expected type.
    #[error("malformed input: {0}")]
    Malformed(String),
    /// The input ended before the value was complete; `needed` counts the
    /// missing bits when known.
    #[error("unexpected end of input")]
    Truncated { needed: Option<usize> },
    /// A decoded primitive lies outside its value or size constraint.
    #[error("constraint violation: {0}")]
    ConstraintViolation(#[from] ConstraintError),
    #[error("parser error: {0:?}")]
    Parser(ErrorKind),
    /// The collections decoded so far hold more elements than the decoder's
    /// element limit admits.
    #[error("element limit exceeded: {requested} more elements, {available} left")]
    ElementLimit { requested: usize, available: usize },
}

impl From<nom::Err<DecodeError>> for DecodeError {
    fn from(value: nom::Err<DecodeError>) -> Self {
        match value {
            nom::Err::Incomplete(Needed::Size(n)) => DecodeError::Truncated {
                needed: Some(n.get()),
            },
            nom::Err::Incomplete(Needed::Unknown) => DecodeError::Truncated { needed: None },
            nom::Err::Error(e) | nom::Err::Failure(e) => e,
        }
    }
}

impl<I> ParseError<I> for DecodeError {
    fn from_error_kind(_: I, kind: ErrorKind) -> Self {
        DecodeError::Parser(kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I, E> FromExternalError<I, E> for DecodeError {
    fn from_external_error(_: I, kind: ErrorKind, _: E) -> Self {
        DecodeError::Parser(kind)
    }
}

/// One part of a PER general length determinant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PerLength {
    /// The last (or only) part, carrying fewer than 16K items.
    Complete(usize),
    /// A fragment of `m * 16K` items; more length parts follow.
    Fragment(usize),
}

/// Read cursor over a borrowed buffer, tracking the position in bits.
#[derive(Clone, Copy)]
pub struct Decoder<'input> {
    input: DecodeIn<'input>,
    total_bits: usize,
    elements_left: Option<usize>,
}

impl core::fmt::Debug for Decoder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Decoder")
            .field("bit_position", &self.bit_position())
            .field("remaining_bits", &self.remaining_bits())
            .field("elements_left", &self.elements_left)
            .finish()
    }
}

impl<'input> Decoder<'input> {
    #[must_use]
    pub fn new(bytes: &'input [u8]) -> Self {
        let input = BSlice(BitSlice::<u8, Msb0>::from_slice(bytes));
        Self {
            input,
            total_bits: input.0.len(),
            elements_left: None,
        }
    }

    /// A decoder that refuses to produce more than `elements` collection
    /// elements in total, over all nesting levels.
    ///
    /// Elements that occupy no bits (e.g. NULL) are not bounded by the input
    /// size, so untrusted input with such element types needs this limit.
    #[must_use]
    pub fn with_element_limit(bytes: &'input [u8], elements: usize) -> Self {
        Self {
            elements_left: Some(elements),
            ..Self::new(bytes)
        }
    }

    /// Elements that may still be decoded, `None` when unlimited.
    #[must_use]
    pub fn elements_left(&self) -> Option<usize> {
        self.elements_left
    }

    /// Takes `count` elements from the element limit.
    pub(crate) fn claim_elements(&mut self, count: usize) -> Result<(), DecodeError> {
        match self.elements_left {
            Some(available) if available < count => Err(DecodeError::ElementLimit {
                requested: count,
                available,
            }),
            Some(available) => {
                self.elements_left = Some(available - count);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Number of bits consumed so far.
    #[must_use]
    pub fn bit_position(&self) -> usize {
        self.total_bits - self.input.0.len()
    }

    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.input.0.len()
    }

    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.bit_position() % 8 == 0
    }

    fn take_bits(&mut self, count: usize) -> Result<DecodeIn<'input>, DecodeError> {
        let (remaining, taken) = take::<usize, DecodeIn<'input>, DecodeError>(count)(self.input)?;
        self.input = remaining;
        Ok(taken)
    }

    pub fn read_bit(&mut self) -> Result<bool, DecodeError> {
        let bit = self.take_bits(1)?;
        Ok(bit.0[0])
    }

    /// Reads an unsigned field of `count` bits, MSB first.
    pub fn read_bits(&mut self, count: u32) -> Result<u64, DecodeError> {
        if count > 64 {
            return Err(DecodeError::Malformed(alloc::format!(
                "bit field of {count} bits"
            )));
        }
        let bits = self.take_bits(count as usize)?;
        Ok(load_uint(bits))
    }

    /// Reads `count` whole octets starting at the current bit position.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        let bit_count = count
            .checked_mul(8)
            .ok_or(DecodeError::Truncated { needed: None })?;
        let bits = self.take_bits(bit_count)?;
        Ok(bits.0.chunks(8).map(|octet| octet.load_be::<u8>()).collect())
    }

    /// Skips the padding up to the next octet boundary.
    pub fn align(&mut self) -> Result<(), DecodeError> {
        let padding = util::padding_bits(self.bit_position());
        self.take_bits(padding).map(|_| ())
    }

    /// OER length determinant, X.696 8.6.
    pub fn read_oer_length(&mut self) -> Result<usize, DecodeError> {
        let first = self.read_bits(8)?;
        match first {
            #[allow(clippy::cast_possible_truncation)]
            len if len < 128 => Ok(len as usize),
            0x80 => Err(DecodeError::Malformed(
                "indefinite length form is not allowed in OER".into(),
            )),
            long => {
                let octets = (long & 0x7F) as usize;
                if octets > 8 {
                    return Err(DecodeError::Malformed(alloc::format!(
                        "length determinant of {octets} octets exceeds supported range"
                    )));
                }
                let bytes = self.read_bytes(octets)?;
                usize::try_from(load_unsigned(&bytes)).map_err(|_| {
                    DecodeError::Malformed("length does not fit into usize".into())
                })
            }
        }
    }

    /// One part of a PER general length, X.691 11.9.3.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn read_per_length(&mut self, rules: Rules) -> Result<PerLength, DecodeError> {
        if rules.is_aligned() {
            self.align()?;
        }
        let first = self.read_bits(8)?;
        match first {
            len if len & 0x80 == 0 => Ok(PerLength::Complete(len as usize)),
            high if high & 0xC0 == 0x80 => {
                let low = self.read_bits(8)?;
                Ok(PerLength::Complete((((high & 0x3F) << 8) | low) as usize))
            }
            fragment => match fragment & 0x3F {
                blocks @ 1..=4 => Ok(PerLength::Fragment(blocks as usize * FRAGMENT_UNIT)),
                blocks => Err(DecodeError::Malformed(alloc::format!(
                    "fragment multiplier {blocks} outside of 1..=4"
                ))),
            },
        }
    }

    /// Reads a complete, possibly fragmented PER general length.
    ///
    /// `part` is called with the number of items read before the part and the
    /// number of items in the part, before the next length part is read. It
    /// is expected to consume the items of that part.
    pub(crate) fn read_per_fragmented<F>(
        &mut self,
        rules: Rules,
        mut part: F,
    ) -> Result<usize, DecodeError>
    where
        F: FnMut(&mut Self, usize, usize) -> Result<(), DecodeError>,
    {
        let mut total = 0usize;
        loop {
            match self.read_per_length(rules)? {
                PerLength::Complete(count) => {
                    log::trace!("PER length: final part of {count} items after {total}");
                    part(self, total, count)?;
                    return Ok(total + count);
                }
                PerLength::Fragment(count) => {
                    log::trace!("PER length: fragment of {count} items after {total}");
                    part(self, total, count)?;
                    total += count;
                }
            }
        }
    }

    /// PER constrained whole number, X.691 11.5.7. Returns the offset from
    /// the lower bound.
    pub(crate) fn read_per_constrained(
        &mut self,
        rules: Rules,
        range: u128,
    ) -> Result<u64, DecodeError> {
        if range <= 1 {
            return Ok(0);
        }
        if !rules.is_aligned() {
            return self.read_bits(bits_for_range(range));
        }
        match range {
            r if r <= 255 => self.read_bits(bits_for_range(r)),
            256 => {
                self.align()?;
                self.read_bits(8)
            }
            r if r <= 65536 => {
                self.align()?;
                self.read_bits(16)
            }
            r => {
                let max_octets = octets_for_range(r);
                #[allow(clippy::cast_possible_truncation)]
                let octets = self.read_bits(bits_for_range(max_octets as u128))? as usize + 1;
                if octets > max_octets {
                    return Err(DecodeError::Malformed(alloc::format!(
                        "{octets} octets exceed the {max_octets} octets of the value range"
                    )));
                }
                self.align()?;
                let bytes = self.read_bytes(octets)?;
                Ok(load_unsigned(&bytes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_bit_fields() {
        let mut decoder = Decoder::new(&[0xAA, 0xBC, 0xD0]);
        assert!(decoder.read_bit().unwrap());
        assert_eq!(2, decoder.read_bits(3).unwrap());
        assert_eq!(0xABCD, decoder.read_bits(16).unwrap());
        assert_eq!(20, decoder.bit_position());
        decoder.align().unwrap();
        assert_eq!(0, decoder.remaining_bits());
    }

    #[test]
    fn spends_element_limit() {
        let mut decoder = Decoder::with_element_limit(&[], 5);
        decoder.claim_elements(3).unwrap();
        assert_eq!(Some(2), decoder.elements_left());
        assert_eq!(
            Err(DecodeError::ElementLimit {
                requested: 3,
                available: 2
            }),
            decoder.claim_elements(3)
        );
        let mut unlimited = Decoder::new(&[]);
        unlimited.claim_elements(usize::MAX).unwrap();
        assert_eq!(None, unlimited.elements_left());
    }

    #[test]
    fn reports_truncation() {
        let mut decoder = Decoder::new(&[0xFF]);
        decoder.read_bits(4).unwrap();
        assert!(matches!(
            decoder.read_bits(8),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            decoder.read_bytes(usize::MAX),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn decodes_oer_length() {
        assert_eq!(3, Decoder::new(&[0x03]).read_oer_length().unwrap());
        assert_eq!(128, Decoder::new(&[0x81, 0x80]).read_oer_length().unwrap());
        assert_eq!(
            65535,
            Decoder::new(&[0x82, 0xFF, 0xFF]).read_oer_length().unwrap()
        );
        assert!(matches!(
            Decoder::new(&[0x80]).read_oer_length(),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            Decoder::new(&[0x83, 0x01]).read_oer_length(),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn decodes_per_length() {
        let mut decoder = Decoder::new(&[0x7F, 0x80, 0x80, 0xC2, 0xC5]);
        assert_eq!(
            PerLength::Complete(127),
            decoder.read_per_length(Rules::UnalignedPer).unwrap()
        );
        assert_eq!(
            PerLength::Complete(128),
            decoder.read_per_length(Rules::UnalignedPer).unwrap()
        );
        assert_eq!(
            PerLength::Fragment(32768),
            decoder.read_per_length(Rules::UnalignedPer).unwrap()
        );
        assert!(matches!(
            decoder.read_per_length(Rules::UnalignedPer),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn decodes_constrained_whole_numbers() {
        let mut decoder = Decoder::new(&[0x00, 0x02]);
        assert_eq!(2, decoder.read_per_constrained(Rules::UnalignedPer, 65535).unwrap());

        let mut decoder = Decoder::new(&[0x80, 0x05]);
        decoder.read_bit().unwrap();
        assert_eq!(5, decoder.read_per_constrained(Rules::AlignedPer, 256).unwrap());

        let mut decoder = Decoder::new(&[0x40, 0x01, 0x02]);
        assert_eq!(
            0x0102,
            decoder.read_per_constrained(Rules::AlignedPer, 1 << 32).unwrap()
        );
    }
}
