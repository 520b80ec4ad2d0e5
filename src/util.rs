extern crate alloc;

use alloc::vec::Vec;

use bitvec::prelude::*;
use nom_bitvec::BSlice;

/// Zero bits needed to reach the next octet boundary from `bit_position`.
pub(crate) fn padding_bits(bit_position: usize) -> usize {
    (8 - bit_position % 8) % 8
}

/// Octets needed to hold every offset of a range of `range` values.
pub(crate) fn octets_for_range(range: u128) -> usize {
    let max_offset = range.saturating_sub(1);
    let bits = 128 - max_offset.leading_zeros() as usize;
    num::Integer::div_ceil(&bits, &8).max(1)
}

/// Big-endian octets of `value` without leading zero octets, at least one octet.
pub(crate) fn minimal_unsigned_octets(value: u64) -> Vec<u8> {
    let raw = value.to_be_bytes();
    let mut bytes = raw.as_ref();
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes = &bytes[1..];
    }
    bytes.to_vec()
}

/// Shortest two's complement representation of `value`.
pub(crate) fn minimal_signed_octets(value: i64) -> Vec<u8> {
    let raw = value.to_be_bytes();
    let mut bytes = raw.as_ref();
    while bytes.len() > 1
        && ((bytes[0] == 0x00 && bytes[1] & 0x80 == 0)
            || (bytes[0] == 0xFF && bytes[1] & 0x80 != 0))
    {
        bytes = &bytes[1..];
    }
    bytes.to_vec()
}

/// Reads an unsigned big-endian integer of up to 64 bits from a bit slice.
pub(crate) fn load_uint(bits: BSlice<'_, u8, Msb0>) -> u64 {
    if bits.0.is_empty() {
        0
    } else {
        bits.0.load_be::<u64>()
    }
}

/// Interprets up to eight octets as an unsigned big-endian integer.
pub(crate) fn load_unsigned(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw[8 - bytes.len()..].copy_from_slice(bytes);
    u64::from_be_bytes(raw)
}

/// Interprets up to eight octets as a two's complement integer.
pub(crate) fn load_signed(bytes: &[u8]) -> i64 {
    let fill = if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        0xFF
    } else {
        0x00
    };
    let mut raw = [fill; 8];
    raw[8 - bytes.len()..].copy_from_slice(bytes);
    i64::from_be_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_padding() {
        assert_eq!(0, padding_bits(0));
        assert_eq!(7, padding_bits(1));
        assert_eq!(0, padding_bits(16));
    }

    #[test]
    fn trims_integer_octets() {
        assert_eq!(vec![0], minimal_unsigned_octets(0));
        assert_eq!(vec![1, 0], minimal_unsigned_octets(256));
        assert_eq!(vec![0x00, 0x80], minimal_signed_octets(128));
        assert_eq!(vec![0x80], minimal_signed_octets(-128));
        assert_eq!(vec![0xFF, 0x7F], minimal_signed_octets(-129));
        assert_eq!(vec![0x00], minimal_signed_octets(0));
        assert_eq!(-129, load_signed(&[0xFF, 0x7F]));
        assert_eq!(128, load_signed(&[0x00, 0x80]));
        assert_eq!(0xFF7F, load_unsigned(&[0xFF, 0x7F]));
    }

    #[test]
    fn sizes_ranges_in_octets() {
        assert_eq!(1, octets_for_range(2));
        assert_eq!(1, octets_for_range(256));
        assert_eq!(2, octets_for_range(257));
        assert_eq!(4, octets_for_range(1 << 32));
        assert_eq!(8, octets_for_range(u128::from(u64::MAX) + 1));
    }

    #[test]
    fn loads_bit_fields() {
        let bits = bits![static u8, Msb0; 1, 0, 1];
        assert_eq!(5, load_uint(BSlice(bits)));
        assert_eq!(0, load_uint(BSlice(&bits[..0])));
    }
}
