//! Codecs for the leaf types: INTEGER, BOOLEAN, NULL, ENUMERATED and
//! OCTET STRING.
use crate::{
    codec::{measure_decode, measure_encode},
    decode::PerLength,
    util::{load_signed, load_unsigned, minimal_signed_octets, minimal_unsigned_octets},
    *,
};

#[allow(clippy::cast_sign_loss)]
fn offset_from(lower: i64, value: i64) -> u64 {
    (i128::from(value) - i128::from(lower)) as u64
}

fn value_at(lower: i64, offset: u64) -> Result<i64, DecodeError> {
    i64::try_from(i128::from(lower) + i128::from(offset))
        .map_err(|_| DecodeError::Malformed(alloc::format!("{lower} + {offset} exceeds 64 bits")))
}

fn unsigned_value(raw: u64) -> Result<i64, DecodeError> {
    i64::try_from(raw).map_err(|_| DecodeError::Malformed(alloc::format!("{raw} exceeds 64 bits")))
}

/// Content octets of a PER integer, preceded by a length determinant.
fn read_per_integer_octets(rules: Rules, input: &mut Decoder<'_>) -> Result<Vec<u8>, DecodeError> {
    match input.read_per_length(rules)? {
        PerLength::Complete(octets @ 1..=8) => input.read_bytes(octets),
        other => Err(DecodeError::Malformed(alloc::format!(
            "integer length {other:?} outside of 1..=8 octets"
        ))),
    }
}

fn write_per_integer_octets(
    rules: Rules,
    octets: &[u8],
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    output.write_per_length(rules, octets.len())?;
    output.write_bytes(octets)
}

// =====================================================
// INTEGER
// =====================================================

/// How X.696 10 lays out an integer for a given constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OerWidth {
    Unsigned(usize),
    Signed(usize),
    VariableUnsigned,
    VariableSigned,
}

impl OerWidth {
    fn of(constraint: &ValueConstraint) -> Self {
        match (constraint.lower, constraint.upper, constraint.extensible) {
            (Some(min), Some(max), false) if min >= 0 => match max {
                m if m <= 255 => Self::Unsigned(1),
                m if m <= 65535 => Self::Unsigned(2),
                m if m <= 4_294_967_295 => Self::Unsigned(4),
                _ => Self::Unsigned(8),
            },
            (Some(min), Some(max), false) => match (min, max) {
                (l, u) if l >= -128 && u <= 127 => Self::Signed(1),
                (l, u) if l >= -32768 && u <= 32767 => Self::Signed(2),
                (l, u) if l >= -2_147_483_648 && u <= 2_147_483_647 => Self::Signed(4),
                _ => Self::Signed(8),
            },
            (Some(min), _, false) if min >= 0 => Self::VariableUnsigned,
            _ => Self::VariableSigned,
        }
    }
}

#[allow(clippy::cast_sign_loss)]
fn encode_oer_integer(
    constraint: &ValueConstraint,
    value: i64,
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    constraint.normalize(value)?;
    match OerWidth::of(constraint) {
        OerWidth::Unsigned(octets) => output.write_bytes(&(value as u64).to_be_bytes()[8 - octets..]),
        OerWidth::Signed(octets) => output.write_bytes(&value.to_be_bytes()[8 - octets..]),
        OerWidth::VariableUnsigned => {
            let bytes = minimal_unsigned_octets(value as u64);
            output.write_oer_length(bytes.len())?;
            output.write_bytes(&bytes)
        }
        OerWidth::VariableSigned => {
            let bytes = minimal_signed_octets(value);
            output.write_oer_length(bytes.len())?;
            output.write_bytes(&bytes)
        }
    }
}

fn decode_oer_integer(
    constraint: &ValueConstraint,
    input: &mut Decoder<'_>,
) -> Result<i64, DecodeError> {
    let value = match OerWidth::of(constraint) {
        OerWidth::Unsigned(octets) => unsigned_value(load_unsigned(&input.read_bytes(octets)?))?,
        OerWidth::Signed(octets) => load_signed(&input.read_bytes(octets)?),
        variable => {
            let octets = input.read_oer_length()?;
            if !(1..=8).contains(&octets) {
                return Err(DecodeError::Malformed(alloc::format!(
                    "integer of {octets} octets"
                )));
            }
            let bytes = input.read_bytes(octets)?;
            if variable == OerWidth::VariableUnsigned {
                unsigned_value(load_unsigned(&bytes))?
            } else {
                load_signed(&bytes)
            }
        }
    };
    Ok(constraint.normalize(value)?)
}

fn encode_per_integer(
    rules: Rules,
    constraint: &ValueConstraint,
    value: i64,
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    let in_root = constraint.contains(value);
    if constraint.extensible {
        output.write_bit(!in_root)?;
    } else {
        constraint.normalize(value)?;
    }
    match (in_root, constraint.lower, constraint.range()) {
        (true, Some(lower), Some(range)) => {
            output.write_per_constrained(rules, offset_from(lower, value), range)
        }
        (true, Some(lower), None) => write_per_integer_octets(
            rules,
            &minimal_unsigned_octets(offset_from(lower, value)),
            output,
        ),
        _ => write_per_integer_octets(rules, &minimal_signed_octets(value), output),
    }
}

fn decode_per_integer(
    rules: Rules,
    constraint: &ValueConstraint,
    input: &mut Decoder<'_>,
) -> Result<i64, DecodeError> {
    let extended = constraint.extensible && input.read_bit()?;
    match (extended, constraint.lower, constraint.range()) {
        (false, Some(lower), Some(range)) => {
            let offset = input.read_per_constrained(rules, range)?;
            Ok(constraint.check_root(value_at(lower, offset)?)?)
        }
        (false, Some(lower), None) => {
            let bytes = read_per_integer_octets(rules, input)?;
            value_at(lower, load_unsigned(&bytes))
        }
        _ => {
            let value = load_signed(&read_per_integer_octets(rules, input)?);
            Ok(if extended {
                value
            } else {
                constraint.check_root(value)?
            })
        }
    }
}

/// INTEGER, carried as [`Value::Integer`].
///
/// Constrained values use the fixed-width octets of X.696 10.2 in OER and
/// bit-packed offsets from the lower bound in PER.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerCodec;

impl ElementCodec for IntegerCodec {
    fn encode(
        &self,
        rules: Rules,
        constraints: &Constraints,
        value: &Value,
        output: &mut Encoder,
    ) -> Result<usize, EncodeError> {
        let Value::Integer(int) = value else {
            return Err(EncodeError::mismatch("IntegerCodec", "INTEGER", value));
        };
        let constraint = &constraints.for_rules(rules).value;
        measure_encode(output, |output| match rules {
            Rules::Oer => encode_oer_integer(constraint, *int, output),
            Rules::UnalignedPer | Rules::AlignedPer => {
                encode_per_integer(rules, constraint, *int, output)
            }
        })
    }

    fn decode(
        &self,
        rules: Rules,
        constraints: &Constraints,
        input: &mut Decoder<'_>,
    ) -> Result<Decoded<Value>, DecodeError> {
        let constraint = &constraints.for_rules(rules).value;
        measure_decode(input, |input| {
            let int = match rules {
                Rules::Oer => decode_oer_integer(constraint, input)?,
                Rules::UnalignedPer | Rules::AlignedPer => {
                    decode_per_integer(rules, constraint, input)?
                }
            };
            Ok(Value::Integer(int))
        })
    }

    fn check(
        &self,
        rules: Rules,
        constraints: &Constraints,
        value: &Value,
    ) -> Result<(), EncodeError> {
        match value {
            Value::Integer(int) => constraints
                .for_rules(rules)
                .value
                .normalize(*int)
                .map(|_| ())
                .map_err(EncodeError::from),
            other => Err(EncodeError::mismatch("IntegerCodec", "INTEGER", other)),
        }
    }
}

// =====================================================
// BOOLEAN, NULL
// =====================================================

/// BOOLEAN: one bit in PER, `0x00` or `0xFF` in OER.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanCodec;

impl ElementCodec for BooleanCodec {
    fn encode(
        &self,
        rules: Rules,
        _constraints: &Constraints,
        value: &Value,
        output: &mut Encoder,
    ) -> Result<usize, EncodeError> {
        let Value::Boolean(flag) = value else {
            return Err(EncodeError::mismatch("BooleanCodec", "BOOLEAN", value));
        };
        measure_encode(output, |output| match rules {
            Rules::Oer => output.write_bytes(&[if *flag { 0xFF } else { 0x00 }]),
            Rules::UnalignedPer | Rules::AlignedPer => output.write_bit(*flag),
        })
    }

    fn decode(
        &self,
        rules: Rules,
        _constraints: &Constraints,
        input: &mut Decoder<'_>,
    ) -> Result<Decoded<Value>, DecodeError> {
        measure_decode(input, |input| match rules {
            Rules::Oer => match input.read_bits(8)? {
                0x00 => Ok(Value::Boolean(false)),
                0xFF => Ok(Value::Boolean(true)),
                other => Err(DecodeError::Malformed(alloc::format!(
                    "{other:#04x} is not a BOOLEAN"
                ))),
            },
            Rules::UnalignedPer | Rules::AlignedPer => input.read_bit().map(Value::Boolean),
        })
    }

    fn check(&self, _: Rules, _: &Constraints, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Boolean(_) => Ok(()),
            other => Err(EncodeError::mismatch("BooleanCodec", "BOOLEAN", other)),
        }
    }
}

/// NULL has no encoding in either rule set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCodec;

impl ElementCodec for NullCodec {
    fn encode(
        &self,
        _: Rules,
        _: &Constraints,
        value: &Value,
        _: &mut Encoder,
    ) -> Result<usize, EncodeError> {
        match value {
            Value::Null => Ok(0),
            other => Err(EncodeError::mismatch("NullCodec", "NULL", other)),
        }
    }

    fn decode(
        &self,
        _: Rules,
        _: &Constraints,
        _: &mut Decoder<'_>,
    ) -> Result<Decoded<Value>, DecodeError> {
        Ok(Decoded {
            bits_consumed: 0,
            decoded: Value::Null,
        })
    }

    fn check(&self, _: Rules, _: &Constraints, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Null => Ok(()),
            other => Err(EncodeError::mismatch("NullCodec", "NULL", other)),
        }
    }
}

// =====================================================
// ENUMERATED
// =====================================================

/// ENUMERATED, carried as [`Value::Enumerated`].
///
/// The value constraint lists the root indices, `(0..n-1)`, and carries the
/// extension marker. OER writes the index itself (X.696 11); PER writes a
/// constrained index for the root and a normally small number for
/// extension additions, counted from zero (X.691 14).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumeratedCodec;

impl EnumeratedCodec {
    fn encode_oer(index: i64, output: &mut Encoder) -> Result<(), EncodeError> {
        match index {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            short @ 0..=127 => output.write_bytes(&[short as u8]),
            long => {
                let bytes = minimal_signed_octets(long);
                #[allow(clippy::cast_possible_truncation)]
                output.write_bytes(&[0x80 | bytes.len() as u8])?;
                output.write_bytes(&bytes)
            }
        }
    }

    fn decode_oer(input: &mut Decoder<'_>) -> Result<i64, DecodeError> {
        match input.read_bits(8)? {
            #[allow(clippy::cast_possible_wrap)]
            short if short < 128 => Ok(short as i64),
            long => {
                #[allow(clippy::cast_possible_truncation)]
                let octets = (long & 0x7F) as usize;
                if !(1..=8).contains(&octets) {
                    return Err(DecodeError::Malformed(alloc::format!(
                        "enumerated value of {octets} octets"
                    )));
                }
                Ok(load_signed(&input.read_bytes(octets)?))
            }
        }
    }

    fn encode_per(
        rules: Rules,
        root: &ValueConstraint,
        index: i64,
        output: &mut Encoder,
    ) -> Result<(), EncodeError> {
        let in_root = root.contains(index);
        if root.extensible {
            output.write_bit(!in_root)?;
        } else {
            root.normalize(index)?;
        }
        match (in_root, root.lower, root.range(), root.upper) {
            (true, Some(lower), Some(range), _) => {
                output.write_per_constrained(rules, offset_from(lower, index), range)
            }
            (false, _, _, Some(upper)) if index > upper => {
                Self::encode_normally_small(rules, offset_from(upper + 1, index), output)
            }
            _ => Err(EncodeError::InvalidValue(alloc::format!(
                "enumerated index {index} has no encoding in {root:?}"
            ))),
        }
    }

    fn decode_per(
        rules: Rules,
        root: &ValueConstraint,
        input: &mut Decoder<'_>,
    ) -> Result<i64, DecodeError> {
        let extended = root.extensible && input.read_bit()?;
        match (extended, root.lower, root.range(), root.upper) {
            (false, Some(lower), Some(range), _) => {
                let offset = input.read_per_constrained(rules, range)?;
                Ok(root.check_root(value_at(lower, offset)?)?)
            }
            (true, _, _, Some(upper)) => {
                let addition = Self::decode_normally_small(rules, input)?;
                value_at(upper + 1, addition)
            }
            _ => Err(DecodeError::Malformed(alloc::format!(
                "no PER encoding for enumerated root {root:?}"
            ))),
        }
    }

    /// Normally small non-negative whole number, X.691 11.6.
    fn encode_normally_small(
        rules: Rules,
        number: u64,
        output: &mut Encoder,
    ) -> Result<(), EncodeError> {
        if number < 64 {
            output.write_bit(false)?;
            output.write_bits(number, 6)
        } else {
            output.write_bit(true)?;
            write_per_integer_octets(rules, &minimal_unsigned_octets(number), output)
        }
    }

    fn decode_normally_small(rules: Rules, input: &mut Decoder<'_>) -> Result<u64, DecodeError> {
        if input.read_bit()? {
            Ok(load_unsigned(&read_per_integer_octets(rules, input)?))
        } else {
            input.read_bits(6)
        }
    }
}

impl ElementCodec for EnumeratedCodec {
    fn encode(
        &self,
        rules: Rules,
        constraints: &Constraints,
        value: &Value,
        output: &mut Encoder,
    ) -> Result<usize, EncodeError> {
        let Value::Enumerated(index) = value else {
            return Err(EncodeError::mismatch("EnumeratedCodec", "ENUMERATED", value));
        };
        let root = &constraints.for_rules(rules).value;
        measure_encode(output, |output| match rules {
            Rules::Oer => {
                root.normalize(*index)?;
                Self::encode_oer(*index, output)
            }
            Rules::UnalignedPer | Rules::AlignedPer => {
                Self::encode_per(rules, root, *index, output)
            }
        })
    }

    fn decode(
        &self,
        rules: Rules,
        constraints: &Constraints,
        input: &mut Decoder<'_>,
    ) -> Result<Decoded<Value>, DecodeError> {
        let root = &constraints.for_rules(rules).value;
        measure_decode(input, |input| {
            let index = match rules {
                Rules::Oer => root.normalize(Self::decode_oer(input)?)?,
                Rules::UnalignedPer | Rules::AlignedPer => Self::decode_per(rules, root, input)?,
            };
            Ok(Value::Enumerated(index))
        })
    }

    fn check(
        &self,
        rules: Rules,
        constraints: &Constraints,
        value: &Value,
    ) -> Result<(), EncodeError> {
        match value {
            Value::Enumerated(index) => constraints
                .for_rules(rules)
                .value
                .normalize(*index)
                .map(|_| ())
                .map_err(EncodeError::from),
            other => Err(EncodeError::mismatch("EnumeratedCodec", "ENUMERATED", other)),
        }
    }
}

// =====================================================
// OCTET STRING
// =====================================================

/// OCTET STRING, carried as [`Value::OctetString`], with an optional SIZE
/// constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct OctetStringCodec;

fn fixed_len(size: &SizeConstraint) -> Option<usize> {
    match (size.is_fixed(), size.extensible, size.upper) {
        (true, false, Some(n)) => usize::try_from(n).ok(),
        _ => None,
    }
}

impl OctetStringCodec {
    fn encode_per(
        rules: Rules,
        size: &SizeConstraint,
        bytes: &[u8],
        output: &mut Encoder,
    ) -> Result<(), EncodeError> {
        let len = bytes.len() as u64;
        let in_root = size.contains(len);
        if size.extensible {
            output.write_bit(!in_root)?;
        } else {
            size.normalize(len)?;
        }
        match (in_root, size.lower, size.range()) {
            (true, _, Some(1)) if len <= 2 => output.write_bytes(bytes),
            (true, _, Some(1)) if len < 65536 => {
                if rules.is_aligned() {
                    output.align()?;
                }
                output.write_bytes(bytes)
            }
            (true, Some(lower), Some(range)) if size.fits_constrained_length() => {
                output.write_per_constrained(rules, len - lower, range)?;
                if rules.is_aligned() {
                    output.align()?;
                }
                output.write_bytes(bytes)
            }
            _ => output.write_per_fragmented(rules, bytes.len(), |output, range| {
                output.write_bytes(&bytes[range])
            }),
        }
    }

    fn decode_per(
        rules: Rules,
        size: &SizeConstraint,
        input: &mut Decoder<'_>,
    ) -> Result<Vec<u8>, DecodeError> {
        let extended = size.extensible && input.read_bit()?;
        let bytes = match (extended, size.lower, size.range()) {
            (false, Some(len), Some(1)) if len <= 2 => input.read_bytes(len as usize)?,
            (false, Some(len), Some(1)) if len < 65536 => {
                if rules.is_aligned() {
                    input.align()?;
                }
                input.read_bytes(len as usize)?
            }
            (false, Some(lower), Some(range)) if size.fits_constrained_length() => {
                let offset = input.read_per_constrained(rules, range)?;
                let len = lower
                    .checked_add(offset)
                    .ok_or_else(|| DecodeError::Malformed("octet count overflows".into()))?;
                let len = size.check_root(len)?;
                if rules.is_aligned() {
                    input.align()?;
                }
                input.read_bytes(len as usize)?
            }
            _ => {
                let mut bytes = Vec::new();
                input.read_per_fragmented(rules, |input, _, count| {
                    bytes.extend(input.read_bytes(count)?);
                    Ok(())
                })?;
                bytes
            }
        };
        if !extended {
            size.check_root(bytes.len() as u64)?;
        }
        Ok(bytes)
    }
}

impl ElementCodec for OctetStringCodec {
    fn encode(
        &self,
        rules: Rules,
        constraints: &Constraints,
        value: &Value,
        output: &mut Encoder,
    ) -> Result<usize, EncodeError> {
        let Value::OctetString(bytes) = value else {
            return Err(EncodeError::mismatch("OctetStringCodec", "OCTET STRING", value));
        };
        let size = &constraints.for_rules(rules).size;
        measure_encode(output, |output| match rules {
            Rules::Oer => {
                size.normalize(bytes.len() as u64)?;
                if fixed_len(size).is_none() {
                    output.write_oer_length(bytes.len())?;
                }
                output.write_bytes(bytes)
            }
            Rules::UnalignedPer | Rules::AlignedPer => Self::encode_per(rules, size, bytes, output),
        })
    }

    fn decode(
        &self,
        rules: Rules,
        constraints: &Constraints,
        input: &mut Decoder<'_>,
    ) -> Result<Decoded<Value>, DecodeError> {
        let size = &constraints.for_rules(rules).size;
        measure_decode(input, |input| {
            let bytes = match rules {
                Rules::Oer => {
                    let len = match fixed_len(size) {
                        Some(len) => len,
                        None => input.read_oer_length()?,
                    };
                    let bytes = input.read_bytes(len)?;
                    size.normalize(bytes.len() as u64)?;
                    bytes
                }
                Rules::UnalignedPer | Rules::AlignedPer => Self::decode_per(rules, size, input)?,
            };
            Ok(Value::OctetString(Bytes::from(bytes)))
        })
    }

    fn check(
        &self,
        rules: Rules,
        constraints: &Constraints,
        value: &Value,
    ) -> Result<(), EncodeError> {
        match value {
            Value::OctetString(bytes) => constraints
                .for_rules(rules)
                .size
                .normalize(bytes.len() as u64)
                .map(|_| ())
                .map_err(EncodeError::from),
            other => Err(EncodeError::mismatch("OctetStringCodec", "OCTET STRING", other)),
        }
    }
}
