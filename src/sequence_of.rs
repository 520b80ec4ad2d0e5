//! SEQUENCE OF / SET OF with a SIZE constraint.
//!
//! Wire layouts:
//! - OER: `[length determinant][element 1]...[element n]`, octet aligned
//!   (X.696 21).
//! - PER, root count with upper bound below 64K: `[count - lower]` as a
//!   constrained whole number, then the elements without padding
//!   (X.691 20.6).
//! - PER otherwise: general length determinant, fragmented in blocks of
//!   16K elements from 16384 elements upwards, interleaved with the
//!   elements (X.691 11.9.3.8).
//!
//! The count read from the wire is validated against the SIZE constraint
//! before any element is decoded or any memory is reserved for them.
use crate::{codec::measure_encode, *};

fn cardinality(size: &SizeConstraint, count: usize) -> Result<u64, ConstraintError> {
    size.normalize(count as u64)
}

/// Encodes `values` as a SEQUENCE OF / SET OF of `element`.
///
/// `constraints` are the effective constraint tables of the collection type.
/// Returns the number of bits written. On error the output holds a partial
/// encoding and must be discarded.
pub fn encode_sequence_of(
    descriptor: &TypeDescriptor,
    element: &TypeDescriptor,
    constraints: &Constraints,
    rules: Rules,
    values: &[Value],
    output: &mut Encoder,
) -> Result<usize, EncodeError> {
    let size = &constraints.for_rules(rules).size;
    cardinality(size, values.len()).map_err(|e| {
        log::debug!("{}: refusing to encode {} elements: {e}", descriptor.name, values.len());
        EncodeError::CardinalityViolation(e)
    })?;

    measure_encode(output, |output| match rules {
        Rules::Oer => {
            output.align()?;
            output.write_oer_length(values.len())?;
            encode_elements(element, rules, values, output)?;
            output.align()
        }
        Rules::UnalignedPer | Rules::AlignedPer => {
            encode_per(element, size, rules, values, output)
        }
    })
}

fn encode_per(
    element: &TypeDescriptor,
    size: &SizeConstraint,
    rules: Rules,
    values: &[Value],
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    let count = values.len() as u64;
    let in_root = size.contains(count);
    if size.extensible {
        output.write_bit(!in_root)?;
    }

    match (in_root, size.lower, size.range()) {
        (true, Some(lower), Some(range)) if size.fits_constrained_length() => {
            log::trace!(
                "{count} elements as {}-bit constrained length",
                size.bit_width()
            );
            output.write_per_constrained(rules, count - lower, range)?;
            encode_elements(element, rules, values, output)
        }
        _ => output.write_per_fragmented(rules, values.len(), |output, range| {
            encode_elements(element, rules, &values[range], output)
        }),
    }
}

fn encode_elements(
    element: &TypeDescriptor,
    rules: Rules,
    values: &[Value],
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    values
        .iter()
        .try_for_each(|value| element.encode(rules, value, output).map(|_| ()))
}

/// Decodes a SEQUENCE OF / SET OF of `element`.
///
/// No partial collection is returned: the first element error aborts the
/// whole decode.
pub fn decode_sequence_of(
    descriptor: &TypeDescriptor,
    element: &TypeDescriptor,
    constraints: &Constraints,
    rules: Rules,
    input: &mut Decoder<'_>,
) -> Result<Decoded<Vec<Value>>, DecodeError> {
    let start = input.bit_position();
    let size = &constraints.for_rules(rules).size;
    let reject = |e: ConstraintError| {
        log::debug!("{}: {e}", descriptor.name);
        DecodeError::CardinalityViolation(e)
    };

    let elements = match rules {
        Rules::Oer => {
            input.align()?;
            let count = input.read_oer_length()?;
            cardinality(size, count).map_err(reject)?;
            input.claim_elements(count)?;
            let mut elements = reserve(count, input);
            decode_elements(descriptor, element, rules, count, &mut elements, input)?;
            input.align()?;
            elements
        }
        Rules::UnalignedPer | Rules::AlignedPer => {
            let extended = if size.extensible {
                input.read_bit()?
            } else {
                false
            };
            match (extended, size.lower, size.range()) {
                (false, Some(lower), Some(range)) if size.fits_constrained_length() => {
                    let offset = input.read_per_constrained(rules, range)?;
                    let count = lower.checked_add(offset).ok_or_else(|| {
                        DecodeError::Malformed("element count overflows".into())
                    })?;
                    // a bit field of `bit_width` bits can exceed the upper bound
                    let count = size.check_root(count).map_err(reject)?;
                    #[allow(clippy::cast_possible_truncation)]
                    let count = count as usize;
                    input.claim_elements(count)?;
                    let mut elements = reserve(count, input);
                    decode_elements(descriptor, element, rules, count, &mut elements, input)?;
                    elements
                }
                _ => {
                    let mut elements = Vec::new();
                    let count = input.read_per_fragmented(rules, |input, before, count| {
                        let total = before.checked_add(count).ok_or_else(|| {
                            DecodeError::Malformed("element count overflows".into())
                        })?;
                        if !extended {
                            check_upper(size, total).map_err(reject)?;
                        }
                        input.claim_elements(count)?;
                        elements.reserve(count.min(input.remaining_bits()));
                        decode_elements(descriptor, element, rules, count, &mut elements, input)
                    })?;
                    if extended && size.contains(count as u64) {
                        return Err(DecodeError::Malformed(alloc::format!(
                            "{}: extension bit set for {count} elements inside the root",
                            descriptor.name
                        )));
                    }
                    if !extended {
                        size.check_root(count as u64).map_err(reject)?;
                    }
                    elements
                }
            }
        }
    };

    Ok(Decoded {
        bits_consumed: input.bit_position() - start,
        decoded: elements,
    })
}

/// Rejects a running total of fragmented parts as soon as it passes the
/// upper bound, before the elements of the part are read.
fn check_upper(size: &SizeConstraint, total: usize) -> Result<(), ConstraintError> {
    match size.upper {
        Some(upper) if total as u64 > upper => Err(ConstraintError::OutOfRange {
            count: total as u64,
            lower: size.lower,
            upper: size.upper,
        }),
        _ => Ok(()),
    }
}

/// Pre-allocates for a validated count, but never more slots than there
/// are bits left: a zero-sized element type yields no allocation bound.
fn reserve(count: usize, input: &Decoder<'_>) -> Vec<Value> {
    Vec::with_capacity(count.min(input.remaining_bits()))
}

fn decode_elements(
    descriptor: &TypeDescriptor,
    element: &TypeDescriptor,
    rules: Rules,
    count: usize,
    elements: &mut Vec<Value>,
    input: &mut Decoder<'_>,
) -> Result<(), DecodeError> {
    for index in 0..count {
        let decoded = element.decode(rules, input).map_err(|e| {
            log::debug!(
                "{}: element {index} of {count} ({}) failed: {e}",
                descriptor.name,
                element.name
            );
            e
        })?;
        elements.push(decoded.decoded);
    }
    Ok(())
}
