//! SEQUENCE and CHOICE.
//!
//! Only the extension root is handled: an extension bit found set on the
//! wire is reported as malformed input, since the tables carry no
//! extension additions to decode it with.
use crate::*;

/// Checks that `slots` has one entry per member and that every required
/// member is present.
pub(crate) fn check_sequence_shape(
    descriptor: &TypeDescriptor,
    members: &[Member],
    slots: &[Option<Value>],
) -> Result<(), EncodeError> {
    if slots.len() != members.len() {
        return Err(EncodeError::InvalidValue(alloc::format!(
            "{} has {} members, value has {} slots",
            descriptor.name,
            members.len(),
            slots.len()
        )));
    }
    match members
        .iter()
        .zip(slots)
        .find(|(member, slot)| !member.is_optional() && slot.is_none())
    {
        Some((missing, _)) => Err(EncodeError::InvalidValue(alloc::format!(
            "{}: required member {} is missing",
            descriptor.name, missing.name
        ))),
        None => Ok(()),
    }
}

/// Extension bit and presence bitmap of the OPTIONAL members.
///
/// OER pads the preamble to an octet boundary and omits it entirely when
/// there is neither an extension marker nor an OPTIONAL member.
fn encode_preamble(
    rules: Rules,
    extensible: bool,
    presence: impl Iterator<Item = bool>,
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    let start = output.bit_position();
    if extensible {
        output.write_bit(false)?;
    }
    for bit in presence {
        output.write_bit(bit)?;
    }
    if rules == Rules::Oer && output.bit_position() != start {
        output.align()?;
    }
    Ok(())
}

/// Decodes the preamble. Returns the presence flags of the OPTIONAL
/// members in declaration order.
fn decode_preamble(
    descriptor: &TypeDescriptor,
    rules: Rules,
    extensible: bool,
    optional_count: usize,
    input: &mut Decoder<'_>,
) -> Result<Vec<bool>, DecodeError> {
    if extensible && input.read_bit()? {
        return Err(DecodeError::Malformed(alloc::format!(
            "{}: extension additions are not supported",
            descriptor.name
        )));
    }
    let bitmap = (0..optional_count)
        .map(|_| input.read_bit())
        .collect::<Result<Vec<_>, _>>()?;
    if rules == Rules::Oer && (extensible || optional_count > 0) {
        input.align()?;
    }
    log::trace!("{}: presence bitmap {bitmap:?}", descriptor.name);
    Ok(bitmap)
}

pub(crate) fn encode_sequence(
    descriptor: &TypeDescriptor,
    members: &[Member],
    extensible: bool,
    rules: Rules,
    value: &Value,
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    let Value::Sequence(slots) = value else {
        return Err(EncodeError::mismatch(descriptor.name, "SEQUENCE", value));
    };
    check_sequence_shape(descriptor, members, slots)?;
    let presence = members
        .iter()
        .zip(slots)
        .filter(|(member, _)| member.is_optional())
        .map(|(_, slot)| slot.is_some());
    encode_preamble(rules, extensible, presence, output)?;
    for (member, slot) in members.iter().zip(slots) {
        if let Some(value) = slot {
            member.encode(rules, value, output)?;
        }
    }
    Ok(())
}

pub(crate) fn decode_sequence(
    descriptor: &TypeDescriptor,
    members: &[Member],
    extensible: bool,
    rules: Rules,
    input: &mut Decoder<'_>,
) -> Result<Value, DecodeError> {
    let optional_count = members.iter().filter(|m| m.is_optional()).count();
    let mut presence = decode_preamble(descriptor, rules, extensible, optional_count, input)?
        .into_iter();
    let mut slots = Vec::with_capacity(members.len());
    for member in members {
        let present = !member.is_optional() || presence.next().unwrap_or(false);
        let slot = if present {
            Some(member.decode(rules, input)?.decoded)
        } else {
            None
        };
        slots.push(slot);
    }
    Ok(Value::Sequence(slots))
}

fn tag_class_bits(class: TagClass) -> u8 {
    match class {
        TagClass::Universal => 0b00,
        TagClass::Application => 0b01,
        TagClass::ContextSpecific => 0b10,
        TagClass::Private => 0b11,
    }
}

/// OER tag of a CHOICE alternative, X.696 8.7. Only the single-octet form
/// for tag numbers below 63 is supported.
fn encode_oer_tag(tag: Tag, output: &mut Encoder) -> Result<(), EncodeError> {
    match tag.number {
        #[allow(clippy::cast_possible_truncation)]
        n if n < 63 => output.write_bytes(&[(tag_class_bits(tag.class) << 6) | n as u8]),
        n => Err(EncodeError::Unsupported(alloc::format!(
            "tag numbers larger than 62 are unsupported, got {n}"
        ))),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn decode_oer_tag(input: &mut Decoder<'_>) -> Result<Tag, DecodeError> {
    let class = match input.read_bits(2)? {
        0b00 => TagClass::Universal,
        0b01 => TagClass::Application,
        0b10 => TagClass::ContextSpecific,
        _ => TagClass::Private,
    };
    match input.read_bits(6)? as u32 {
        0x3F => Err(DecodeError::Malformed(
            "tag numbers larger than 62 are unsupported".into(),
        )),
        number => Ok(Tag { class, number }),
    }
}

pub(crate) fn encode_choice(
    descriptor: &TypeDescriptor,
    alternatives: &[Member],
    extensible: bool,
    rules: Rules,
    value: &Value,
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    let Value::Choice { index, value } = value else {
        return Err(EncodeError::mismatch(descriptor.name, "CHOICE", value));
    };
    let alternative = alternatives.get(*index).ok_or_else(|| {
        EncodeError::InvalidValue(alloc::format!(
            "{} has no alternative {index}",
            descriptor.name
        ))
    })?;
    match rules {
        Rules::Oer => encode_oer_tag(alternative.tag, output)?,
        Rules::UnalignedPer | Rules::AlignedPer => {
            if extensible {
                output.write_bit(false)?;
            }
            output.write_per_constrained(rules, *index as u64, alternatives.len() as u128)?;
        }
    }
    alternative.encode(rules, value, output).map(|_| ())
}

pub(crate) fn decode_choice(
    descriptor: &TypeDescriptor,
    alternatives: &[Member],
    extensible: bool,
    rules: Rules,
    input: &mut Decoder<'_>,
) -> Result<Value, DecodeError> {
    let index = match rules {
        Rules::Oer => {
            let tag = decode_oer_tag(input)?;
            alternatives
                .iter()
                .position(|alternative| alternative.tag == tag)
                .ok_or_else(|| {
                    DecodeError::Malformed(alloc::format!(
                        "{}: no alternative with tag {tag:?}",
                        descriptor.name
                    ))
                })?
        }
        Rules::UnalignedPer | Rules::AlignedPer => {
            if extensible && input.read_bit()? {
                return Err(DecodeError::Malformed(alloc::format!(
                    "{}: extension alternatives are not supported",
                    descriptor.name
                )));
            }
            let index = input.read_per_constrained(rules, alternatives.len() as u128)?;
            usize::try_from(index)
                .ok()
                .filter(|index| *index < alternatives.len())
                .ok_or_else(|| {
                    DecodeError::Malformed(alloc::format!(
                        "{}: alternative index {index} out of range",
                        descriptor.name
                    ))
                })?
        }
    };
    let alternative = alternatives.get(index).ok_or_else(|| {
        DecodeError::Malformed(alloc::format!("{} has no alternatives", descriptor.name))
    })?;
    Ok(Value::Choice {
        index,
        value: Box::new(alternative.decode(rules, input)?.decoded),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    static BYTE: TypeDescriptor = TypeDescriptor::primitive(
        "Byte",
        &[Tag::INTEGER],
        &IntegerCodec,
        Constraints::value(ValueConstraint::new(0, 255)),
    );
    static FLAG: TypeDescriptor =
        TypeDescriptor::primitive("Flag", &[Tag::BOOLEAN], &BooleanCodec, Constraints::UNCONSTRAINED);

    static RECORD_MEMBERS: [Member; 2] = [
        Member::required("id", Tag::context(0), &BYTE),
        Member::optional("flag", Tag::context(1), &FLAG),
    ];
    static RECORD: TypeDescriptor = TypeDescriptor::sequence("Record", &RECORD_MEMBERS, false);

    static PLAIN_MEMBERS: [Member; 1] = [Member::required("id", Tag::context(0), &BYTE)];
    static PLAIN: TypeDescriptor = TypeDescriptor::sequence("Plain", &PLAIN_MEMBERS, false);
    static OPEN: TypeDescriptor = TypeDescriptor::sequence("Open", &PLAIN_MEMBERS, true);

    static SELECTOR_ALTERNATIVES: [Member; 3] = [
        Member::required("id", Tag::context(0), &BYTE),
        Member::required("flag", Tag::context(1), &FLAG),
        Member::required("other", Tag::context(2), &FLAG),
    ];
    static SELECTOR: TypeDescriptor = TypeDescriptor::choice("Selector", &SELECTOR_ALTERNATIVES, false);
    static OPEN_SELECTOR: TypeDescriptor =
        TypeDescriptor::choice("OpenSelector", &SELECTOR_ALTERNATIVES, true);

    fn round_trip(descriptor: &TypeDescriptor, rules: Rules, value: &Value) -> Vec<u8> {
        let encoded = descriptor.encode_to_vec(rules, value).unwrap();
        assert_eq!(value, &descriptor.decode_from_slice(rules, &encoded).unwrap().decoded);
        encoded
    }

    fn record(id: i64, flag: Option<bool>) -> Value {
        Value::Sequence(vec![Some(Value::Integer(id)), flag.map(Value::Boolean)])
    }

    #[test]
    fn encodes_presence_bitmap() {
        assert_eq!(vec![0x82, 0xC0], round_trip(&RECORD, Rules::UnalignedPer, &record(5, Some(true))));
        assert_eq!(vec![0x02, 0x80], round_trip(&RECORD, Rules::UnalignedPer, &record(5, None)));
        assert_eq!(vec![0x80, 0x05, 0xFF], round_trip(&RECORD, Rules::Oer, &record(5, Some(true))));
        assert_eq!(vec![0x00, 0x05], round_trip(&RECORD, Rules::Oer, &record(5, None)));
        round_trip(&RECORD, Rules::AlignedPer, &record(5, Some(false)));
    }

    #[test]
    fn omits_empty_oer_preamble() {
        let value = Value::Sequence(vec![Some(Value::Integer(5))]);
        assert_eq!(vec![0x05], round_trip(&PLAIN, Rules::Oer, &value));
        assert_eq!(vec![0x00, 0x05], round_trip(&OPEN, Rules::Oer, &value));
        assert_eq!(vec![0x02, 0x80], round_trip(&OPEN, Rules::UnalignedPer, &value));
    }

    #[test]
    fn rejects_extension_additions() {
        assert!(matches!(
            OPEN.decode_from_slice(Rules::UnalignedPer, &[0x82, 0x80]),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            OPEN.decode_from_slice(Rules::Oer, &[0x80, 0x05]),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_sequence_values_of_wrong_shape() {
        assert!(matches!(
            RECORD.encode_to_vec(Rules::Oer, &Value::Sequence(vec![None, None])),
            Err(EncodeError::InvalidValue(_))
        ));
        assert!(matches!(
            RECORD.encode_to_vec(Rules::Oer, &Value::Sequence(vec![Some(Value::Integer(1))])),
            Err(EncodeError::InvalidValue(_))
        ));
        assert!(matches!(
            RECORD.encode_to_vec(Rules::Oer, &Value::Integer(1)),
            Err(EncodeError::InvalidValue(_))
        ));
    }

    #[test]
    fn encodes_choice_index_and_tag() {
        let flag = Value::Choice {
            index: 1,
            value: Box::new(Value::Boolean(true)),
        };
        let id = Value::Choice {
            index: 0,
            value: Box::new(Value::Integer(7)),
        };
        assert_eq!(vec![0x60], round_trip(&SELECTOR, Rules::UnalignedPer, &flag));
        assert_eq!(vec![0x01, 0xC0], round_trip(&SELECTOR, Rules::UnalignedPer, &id));
        assert_eq!(vec![0x81, 0xFF], round_trip(&SELECTOR, Rules::Oer, &flag));
        assert_eq!(vec![0x80, 0x07], round_trip(&SELECTOR, Rules::Oer, &id));
        assert_eq!(vec![0x30], round_trip(&OPEN_SELECTOR, Rules::UnalignedPer, &flag));
        round_trip(&OPEN_SELECTOR, Rules::AlignedPer, &id);
    }

    #[test]
    fn rejects_unknown_alternatives() {
        assert!(matches!(
            SELECTOR.decode_from_slice(Rules::Oer, &[0x83, 0xFF]),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            SELECTOR.decode_from_slice(Rules::UnalignedPer, &[0xC0]),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            OPEN_SELECTOR.decode_from_slice(Rules::UnalignedPer, &[0x80]),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            SELECTOR.encode_to_vec(
                Rules::Oer,
                &Value::Choice {
                    index: 5,
                    value: Box::new(Value::Null)
                }
            ),
            Err(EncodeError::InvalidValue(_))
        ));
    }

    #[test]
    fn refuses_long_oer_tags() {
        let mut encoder = Encoder::new();
        assert!(matches!(
            encode_oer_tag(Tag::context(63), &mut encoder),
            Err(EncodeError::Unsupported(_))
        ));
        assert_eq!(
            Tag::private(5),
            decode_oer_tag(&mut Decoder::new(&[0xC5])).unwrap()
        );
    }
}
