use crate::{
    codec::{measure_decode, measure_encode},
    *,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

/// ASN.1 tag. PER never puts tags on the wire; OER uses them to identify
/// CHOICE alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
pub struct Tag {
    pub class: TagClass,
    pub number: u32,
}

impl Tag {
    pub const BOOLEAN: Tag = Tag::universal(1);
    pub const INTEGER: Tag = Tag::universal(2);
    pub const OCTET_STRING: Tag = Tag::universal(4);
    pub const NULL: Tag = Tag::universal(5);
    pub const ENUMERATED: Tag = Tag::universal(10);
    pub const SEQUENCE: Tag = Tag::universal(16);
    pub const SET: Tag = Tag::universal(17);

    #[must_use]
    pub const fn universal(number: u32) -> Self {
        Self {
            class: TagClass::Universal,
            number,
        }
    }

    #[must_use]
    pub const fn application(number: u32) -> Self {
        Self {
            class: TagClass::Application,
            number,
        }
    }

    /// `[number]`, the implicit tags a schema compiler assigns to SEQUENCE
    /// members and CHOICE alternatives.
    #[must_use]
    pub const fn context(number: u32) -> Self {
        Self {
            class: TagClass::ContextSpecific,
            number,
        }
    }

    #[must_use]
    pub const fn private(number: u32) -> Self {
        Self {
            class: TagClass::Private,
            number,
        }
    }
}

/// Whether a SEQUENCE member has to be present in every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(Serialize))]
pub enum Presence {
    Required,
    Optional,
}

/// A SEQUENCE member or CHOICE alternative.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "json", derive(Serialize))]
pub struct Member {
    pub name: &'static str,
    pub tag: Tag,
    pub presence: Presence,
    pub descriptor: &'static TypeDescriptor,
    /// Replaces the constraints of `descriptor` for this member only.
    pub constraints: Option<Constraints>,
}

impl Member {
    #[must_use]
    pub const fn required(name: &'static str, tag: Tag, descriptor: &'static TypeDescriptor) -> Self {
        Self {
            name,
            tag,
            presence: Presence::Required,
            descriptor,
            constraints: None,
        }
    }

    #[must_use]
    pub const fn optional(name: &'static str, tag: Tag, descriptor: &'static TypeDescriptor) -> Self {
        Self {
            name,
            tag,
            presence: Presence::Optional,
            descriptor,
            constraints: None,
        }
    }

    #[must_use]
    pub const fn with_constraints(self, constraints: Constraints) -> Self {
        Self {
            constraints: Some(constraints),
            ..self
        }
    }

    #[must_use]
    pub const fn is_optional(&self) -> bool {
        matches!(self.presence, Presence::Optional)
    }

    /// Constraint tables in force for this member.
    #[must_use]
    pub fn constraints(&self) -> &Constraints {
        self.constraints
            .as_ref()
            .unwrap_or(&self.descriptor.constraints)
    }

    pub(crate) fn encode(
        &self,
        rules: Rules,
        value: &Value,
        output: &mut Encoder,
    ) -> Result<usize, EncodeError> {
        self.descriptor
            .encode_with(rules, self.constraints(), value, output)
    }

    pub(crate) fn decode(
        &self,
        rules: Rules,
        input: &mut Decoder<'_>,
    ) -> Result<Decoded<Value>, DecodeError> {
        self.descriptor.decode_with(rules, self.constraints(), input)
    }
}

/// Structure of a type, deciding which codec a descriptor dispatches to.
#[derive(Clone, Copy)]
pub enum Kind {
    Primitive(&'static dyn ElementCodec),
    Sequence {
        members: &'static [Member],
        extensible: bool,
    },
    Choice {
        alternatives: &'static [Member],
        extensible: bool,
    },
    SequenceOf(&'static TypeDescriptor),
    SetOf(&'static TypeDescriptor),
}

impl Debug for Kind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Kind::Primitive(_) => f.write_str("Primitive"),
            Kind::Sequence {
                members,
                extensible,
            } => f
                .debug_struct("Sequence")
                .field("members", &members.iter().map(|m| m.name).collect::<Vec<_>>())
                .field("extensible", extensible)
                .finish(),
            Kind::Choice {
                alternatives,
                extensible,
            } => f
                .debug_struct("Choice")
                .field(
                    "alternatives",
                    &alternatives.iter().map(|m| m.name).collect::<Vec<_>>(),
                )
                .field("extensible", extensible)
                .finish(),
            Kind::SequenceOf(element) => f.debug_tuple("SequenceOf").field(&element.name).finish(),
            Kind::SetOf(element) => f.debug_tuple("SetOf").field(&element.name).finish(),
        }
    }
}

#[cfg(feature = "json")]
impl Serialize for Kind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStructVariant;

        match self {
            Kind::Primitive(_) => serializer.serialize_unit_variant("Kind", 0, "Primitive"),
            Kind::Sequence {
                members,
                extensible,
            } => {
                let mut variant = serializer.serialize_struct_variant("Kind", 1, "Sequence", 2)?;
                variant.serialize_field("members", members)?;
                variant.serialize_field("extensible", extensible)?;
                variant.end()
            }
            Kind::Choice {
                alternatives,
                extensible,
            } => {
                let mut variant = serializer.serialize_struct_variant("Kind", 2, "Choice", 2)?;
                variant.serialize_field("alternatives", alternatives)?;
                variant.serialize_field("extensible", extensible)?;
                variant.end()
            }
            Kind::SequenceOf(element) => {
                serializer.serialize_newtype_variant("Kind", 3, "SequenceOf", element)
            }
            Kind::SetOf(element) => serializer.serialize_newtype_variant("Kind", 4, "SetOf", element),
        }
    }
}

/// Immutable description of one ASN.1 type.
///
/// Descriptors are meant to live in `static` items and reference each
/// other, the way a schema compiler lays out its type tables:
///
/// ```
/// # use asn1_runtime::*;
/// static ID: TypeDescriptor = TypeDescriptor::primitive(
///     "Id",
///     &[Tag::INTEGER],
///     &IntegerCodec,
///     Constraints::value(ValueConstraint::new(0, 1023)),
/// );
/// static IDS: TypeDescriptor =
///     TypeDescriptor::set_of("Ids", &ID, Constraints::size(SizeConstraint::new(0, 16)));
///
/// assert_eq!(IDS.element_descriptor().map(TypeDescriptor::name), Some("Id"));
/// assert_eq!(IDS.constraints().per.size.bit_width(), 5);
/// ```
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "json", derive(Serialize))]
pub struct TypeDescriptor {
    pub name: &'static str,
    /// Outermost tag first.
    pub tags: &'static [Tag],
    pub kind: Kind,
    pub constraints: Constraints,
}

impl TypeDescriptor {
    #[must_use]
    pub const fn primitive(
        name: &'static str,
        tags: &'static [Tag],
        codec: &'static dyn ElementCodec,
        constraints: Constraints,
    ) -> Self {
        Self {
            name,
            tags,
            kind: Kind::Primitive(codec),
            constraints,
        }
    }

    #[must_use]
    pub const fn sequence(name: &'static str, members: &'static [Member], extensible: bool) -> Self {
        Self {
            name,
            tags: &[Tag::SEQUENCE],
            kind: Kind::Sequence {
                members,
                extensible,
            },
            constraints: Constraints::UNCONSTRAINED,
        }
    }

    #[must_use]
    pub const fn choice(
        name: &'static str,
        alternatives: &'static [Member],
        extensible: bool,
    ) -> Self {
        Self {
            name,
            tags: &[],
            kind: Kind::Choice {
                alternatives,
                extensible,
            },
            constraints: Constraints::UNCONSTRAINED,
        }
    }

    #[must_use]
    pub const fn sequence_of(
        name: &'static str,
        element: &'static TypeDescriptor,
        constraints: Constraints,
    ) -> Self {
        Self {
            name,
            tags: &[Tag::SEQUENCE],
            kind: Kind::SequenceOf(element),
            constraints,
        }
    }

    #[must_use]
    pub const fn set_of(
        name: &'static str,
        element: &'static TypeDescriptor,
        constraints: Constraints,
    ) -> Self {
        Self {
            name,
            tags: &[Tag::SET],
            kind: Kind::SetOf(element),
            constraints,
        }
    }

    #[must_use]
    pub const fn with_tags(self, tags: &'static [Tag]) -> Self {
        Self { tags, ..self }
    }

    #[must_use]
    pub const fn with_constraints(self, constraints: Constraints) -> Self {
        Self {
            constraints,
            ..self
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn tag(&self) -> Option<Tag> {
        self.tags.first().copied()
    }

    #[must_use]
    pub const fn tags(&self) -> &'static [Tag] {
        self.tags
    }

    #[must_use]
    pub const fn kind(&self) -> &Kind {
        &self.kind
    }

    #[must_use]
    pub const fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Descriptor of the elements of a SEQUENCE OF / SET OF.
    #[must_use]
    pub const fn element_descriptor(&self) -> Option<&'static TypeDescriptor> {
        match self.kind {
            Kind::SequenceOf(element) | Kind::SetOf(element) => Some(element),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_repetition(&self) -> bool {
        matches!(self.kind, Kind::SequenceOf(_) | Kind::SetOf(_))
    }

    /// Encodes `value` with this type's own constraints. Returns the number
    /// of bits written.
    pub fn encode(
        &self,
        rules: Rules,
        value: &Value,
        output: &mut Encoder,
    ) -> Result<usize, EncodeError> {
        self.encode_with(rules, &self.constraints, value, output)
    }

    /// Encodes `value` with explicitly given constraint tables.
    pub fn encode_with(
        &self,
        rules: Rules,
        constraints: &Constraints,
        value: &Value,
        output: &mut Encoder,
    ) -> Result<usize, EncodeError> {
        ElementCodec::encode(self, rules, constraints, value, output)
    }

    /// Encodes `value` as a complete encoding, padded to whole octets.
    ///
    /// A PER encoding of zero bits is replaced by a single zero octet,
    /// X.691 10.1.3.
    pub fn encode_to_vec(&self, rules: Rules, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let mut encoder = Encoder::new();
        self.encode_complete(rules, value, &mut encoder)?;
        Ok(encoder.into())
    }

    /// Like [`Self::encode_to_vec`], failing with
    /// [`EncodeError::BufferExhausted`] when more than `limit` octets are needed.
    pub fn encode_to_vec_limited(
        &self,
        rules: Rules,
        value: &Value,
        limit: usize,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut encoder = Encoder::with_limit(limit);
        self.encode_complete(rules, value, &mut encoder)?;
        Ok(encoder.into())
    }

    fn encode_complete(
        &self,
        rules: Rules,
        value: &Value,
        encoder: &mut Encoder,
    ) -> Result<(), EncodeError> {
        let written = self.encode(rules, value, encoder)?;
        if written == 0 && rules.is_per() {
            encoder.write_bits(0, 8)?;
        }
        Ok(())
    }

    pub fn decode(
        &self,
        rules: Rules,
        input: &mut Decoder<'_>,
    ) -> Result<Decoded<Value>, DecodeError> {
        self.decode_with(rules, &self.constraints, input)
    }

    pub fn decode_with(
        &self,
        rules: Rules,
        constraints: &Constraints,
        input: &mut Decoder<'_>,
    ) -> Result<Decoded<Value>, DecodeError> {
        ElementCodec::decode(self, rules, constraints, input)
    }

    /// Decodes one value from the start of `bytes`.
    /// ### Usage
    /// ```
    /// # use asn1_runtime::*;
    /// static FLAG: TypeDescriptor =
    ///     TypeDescriptor::primitive("Flag", &[Tag::BOOLEAN], &BooleanCodec, Constraints::UNCONSTRAINED);
    /// static FLAGS: TypeDescriptor =
    ///     TypeDescriptor::sequence_of("Flags", &FLAG, Constraints::size(SizeConstraint::new(0, 7)));
    ///
    /// // count 2 in 3 bits, then the bits 1 and 0
    /// let result = FLAGS.decode_from_slice(Rules::UnalignedPer, &[0b0101_0000]).unwrap();
    /// assert_eq!(result.bits_consumed, 5);
    /// assert_eq!(
    ///     result.decoded,
    ///     Value::SequenceOf(vec![Value::Boolean(true), Value::Boolean(false)])
    /// );
    /// ```
    pub fn decode_from_slice(
        &self,
        rules: Rules,
        bytes: &[u8],
    ) -> Result<Decoded<Value>, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        self.decode(rules, &mut decoder)
    }

    #[cfg(feature = "json")]
    /// Dumps the descriptor tree, members and constraint tables included.
    pub fn to_json(&self) -> Result<String, EncodeError> {
        serde_json::to_string(self)
            .map_err(|e| EncodeError::Unsupported(alloc::format!("Error encoding JSON: {e:?}")))
    }

    /// Validates `value` against this type's constraints for `rules`
    /// without producing an encoding.
    pub fn check_constraints(&self, rules: Rules, value: &Value) -> Result<(), EncodeError> {
        ElementCodec::check(self, rules, &self.constraints, value)
    }
}

impl ElementCodec for TypeDescriptor {
    fn encode(
        &self,
        rules: Rules,
        constraints: &Constraints,
        value: &Value,
        output: &mut Encoder,
    ) -> Result<usize, EncodeError> {
        match self.kind {
            Kind::Primitive(codec) => codec.encode(rules, constraints, value, output),
            Kind::Sequence {
                members,
                extensible,
            } => measure_encode(output, |output| {
                constructed::encode_sequence(self, members, extensible, rules, value, output)
            }),
            Kind::Choice {
                alternatives,
                extensible,
            } => measure_encode(output, |output| {
                constructed::encode_choice(self, alternatives, extensible, rules, value, output)
            }),
            Kind::SequenceOf(element) | Kind::SetOf(element) => match value {
                Value::SequenceOf(elements) => {
                    encode_sequence_of(self, element, constraints, rules, elements, output)
                }
                other => Err(EncodeError::mismatch(self.name, "SEQUENCE OF", other)),
            },
        }
    }

    fn decode(
        &self,
        rules: Rules,
        constraints: &Constraints,
        input: &mut Decoder<'_>,
    ) -> Result<Decoded<Value>, DecodeError> {
        match self.kind {
            Kind::Primitive(codec) => codec.decode(rules, constraints, input),
            Kind::Sequence {
                members,
                extensible,
            } => measure_decode(input, |input| {
                constructed::decode_sequence(self, members, extensible, rules, input)
            }),
            Kind::Choice {
                alternatives,
                extensible,
            } => measure_decode(input, |input| {
                constructed::decode_choice(self, alternatives, extensible, rules, input)
            }),
            Kind::SequenceOf(element) | Kind::SetOf(element) => {
                decode_sequence_of(self, element, constraints, rules, input).map(|decoded| {
                    Decoded {
                        bits_consumed: decoded.bits_consumed,
                        decoded: Value::SequenceOf(decoded.decoded),
                    }
                })
            }
        }
    }

    fn check(
        &self,
        rules: Rules,
        constraints: &Constraints,
        value: &Value,
    ) -> Result<(), EncodeError> {
        match (self.kind, value) {
            (Kind::Primitive(codec), value) => codec.check(rules, constraints, value),
            (Kind::SequenceOf(element) | Kind::SetOf(element), Value::SequenceOf(elements)) => {
                constraints
                    .for_rules(rules)
                    .size
                    .normalize(elements.len() as u64)
                    .map_err(EncodeError::CardinalityViolation)?;
                elements
                    .iter()
                    .try_for_each(|e| element.check(rules, &element.constraints, e))
            }
            (Kind::Sequence { members, .. }, Value::Sequence(slots)) => {
                constructed::check_sequence_shape(self, members, slots)?;
                members
                    .iter()
                    .zip(slots)
                    .filter_map(|(member, slot)| slot.as_ref().map(|v| (member, v)))
                    .try_for_each(|(member, v)| {
                        member
                            .descriptor
                            .check(rules, member.constraints(), v)
                    })
            }
            (Kind::Choice { alternatives, .. }, Value::Choice { index, value }) => {
                let alternative = alternatives.get(*index).ok_or_else(|| {
                    EncodeError::InvalidValue(alloc::format!(
                        "{} has no alternative {index}",
                        self.name
                    ))
                })?;
                alternative
                    .descriptor
                    .check(rules, alternative.constraints(), value)
            }
            (Kind::SequenceOf(_) | Kind::SetOf(_), other) => {
                Err(EncodeError::mismatch(self.name, "SEQUENCE OF", other))
            }
            (Kind::Sequence { .. }, other) => Err(EncodeError::mismatch(self.name, "SEQUENCE", other)),
            (Kind::Choice { .. }, other) => Err(EncodeError::mismatch(self.name, "CHOICE", other)),
        }
    }
}
