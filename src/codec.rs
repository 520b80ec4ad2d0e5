use crate::*;

/// The encoding rules a codec call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
pub enum Rules {
    /// Octet Encoding Rules, X.696 (BASIC-OER).
    Oer,
    /// Unaligned Packed Encoding Rules, X.691 (UPER).
    UnalignedPer,
    /// Aligned Packed Encoding Rules, X.691 (APER).
    AlignedPer,
}

impl Rules {
    #[must_use]
    pub const fn is_per(self) -> bool {
        matches!(self, Self::UnalignedPer | Self::AlignedPer)
    }

    /// Whether fields are padded to octet boundaries where X.691 says "aligned".
    #[must_use]
    pub const fn is_aligned(self) -> bool {
        matches!(self, Self::AlignedPer)
    }
}

/// Returns the value of a decoding attempt
#[derive(Debug, PartialEq)]
pub struct Decoded<T: Debug + PartialEq> {
    /// indicates the number of bits that were consumed by the decoder
    pub bits_consumed: usize,
    /// the decoded return value
    pub decoded: T,
}

impl<T: Debug + PartialEq> Decoded<T> {
    /// Consumed input rounded up to whole octets.
    #[must_use]
    pub fn bytes_consumed(&self) -> usize {
        num::Integer::div_ceil(&self.bits_consumed, &8)
    }
}

/// Uniform interface between the composite codecs and whatever encodes one
/// element.
///
/// Implemented by the primitive codecs of this crate and by
/// [`TypeDescriptor`] itself, so nested descriptors plug into SEQUENCE OF,
/// SEQUENCE and CHOICE without further glue. Implementations are shared
/// read-only from `static` descriptor tables and must therefore be `Sync`.
pub trait ElementCodec: Sync {
    /// Appends the encoding of `value` at the encoder's position.
    ///
    /// `constraints` are the effective constraint tables of the element,
    /// which may be a member-level override of the type's own tables.
    /// Returns the number of bits written.
    fn encode(
        &self,
        rules: Rules,
        constraints: &Constraints,
        value: &Value,
        output: &mut Encoder,
    ) -> Result<usize, EncodeError>;

    /// Reads exactly one element at the decoder's position.
    fn decode(
        &self,
        rules: Rules,
        constraints: &Constraints,
        input: &mut Decoder<'_>,
    ) -> Result<Decoded<Value>, DecodeError>;

    /// Checks `value` against the constraint table of `rules` without
    /// encoding it.
    fn check(
        &self,
        _rules: Rules,
        _constraints: &Constraints,
        _value: &Value,
    ) -> Result<(), EncodeError> {
        Ok(())
    }
}

/// Runs `f` and reports how many bits it appended to `output`.
pub(crate) fn measure_encode<F>(output: &mut Encoder, f: F) -> Result<usize, EncodeError>
where
    F: FnOnce(&mut Encoder) -> Result<(), EncodeError>,
{
    let start = output.bit_position();
    f(output)?;
    Ok(output.bit_position() - start)
}

/// Runs `f` and wraps its value together with the number of bits it consumed.
pub(crate) fn measure_decode<'input, F>(
    input: &mut Decoder<'input>,
    f: F,
) -> Result<Decoded<Value>, DecodeError>
where
    F: FnOnce(&mut Decoder<'input>) -> Result<Value, DecodeError>,
{
    let start = input.bit_position();
    let decoded = f(input)?;
    Ok(Decoded {
        bits_consumed: input.bit_position() - start,
        decoded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rules() {
        assert!(!Rules::Oer.is_per());
        assert!(Rules::UnalignedPer.is_per());
        assert!(!Rules::UnalignedPer.is_aligned());
        assert!(Rules::AlignedPer.is_aligned());
    }

    #[test]
    fn rounds_consumed_bits_up() {
        let decoded = Decoded {
            bits_consumed: 9,
            decoded: Value::Null,
        };
        assert_eq!(2, decoded.bytes_consumed());
    }
}
