//! Descriptor-driven ASN.1 codec runtime for the Packed Encoding Rules
//! (ITU-T X.691, aligned and unaligned) and the Octet Encoding Rules
//! (ITU-T X.696).
//!
//! Types are described by immutable, `'static` [`TypeDescriptor`] tables.
//! Values are dynamic [`Value`] trees. One generic codec walks both, so a
//! size-constrained `SEQUENCE OF` of any element type is encoded and decoded
//! by the same code path:
//!
//! ```
//! # use asn1_runtime::*;
//! static ITEM: TypeDescriptor = TypeDescriptor::primitive(
//!     "Item",
//!     &[Tag::INTEGER],
//!     &IntegerCodec,
//!     Constraints::value(ValueConstraint::new(0, 255)),
//! );
//! static LIST: TypeDescriptor = TypeDescriptor::sequence_of(
//!     "ItemList",
//!     &ITEM,
//!     Constraints::size(SizeConstraint::new(1, 65535)),
//! );
//!
//! let list = Value::SequenceOf(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
//! let per = LIST.encode_to_vec(Rules::UnalignedPer, &list).unwrap();
//! assert_eq!(per, [0x00, 0x02, 0x01, 0x02, 0x03]);
//! let oer = LIST.encode_to_vec(Rules::Oer, &list).unwrap();
//! assert_eq!(oer, [0x03, 0x01, 0x02, 0x03]);
//! assert_eq!(LIST.decode_from_slice(Rules::Oer, &oer).unwrap().decoded, list);
//! ```
#![cfg_attr(not(test), no_std)]
extern crate alloc;

use alloc::{boxed::Box, string::String, vec::Vec};
use core::fmt::{Debug, Display};

use bytes::Bytes;
#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};

mod codec;
mod constraint;
mod constructed;
mod decode;
mod descriptor;
mod encode;
mod primitive;
mod sequence_of;
pub(crate) mod util;

pub use codec::{Decoded, ElementCodec, Rules};
pub use constraint::{
    ConstraintError, Constraints, RuleConstraints, SizeConstraint, ValueConstraint,
};
pub use decode::{DecodeError, Decoder};
pub use descriptor::{Kind, Member, Presence, Tag, TagClass, TypeDescriptor};
pub use encode::{EncodeError, Encoder};
pub use primitive::{BooleanCodec, EnumeratedCodec, IntegerCodec, NullCodec, OctetStringCodec};
pub use sequence_of::{decode_sequence_of, encode_sequence_of};

/// A dynamically typed ASN.1 value.
///
/// The shape of a value mirrors the [`Kind`] of the descriptor it is
/// encoded with.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Enumerated(i64),
    OctetString(Bytes),
    /// One slot per member in declaration order; `None` marks an absent
    /// OPTIONAL member.
    Sequence(Vec<Option<Value>>),
    Choice {
        index: usize,
        value: Box<Value>,
    },
    /// Elements of a SEQUENCE OF or SET OF, in wire order.
    SequenceOf(Vec<Value>),
}

impl Value {
    /// Short name of the value's shape, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Boolean(_) => "BOOLEAN",
            Self::Integer(_) => "INTEGER",
            Self::Enumerated(_) => "ENUMERATED",
            Self::OctetString(_) => "OCTET STRING",
            Self::Sequence(_) => "SEQUENCE",
            Self::Choice { .. } => "CHOICE",
            Self::SequenceOf(_) => "SEQUENCE OF",
        }
    }

    /// Elements of a collection value, `None` for any other shape.
    #[must_use]
    pub fn as_elements(&self) -> Option<&[Value]> {
        match self {
            Self::SequenceOf(elements) => Some(elements),
            _ => None,
        }
    }

    #[cfg(feature = "json")]
    /// Serializes the value tree to JSON, e.g. for logging decoded messages.
    pub fn to_json(&self) -> Result<String, EncodeError> {
        serde_json::to_string(self)
            .map_err(|e| EncodeError::Unsupported(alloc::format!("Error encoding JSON: {e:?}")))
    }

    #[cfg(feature = "json")]
    /// Reads a value tree back from its JSON form.
    /// ### Usage
    /// ```
    /// # use asn1_runtime::*;
    /// let value = Value::from_json(r#"{"SequenceOf":[{"Integer":7},{"Boolean":true}]}"#).unwrap();
    /// assert_eq!(value, Value::SequenceOf(vec![Value::Integer(7), Value::Boolean(true)]));
    /// ```
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(json).map_err(|e| DecodeError::Malformed(alloc::format!("{e:?}")))
    }
}

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Self::SequenceOf(elements)
    }
}
