use crate::*;

/// Raised when a count or an integer value leaves its declared bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    #[error("count {count} outside of SIZE({}..{})", bound(.lower), bound(.upper))]
    OutOfRange {
        count: u64,
        lower: Option<u64>,
        upper: Option<u64>,
    },
    #[error("value {value} outside of ({}..{})", bound(.lower), bound(.upper))]
    ValueOutOfRange {
        value: i64,
        lower: Option<i64>,
        upper: Option<i64>,
    },
}

fn bound<T: Display>(b: &Option<T>) -> String {
    b.as_ref()
        .map_or_else(|| "MAX".into(), |v| alloc::format!("{v}"))
}

/// Number of bits needed to write any offset in a range of `range` values.
///
/// `range` is the count of distinct values, i.e. `upper - lower + 1`.
pub(crate) fn bits_for_range(range: u128) -> u32 {
    if range <= 1 {
        0
    } else {
        128 - (range - 1).leading_zeros()
    }
}

/// Cardinality constraint of a SEQUENCE OF / SET OF or of a string type,
/// e.g. `SIZE(1..65535)` or `SIZE(0..MAX, ...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
pub struct SizeConstraint {
    pub lower: Option<u64>,
    pub upper: Option<u64>,
    pub extensible: bool,
}

impl SizeConstraint {
    pub const UNCONSTRAINED: Self = Self {
        lower: None,
        upper: None,
        extensible: false,
    };

    /// `SIZE(lower..upper)`
    ///
    /// # Panics
    /// When `lower > upper`. Used in `static` descriptor tables,
    /// where this becomes a compile-time error.
    #[must_use]
    pub const fn new(lower: u64, upper: u64) -> Self {
        assert!(lower <= upper, "SIZE constraint with lower > upper");
        Self {
            lower: Some(lower),
            upper: Some(upper),
            extensible: false,
        }
    }

    /// `SIZE(lower..MAX)`
    #[must_use]
    pub const fn at_least(lower: u64) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
            extensible: false,
        }
    }

    /// `SIZE(n)`
    #[must_use]
    pub const fn fixed(n: u64) -> Self {
        Self::new(n, n)
    }

    /// Marks the constraint as carrying an extension marker (`...`).
    #[must_use]
    pub const fn extensible(self) -> Self {
        Self {
            extensible: true,
            ..self
        }
    }

    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }

    #[must_use]
    pub const fn is_fixed(&self) -> bool {
        matches!((self.lower, self.upper), (Some(l), Some(u)) if l == u)
    }

    /// Number of distinct counts admitted by the root, `None` if unbounded
    /// or if the bounds are reversed.
    #[must_use]
    pub fn range(&self) -> Option<u128> {
        match (self.lower, self.upper) {
            (Some(l), Some(u)) => u128::from(u).checked_sub(u128::from(l)).map(|d| d + 1),
            _ => None,
        }
    }

    /// Bits needed for a PER bit-packed count. `0` for unbounded and
    /// single-valued constraints.
    #[must_use]
    pub fn bit_width(&self) -> u32 {
        self.range().map_or(0, bits_for_range)
    }

    /// PER writes the count as a constrained whole number only when the
    /// upper bound is below 64K (X.691 11.9.4.1).
    #[must_use]
    pub fn fits_constrained_length(&self) -> bool {
        matches!(self.upper, Some(u) if u < 65536) && self.lower.is_some()
    }

    /// Whether `count` lies in the root of this constraint.
    #[must_use]
    pub fn contains(&self, count: u64) -> bool {
        self.lower.map_or(true, |l| count >= l) && self.upper.map_or(true, |u| count <= u)
    }

    /// Checks `count` against the bounds. Extensible constraints admit every
    /// count; whether the count lies in the root is answered by [`Self::contains`].
    pub fn normalize(&self, count: u64) -> Result<u64, ConstraintError> {
        if self.extensible {
            Ok(count)
        } else {
            self.check_root(count)
        }
    }

    /// Checks `count` against the root bounds, extension marker or not.
    /// A count read with the PER extension bit cleared must pass this.
    pub fn check_root(&self, count: u64) -> Result<u64, ConstraintError> {
        if self.contains(count) {
            Ok(count)
        } else {
            Err(ConstraintError::OutOfRange {
                count,
                lower: self.lower,
                upper: self.upper,
            })
        }
    }
}

/// Value range of an INTEGER or ENUMERATED type, e.g. `(0..255)` or `(-1..MAX)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
pub struct ValueConstraint {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub extensible: bool,
}

impl ValueConstraint {
    pub const UNCONSTRAINED: Self = Self {
        lower: None,
        upper: None,
        extensible: false,
    };

    /// # Panics
    /// When `lower > upper`.
    #[must_use]
    pub const fn new(lower: i64, upper: i64) -> Self {
        assert!(lower <= upper, "value constraint with lower > upper");
        Self {
            lower: Some(lower),
            upper: Some(upper),
            extensible: false,
        }
    }

    #[must_use]
    pub const fn at_least(lower: i64) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
            extensible: false,
        }
    }

    #[must_use]
    pub const fn extensible(self) -> Self {
        Self {
            extensible: true,
            ..self
        }
    }

    #[must_use]
    pub fn range(&self) -> Option<u128> {
        match (self.lower, self.upper) {
            (Some(l), Some(u)) => u128::try_from(i128::from(u) - i128::from(l))
                .ok()
                .map(|d| d + 1),
            _ => None,
        }
    }

    #[must_use]
    pub fn bit_width(&self) -> u32 {
        self.range().map_or(0, bits_for_range)
    }

    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        self.lower.map_or(true, |l| value >= l) && self.upper.map_or(true, |u| value <= u)
    }

    pub fn normalize(&self, value: i64) -> Result<i64, ConstraintError> {
        if self.extensible {
            Ok(value)
        } else {
            self.check_root(value)
        }
    }

    pub fn check_root(&self, value: i64) -> Result<i64, ConstraintError> {
        if self.contains(value) {
            Ok(value)
        } else {
            Err(ConstraintError::ValueOutOfRange {
                value,
                lower: self.lower,
                upper: self.upper,
            })
        }
    }
}

/// Constraints as seen by one family of encoding rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
pub struct RuleConstraints {
    pub value: ValueConstraint,
    pub size: SizeConstraint,
}

impl RuleConstraints {
    pub const UNCONSTRAINED: Self = Self {
        value: ValueConstraint::UNCONSTRAINED,
        size: SizeConstraint::UNCONSTRAINED,
    };
}

/// The OER and PER constraint tables attached to a type.
///
/// Both tables usually carry the same bounds; they are kept apart because a
/// schema compiler may drop constraints that one rule set does not make
/// visible on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
pub struct Constraints {
    pub oer: RuleConstraints,
    pub per: RuleConstraints,
}

impl Constraints {
    pub const UNCONSTRAINED: Self = Self {
        oer: RuleConstraints::UNCONSTRAINED,
        per: RuleConstraints::UNCONSTRAINED,
    };

    /// Same cardinality constraint for both rule sets.
    #[must_use]
    pub const fn size(size: SizeConstraint) -> Self {
        let table = RuleConstraints {
            value: ValueConstraint::UNCONSTRAINED,
            size,
        };
        Self {
            oer: table,
            per: table,
        }
    }

    /// Same value constraint for both rule sets.
    #[must_use]
    pub const fn value(value: ValueConstraint) -> Self {
        let table = RuleConstraints {
            value,
            size: SizeConstraint::UNCONSTRAINED,
        };
        Self {
            oer: table,
            per: table,
        }
    }

    #[must_use]
    pub const fn for_rules(&self, rules: Rules) -> &RuleConstraints {
        match rules {
            Rules::Oer => &self.oer,
            Rules::UnalignedPer | Rules::AlignedPer => &self.per,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_bit_width() {
        assert_eq!(16, SizeConstraint::new(1, 65535).bit_width());
        assert_eq!(1, SizeConstraint::new(0, 1).bit_width());
        assert_eq!(0, SizeConstraint::new(5, 5).bit_width());
        assert_eq!(0, SizeConstraint::at_least(1).bit_width());
        assert_eq!(0, SizeConstraint::UNCONSTRAINED.bit_width());
        assert_eq!(8, SizeConstraint::new(0, 255).bit_width());
        assert_eq!(9, SizeConstraint::new(0, 256).bit_width());
        assert_eq!(64, SizeConstraint::new(0, u64::MAX).bit_width());
        assert_eq!(32, ValueConstraint::new(i64::from(i32::MIN), i64::from(i32::MAX)).bit_width());
    }

    #[test]
    fn normalizes_counts() {
        let size = SizeConstraint::new(1, 65535);
        assert_eq!(Ok(3), size.normalize(3));
        assert_eq!(Ok(65535), size.normalize(65535));
        assert_eq!(
            Err(ConstraintError::OutOfRange {
                count: 0,
                lower: Some(1),
                upper: Some(65535)
            }),
            size.normalize(0)
        );
        assert!(size.normalize(1_000_000).is_err());
        assert_eq!(Ok(0), SizeConstraint::UNCONSTRAINED.normalize(0));
        assert_eq!(Ok(7), SizeConstraint::new(1, 4).extensible().normalize(7));
        assert!(!SizeConstraint::new(1, 4).extensible().contains(7));
    }

    #[test]
    fn checks_root_of_extensible_constraints() {
        let size = SizeConstraint::new(1, 4).extensible();
        assert_eq!(Ok(4), size.check_root(4));
        assert!(size.check_root(0).is_err());
        assert!(size.check_root(5).is_err());
        let value = ValueConstraint::new(-1, 1).extensible();
        assert_eq!(Ok(7), value.normalize(7));
        assert!(value.check_root(7).is_err());
    }

    #[test]
    fn reversed_bounds_have_no_range() {
        let size = SizeConstraint {
            lower: Some(5),
            upper: Some(1),
            extensible: true,
        };
        assert_eq!(None, size.range());
        assert_eq!(0, size.bit_width());
        assert!(size.check_root(3).is_err());
        let value = ValueConstraint {
            lower: Some(i64::MAX),
            upper: Some(i64::MIN),
            extensible: false,
        };
        assert_eq!(None, value.range());
        assert_eq!(
            Some(u128::from(u64::MAX) + 1),
            ValueConstraint::new(i64::MIN, i64::MAX).range()
        );
    }

    #[test]
    fn only_small_upper_bounds_are_bit_packed() {
        assert!(SizeConstraint::new(1, 65535).fits_constrained_length());
        assert!(!SizeConstraint::new(1, 65536).fits_constrained_length());
        assert!(!SizeConstraint::at_least(0).fits_constrained_length());
    }

    #[test]
    fn displays_bounds() {
        let err = SizeConstraint::at_least(2).normalize(1).unwrap_err();
        assert_eq!("count 1 outside of SIZE(2..MAX)", alloc::format!("{err}"));
    }
}
