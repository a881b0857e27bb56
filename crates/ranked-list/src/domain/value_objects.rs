//! Value objects for ranked lists
//!
//! `Rank` is the sparse position value. It is an exact binary fixed-point
//! number so that repeated halving never loses precision silently: once two
//! neighbours sit one unit of resolution apart, their midpoint collapses onto
//! the smaller one and the collision is resolved by a spread.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Milliseconds since the Unix epoch, or any other monotonic tick.
pub type Timestamp = u64;

/// Stable identity of a record within its collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identity of a ranked collection ("record type").
///
/// Execution modes are keyed by this value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Value of a scope column on a record.
///
/// The derived order (`Null < Bool < Int < Text`) is what `NamedGroup`
/// scopes sort by.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Storage type of a field, as reported by schema introspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Integer,
    Decimal,
    Float,
    Text,
    Boolean,
    Timestamp,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Decimal | FieldKind::Float)
    }
}

/// Resolution at which allocated ranks are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankPrecision {
    /// Full fixed-point resolution.
    Exact,
    /// Whole numbers only; allocations are floored.
    Integer,
}

impl RankPrecision {
    pub fn for_field(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Integer => RankPrecision::Integer,
            _ => RankPrecision::Exact,
        }
    }

    pub fn apply(self, rank: Rank) -> Rank {
        match self {
            RankPrecision::Exact => rank,
            RankPrecision::Integer => rank.floor(),
        }
    }
}

/// Sort direction over the total order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Top of the list first (smallest rank first).
    Ascending,
    /// Bottom of the list first.
    Descending,
}

impl Direction {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

/// Where a record created without a rank is placed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewItemPlacement {
    Highest,
    #[default]
    Lowest,
    Unranked,
}

/// Condition on rank used by neighbour searches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RankBound {
    LessThan(Rank),
    LessOrEqual(Rank),
    GreaterThan(Rank),
    GreaterOrEqual(Rank),
}

impl RankBound {
    pub fn admits(self, rank: Rank) -> bool {
        match self {
            RankBound::LessThan(bound) => rank < bound,
            RankBound::LessOrEqual(bound) => rank <= bound,
            RankBound::GreaterThan(bound) => rank > bound,
            RankBound::GreaterOrEqual(bound) => rank >= bound,
        }
    }
}

/// Sparse position of a record.
///
/// Stored as a signed mantissa scaled by `2^FRACTION_BITS`. The integer part
/// is limited to `±2^62` so the sum of two ranks never overflows.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rank(i128);

impl Rank {
    /// Fractional bits of resolution.
    pub const FRACTION_BITS: u32 = 48;
    /// Largest integer magnitude a rank may hold.
    pub const MAX_INTEGER: i64 = 1 << 62;

    const ONE: i128 = 1 << Self::FRACTION_BITS;
    const LIMIT: i128 = (Self::MAX_INTEGER as i128) << Self::FRACTION_BITS;

    pub const ZERO: Rank = Rank(0);

    /// Smallest representable positive rank.
    pub const EPSILON: Rank = Rank(1);

    fn from_raw(raw: i128) -> Option<Rank> {
        (-Self::LIMIT..=Self::LIMIT).contains(&raw).then_some(Rank(raw))
    }

    /// Exact rank for an integer, `None` beyond `±MAX_INTEGER`.
    pub fn from_integer(value: i64) -> Option<Rank> {
        Self::from_raw(i128::from(value) << Self::FRACTION_BITS)
    }

    /// Rank nearest to `value`; exact for every dyadic value in range.
    pub fn from_f64(value: f64) -> Option<Rank> {
        if !value.is_finite() || value.abs() > Self::MAX_INTEGER as f64 {
            return None;
        }
        let scaled = (value * Self::ONE as f64).round();
        Self::from_raw(scaled as i128)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::ONE as f64
    }

    /// True when the value has no fractional part.
    pub fn is_integer(self) -> bool {
        self.0 % Self::ONE == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Largest whole number not greater than `self`.
    pub fn floor(self) -> Rank {
        Rank(self.0.div_euclid(Self::ONE) * Self::ONE)
    }

    /// Midpoint of two ranks, rounded toward negative infinity.
    pub fn midpoint(self, other: Rank) -> Rank {
        Rank((self.0 + other.0).div_euclid(2))
    }

    pub fn half(self) -> Rank {
        self.midpoint(Rank::ZERO)
    }

    pub fn checked_add(self, other: Rank) -> Option<Rank> {
        Self::from_raw(self.0 + other.0)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Rank> {
        self.0
            .checked_mul(i128::from(factor))
            .and_then(Self::from_raw)
    }
}

impl TryFrom<f64> for Rank {
    type Error = f64;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Rank::from_f64(value).ok_or(value)
    }
}

impl From<i32> for Rank {
    fn from(value: i32) -> Self {
        Rank(i128::from(value) << Self::FRACTION_BITS)
    }
}

impl fmt::Display for Rank {
    /// Exact decimal expansion; every dyadic fraction terminates.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.0 < 0;
        let magnitude = self.0.unsigned_abs();
        let one = Self::ONE as u128;
        let integer = magnitude / one;
        let mut fraction = magnitude % one;

        if negative {
            f.write_str("-")?;
        }
        write!(f, "{integer}")?;
        if fraction == 0 {
            return Ok(());
        }
        f.write_str(".")?;
        while fraction != 0 {
            fraction *= 10;
            write!(f, "{}", fraction / one)?;
            fraction %= one;
        }
        Ok(())
    }
}

impl fmt::Debug for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rank({self})")
    }
}
