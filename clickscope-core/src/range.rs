//! Shared range predicates
//!
//! Every view applies its filters through these functions so that the
//! inclusive-range and optional-value rules are identical everywhere.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A closed interval `[min, max]`, inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> ValueRange<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// `min <= max`. False when either end is NaN.
    pub fn is_valid(&self) -> bool {
        matches!(
            self.min.partial_cmp(&self.max),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        )
    }

    pub fn contains(&self, value: T) -> bool {
        in_inclusive_range(value, self)
    }

    /// Pull both ends inside `outer`. A range entirely outside `outer`
    /// collapses onto the nearest end of `outer`.
    pub fn clamp_to(&self, outer: &ValueRange<T>) -> Self {
        let clamp = |v: T| {
            if v < outer.min {
                outer.min
            } else if v > outer.max {
                outer.max
            } else {
                v
            }
        };
        Self::new(clamp(self.min), clamp(self.max))
    }
}

impl<T: fmt::Display> fmt::Display for ValueRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Outcome of checking an optional value against a range.
///
/// An absent value is `NotApplicable`, which passes: the record is not
/// excluded on the basis of a value it does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeCheck {
    Inside,
    Outside,
    NotApplicable,
}

impl RangeCheck {
    pub fn passes(self) -> bool {
        match self {
            RangeCheck::Inside | RangeCheck::NotApplicable => true,
            RangeCheck::Outside => false,
        }
    }
}

/// `min <= value <= max`.
pub fn in_inclusive_range<T: PartialOrd>(value: T, range: &ValueRange<T>) -> bool {
    value >= range.min && value <= range.max
}

/// Three-valued check of an optional value.
pub fn check_optional<T>(value: Option<T>, range: &ValueRange<T>) -> RangeCheck
where
    T: PartialOrd + Copy,
{
    match value {
        None => RangeCheck::NotApplicable,
        Some(v) if in_inclusive_range(v, range) => RangeCheck::Inside,
        Some(_) => RangeCheck::Outside,
    }
}

/// True when the value is absent, or present and inside the range.
pub fn is_defined_and_in_range<T>(value: Option<T>, range: &ValueRange<T>) -> bool
where
    T: PartialOrd + Copy,
{
    check_optional(value, range).passes()
}

/// Look up a reference; `None` means the record referencing `key` is dropped.
pub fn lookup_or_drop<'a, K, Q, V>(map: &'a HashMap<K, V>, key: &Q) -> Option<&'a V>
where
    K: Borrow<Q> + Eq + Hash,
    Q: Eq + Hash + ?Sized,
{
    map.get(key)
}
