#![allow(dead_code)]
use serde::{Deserialize, Serialize};
use std::ops::{Add, Neg, Sub};

/// A component identifier as handed out by the component graph.
///
/// Battery and inverter IDs share the same numeric ID space in the
/// microgrid component graph, so we keep them as plain aliases rather than
/// distinct newtypes to avoid friction when indexing into topology maps
/// keyed by whichever side is relevant.
pub type BatteryId = u64;
pub type InverterId = u64;

/// Signed real power, in watts.
///
/// Positive values mean "consume/charge", negative values mean
/// "supply/discharge" — the same convention used throughout the microgrid
/// component graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd, Default)]
pub struct Power(pub f64);

impl Power {
    pub fn watts(w: f64) -> Self {
        Self(w)
    }

    pub fn zero() -> Self {
        Self(0.0)
    }

    pub fn as_watts(&self) -> f64 {
        self.0
    }

    pub fn is_nan(&self) -> bool {
        self.0.is_nan()
    }

    /// Whether this power is close enough to zero to be treated as exactly
    /// zero for bounds-checking purposes.
    pub fn is_close_to_zero(&self) -> bool {
        is_close_to_zero(self.0)
    }
}

/// Same "is this close enough to zero" tolerance used for both `Power`
/// values and the invariant checks in the distribution algorithm.
pub const ZERO_TOLERANCE: f64 = 1e-6;

pub fn is_close_to_zero(value: f64) -> bool {
    value.abs() < ZERO_TOLERANCE
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < ZERO_TOLERANCE
}

impl std::fmt::Display for Power {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3} W", self.0)
    }
}

impl Add for Power {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Power {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Power {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

/// Inclusion/exclusion bounds for a device's admissible operating power.
///
/// Semantics: the admissible range is
/// `[inclusion_lower, exclusion_lower] ∪ {0} ∪ [exclusion_upper, inclusion_upper]`.
/// The open interval `(exclusion_lower, exclusion_upper) \ {0}` is the
/// device's deadband and is always forbidden except for exact zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PowerBounds {
    pub inclusion_lower: f64,
    pub inclusion_upper: f64,
    pub exclusion_lower: f64,
    pub exclusion_upper: f64,
}

impl PowerBounds {
    pub fn new(
        inclusion_lower: f64,
        exclusion_lower: f64,
        exclusion_upper: f64,
        inclusion_upper: f64,
    ) -> Self {
        Self {
            inclusion_lower,
            inclusion_upper,
            exclusion_lower,
            exclusion_upper,
        }
    }

    pub fn symmetric(inclusion: f64) -> Self {
        Self {
            inclusion_lower: -inclusion,
            inclusion_upper: inclusion,
            exclusion_lower: 0.0,
            exclusion_upper: 0.0,
        }
    }

    /// Whether `power` is inside the forbidden deadband (and not exactly
    /// zero).
    pub fn in_deadband(&self, power: f64) -> bool {
        !is_close_to_zero(power) && self.exclusion_lower < power && power < self.exclusion_upper
    }

    /// Whether `power` lies anywhere in the admissible range.
    pub fn admits(&self, power: f64) -> bool {
        if is_close_to_zero(power) {
            return true;
        }
        let in_lower_range = self.inclusion_lower <= power && power <= self.exclusion_lower;
        let in_upper_range = self.exclusion_upper <= power && power <= self.inclusion_upper;
        in_lower_range || in_upper_range
    }

    pub fn clamp(&self, power: f64) -> f64 {
        power.clamp(self.inclusion_lower, self.inclusion_upper)
    }

    /// Combine two bounds by summation, used to aggregate several
    /// inverters' bounds into one pool-level bound.
    pub fn sum(&self, other: &PowerBounds) -> Self {
        Self {
            inclusion_lower: self.inclusion_lower + other.inclusion_lower,
            inclusion_upper: self.inclusion_upper + other.inclusion_upper,
            exclusion_lower: self.exclusion_lower + other.exclusion_lower,
            exclusion_upper: self.exclusion_upper + other.exclusion_upper,
        }
    }

    pub fn zero() -> Self {
        Self {
            inclusion_lower: 0.0,
            inclusion_upper: 0.0,
            exclusion_lower: 0.0,
            exclusion_upper: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_arithmetic() {
        let a = Power::watts(100.0);
        let b = Power::watts(40.0);
        assert_eq!((a - b).as_watts(), 60.0);
        assert_eq!((a + b).as_watts(), 140.0);
        assert_eq!((-a).as_watts(), -100.0);
    }

    #[test]
    fn zero_is_always_admissible() {
        let bounds = PowerBounds::new(-1000.0, -50.0, 50.0, 1000.0);
        assert!(bounds.admits(0.0));
        assert!(!bounds.in_deadband(0.0));
    }

    #[test]
    fn deadband_excludes_nonzero_interior() {
        let bounds = PowerBounds::new(-1000.0, -50.0, 50.0, 1000.0);
        assert!(bounds.in_deadband(30.0));
        assert!(bounds.in_deadband(-30.0));
        assert!(!bounds.in_deadband(60.0));
        assert!(!bounds.admits(30.0));
        assert!(bounds.admits(60.0));
        assert!(bounds.admits(-1000.0));
    }
}
