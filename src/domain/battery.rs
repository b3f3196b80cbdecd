#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::PowerBounds;

/// Latest reported telemetry for a single battery.
///
/// Any field may be `NaN` if the device hasn't reported it yet; such
/// samples are filtered out before they reach any computation (see
/// [`BatteryTelemetry::has_crucial_nan`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BatteryTelemetry {
    pub soc: f64,
    pub soc_lower_bound: f64,
    pub soc_upper_bound: f64,
    pub capacity_wh: f64,
    pub power_bounds: PowerBounds,
    pub timestamp: DateTime<Utc>,
}

impl BatteryTelemetry {
    /// The metrics that must be present (non-`NaN`) for this telemetry to
    /// be usable in a distribution computation.
    pub fn has_crucial_nan(&self) -> bool {
        self.soc.is_nan()
            || self.soc_lower_bound.is_nan()
            || self.soc_upper_bound.is_nan()
            || self.capacity_wh.is_nan()
            || self.power_bounds.inclusion_lower.is_nan()
            || self.power_bounds.inclusion_upper.is_nan()
    }

    /// Headroom to charge, in watt-capacity units (`(soc_upper - soc) *
    /// capacity`). Used as the SoC-equalizing weight when charging.
    pub fn charge_headroom(&self) -> f64 {
        (self.soc_upper_bound - self.soc).max(0.0) * self.capacity_wh
    }

    /// Headroom to discharge, in watt-capacity units (`(soc - soc_lower) *
    /// capacity`). Used as the SoC-equalizing weight when discharging.
    pub fn discharge_headroom(&self) -> f64 {
        (self.soc - self.soc_lower_bound).max(0.0) * self.capacity_wh
    }
}

/// One logical unit obtained by aggregating telemetry of batteries that
/// share inverters (see the equivalence-class partition in
/// `distribution::distributor`).
///
/// Componentwise sum of capacities and power bounds; capacity-weighted mean
/// of SoC; narrowest SoC bounds of the members.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AggregatedBatteryData {
    pub soc: f64,
    pub soc_lower_bound: f64,
    pub soc_upper_bound: f64,
    pub capacity_wh: f64,
    pub power_bounds: PowerBounds,
    pub timestamp: DateTime<Utc>,
}

impl AggregatedBatteryData {
    /// Aggregate a non-empty slice of battery telemetry.
    ///
    /// # Panics
    ///
    /// Panics if `members` is empty; callers are expected to have already
    /// filtered out empty equivalence classes.
    pub fn aggregate(members: &[BatteryTelemetry]) -> Self {
        assert!(!members.is_empty(), "cannot aggregate an empty battery set");

        let total_capacity: f64 = members.iter().map(|b| b.capacity_wh).sum();
        let weighted_soc: f64 = if total_capacity > 0.0 {
            members.iter().map(|b| b.soc * b.capacity_wh).sum::<f64>() / total_capacity
        } else {
            members.iter().map(|b| b.soc).sum::<f64>() / members.len() as f64
        };

        let soc_lower_bound = members
            .iter()
            .map(|b| b.soc_lower_bound)
            .fold(f64::NEG_INFINITY, f64::max);
        let soc_upper_bound = members
            .iter()
            .map(|b| b.soc_upper_bound)
            .fold(f64::INFINITY, f64::min);

        let power_bounds = members
            .iter()
            .map(|b| b.power_bounds)
            .reduce(|acc, b| acc.sum(&b))
            .unwrap_or_else(PowerBounds::zero);

        let timestamp = members.iter().map(|b| b.timestamp).max().unwrap();

        Self {
            soc: weighted_soc,
            soc_lower_bound,
            soc_upper_bound,
            capacity_wh: total_capacity,
            power_bounds,
            timestamp,
        }
    }

    pub fn charge_headroom(&self) -> f64 {
        (self.soc_upper_bound - self.soc).max(0.0) * self.capacity_wh
    }

    pub fn discharge_headroom(&self) -> f64 {
        (self.soc - self.soc_lower_bound).max(0.0) * self.capacity_wh
    }
}
