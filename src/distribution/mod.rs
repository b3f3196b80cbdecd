//! Distribution Algorithm and Power Distributor (spec.md §4.3, §4.4).

pub mod algorithm;
pub mod distributor;

use crate::domain::{AggregatedBatteryData, InverterId, InverterTelemetry, PowerBounds};

pub use algorithm::{distribute, DistributionAlgorithm, DistributionError, DistributionResult};
pub use distributor::PowerDistributor;

/// One logical unit: an aggregated battery plus the telemetry of its
/// adjacent inverters (at least one).
#[derive(Debug, Clone)]
pub struct InvBatPair {
    pub battery: AggregatedBatteryData,
    pub inverters: Vec<(InverterId, InverterTelemetry)>,
}

impl InvBatPair {
    pub fn new(battery: AggregatedBatteryData, inverters: Vec<(InverterId, InverterTelemetry)>) -> Self {
        Self { battery, inverters }
    }

    /// Sum of this pair's inverters' bounds.
    pub fn inverter_bounds_sum(&self) -> PowerBounds {
        self.inverters
            .iter()
            .map(|(_, t)| t.active_power_bounds)
            .reduce(|acc, b| acc.sum(&b))
            .unwrap_or_else(PowerBounds::zero)
    }

    /// Componentwise most-restrictive combination of the battery's bounds
    /// and the sum of its inverters' bounds (spec.md §4.4 "Aggregate bound
    /// computation", applied at the pair level).
    pub fn effective_bounds(&self) -> PowerBounds {
        let inv = self.inverter_bounds_sum();
        let bat = self.battery.power_bounds;
        PowerBounds {
            inclusion_lower: bat.inclusion_lower.max(inv.inclusion_lower),
            inclusion_upper: bat.inclusion_upper.min(inv.inclusion_upper),
            exclusion_lower: bat.exclusion_lower.min(inv.exclusion_lower),
            exclusion_upper: bat.exclusion_upper.max(inv.exclusion_upper),
        }
    }
}

/// Pool-level admissible bound over every pair (spec.md §4.4 "Aggregate
/// bound computation").
///
/// Inclusion bounds are summed pair-by-pair using each pair's own
/// most-restrictive combination; exclusion bounds are computed once over
/// the whole pool, taking the widest deadband envelope between "sum of
/// battery deadbands" and "sum of inverter deadbands" so that no pair can
/// exit the pool's reported deadband.
pub fn pool_bounds(pairs: &[InvBatPair]) -> PowerBounds {
    let inclusion_lower = pairs.iter().map(|p| p.effective_bounds().inclusion_lower).sum();
    let inclusion_upper = pairs.iter().map(|p| p.effective_bounds().inclusion_upper).sum();

    let battery_exclusion_lower: f64 = pairs.iter().map(|p| p.battery.power_bounds.exclusion_lower).sum();
    let battery_exclusion_upper: f64 = pairs.iter().map(|p| p.battery.power_bounds.exclusion_upper).sum();
    let inverter_exclusion_lower: f64 = pairs
        .iter()
        .flat_map(|p| p.inverters.iter())
        .map(|(_, t)| t.active_power_bounds.exclusion_lower)
        .sum();
    let inverter_exclusion_upper: f64 = pairs
        .iter()
        .flat_map(|p| p.inverters.iter())
        .map(|(_, t)| t.active_power_bounds.exclusion_upper)
        .sum();

    PowerBounds {
        inclusion_lower,
        inclusion_upper,
        exclusion_lower: battery_exclusion_lower.min(inverter_exclusion_lower),
        exclusion_upper: battery_exclusion_upper.max(inverter_exclusion_upper),
    }
}
