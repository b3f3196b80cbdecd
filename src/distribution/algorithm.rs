//! SoC-equalizing Distribution Algorithm (spec.md §4.3).
//!
//! Pure function: given a signed target power and a set of
//! [`InvBatPair`]s, compute how much power each inverter should be
//! commanded to, such that batteries with more headroom in the direction
//! of flow take a proportionally larger share, while respecting each
//! pair's admissible bounds.

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

use crate::domain::{is_close_to_zero, InverterId};

use super::InvBatPair;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DistributionError {
    #[error("cannot distribute power across an empty set of battery/inverter pairs")]
    EmptyPairs,
    #[error("pair data contains NaN after filtering, cannot distribute")]
    NanInput,
}

/// Result of a single [`distribute`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionResult {
    pub per_inverter: HashMap<InverterId, f64>,
    pub remaining_watts: f64,
}

/// The SoC-equalizing power distribution algorithm, parameterized by the
/// headroom exponent (spec.md §4.3: "weights ... raised to a configurable
/// exponent (default 1.0)").
#[derive(Debug, Clone, Copy)]
pub struct DistributionAlgorithm {
    pub exponent: f64,
}

impl Default for DistributionAlgorithm {
    fn default() -> Self {
        Self { exponent: 1.0 }
    }
}

impl DistributionAlgorithm {
    pub fn new(exponent: f64) -> Self {
        Self { exponent }
    }

    pub fn distribute(&self, target_watts: f64, pairs: &[InvBatPair]) -> Result<DistributionResult, DistributionError> {
        distribute_with_exponent(target_watts, pairs, self.exponent)
    }
}

/// Free-function entry point using the default exponent of `1.0`.
pub fn distribute(target_watts: f64, pairs: &[InvBatPair]) -> Result<DistributionResult, DistributionError> {
    DistributionAlgorithm::default().distribute(target_watts, pairs)
}

fn validate(pairs: &[InvBatPair]) -> Result<(), DistributionError> {
    if pairs.is_empty() {
        return Err(DistributionError::EmptyPairs);
    }
    for pair in pairs {
        if pair.battery.soc.is_nan()
            || pair.battery.soc_lower_bound.is_nan()
            || pair.battery.soc_upper_bound.is_nan()
            || pair.battery.capacity_wh.is_nan()
        {
            return Err(DistributionError::NanInput);
        }
        if pair.inverters.is_empty() {
            return Err(DistributionError::NanInput);
        }
    }
    Ok(())
}

fn distribute_with_exponent(
    target_watts: f64,
    pairs: &[InvBatPair],
    exponent: f64,
) -> Result<DistributionResult, DistributionError> {
    validate(pairs)?;

    let n = pairs.len();

    if is_close_to_zero(target_watts) {
        let per_inverter = pairs
            .iter()
            .flat_map(|p| p.inverters.iter())
            .map(|(id, _)| (*id, 0.0))
            .collect();
        return Ok(DistributionResult {
            per_inverter,
            remaining_watts: 0.0,
        });
    }

    let charging = target_watts > 0.0;

    // Static per-pair headroom weight; does not change across
    // redistribution rounds (only which pairs remain *active* changes).
    let weights: Vec<f64> = pairs
        .iter()
        .map(|p| {
            let headroom = if charging {
                p.battery.charge_headroom()
            } else {
                p.battery.discharge_headroom()
            };
            headroom.max(0.0).powf(exponent)
        })
        .collect();

    let bounds: Vec<(f64, f64)> = pairs
        .iter()
        .map(|p| {
            let b = p.effective_bounds();
            (b.inclusion_lower, b.inclusion_upper)
        })
        .collect();

    let mut pair_watts = vec![0.0_f64; n];
    let mut active: Vec<usize> = (0..n).collect();
    let mut remaining_target = target_watts;

    // Each iteration either finishes (no pair saturates) or permanently
    // saturates at least one pair, so this terminates in at most `n + 1`
    // rounds.
    for _ in 0..=n {
        if active.is_empty() || is_close_to_zero(remaining_target) {
            break;
        }

        let total_weight: f64 = active.iter().map(|&i| weights[i]).sum();

        let candidates: Vec<(usize, f64)> = if total_weight > 0.0 {
            active
                .iter()
                .map(|&i| (i, remaining_target * weights[i] / total_weight))
                .collect()
        } else {
            // No headroom anywhere active: fall back to an equal split so
            // the request still makes progress instead of stalling.
            let share = remaining_target / active.len() as f64;
            active.iter().map(|&i| (i, share)).collect()
        };

        let mut saturated = Vec::new();
        let mut saturated_amount = 0.0;

        for &(i, candidate) in &candidates {
            let (lo, hi) = bounds[i];
            let clamped = candidate.clamp(lo, hi);
            if (candidate - clamped).abs() > 1e-9 {
                pair_watts[i] = clamped;
                saturated_amount += clamped;
                saturated.push(i);
            }
        }

        if saturated.is_empty() {
            for &(i, candidate) in &candidates {
                pair_watts[i] = candidate;
            }
            remaining_target = 0.0;
            break;
        }

        remaining_target -= saturated_amount;
        active.retain(|i| !saturated.contains(i));
    }

    if !is_close_to_zero(remaining_target) && !active.is_empty() {
        warn!(
            remaining = remaining_target,
            "distribution did not converge within the iteration budget, treating leftover as excess"
        );
    }

    let mut per_inverter: HashMap<InverterId, f64> = HashMap::new();
    let mut remaining_watts = remaining_target;

    for (idx, pair) in pairs.iter().enumerate() {
        let share = pair_watts[idx];
        let n_inv = pair.inverters.len() as f64;
        let per_inv_raw = share / n_inv;

        for (inverter_id, telemetry) in &pair.inverters {
            let clipped = telemetry.active_power_bounds.clamp(per_inv_raw);
            remaining_watts += per_inv_raw - clipped;
            per_inverter.insert(*inverter_id, clipped);
        }
    }

    Ok(DistributionResult {
        per_inverter,
        remaining_watts,
    })
}
