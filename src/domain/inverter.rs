#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::PowerBounds;

/// Latest reported telemetry for a single inverter.
///
/// NaN semantics are identical to [`super::battery::BatteryTelemetry`]: a
/// field that hasn't been reported yet is `NaN` and must be filtered out
/// before use in a computation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct InverterTelemetry {
    pub active_power_bounds: PowerBounds,
    pub timestamp: DateTime<Utc>,
}

impl InverterTelemetry {
    pub fn has_crucial_nan(&self) -> bool {
        self.active_power_bounds.inclusion_lower.is_nan()
            || self.active_power_bounds.inclusion_upper.is_nan()
    }
}
