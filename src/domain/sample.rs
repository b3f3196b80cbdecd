#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single timeseries data point. `value == None` (or a `NaN` payload
/// before it reaches a [`Sample`]) means "no reading at this timestamp".
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }

    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            value: None,
        }
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}
impl Eq for Sample {}

impl PartialOrd for Sample {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Sample {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

/// Properties of a resampling source, tracked by
/// [`crate::resampling::helper::ResamplingHelper`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SourceProperties {
    pub sampling_start: Option<DateTime<Utc>>,
    pub received_samples: u64,
    pub sampling_period_s: Option<f64>,
}
