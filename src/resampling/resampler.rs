//! Resampler (spec.md §4.7): periodic driver with drift-free scheduling.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

use crate::domain::SourceProperties;

use super::streaming::{Sink, Source, StreamingError, StreamingHelper};
use super::{helper::ResamplingHelper, ResamplerConfig};

/// Aggregates the per-source errors raised while servicing one tick
/// (spec.md §4.7 step 4). The periodic timer keeps running regardless;
/// callers are expected to `remove_timeseries` any source that raised.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("errors while resampling: {0:?}")]
pub struct ResamplingError(pub HashMap<String, StreamingError>);

/// Periodic driver that fans `resample()` out across every registered
/// timeseries on a precise, drift-free schedule.
pub struct Resampler {
    config: ResamplerConfig,
    sources: HashMap<String, StreamingHelper>,
    window_end: DateTime<Utc>,
}

impl Resampler {
    pub fn new(config: ResamplerConfig) -> Self {
        let window_end = Utc::now() + ChronoDuration::milliseconds((config.resampling_period_s * 1000.0) as i64);
        Self {
            config,
            sources: HashMap::new(),
            window_end,
        }
    }

    pub fn config(&self) -> ResamplerConfig {
        self.config
    }

    pub fn get_source_properties(&self, name: &str) -> Option<SourceProperties> {
        self.sources.get(name).map(|s| s.source_properties())
    }

    /// Start resampling a new timeseries. Returns `false` if `name` is
    /// already registered (spec.md §4.7 "add_timeseries refuses
    /// duplicates").
    pub fn add_timeseries(&mut self, name: impl Into<String>, source: Source, sink: Sink) -> bool {
        let name = name.into();
        if self.sources.contains_key(&name) {
            return false;
        }
        let helper = ResamplingHelper::new(name.clone(), self.config);
        self.sources.insert(name, StreamingHelper::new(helper, source, sink));
        true
    }

    /// Stop resampling `name`. Returns `false` if it wasn't registered.
    pub fn remove_timeseries(&mut self, name: &str) -> bool {
        self.sources.remove(name).is_some()
    }

    /// Cancel every streaming helper's background ingestion task.
    pub async fn stop(&mut self) {
        for helper in self.sources.values_mut() {
            helper.stop().await;
        }
    }

    async fn wait_for_next_resampling_period(&self) {
        let now = Utc::now();
        if self.window_end > now {
            let sleep_for = (self.window_end - now).to_std().unwrap_or_default();
            tokio::time::sleep_until(Instant::now() + sleep_for).await;
        }

        let now = Utc::now();
        let timer_error_s = (now - self.window_end).num_milliseconds() as f64 / 1000.0;
        if timer_error_s > self.config.resampling_period_s / 10.0 {
            warn!(
                expected = %self.window_end,
                actual = %now,
                error_s = timer_error_s,
                "resampling task woke up too late"
            );
        }
    }

    /// Run the periodic loop. If `one_shot` is set, service exactly one
    /// tick and return (spec.md §4.7 "Main loop").
    pub async fn resample(&mut self, one_shot: bool) -> Result<(), ResamplingError> {
        loop {
            self.wait_for_next_resampling_period().await;

            let window_end = self.window_end;
            let results = join_all(
                self.sources
                    .iter()
                    .map(|(name, helper)| async move { (name.clone(), helper.resample(window_end).await) }),
            )
            .await;

            let mut errors = HashMap::new();
            for (name, result) in results {
                if let Err(e) = result {
                    errors.insert(name, e);
                }
            }

            // Advance by pure addition, never by reading the clock, so
            // accumulated scheduler lateness never compresses a window.
            self.window_end = self.window_end + ChronoDuration::milliseconds((self.config.resampling_period_s * 1000.0) as i64);

            if !errors.is_empty() {
                return Err(ResamplingError(errors));
            }
            if one_shot {
                return Ok(());
            }
        }
    }
}
