//! Timeseries Resampler (spec.md §4.5, §4.6, §4.7).

pub mod functions;
pub mod helper;
pub mod resampler;
pub mod streaming;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use functions::{average, ResamplingFunction};
pub use helper::ResamplingHelper;
pub use resampler::{Resampler, ResamplingError};
pub use streaming::{Sink, Source, SourceStoppedError, StreamingHelper};

pub const DEFAULT_BUFFER_LEN_INIT: usize = 16;
pub const DEFAULT_BUFFER_LEN_MAX: usize = 1024;
pub const DEFAULT_BUFFER_LEN_WARN: usize = 128;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("resampling_period_s ({0}) must be positive")]
    NonPositivePeriod(f64),
    #[error("max_data_age_in_periods ({0}) should be at least 1.0")]
    DataAgeTooSmall(f64),
    #[error("initial_buffer_len ({initial}) is bigger than max_buffer_len ({max}), use a smaller initial_buffer_len or a bigger max_buffer_len")]
    InitialBiggerThanMax { initial: usize, max: usize },
    #[error("max_buffer_len ({max}) should be bigger than warn_buffer_len ({warn})")]
    MaxNotBiggerThanWarn { max: usize, warn: usize },
    #[error("initial_buffer_len ({0}) should be at least 1")]
    InitialBufferTooSmall(usize),
}

/// Resampler configuration (spec.md §3 "ResamplerConfig").
///
/// Only constructible through [`ResamplerConfig::new`] /
/// [`ResamplerConfig::builder`], which enforce every cross-field invariant
/// up front — there is no way to hold an invalid `ResamplerConfig`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResamplerConfig {
    pub resampling_period_s: f64,
    pub max_data_age_in_periods: f64,
    pub resampling_function: ResamplingFunction,
    pub initial_buffer_len: usize,
    pub warn_buffer_len: usize,
    pub max_buffer_len: usize,
}

impl ResamplerConfig {
    /// Build a config with every other field at its default, matching
    /// the upstream resampler's defaults.
    pub fn new(resampling_period_s: f64) -> Result<Self, ConfigError> {
        Self::builder(resampling_period_s).build()
    }

    pub fn builder(resampling_period_s: f64) -> ResamplerConfigBuilder {
        ResamplerConfigBuilder {
            resampling_period_s,
            max_data_age_in_periods: 3.0,
            resampling_function: average,
            initial_buffer_len: DEFAULT_BUFFER_LEN_INIT,
            warn_buffer_len: DEFAULT_BUFFER_LEN_WARN,
            max_buffer_len: DEFAULT_BUFFER_LEN_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResamplerConfigBuilder {
    resampling_period_s: f64,
    max_data_age_in_periods: f64,
    resampling_function: ResamplingFunction,
    initial_buffer_len: usize,
    warn_buffer_len: usize,
    max_buffer_len: usize,
}

impl ResamplerConfigBuilder {
    pub fn max_data_age_in_periods(mut self, value: f64) -> Self {
        self.max_data_age_in_periods = value;
        self
    }

    pub fn resampling_function(mut self, f: ResamplingFunction) -> Self {
        self.resampling_function = f;
        self
    }

    pub fn initial_buffer_len(mut self, value: usize) -> Self {
        self.initial_buffer_len = value;
        self
    }

    pub fn warn_buffer_len(mut self, value: usize) -> Self {
        self.warn_buffer_len = value;
        self
    }

    pub fn max_buffer_len(mut self, value: usize) -> Self {
        self.max_buffer_len = value;
        self
    }

    pub fn build(self) -> Result<ResamplerConfig, ConfigError> {
        if self.resampling_period_s <= 0.0 {
            return Err(ConfigError::NonPositivePeriod(self.resampling_period_s));
        }
        if self.max_data_age_in_periods < 1.0 {
            return Err(ConfigError::DataAgeTooSmall(self.max_data_age_in_periods));
        }
        if self.warn_buffer_len < 1 {
            return Err(ConfigError::InitialBufferTooSmall(self.warn_buffer_len));
        }
        if self.max_buffer_len <= self.warn_buffer_len {
            return Err(ConfigError::MaxNotBiggerThanWarn {
                max: self.max_buffer_len,
                warn: self.warn_buffer_len,
            });
        }
        if self.initial_buffer_len < 1 {
            return Err(ConfigError::InitialBufferTooSmall(self.initial_buffer_len));
        }
        if self.initial_buffer_len > self.max_buffer_len {
            return Err(ConfigError::InitialBiggerThanMax {
                initial: self.initial_buffer_len,
                max: self.max_buffer_len,
            });
        }
        if self.initial_buffer_len > self.warn_buffer_len {
            tracing::warn!(
                initial = self.initial_buffer_len,
                warn_threshold = self.warn_buffer_len,
                "initial_buffer_len is bigger than warn_buffer_len"
            );
        }

        Ok(ResamplerConfig {
            resampling_period_s: self.resampling_period_s,
            max_data_age_in_periods: self.max_data_age_in_periods,
            resampling_function: self.resampling_function,
            initial_buffer_len: self.initial_buffer_len,
            warn_buffer_len: self.warn_buffer_len,
            max_buffer_len: self.max_buffer_len,
        })
    }
}
