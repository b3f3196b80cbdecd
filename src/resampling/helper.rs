//! Resampling Helper (spec.md §4.5): per-source windowed buffer with
//! one-shot sampling-period inference and adaptive buffer length.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::domain::{Sample, SourceProperties};

use super::ResamplerConfig;

/// Ring buffer of recent samples for one source, plus the inferred source
/// properties used to size the window and (optionally) the buffer.
pub struct ResamplingHelper {
    name: String,
    config: ResamplerConfig,
    buffer: VecDeque<Sample>,
    capacity: usize,
    properties: SourceProperties,
}

impl ResamplingHelper {
    pub fn new(name: impl Into<String>, config: ResamplerConfig) -> Self {
        Self {
            name: name.into(),
            capacity: config.initial_buffer_len,
            config,
            buffer: VecDeque::with_capacity(config.initial_buffer_len),
            properties: SourceProperties::default(),
        }
    }

    pub fn source_properties(&self) -> SourceProperties {
        self.properties
    }

    /// Append a sample to the ring buffer, evicting the oldest entry once
    /// `capacity` is exceeded (spec.md §4.5 "add_sample").
    pub fn add_sample(&mut self, sample: Sample) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample);

        if self.properties.sampling_start.is_none() {
            self.properties.sampling_start = Some(sample.timestamp);
        }
        self.properties.received_samples += 1;
    }

    /// One-shot inference of the source's average sampling period, once
    /// enough samples have accumulated and the buffer is full.
    fn update_source_sample_period(&mut self, now: DateTime<Utc>) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let Some(sampling_start) = self.properties.sampling_start else {
            return false;
        };
        if self.properties.sampling_period_s.is_some() {
            return false;
        }
        let threshold = self.config.resampling_period_s * self.config.max_data_age_in_periods;
        if (self.properties.received_samples as f64) < threshold {
            return false;
        }
        if self.buffer.len() < self.capacity {
            return false;
        }
        if now <= sampling_start {
            return false;
        }

        let elapsed = (now - sampling_start).num_milliseconds() as f64 / 1000.0;
        let period = elapsed / self.properties.received_samples as f64;
        self.properties.sampling_period_s = Some(period);
        debug!(source = %self.name, period_s = period, "inferred input sampling period");
        true
    }

    /// Resize the ring buffer to fit `max_data_age_in_periods` worth of
    /// history at the now-known input period (spec.md §4.5 "Buffer
    /// resize").
    fn update_buffer_len(&mut self) {
        let Some(input_period) = self.properties.sampling_period_s else {
            return;
        };

        let raw_len = if input_period > self.config.resampling_period_s {
            input_period * self.config.max_data_age_in_periods
        } else {
            self.config.resampling_period_s / input_period * self.config.max_data_age_in_periods
        };

        let mut new_len = raw_len.ceil().max(1.0) as usize;
        if new_len > self.config.max_buffer_len {
            error!(
                source = %self.name,
                requested = new_len,
                using = self.config.max_buffer_len,
                "buffer length too big, truncating"
            );
            new_len = self.config.max_buffer_len;
        } else if new_len > self.config.warn_buffer_len {
            warn!(source = %self.name, new_len, warn_threshold = self.config.warn_buffer_len, "buffer length bigger than warn threshold");
        }

        if new_len == self.capacity {
            return;
        }

        debug!(source = %self.name, new_len, "resizing resampling buffer");
        while self.buffer.len() > new_len {
            self.buffer.pop_front();
        }
        self.buffer.reserve(new_len.saturating_sub(self.buffer.len()));
        self.capacity = new_len;
    }

    /// Produce a new sample for `timestamp` from the currently *relevant*
    /// window (spec.md §4.5 "resample").
    pub fn resample(&mut self, timestamp: DateTime<Utc>) -> Sample {
        if self.update_source_sample_period(timestamp) {
            self.update_buffer_len();
        }

        let period = match self.properties.sampling_period_s {
            Some(input_period) => self.config.resampling_period_s.max(input_period),
            None => self.config.resampling_period_s,
        };
        let min_relevant =
            timestamp - chrono::Duration::milliseconds((period * self.config.max_data_age_in_periods * 1000.0) as i64);

        // Buffer is timestamp-ordered, so the relevant window is found by
        // two binary searches rather than a linear scan.
        let lo = self.buffer.partition_point(|s| s.timestamp <= min_relevant);
        let hi = self.buffer.partition_point(|s| s.timestamp <= timestamp);
        let relevant: Vec<Sample> = self.buffer.iter().skip(lo).take(hi.saturating_sub(lo)).copied().collect();

        if relevant.is_empty() {
            return Sample::empty(timestamp);
        }

        let value = (self.config.resampling_function)(&relevant, &self.config, &self.properties);
        Sample::new(timestamp, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config(period_s: f64) -> ResamplerConfig {
        ResamplerConfig::builder(period_s)
            .initial_buffer_len(4)
            .max_data_age_in_periods(3.0)
            .build()
            .unwrap()
    }

    #[test]
    fn resample_with_no_samples_yields_none() {
        let mut helper = ResamplingHelper::new("empty", config(1.0));
        let now = Utc::now();
        let sample = helper.resample(now);
        assert_eq!(sample.value, None);
    }

    #[test]
    fn resample_averages_relevant_window() {
        let mut helper = ResamplingHelper::new("src", config(1.0));
        let t0 = Utc::now();
        helper.add_sample(Sample::new(t0, Some(10.0)));
        helper.add_sample(Sample::new(t0 + Duration::milliseconds(500), Some(20.0)));

        let result = helper.resample(t0 + Duration::seconds(1));
        assert_eq!(result.value, Some(15.0));
    }

    #[test]
    fn samples_older_than_max_age_are_excluded() {
        let mut helper = ResamplingHelper::new("src", config(1.0));
        let t0 = Utc::now();
        helper.add_sample(Sample::new(t0, Some(100.0)));

        // max_data_age_in_periods=3, resampling_period=1s -> relevant window is 3s.
        let far_future = t0 + Duration::seconds(10);
        let result = helper.resample(far_future);
        assert_eq!(result.value, None);
    }

    #[test]
    fn crossing_the_age_threshold_infers_period_and_resizes_buffer() {
        // initial_buffer_len=4, resampling_period_s=1.0, max_data_age_in_periods=3.0
        // -> threshold is 3 samples. Feed 4 samples 200ms apart so both the
        // "buffer full" and "enough samples" conditions are met together.
        let mut helper = ResamplingHelper::new("src", config(1.0));
        let t0 = Utc::now();
        for i in 0..4 {
            helper.add_sample(Sample::new(t0 + Duration::milliseconds(i * 200), Some(i as f64)));
        }
        assert_eq!(helper.properties.sampling_period_s, None);
        assert_eq!(helper.capacity, 4);

        // Triggers update_source_sample_period (elapsed 600ms / 4 samples =
        // 150ms input period) then update_buffer_len (resampling_period_s /
        // input_period * max_data_age_in_periods = 1.0 / 0.15 * 3.0, ceiled).
        helper.resample(t0 + Duration::milliseconds(600));

        let period = helper.properties.sampling_period_s.expect("period should now be inferred");
        assert!((period - 0.15).abs() < 1e-9);
        assert_eq!(helper.capacity, 20);
        assert!(helper.buffer.capacity() >= 20);

        // One-shot: a later resample() must not overwrite the inferred period.
        helper.add_sample(Sample::new(t0 + Duration::milliseconds(800), Some(9.0)));
        helper.resample(t0 + Duration::milliseconds(1000));
        assert!((helper.properties.sampling_period_s.unwrap() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn ring_buffer_evicts_oldest_beyond_capacity() {
        let mut helper = ResamplingHelper::new("src", config(1.0));
        let t0 = Utc::now();
        for i in 0..10 {
            helper.add_sample(Sample::new(t0 + Duration::milliseconds(i * 10), Some(i as f64)));
        }
        assert_eq!(helper.buffer.len(), helper.capacity);
    }
}
