//! Pluggable resampling functions (spec.md §4.5).

use crate::domain::{Sample, SourceProperties};

use super::ResamplerConfig;

/// A function that reduces a non-empty window of relevant samples to a
/// single value. Receives the resampler's config and the source's current
/// properties so more elaborate functions (e.g. extrapolation) can use the
/// inferred input period.
pub type ResamplingFunction = fn(&[Sample], &ResamplerConfig, &SourceProperties) -> Option<f64>;

/// Arithmetic mean of the non-`None` values in `samples`.
///
/// # Panics
///
/// Panics if `samples` is empty; callers only invoke a resampling function
/// over a non-empty relevant window.
pub fn average(samples: &[Sample], _config: &ResamplerConfig, _props: &SourceProperties) -> Option<f64> {
    assert!(!samples.is_empty(), "average cannot be given an empty list of samples");
    let values: Vec<f64> = samples.iter().filter_map(|s| s.value).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config() -> ResamplerConfig {
        ResamplerConfig::new(1.0).unwrap()
    }

    #[test]
    fn averages_non_none_values() {
        let now = Utc::now();
        let samples = vec![
            Sample::new(now, Some(10.0)),
            Sample::new(now, Some(20.0)),
            Sample::new(now, None),
        ];
        let props = SourceProperties::default();
        let result = average(&samples, &config(), &props);
        assert_eq!(result, Some(15.0));
    }

    #[test]
    fn all_none_window_yields_none() {
        let now = Utc::now();
        let samples = vec![Sample::new(now, None)];
        let props = SourceProperties::default();
        assert_eq!(average(&samples, &config(), &props), None);
    }
}
