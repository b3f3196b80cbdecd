#![allow(dead_code)]
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level configuration for a Power Distributor instance.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DistributorConfig {
    /// Exponent applied to each pair's headroom weight before
    /// normalization (spec.md §4.3). `1.0` is a linear, proportional
    /// split; values above `1.0` favor batteries with more headroom more
    /// aggressively.
    #[serde(default = "default_power_distributor_exponent")]
    #[validate(range(min = 0.0))]
    pub power_distributor_exponent: f64,

    /// How long to sleep after starting the device data cache before
    /// processing the first request, giving background subscriptions a
    /// chance to populate (spec.md §9, supplemented from the upstream
    /// actor's startup grace period).
    #[serde(default = "default_wait_for_data_sec")]
    #[validate(range(min = 0.0))]
    pub wait_for_data_sec: f64,

    /// How long a battery stays excluded from the working set after a
    /// dispatch failure (spec.md §6 "blocking duration").
    #[serde(default = "default_blocking_duration_sec")]
    #[validate(range(min = 0.0))]
    pub blocking_duration_sec: f64,
}

fn default_power_distributor_exponent() -> f64 {
    1.0
}

fn default_wait_for_data_sec() -> f64 {
    2.0
}

fn default_blocking_duration_sec() -> f64 {
    30.0
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            power_distributor_exponent: default_power_distributor_exponent(),
            wait_for_data_sec: default_wait_for_data_sec(),
            blocking_duration_sec: default_blocking_duration_sec(),
        }
    }
}

impl DistributorConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Configuration is loaded in this order (later overrides earlier):
    /// 1. `config/default.toml` (base configuration)
    /// 2. `config/<environment>.toml`, if an environment is given
    /// 3. Environment variables with a `MICROGRID__` prefix
    ///    (`MICROGRID__WAIT_FOR_DATA_SEC` -> `wait_for_data_sec`)
    pub fn load(environment: Option<&str>) -> Result<Self> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(Self::default()))
            .merge(Toml::file("config/default.toml"));

        if let Some(env) = environment {
            figment = figment.merge(Toml::file(format!("config/{env}.toml")));
        }

        figment = figment.merge(Env::prefixed("MICROGRID__").split("__"));

        let config: Self = figment.extract().context("failed to parse distributor configuration")?;
        config.validate().context("distributor configuration validation failed")?;
        Ok(config)
    }
}
