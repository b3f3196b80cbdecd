//! Shared data model (spec.md §3): power quantities, device telemetry,
//! requests and results, and timeseries samples.

pub mod battery;
pub mod component;
pub mod inverter;
pub mod request;
pub mod result;
pub mod sample;
pub mod types;

pub use battery::{AggregatedBatteryData, BatteryTelemetry};
pub use component::{Component, ComponentCategory};
pub use inverter::InverterTelemetry;
pub use request::Request;
pub use result::RequestOutcome;
pub use sample::{Sample, SourceProperties};
pub use types::{approx_eq, is_close_to_zero, BatteryId, InverterId, Power, PowerBounds};
