//! Device RPC client (spec.md §6, consumed external interface).
//!
//! The actual microgrid API client lives outside this crate; we only
//! depend on this trait so the distributor can be driven in tests (and so
//! a real client only needs to implement three methods to plug in).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::domain::{BatteryId, BatteryTelemetry, InverterId, InverterTelemetry};

pub type TelemetryStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Error returned by a `set_power` call.
///
/// `OutOfRange` is a benign refusal by the device (the setpoint landed
/// somewhere the device itself won't accept) and is classified separately
/// from any other transport/protocol error, which is treated as the device
/// being unhealthy (spec.md §4.4 step 7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl RpcError {
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, RpcError::OutOfRange(_))
    }
}

/// The microgrid device RPC client (spec.md §6).
#[async_trait]
pub trait DeviceApiClient: Send + Sync {
    async fn set_power(&self, inverter_id: InverterId, watts: f64) -> Result<(), RpcError>;

    async fn battery_data(&self, battery_id: BatteryId) -> TelemetryStream<BatteryTelemetry>;

    async fn inverter_data(&self, inverter_id: InverterId) -> TelemetryStream<InverterTelemetry>;
}
