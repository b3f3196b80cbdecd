//! Device Data Cache (spec.md §4.2).
//!
//! Per-device, single-slot "peek" caches for the latest telemetry sample of
//! each battery and inverter referenced by the topology. A dedicated
//! background task per device writes into the slot; readers never block on
//! the underlying stream.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::{BatteryId, BatteryTelemetry, InverterId, InverterTelemetry};
use crate::rpc::DeviceApiClient;
use crate::topology::TopologyIndex;

/// A single-slot, non-blocking, non-consuming cache for the latest value
/// of type `T`. Writes replace the slot atomically; reads clone it out
/// without taking the writer's place in line.
#[derive(Debug, Clone)]
struct PeekSlot<T> {
    slot: Arc<RwLock<Option<T>>>,
}

impl<T: Clone> PeekSlot<T> {
    fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
        }
    }

    fn store(&self, value: T) {
        *self.slot.write() = Some(value);
    }

    fn peek(&self) -> Option<T> {
        self.slot.read().clone()
    }
}

/// Device telemetry caches, populated by background subscription tasks
/// started in [`DeviceDataCache::start`].
pub struct DeviceDataCache {
    battery_slots: HashMap<BatteryId, PeekSlot<BatteryTelemetry>>,
    inverter_slots: HashMap<InverterId, PeekSlot<InverterTelemetry>>,
    tasks: RwLock<Vec<JoinHandle<()>>>,
}

impl DeviceDataCache {
    /// Subscribe to every battery and inverter referenced by `topology` and
    /// start one background ingestion task per device.
    pub async fn start(api: Arc<dyn DeviceApiClient>, topology: &TopologyIndex) -> Self {
        let mut battery_slots = HashMap::new();
        let mut inverter_slots = HashMap::new();
        let mut tasks = Vec::new();

        let mut inverter_ids = std::collections::HashSet::new();
        for battery_id in topology.all_batteries() {
            let slot = PeekSlot::new();
            battery_slots.insert(battery_id, slot.clone());

            let mut stream = api.battery_data(battery_id).await;
            let task_slot = slot;
            tasks.push(tokio::spawn(async move {
                while let Some(sample) = stream.next().await {
                    debug!(battery = battery_id, "received battery telemetry");
                    task_slot.store(sample);
                }
            }));

            inverter_ids.extend(topology.bat_invs(battery_id));
        }

        for inverter_id in inverter_ids {
            let slot = PeekSlot::new();
            inverter_slots.insert(inverter_id, slot.clone());

            let mut stream = api.inverter_data(inverter_id).await;
            let task_slot = slot;
            tasks.push(tokio::spawn(async move {
                while let Some(sample) = stream.next().await {
                    debug!(inverter = inverter_id, "received inverter telemetry");
                    task_slot.store(sample);
                }
            }));
        }

        Self {
            battery_slots,
            inverter_slots,
            tasks: RwLock::new(tasks),
        }
    }

    pub fn peek_battery(&self, id: BatteryId) -> Option<BatteryTelemetry> {
        self.battery_slots.get(&id)?.peek()
    }

    pub fn peek_inverter(&self, id: InverterId) -> Option<InverterTelemetry> {
        self.inverter_slots.get(&id)?.peek()
    }

    pub fn knows_battery(&self, id: BatteryId) -> bool {
        self.battery_slots.contains_key(&id)
    }

    /// Tear down all background subscription tasks.
    pub async fn stop(&self) {
        let tasks = std::mem::take(&mut *self.tasks.write());
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PowerBounds;
    use crate::rpc::{RpcError, TelemetryStream};
    use async_trait::async_trait;
    use chrono::Utc;
    use futures::stream;
    use std::collections::HashMap as StdHashMap;

    struct FakeApi {
        battery_samples: StdHashMap<BatteryId, Vec<BatteryTelemetry>>,
    }

    #[async_trait]
    impl DeviceApiClient for FakeApi {
        async fn set_power(&self, _inverter_id: InverterId, _watts: f64) -> Result<(), RpcError> {
            Ok(())
        }

        async fn battery_data(&self, battery_id: BatteryId) -> TelemetryStream<BatteryTelemetry> {
            let samples = self.battery_samples.get(&battery_id).cloned().unwrap_or_default();
            Box::pin(stream::iter(samples))
        }

        async fn inverter_data(&self, _inverter_id: InverterId) -> TelemetryStream<InverterTelemetry> {
            Box::pin(stream::empty())
        }
    }

    fn telemetry(soc: f64) -> BatteryTelemetry {
        BatteryTelemetry {
            soc,
            soc_lower_bound: 0.0,
            soc_upper_bound: 100.0,
            capacity_wh: 1000.0,
            power_bounds: PowerBounds::symmetric(500.0),
            timestamp: Utc::now(),
        }
    }

    struct EmptyGraph;
    impl crate::topology::ComponentGraph for EmptyGraph {
        fn predecessors(&self, _id: u64) -> Vec<crate::domain::Component> {
            vec![crate::domain::Component::inverter(10)]
        }
        fn successors(&self, _id: u64) -> Vec<crate::domain::Component> {
            vec![crate::domain::Component::battery(1)]
        }
    }

    #[tokio::test]
    async fn peek_returns_latest_sample() {
        let mut samples = StdHashMap::new();
        samples.insert(1u64, vec![telemetry(10.0), telemetry(20.0)]);
        let api: Arc<dyn DeviceApiClient> = Arc::new(FakeApi {
            battery_samples: samples,
        });

        let topology = TopologyIndex::build(&EmptyGraph, [1]);
        let cache = DeviceDataCache::start(api, &topology).await;

        // Give the background task a chance to drain the finite stream.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let latest = cache.peek_battery(1).expect("sample expected");
        assert_eq!(latest.soc, 20.0);
        assert!(cache.peek_battery(99).is_none());

        cache.stop().await;
    }
}
