//! Battery-health/status tracker (spec.md §6, consumed external interface).
//!
//! A direct translation of the blocking-duration policy in spec.md §6 is
//! shipped as [`BatteryPoolStatus`] so the distributor's own test suite
//! doesn't need a hand-rolled mock for every test.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::info;

use crate::domain::BatteryId;

/// A battery health transition, published on the status channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub battery_id: BatteryId,
    pub working: bool,
}

/// The health tracker interface consumed by the Power Distributor.
#[async_trait]
pub trait HealthTracker: Send + Sync {
    /// Of the given batteries, which are currently considered working.
    async fn get_working_batteries(&self, batteries: &HashSet<BatteryId>) -> HashSet<BatteryId>;

    /// Report which batteries succeeded and which failed on the most
    /// recent dispatch. Concurrent-safe: may be called while another
    /// request's classification is in flight.
    async fn update_status(&self, succeeded: HashSet<BatteryId>, failed: HashSet<BatteryId>);
}

/// Reference implementation of the health tracker: a battery that failed
/// is excluded from "working" for `blocking_duration`, after which it is
/// eligible again (the distributor's next request will simply find out if
/// it's still broken).
pub struct BatteryPoolStatus {
    blocking_duration: Duration,
    last_failure: Mutex<HashMap<BatteryId, Instant>>,
    status_sender: Option<mpsc::Sender<ComponentStatus>>,
}

impl BatteryPoolStatus {
    pub fn new(blocking_duration: Duration, status_sender: Option<mpsc::Sender<ComponentStatus>>) -> Self {
        Self {
            blocking_duration,
            last_failure: Mutex::new(HashMap::new()),
            status_sender,
        }
    }

    fn is_blocked(&self, battery_id: BatteryId, now: Instant) -> bool {
        match self.last_failure.lock().get(&battery_id) {
            Some(&failed_at) => now.duration_since(failed_at) < self.blocking_duration,
            None => false,
        }
    }

    fn publish(&self, battery_id: BatteryId, working: bool) {
        if let Some(sender) = &self.status_sender {
            let _ = sender.try_send(ComponentStatus { battery_id, working });
        }
    }
}

#[async_trait]
impl HealthTracker for BatteryPoolStatus {
    async fn get_working_batteries(&self, batteries: &HashSet<BatteryId>) -> HashSet<BatteryId> {
        let now = Instant::now();
        batteries
            .iter()
            .filter(|&&id| !self.is_blocked(id, now))
            .copied()
            .collect()
    }

    async fn update_status(&self, succeeded: HashSet<BatteryId>, failed: HashSet<BatteryId>) {
        let now = Instant::now();
        let mut map = self.last_failure.lock();
        for battery_id in &failed {
            map.insert(*battery_id, now);
        }
        for battery_id in &succeeded {
            map.remove(battery_id);
        }
        drop(map);

        for battery_id in &failed {
            info!(battery = battery_id, "marking battery broken");
            self.publish(*battery_id, false);
        }
        for battery_id in &succeeded {
            self.publish(*battery_id, true);
        }
    }
}

/// Convenience constructor matching spec.md §6's "blocking duration +
/// status channel" constructor shape, wrapped for shared ownership.
pub fn shared_pool_status(
    blocking_duration: Duration,
    status_sender: Option<mpsc::Sender<ComponentStatus>>,
) -> Arc<dyn HealthTracker> {
    Arc::new(BatteryPoolStatus::new(blocking_duration, status_sender))
}
