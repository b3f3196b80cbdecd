//! Power Distributor orchestrator (spec.md §4.4).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, warn};

use crate::cache::DeviceDataCache;
use crate::domain::{
    AggregatedBatteryData, BatteryId, BatteryTelemetry, InverterId, InverterTelemetry, Power, Request, RequestOutcome,
};
use crate::health::HealthTracker;
use crate::rpc::DeviceApiClient;
use crate::topology::{ComponentGraph, TopologyIndex};

use super::{pool_bounds, DistributionAlgorithm, InvBatPair};

/// One surviving equivalence class: the aggregated battery/inverter pair
/// plus the original battery IDs it was built from (needed to classify
/// per-device dispatch outcomes back onto batteries).
struct Snapshot {
    batteries: BTreeSet<BatteryId>,
    pair: InvBatPair,
}

/// Orchestrates request processing: validates, distributes, dispatches,
/// classifies, and reports (spec.md §4.4 steps 1-9).
pub struct PowerDistributor {
    api: Arc<dyn DeviceApiClient>,
    topology: TopologyIndex,
    cache: DeviceDataCache,
    health: Arc<dyn HealthTracker>,
    algorithm: DistributionAlgorithm,
    queue: Mutex<VecDeque<Request>>,
    queue_notify: Notify,
}

impl PowerDistributor {
    /// Build the topology, start the device data cache, and sleep
    /// `wait_for_data_sec` to give background subscriptions a chance to
    /// populate before the first request is processed.
    pub async fn start(
        api: Arc<dyn DeviceApiClient>,
        graph: &dyn ComponentGraph,
        batteries: impl IntoIterator<Item = BatteryId>,
        health: Arc<dyn HealthTracker>,
        algorithm: DistributionAlgorithm,
        wait_for_data_sec: f64,
    ) -> Self {
        let topology = TopologyIndex::build(graph, batteries);
        let cache = DeviceDataCache::start(api.clone(), &topology).await;

        if wait_for_data_sec > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(wait_for_data_sec)).await;
        }

        Self {
            api,
            topology,
            cache,
            health,
            algorithm,
            queue: Mutex::new(VecDeque::new()),
            queue_notify: Notify::new(),
        }
    }

    /// Enqueue a request for processing. A request targeting the exact
    /// same battery set as one already queued (but not yet dispatched)
    /// supersedes it: the superseded request is reported as `Ignored`
    /// immediately (spec.md §4.4 "Duplicate/overlapping requests").
    pub async fn submit(&self, request: Request, results: &mpsc::Sender<RequestOutcome>) {
        let superseded = {
            let mut queue = self.queue.lock();
            let displaced = queue
                .iter()
                .position(|queued| queued.targets_same_batteries(&request))
                .map(|idx| queue.remove(idx).unwrap());

            for queued in queue.iter() {
                if queued.overlaps(&request) {
                    warn!("overlapping requests queued for non-identical battery sets");
                }
            }

            queue.push_back(request);
            displaced
        };
        self.queue_notify.notify_one();

        if let Some(displaced) = superseded {
            let _ = results.send(RequestOutcome::Ignored { request: displaced }).await;
        }
    }

    /// Run the FIFO processing loop until the request stream ends.
    ///
    /// Requests are drained from an external source into the internal
    /// coalescing queue, then popped and processed strictly one at a time.
    pub async fn run(
        self: Arc<Self>,
        mut requests: impl futures_util::Stream<Item = Request> + Unpin + Send,
        results: mpsc::Sender<RequestOutcome>,
    ) {
        let ingest = {
            let this = self.clone();
            let results = results.clone();
            tokio::spawn(async move {
                while let Some(request) = requests.next().await {
                    this.submit(request, &results).await;
                }
            })
        };

        loop {
            let next = {
                let mut queue = self.queue.lock();
                queue.pop_front()
            };

            let request = match next {
                Some(request) => request,
                None => {
                    if ingest.is_finished() && self.queue.lock().is_empty() {
                        break;
                    }
                    self.queue_notify.notified().await;
                    continue;
                }
            };

            let outcome = self.process(request).await;
            if results.send(outcome).await.is_err() {
                break;
            }
        }

        let _ = ingest.await;
    }

    /// Process a single request through validation, distribution,
    /// dispatch, and classification (spec.md §4.4 steps 1-8).
    async fn process(&self, request: Request) -> RequestOutcome {
        if let Some(unknown) = request.batteries.iter().find(|&&b| !self.cache.knows_battery(b)) {
            error!(battery = unknown, "unknown battery in request");
            return RequestOutcome::Error {
                request,
                message: format!("No battery with ID {unknown}"),
            };
        }

        let working = self.health.get_working_batteries(&request.batteries).await;

        let connected_inverters = self.topology.connected_inverters(working.iter().copied());
        let implied_batteries = self.topology.implied_batteries(connected_inverters);
        if implied_batteries != request.batteries {
            warn!(
                requested = request.batteries.len(),
                implied = implied_batteries.len(),
                "request affects batteries beyond the ones requested via shared inverters"
            );
        }

        let snapshots = self.build_snapshot(&working);
        if snapshots.is_empty() {
            return RequestOutcome::Error {
                request,
                message: "no usable telemetry for any requested battery".to_string(),
            };
        }

        let pairs: Vec<InvBatPair> = snapshots.iter().map(|s| s.pair.clone()).collect();
        let bounds = pool_bounds(&pairs);

        if !request.power.is_close_to_zero() {
            let rejected = if request.adjust_power {
                bounds.in_deadband(request.power.as_watts())
            } else {
                !bounds.admits(request.power.as_watts())
            };
            if rejected {
                return RequestOutcome::OutOfBounds { request, bounds };
            }
        }

        let distributed = match self.algorithm.distribute(request.power.as_watts(), &pairs) {
            Ok(d) => d,
            Err(e) => {
                return RequestOutcome::Error {
                    request,
                    message: format!("Couldn't distribute power: {e}"),
                }
            }
        };

        let snapshot_batteries: BTreeSet<BatteryId> = snapshots.iter().flat_map(|s| s.batteries.iter().copied()).collect();

        let dispatch = self.dispatch(&distributed.per_inverter, request.request_timeout).await;

        let mut failed_batteries: BTreeSet<BatteryId> = BTreeSet::new();
        let mut failed_power = 0.0;
        let mut succeeded_power = 0.0;

        for (inverter_id, watts) in &distributed.per_inverter {
            let affected: BTreeSet<BatteryId> = self
                .topology
                .inv_bats(*inverter_id)
                .into_iter()
                .filter(|b| snapshot_batteries.contains(b))
                .collect();

            match dispatch.get(inverter_id) {
                Some(DispatchOutcome::Success) => succeeded_power += watts,
                Some(DispatchOutcome::OutOfRange) => {
                    debug!(inverter = inverter_id, "device declined setpoint as out of range");
                    failed_power += watts;
                    failed_batteries.extend(affected);
                }
                Some(DispatchOutcome::Failed) | Some(DispatchOutcome::TimedOut) | None => {
                    warn!(inverter = inverter_id, "marking broken");
                    failed_power += watts;
                    failed_batteries.extend(affected);
                }
            }
        }

        let succeeded_batteries: BTreeSet<BatteryId> =
            snapshot_batteries.difference(&failed_batteries).copied().collect();

        let outcome = if failed_batteries.is_empty() {
            RequestOutcome::Success {
                request: request.clone(),
                succeeded_power: Power::watts(succeeded_power),
                succeeded_batteries: succeeded_batteries.clone(),
                excess_power: Power::watts(distributed.remaining_watts),
            }
        } else {
            RequestOutcome::PartialFailure {
                request: request.clone(),
                succeeded_power: Power::watts(succeeded_power),
                succeeded_batteries: succeeded_batteries.clone(),
                failed_power: Power::watts(failed_power),
                failed_batteries: failed_batteries.clone(),
                excess_power: Power::watts(distributed.remaining_watts),
            }
        };

        self.health.update_status(succeeded_batteries, failed_batteries).await;
        outcome
    }

    /// Partition `working` batteries into equivalence classes that share
    /// at least one inverter, read the latest telemetry from the cache,
    /// and skip any class with missing or NaN-poisoned members
    /// (spec.md §4.4 step 3).
    fn build_snapshot(&self, working: &HashSet<BatteryId>) -> Vec<Snapshot> {
        let mut seen: HashSet<BatteryId> = HashSet::new();
        let mut snapshots = Vec::new();

        for &battery_id in working {
            if seen.contains(&battery_id) {
                continue;
            }

            let class: BTreeSet<BatteryId> = self
                .topology
                .bat_bats(battery_id)
                .into_iter()
                .filter(|b| working.contains(b))
                .collect();
            seen.extend(class.iter().copied());

            let telemetries: Option<Vec<BatteryTelemetry>> = class
                .iter()
                .map(|&b| self.cache.peek_battery(b).filter(|t| !t.has_crucial_nan()))
                .collect();

            let Some(telemetries) = telemetries else {
                debug!(?class, "skipping equivalence class with missing/NaN battery telemetry");
                continue;
            };
            if telemetries.is_empty() {
                continue;
            }

            let inverter_ids: HashSet<InverterId> = self.topology.connected_inverters(class.iter().copied());
            let inverters: Option<Vec<(InverterId, InverterTelemetry)>> = inverter_ids
                .iter()
                .map(|&id| {
                    self.cache
                        .peek_inverter(id)
                        .filter(|t| !t.has_crucial_nan())
                        .map(|t| (id, t))
                })
                .collect();

            let Some(inverters) = inverters else {
                debug!(?class, "skipping equivalence class with missing/NaN inverter telemetry");
                continue;
            };
            if inverters.is_empty() {
                continue;
            }

            let battery = AggregatedBatteryData::aggregate(&telemetries);
            snapshots.push(Snapshot {
                batteries: class,
                pair: InvBatPair::new(battery, inverters),
            });
        }

        snapshots
    }

    /// Fan out `set_power` calls concurrently, bounded by an absolute
    /// deadline. Calls still pending at the deadline are aborted and
    /// classified as timed out (spec.md §4.4 step 6).
    async fn dispatch(
        &self,
        per_inverter: &HashMap<InverterId, f64>,
        timeout: Duration,
    ) -> HashMap<InverterId, DispatchOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;

        let handles: Vec<(InverterId, tokio::task::JoinHandle<Result<(), crate::rpc::RpcError>>)> = per_inverter
            .iter()
            .map(|(&inverter_id, &watts)| {
                let api = self.api.clone();
                (inverter_id, tokio::spawn(async move { api.set_power(inverter_id, watts).await }))
            })
            .collect();

        let mut outcomes = HashMap::new();
        for (inverter_id, mut handle) in handles {
            let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => DispatchOutcome::Success,
                Ok(Ok(Err(e))) if e.is_out_of_range() => DispatchOutcome::OutOfRange,
                Ok(Ok(Err(_))) => DispatchOutcome::Failed,
                Ok(Err(_)) => DispatchOutcome::Failed,
                Err(_) => {
                    // Cancel and await the task's actual termination before
                    // classifying, matching the original's cancel-then-gather.
                    handle.abort();
                    let _ = handle.await;
                    DispatchOutcome::TimedOut
                }
            };
            outcomes.insert(inverter_id, outcome);
        }
        outcomes
    }

    /// Tear down the device data cache's background subscription tasks.
    pub async fn stop(&self) {
        self.cache.stop().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchOutcome {
    Success,
    OutOfRange,
    Failed,
    TimedOut,
}
