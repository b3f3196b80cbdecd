//! Black-box scenarios for the Power Distributor driven entirely through
//! its public API (spec.md §8).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use microgrid_core::distribution::{DistributionAlgorithm, PowerDistributor};
use microgrid_core::domain::{
    BatteryId, BatteryTelemetry, Component, InverterId, InverterTelemetry, Power, PowerBounds, Request,
    RequestOutcome,
};
use microgrid_core::health::BatteryPoolStatus;
use microgrid_core::rpc::{DeviceApiClient, RpcError, TelemetryStream};
use microgrid_core::topology::ComponentGraph;
use parking_lot::Mutex;
use tokio::sync::mpsc;

struct TwoBatteryGraph;
impl ComponentGraph for TwoBatteryGraph {
    fn predecessors(&self, id: u64) -> Vec<Component> {
        match id {
            1 => vec![Component::inverter(10)],
            2 => vec![Component::inverter(20)],
            _ => vec![],
        }
    }
    fn successors(&self, id: u64) -> Vec<Component> {
        match id {
            10 => vec![Component::battery(1)],
            20 => vec![Component::battery(2)],
            _ => vec![],
        }
    }
}

struct StaticApi {
    socs: HashMap<BatteryId, f64>,
    bounds: HashMap<InverterId, PowerBounds>,
    calls: Arc<Mutex<Vec<(InverterId, f64)>>>,
}

#[async_trait]
impl DeviceApiClient for StaticApi {
    async fn set_power(&self, inverter_id: InverterId, watts: f64) -> Result<(), RpcError> {
        self.calls.lock().push((inverter_id, watts));
        Ok(())
    }

    async fn battery_data(&self, battery_id: BatteryId) -> TelemetryStream<BatteryTelemetry> {
        let soc = *self.socs.get(&battery_id).unwrap_or(&50.0);
        let sample = BatteryTelemetry {
            soc,
            soc_lower_bound: 0.0,
            soc_upper_bound: 100.0,
            capacity_wh: 1000.0,
            power_bounds: PowerBounds::symmetric(5000.0),
            timestamp: Utc::now(),
        };
        Box::pin(stream::iter(vec![sample]))
    }

    async fn inverter_data(&self, inverter_id: InverterId) -> TelemetryStream<InverterTelemetry> {
        let bounds = *self.bounds.get(&inverter_id).unwrap_or(&PowerBounds::symmetric(5000.0));
        let sample = InverterTelemetry {
            active_power_bounds: bounds,
            timestamp: Utc::now(),
        };
        Box::pin(stream::iter(vec![sample]))
    }
}

fn req(batteries: &[BatteryId], watts: f64) -> Request {
    Request::new(batteries.iter().copied(), Power::watts(watts), Duration::from_millis(500), false)
}

async fn run_single(api: Arc<StaticApi>, request: Request) -> RequestOutcome {
    let health = Arc::new(BatteryPoolStatus::new(Duration::from_secs(30), None));
    let distributor = Arc::new(
        PowerDistributor::start(api, &TwoBatteryGraph, [1, 2], health, DistributionAlgorithm::default(), 0.0).await,
    );

    let (tx, mut rx) = mpsc::channel(8);
    let requests = stream::iter(vec![request]);
    tokio::spawn(distributor.clone().run(requests, tx));
    rx.recv().await.unwrap()
}

/// Scenario 2 (spec.md §8): unequal SoC charges the emptier battery harder.
#[tokio::test]
async fn soc_weighted_split_end_to_end() {
    let mut socs = HashMap::new();
    socs.insert(1, 20.0);
    socs.insert(2, 80.0);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let api = Arc::new(StaticApi {
        socs,
        bounds: HashMap::new(),
        calls: calls.clone(),
    });

    let outcome = run_single(api, req(&[1, 2], 600.0)).await;
    assert!(matches!(outcome, RequestOutcome::Success { .. }));

    let mut calls = calls.lock().clone();
    calls.sort_by_key(|(id, _)| *id);
    assert!((calls[0].1 - 480.0).abs() < 1e-6, "battery 1 (emptier) should take the bigger share");
    assert!((calls[1].1 - 120.0).abs() < 1e-6);
}

/// Scenario 3: one inverter's bound saturates and the remainder is
/// redistributed onto the other inverter.
#[tokio::test]
async fn clamp_and_redistribute_end_to_end() {
    let mut socs = HashMap::new();
    socs.insert(1, 50.0);
    socs.insert(2, 50.0);
    let mut bounds = HashMap::new();
    bounds.insert(10, PowerBounds::new(-100.0, 0.0, 0.0, 100.0));
    bounds.insert(20, PowerBounds::new(-500.0, 0.0, 0.0, 500.0));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let api = Arc::new(StaticApi {
        socs,
        bounds,
        calls: calls.clone(),
    });

    let outcome = run_single(api, req(&[1, 2], 500.0)).await;
    match outcome {
        RequestOutcome::Success { excess_power, .. } => assert!(excess_power.as_watts().abs() < 1e-6),
        other => panic!("expected Success, got {other:?}"),
    }

    let mut calls = calls.lock().clone();
    calls.sort_by_key(|(id, _)| *id);
    assert!((calls[0].1 - 100.0).abs() < 1e-6);
    assert!((calls[1].1 - 400.0).abs() < 1e-6);
}

/// Invariant 3 (spec.md §8): a zero-power request is never rejected as
/// `OutOfBounds`, even when the pool's deadband would reject any nonzero
/// value in the same range.
#[tokio::test]
async fn zero_power_request_is_never_out_of_bounds() {
    let mut socs = HashMap::new();
    socs.insert(1, 50.0);
    socs.insert(2, 50.0);
    let mut bounds = HashMap::new();
    bounds.insert(10, PowerBounds::new(-1000.0, -50.0, 50.0, 1000.0));
    bounds.insert(20, PowerBounds::new(-1000.0, -50.0, 50.0, 1000.0));
    let api = Arc::new(StaticApi {
        socs,
        bounds,
        calls: Arc::new(Mutex::new(Vec::new())),
    });

    let outcome = run_single(api, req(&[1, 2], 0.0)).await;
    assert!(!matches!(outcome, RequestOutcome::OutOfBounds { .. }));
}

/// Invariant 7: a dispatch with no failed batteries must be reported as
/// `Success`, never `PartialFailure`.
#[tokio::test]
async fn all_batteries_succeeding_yields_success_not_partial_failure() {
    let mut socs = HashMap::new();
    socs.insert(1, 50.0);
    socs.insert(2, 50.0);
    let api = Arc::new(StaticApi {
        socs,
        bounds: HashMap::new(),
        calls: Arc::new(Mutex::new(Vec::new())),
    });

    let outcome = run_single(api, req(&[1, 2], 400.0)).await;
    match outcome {
        RequestOutcome::Success { succeeded_batteries, .. } => {
            assert_eq!(succeeded_batteries, BTreeSet::from([1, 2]));
        }
        other => panic!("expected Success, got {other:?}"),
    }
}

/// Invariant 6: exactly one result is emitted per request, and it echoes
/// the request it was computed from.
#[tokio::test]
async fn exactly_one_result_per_request() {
    let mut socs = HashMap::new();
    socs.insert(1, 50.0);
    socs.insert(2, 50.0);
    let api = Arc::new(StaticApi {
        socs,
        bounds: HashMap::new(),
        calls: Arc::new(Mutex::new(Vec::new())),
    });
    let health = Arc::new(BatteryPoolStatus::new(Duration::from_secs(30), None));
    let distributor = Arc::new(
        PowerDistributor::start(api, &TwoBatteryGraph, [1, 2], health, DistributionAlgorithm::default(), 0.0).await,
    );

    let sent = req(&[1, 2], 400.0);
    let (tx, mut rx) = mpsc::channel(8);
    let requests = stream::iter(vec![sent.clone()]);
    tokio::spawn(distributor.clone().run(requests, tx));

    let outcome = rx.recv().await.unwrap();
    assert_eq!(outcome.request(), &sent);
    assert!(tokio::time::timeout(Duration::from_millis(100), rx.recv()).await.unwrap().is_none());
}
