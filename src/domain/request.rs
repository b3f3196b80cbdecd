#![allow(dead_code)]
use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{BatteryId, Power};

/// A request to set a given real-power setpoint across a set of batteries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub batteries: BTreeSet<BatteryId>,
    pub power: Power,
    #[serde(with = "duration_as_secs_f64")]
    pub request_timeout: Duration,
    pub adjust_power: bool,
}

impl Request {
    pub fn new(
        batteries: impl IntoIterator<Item = BatteryId>,
        power: Power,
        request_timeout: Duration,
        adjust_power: bool,
    ) -> Self {
        Self {
            batteries: batteries.into_iter().collect(),
            power,
            request_timeout,
            adjust_power,
        }
    }

    /// Two requests "overlap" when they share at least one battery but are
    /// not for the identical set.
    pub fn overlaps(&self, other: &Request) -> bool {
        self.batteries != other.batteries && !self.batteries.is_disjoint(&other.batteries)
    }

    /// Two requests target the exact same battery set — a later one
    /// supersedes an earlier one still in flight.
    pub fn targets_same_batteries(&self, other: &Request) -> bool {
        self.batteries == other.batteries
    }
}

mod duration_as_secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(batteries: &[BatteryId]) -> Request {
        Request::new(
            batteries.iter().copied(),
            Power::watts(100.0),
            Duration::from_millis(500),
            false,
        )
    }

    #[test]
    fn identical_sets_not_overlapping() {
        let a = req(&[1, 2]);
        let b = req(&[1, 2]);
        assert!(!a.overlaps(&b));
        assert!(a.targets_same_batteries(&b));
    }

    #[test]
    fn partial_overlap_detected() {
        let a = req(&[1, 2]);
        let b = req(&[2, 3]);
        assert!(a.overlaps(&b));
        assert!(!a.targets_same_batteries(&b));
    }

    #[test]
    fn disjoint_sets_not_overlapping() {
        let a = req(&[1, 2]);
        let b = req(&[3, 4]);
        assert!(!a.overlaps(&b));
    }
}
