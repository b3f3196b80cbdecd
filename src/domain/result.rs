#![allow(dead_code)]
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::request::Request;
use super::types::{BatteryId, Power, PowerBounds};

/// The outcome of processing a single [`Request`].
///
/// Exactly one `Result` is emitted per `Request` that enters the
/// distributor (see the invariant in spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RequestOutcome {
    Success {
        request: Request,
        succeeded_power: Power,
        succeeded_batteries: BTreeSet<BatteryId>,
        excess_power: Power,
    },
    PartialFailure {
        request: Request,
        succeeded_power: Power,
        succeeded_batteries: BTreeSet<BatteryId>,
        failed_power: Power,
        failed_batteries: BTreeSet<BatteryId>,
        excess_power: Power,
    },
    OutOfBounds {
        request: Request,
        bounds: PowerBounds,
    },
    Error {
        request: Request,
        message: String,
    },
    /// A request superseded by a more recent request for the identical
    /// battery set before it could be processed. See spec.md §4.4
    /// "Duplicate/overlapping requests" and the open question in §9 about
    /// whether `IGNORED` should be exposed — we expose it since the
    /// coalescing queue in [`crate::distribution::distributor`] makes the
    /// case concrete.
    Ignored { request: Request },
}

impl RequestOutcome {
    pub fn request(&self) -> &Request {
        match self {
            Self::Success { request, .. }
            | Self::PartialFailure { request, .. }
            | Self::OutOfBounds { request, .. }
            | Self::Error { request, .. }
            | Self::Ignored { request, .. } => request,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_partial_failure(&self) -> bool {
        matches!(self, Self::PartialFailure { .. })
    }
}
