#![allow(dead_code)]
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::types::{BatteryId, InverterId};

/// The category of a node in the component graph.
///
/// The graph itself (what feeds what) is an external collaborator — see
/// [`crate::topology::ComponentGraph`] — this is just the label attached to
/// each node that lets us tell batteries from inverters from everything
/// else in the microgrid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
pub enum ComponentCategory {
    #[strum(serialize = "battery")]
    Battery,
    #[strum(serialize = "inverter")]
    Inverter,
    #[strum(serialize = "grid")]
    Grid,
    #[strum(serialize = "meter")]
    Meter,
    #[strum(serialize = "other")]
    Other,
}

/// A node in the component graph, as returned by `predecessors`/`successors`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Component {
    pub id: u64,
    pub category: ComponentCategory,
}

impl Component {
    pub fn battery(id: BatteryId) -> Self {
        Self {
            id,
            category: ComponentCategory::Battery,
        }
    }

    pub fn inverter(id: InverterId) -> Self {
        Self {
            id,
            category: ComponentCategory::Inverter,
        }
    }
}
