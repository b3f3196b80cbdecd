//! Topology Index (spec.md §4.1).
//!
//! Static maps derived once from the component graph, immutable for the
//! lifetime of the distributor.

use std::collections::{HashMap, HashSet};

use tracing::error;

use crate::domain::{BatteryId, Component, ComponentCategory, InverterId};

/// The component graph — an external collaborator (spec.md §1, §6). This
/// crate only consumes `predecessors`/`successors`; discovering the graph
/// itself is out of scope.
pub trait ComponentGraph: Send + Sync {
    /// Components that feed into `id` (e.g. the inverters behind a
    /// battery).
    fn predecessors(&self, id: u64) -> Vec<Component>;

    /// Components fed by `id` (e.g. the batteries behind an inverter).
    fn successors(&self, id: u64) -> Vec<Component>;
}

/// Immutable battery/inverter adjacency maps, built once at construction
/// time (spec.md §4.1).
#[derive(Debug, Clone, Default)]
pub struct TopologyIndex {
    bat_invs: HashMap<BatteryId, HashSet<InverterId>>,
    inv_bats: HashMap<InverterId, HashSet<BatteryId>>,
    bat_bats: HashMap<BatteryId, HashSet<BatteryId>>,
    inv_invs: HashMap<InverterId, HashSet<InverterId>>,
}

impl TopologyIndex {
    /// Build the index for the given batteries using the component graph.
    ///
    /// A battery with no adjacent inverters is logged and skipped — it
    /// never appears in any of the resulting maps.
    pub fn build(graph: &dyn ComponentGraph, batteries: impl IntoIterator<Item = BatteryId>) -> Self {
        let mut bat_invs: HashMap<BatteryId, HashSet<InverterId>> = HashMap::new();
        let mut inv_bats: HashMap<InverterId, HashSet<BatteryId>> = HashMap::new();
        let mut bat_bats: HashMap<BatteryId, HashSet<BatteryId>> = HashMap::new();
        let mut inv_invs: HashMap<InverterId, HashSet<InverterId>> = HashMap::new();

        for battery_id in batteries {
            let inverters: HashSet<InverterId> = graph
                .predecessors(battery_id)
                .into_iter()
                .filter(|c| c.category == ComponentCategory::Inverter)
                .map(|c| c.id)
                .collect();

            if inverters.is_empty() {
                error!(battery = battery_id, "no inverters for battery, skipping");
                continue;
            }

            for &inverter_id in &inverters {
                inv_bats.entry(inverter_id).or_default().insert(battery_id);

                let siblings: HashSet<BatteryId> = graph
                    .successors(inverter_id)
                    .into_iter()
                    .filter(|c| c.category == ComponentCategory::Battery)
                    .map(|c| c.id)
                    .collect();
                bat_bats.entry(battery_id).or_default().extend(siblings);
            }

            bat_invs.insert(battery_id, inverters);
        }

        // inv_invs[I] = union of bat_invs[B] for every B with I in bat_invs[B]
        for (&inverter_id, bats) in &inv_bats {
            let mut siblings = HashSet::new();
            for &bat in bats {
                if let Some(invs) = bat_invs.get(&bat) {
                    siblings.extend(invs.iter().copied());
                }
            }
            inv_invs.insert(inverter_id, siblings);
        }

        Self {
            bat_invs,
            inv_bats,
            bat_bats,
            inv_invs,
        }
    }

    pub fn bat_invs(&self, battery: BatteryId) -> HashSet<InverterId> {
        self.bat_invs.get(&battery).cloned().unwrap_or_default()
    }

    pub fn inv_bats(&self, inverter: InverterId) -> HashSet<BatteryId> {
        self.inv_bats.get(&inverter).cloned().unwrap_or_default()
    }

    pub fn bat_bats(&self, battery: BatteryId) -> HashSet<BatteryId> {
        self.bat_bats.get(&battery).cloned().unwrap_or_default()
    }

    pub fn inv_invs(&self, inverter: InverterId) -> HashSet<InverterId> {
        self.inv_invs.get(&inverter).cloned().unwrap_or_default()
    }

    pub fn knows_battery(&self, battery: BatteryId) -> bool {
        self.bat_invs.contains_key(&battery)
    }

    pub fn all_batteries(&self) -> impl Iterator<Item = BatteryId> + '_ {
        self.bat_invs.keys().copied()
    }

    /// Union of `bat_invs[b]` for every `b` in `batteries`.
    pub fn connected_inverters(&self, batteries: impl IntoIterator<Item = BatteryId>) -> HashSet<InverterId> {
        batteries
            .into_iter()
            .flat_map(|b| self.bat_invs(b))
            .collect()
    }

    /// Union of `inv_bats[i]` for every `i` in `inverters`.
    pub fn implied_batteries(&self, inverters: impl IntoIterator<Item = InverterId>) -> HashSet<BatteryId> {
        inverters
            .into_iter()
            .flat_map(|i| self.inv_bats(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    /// Simple in-memory graph for tests: two batteries behind one shared
    /// inverter, plus one battery with its own dedicated inverter.
    struct FakeGraph {
        predecessors: StdHashMap<u64, Vec<Component>>,
        successors: StdHashMap<u64, Vec<Component>>,
    }

    impl ComponentGraph for FakeGraph {
        fn predecessors(&self, id: u64) -> Vec<Component> {
            self.predecessors.get(&id).cloned().unwrap_or_default()
        }
        fn successors(&self, id: u64) -> Vec<Component> {
            self.successors.get(&id).cloned().unwrap_or_default()
        }
    }

    fn shared_inverter_graph() -> FakeGraph {
        // battery 1, 2 share inverter 10; battery 3 has its own inverter 11
        let mut predecessors = StdHashMap::new();
        predecessors.insert(1, vec![Component::inverter(10)]);
        predecessors.insert(2, vec![Component::inverter(10)]);
        predecessors.insert(3, vec![Component::inverter(11)]);

        let mut successors = StdHashMap::new();
        successors.insert(10, vec![Component::battery(1), Component::battery(2)]);
        successors.insert(11, vec![Component::battery(3)]);

        FakeGraph {
            predecessors,
            successors,
        }
    }

    #[test]
    fn shared_inverter_collapses_into_one_class() {
        let graph = shared_inverter_graph();
        let index = TopologyIndex::build(&graph, [1, 2, 3]);

        assert_eq!(index.bat_invs(1), HashSet::from([10]));
        assert_eq!(index.bat_bats(1), HashSet::from([1, 2]));
        assert_eq!(index.bat_bats(2), HashSet::from([1, 2]));
        assert_eq!(index.bat_bats(3), HashSet::from([3]));
        assert_eq!(index.inv_bats(10), HashSet::from([1, 2]));
    }

    #[test]
    fn battery_without_inverters_is_skipped() {
        let graph = FakeGraph {
            predecessors: StdHashMap::new(),
            successors: StdHashMap::new(),
        };
        let index = TopologyIndex::build(&graph, [42]);
        assert!(!index.knows_battery(42));
    }
}
