/// Slot ownership snapshot for cluster mode
///
/// A `SlotTable` is immutable once built. A topology refresh or a MOVED
/// redirect produces a new table that replaces the old one.
use super::nodes::ClusterNode;
use super::SLOT_COUNT;
use crate::core::Endpoint;
use std::collections::HashMap;
use tracing::debug;

/// A slot in flight between two nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTransition {
    /// Node that reported the transition
    pub node: Endpoint,
    /// Id of the other side
    pub peer_id: String,
    /// Address of the other side, when it appears in the same description
    pub peer: Option<Endpoint>,
}

#[derive(Debug, Clone)]
pub struct SlotTable {
    endpoints: Vec<Endpoint>,
    owners: Box<[Option<u32>]>,
    importing: HashMap<u16, SlotTransition>,
    migrating: HashMap<u16, SlotTransition>,
}

/// Statistics about slot coverage
#[derive(Debug, Clone)]
pub struct SlotCoverage {
    pub assigned_slots: usize,
    pub total_slots: usize,
    pub coverage_percentage: f64,
    pub distribution: HashMap<Endpoint, usize>,
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl SlotTable {
    /// A table with no slot assigned
    pub fn empty() -> Self {
        Self {
            endpoints: Vec::new(),
            owners: vec![None; SLOT_COUNT].into_boxed_slice(),
            importing: HashMap::new(),
            migrating: HashMap::new(),
        }
    }

    /// Build a table from parsed node descriptions. Replicas and nodes that
    /// are failed or have no address don't own slots.
    pub fn from_nodes(nodes: &[ClusterNode]) -> Self {
        let mut table = Self::empty();
        let ids: HashMap<&str, &Endpoint> = nodes
            .iter()
            .map(|node| (node.node_id.as_str(), &node.endpoint))
            .collect();

        for node in nodes {
            if !node.is_serving() || node.has_flag("slave") {
                debug!("Skipping node {} ({}) flags={:?}", node.node_id, node.endpoint, node.flags);
                continue;
            }

            if !node.slots.is_empty() {
                let index = table.intern(&node.endpoint);
                for range in &node.slots {
                    for slot in range.iter() {
                        table.owners[usize::from(slot)] = Some(index);
                    }
                }
            }

            let transition = |peer_id: &String| SlotTransition {
                node: node.endpoint.clone(),
                peer_id: peer_id.clone(),
                peer: ids.get(peer_id.as_str()).map(|endpoint| (*endpoint).clone()),
            };
            for (slot, source) in &node.importing {
                table.importing.insert(*slot, transition(source));
            }
            for (slot, destination) in &node.migrating {
                table.migrating.insert(*slot, transition(destination));
            }
        }
        table
    }

    fn intern(&mut self, endpoint: &Endpoint) -> u32 {
        match self.endpoints.iter().position(|e| e == endpoint) {
            Some(index) => index as u32,
            None => {
                self.endpoints.push(endpoint.clone());
                (self.endpoints.len() - 1) as u32
            }
        }
    }

    /// Endpoint owning `slot`
    pub fn owner(&self, slot: u16) -> Option<&Endpoint> {
        self.owners
            .get(usize::from(slot))
            .copied()
            .flatten()
            .map(|index| &self.endpoints[index as usize])
    }

    /// Transition for a slot being imported into `node` from `peer`
    pub fn importing(&self, slot: u16) -> Option<&SlotTransition> {
        self.importing.get(&slot)
    }

    /// Transition for a slot being migrated from `node` to `peer`
    pub fn migrating(&self, slot: u16) -> Option<&SlotTransition> {
        self.migrating.get(&slot)
    }

    /// Every endpoint that owns at least one slot
    pub fn masters(&self) -> Vec<Endpoint> {
        let mut owning = vec![false; self.endpoints.len()];
        for index in self.owners.iter().flatten() {
            owning[*index as usize] = true;
        }
        self.endpoints
            .iter()
            .zip(owning)
            .filter_map(|(endpoint, owns)| owns.then(|| endpoint.clone()))
            .collect()
    }

    pub fn assigned_slots(&self) -> usize {
        self.owners.iter().filter(|owner| owner.is_some()).count()
    }

    /// Check if all slots (0-16383) are assigned
    pub fn is_complete(&self) -> bool {
        self.assigned_slots() == SLOT_COUNT
    }

    pub fn missing_slots(&self) -> Vec<u16> {
        self.owners
            .iter()
            .enumerate()
            .filter(|(_, owner)| owner.is_none())
            .map(|(slot, _)| slot as u16)
            .collect()
    }

    pub fn coverage(&self) -> SlotCoverage {
        let assigned_slots = self.assigned_slots();
        let mut distribution = HashMap::new();
        for index in self.owners.iter().flatten() {
            *distribution
                .entry(self.endpoints[*index as usize].clone())
                .or_insert(0) += 1;
        }

        SlotCoverage {
            assigned_slots,
            total_slots: SLOT_COUNT,
            coverage_percentage: assigned_slots as f64 / SLOT_COUNT as f64 * 100.0,
            distribution,
        }
    }

    /// A copy of this table with `slot` owned by `endpoint`. Any transition
    /// recorded for the slot is dropped.
    pub fn with_owner(&self, slot: u16, endpoint: &Endpoint) -> Self {
        let mut table = self.clone();
        if usize::from(slot) < SLOT_COUNT {
            let index = table.intern(endpoint);
            table.owners[usize::from(slot)] = Some(index);
            table.importing.remove(&slot);
            table.migrating.remove(&slot);
        }
        table
    }
}
