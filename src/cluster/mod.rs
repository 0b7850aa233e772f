/// Cluster mode topology
///
/// The live [`SlotTable`] sits behind a single reference that is swapped
/// whole on every refresh, so readers always see a consistent table.
pub mod nodes;
pub mod redirect;
pub mod slots;

pub use nodes::{parse_cluster_nodes, ClusterNode, SlotRange};
pub use redirect::Redirect;
pub use slots::{SlotCoverage, SlotTable, SlotTransition};

use crate::core::Endpoint;
use crate::error::{ShardwireResult, TopologyError};
use crate::pool::ConnectionPools;
use crate::protocol::Reply;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Number of hash slots in a cluster
pub const SLOT_COUNT: usize = 16384;

pub struct ClusterTopology {
    seeds: Vec<Endpoint>,
    table: RwLock<Arc<SlotTable>>,
}

impl ClusterTopology {
    /// A topology with no slots assigned yet. Call [`discover`](Self::discover)
    /// to load it.
    pub fn new(seeds: Vec<Endpoint>) -> Self {
        Self {
            seeds,
            table: RwLock::new(Arc::new(SlotTable::empty())),
        }
    }

    pub fn seeds(&self) -> &[Endpoint] {
        &self.seeds
    }

    /// Current table
    pub fn snapshot(&self) -> Arc<SlotTable> {
        self.table.read().clone()
    }

    /// Replace the current table.
    pub fn install(&self, table: SlotTable) -> Arc<SlotTable> {
        let table = Arc::new(table);
        *self.table.write() = table.clone();
        table
    }

    /// Install the table described by a CLUSTER NODES reply from `reporter`.
    /// A malformed description leaves the current table in place.
    pub fn refresh(&self, text: &str, reporter: &Endpoint) -> ShardwireResult<Arc<SlotTable>> {
        let nodes = match parse_cluster_nodes(text, reporter) {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("Rejected topology from {}: {}", reporter, e);
                return Err(e.into());
            }
        };

        let table = SlotTable::from_nodes(&nodes);
        info!(
            "Installed topology from {}: {} nodes, {}/{} slots assigned",
            reporter,
            nodes.len(),
            table.assigned_slots(),
            SLOT_COUNT
        );
        Ok(self.install(table))
    }

    /// Ask each seed, then each known master, for CLUSTER NODES until one
    /// answers with a usable description.
    pub async fn discover(&self, pools: &ConnectionPools, max_wait: Duration) -> ShardwireResult<Arc<SlotTable>> {
        let mut candidates = self.seeds.clone();
        for master in self.snapshot().masters() {
            if !candidates.contains(&master) {
                candidates.push(master);
            }
        }

        for endpoint in &candidates {
            let text = match pools.exec(endpoint, &["CLUSTER", "NODES"], max_wait).await {
                Ok(Reply::Bulk(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(other) => {
                    warn!("Unexpected CLUSTER NODES reply from {}: {}", endpoint, other);
                    continue;
                }
                Err(e) => {
                    warn!("Topology query failed: {}", e);
                    continue;
                }
            };

            if text.trim().is_empty() {
                debug!("{} returned an empty node list", endpoint);
                continue;
            }
            if let Ok(table) = self.refresh(&text, endpoint) {
                return Ok(table);
            }
        }

        Err(TopologyError::NoReachableSeed.into())
    }

    /// Apply a redirect. A MOVED rebuilds the table with the new owner; an
    /// ASK is per-command and leaves it untouched. Returns true if the table
    /// changed.
    pub fn apply_redirect(&self, redirect: &Redirect) -> bool {
        let Redirect::Moved { slot, endpoint } = redirect else {
            return false;
        };

        let mut table = self.table.write();
        if table.owner(*slot) == Some(endpoint) {
            return false;
        }
        debug!("Slot {} moved to {}", slot, endpoint);
        *table = Arc::new(table.with_owner(*slot, endpoint));
        true
    }

    /// Owner of `slot` in the current table
    pub fn slot_endpoint(&self, slot: u16) -> Option<Endpoint> {
        self.table.read().owner(slot).cloned()
    }
}
