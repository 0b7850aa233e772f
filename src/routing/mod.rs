/// Key routing
///
/// Keys route on their hash tag: the bytes between the first `{` and the
/// next `}`, when that span isn't empty. Sharded deployments look the tag
/// up on a hash ring; clusters map it to one of 16384 slots.
use crate::cluster::{ClusterTopology, Redirect, SLOT_COUNT};
use crate::core::{Endpoint, ShardDescriptor};
use crate::error::{ShardwireError, ShardwireResult};
use crate::hashing::{HashRing, HashingStrategy};
use crate::registry::{ShardListener, ShardRegistry};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Resolves keys to the endpoint that serves them
pub trait KeyRouter: Send + Sync {
    fn resolve(&self, key: &[u8]) -> ShardwireResult<Endpoint>;

    /// Every endpoint a fan-out command has to reach
    fn resolve_all(&self) -> Vec<Endpoint>;

    /// Learn from a redirect. Returns true if routing changed.
    fn on_redirect(&self, _redirect: &Redirect) -> bool {
        false
    }
}

/// The part of `key` that is hashed
pub fn extract_tag(key: &[u8]) -> &[u8] {
    if let Some(start) = key.iter().position(|&b| b == b'{') {
        if let Some(len) = key[start + 1..].iter().position(|&b| b == b'}') {
            if len > 0 {
                return &key[start + 1..start + 1 + len];
            }
        }
    }
    key
}

/// CRC16-CCITT (XModem): polynomial 0x1021, initial value 0, no reflection
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Cluster slot of `key`
pub fn slot(key: &[u8]) -> u16 {
    crc16(extract_tag(key)) % SLOT_COUNT as u16
}

/// Consistent-hashing router over a shard list
pub struct ShardedRouter {
    strategy: HashingStrategy,
    ring: RwLock<Arc<HashRing>>,
}

impl ShardedRouter {
    pub fn new(shards: &[ShardDescriptor], strategy: HashingStrategy) -> Self {
        Self {
            strategy,
            ring: RwLock::new(Arc::new(HashRing::build(shards, strategy))),
        }
    }

    /// A router that follows `registry`: it is built from the current
    /// shard list and rebuilds its ring on every change.
    pub fn from_registry(registry: &ShardRegistry, strategy: HashingStrategy) -> Arc<Self> {
        let router = Arc::new(Self::new(&registry.shards(), strategy));
        registry.register(router.clone());
        router
    }

    /// Current ring
    pub fn ring(&self) -> Arc<HashRing> {
        self.ring.read().clone()
    }

    /// Build a fresh ring and swap it in.
    pub fn rebuild(&self, shards: &[ShardDescriptor]) {
        let ring = Arc::new(HashRing::build(shards, self.strategy));
        info!(
            "Rebuilt {} ring: {} shards, {} points",
            self.strategy,
            shards.len(),
            ring.len()
        );
        *self.ring.write() = ring;
    }

    /// Shard serving `key`
    pub fn shard(&self, key: &[u8]) -> Option<Arc<ShardDescriptor>> {
        self.ring().resolve(extract_tag(key)).cloned()
    }
}

impl KeyRouter for ShardedRouter {
    fn resolve(&self, key: &[u8]) -> ShardwireResult<Endpoint> {
        self.shard(key)
            .map(|shard| shard.endpoint.clone())
            .ok_or_else(|| ShardwireError::routing("no shards configured"))
    }

    fn resolve_all(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = Vec::new();
        for shard in self.ring().shards() {
            if !endpoints.contains(&shard.endpoint) {
                endpoints.push(shard.endpoint.clone());
            }
        }
        endpoints
    }
}

impl ShardListener for ShardedRouter {
    fn on_shards_changed(&self, registry: &ShardRegistry) {
        self.rebuild(&registry.shards());
    }
}

/// Slot router over a cluster topology
pub struct ClusterRouter {
    topology: Arc<ClusterTopology>,
}

impl ClusterRouter {
    pub fn new(topology: Arc<ClusterTopology>) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &Arc<ClusterTopology> {
        &self.topology
    }
}

impl KeyRouter for ClusterRouter {
    fn resolve(&self, key: &[u8]) -> ShardwireResult<Endpoint> {
        let slot = slot(key);
        self.topology
            .slot_endpoint(slot)
            .ok_or_else(|| ShardwireError::routing(format!("slot {} is not served by any node", slot)))
    }

    fn resolve_all(&self) -> Vec<Endpoint> {
        self.topology.snapshot().masters()
    }

    fn on_redirect(&self, redirect: &Redirect) -> bool {
        self.topology.apply_redirect(redirect)
    }
}
