/// Shardwire - routing, pooling and framing core for sharded and clustered
/// key-value stores speaking the Redis wire protocol
///
/// Shardwire supports three deployment shapes:
/// 1. Sharded: client-side consistent hashing over a shard list (plain or Ketama rings)
/// 2. Cluster: hash-slot routing from a CLUSTER NODES topology, following MOVED/ASK
/// 3. Failover: a replicated group whose master is elected by probing members
///
/// Every shape hands out connections from per-endpoint pools with background
/// repair, and speaks the protocol through a buffered codec.
pub mod cluster;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod failover;
pub mod hashing;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod routing;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::cluster::{ClusterTopology, Redirect, SlotTable};
pub use crate::config::Config;
pub use crate::core::{ConnectOptions, Connection, Endpoint, ShardDescriptor};
pub use crate::dispatch::Dispatcher;
pub use crate::error::{ShardwireError, ShardwireResult};
pub use crate::failover::FailoverCoordinator;
pub use crate::hashing::{HashRing, HashingStrategy};
pub use crate::pool::{ConnectionPools, PoolConfig, PoolStats, ResourceFactory, ResourcePool};
pub use crate::protocol::{Reply, RespReader, RespWriter};
pub use crate::registry::{ShardListener, ShardRegistry};
pub use crate::routing::{ClusterRouter, KeyRouter, ShardedRouter};
