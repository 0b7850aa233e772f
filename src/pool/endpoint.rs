/// Per-endpoint connection pools
///
/// Pools are created lazily the first time an endpoint is asked for and
/// live until [`ConnectionPools::shutdown`].
use super::{PoolConfig, PoolStats, Pooled, ResourcePool};
use crate::core::{ConnectOptions, ConnectionFactory, Endpoint};
use crate::error::{ShardwireError, ShardwireResult};
use crate::protocol::Reply;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A connection checked out of an endpoint pool
pub type PooledConnection = Pooled<ConnectionFactory>;

pub struct ConnectionPools {
    template: PoolConfig,
    options: ConnectOptions,
    pools: RwLock<HashMap<Endpoint, Arc<ResourcePool<ConnectionFactory>>>>,
}

impl ConnectionPools {
    /// `template` sizes every pool; its name is used as a prefix.
    pub fn new(template: PoolConfig, options: ConnectOptions) -> Self {
        Self {
            template,
            options,
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_wait(&self) -> Duration {
        self.template.default_wait
    }

    /// The pool for `endpoint`, started on first use.
    pub fn pool(&self, endpoint: &Endpoint) -> Arc<ResourcePool<ConnectionFactory>> {
        if let Some(pool) = self.pools.read().get(endpoint) {
            return pool.clone();
        }

        let mut pools = self.pools.write();
        pools
            .entry(endpoint.clone())
            .or_insert_with(|| {
                debug!("Starting connection pool for {}", endpoint);
                let config = PoolConfig {
                    name: format!("{}@{}", self.template.name, endpoint),
                    ..self.template.clone()
                };
                let factory = ConnectionFactory::new(endpoint.clone(), self.options.clone());
                Arc::new(ResourcePool::start(config, factory))
            })
            .clone()
    }

    /// Check out a connection to `endpoint`, waiting at most `max_wait`.
    pub async fn get(&self, endpoint: &Endpoint, max_wait: Duration) -> ShardwireResult<PooledConnection> {
        self.pool(endpoint)
            .get_resource(max_wait)
            .await
            .map_err(|e| e.with_endpoint(endpoint, "check out connection"))
    }

    /// Return a healthy connection to its pool.
    pub fn release(&self, connection: PooledConnection) -> ShardwireResult<()> {
        let pool = self.owner(&connection)?;
        pool.return_resource(connection)
    }

    /// Return a connection that saw a transport or framing error.
    pub fn release_broken(&self, connection: PooledConnection) -> ShardwireResult<()> {
        let pool = self.owner(&connection)?;
        pool.return_broken_resource(connection)
    }

    /// Hand a connection back after use: broken if it saw a transport or
    /// framing error, healthy otherwise. A failed return is logged so it
    /// never hides the outcome of the command that ran on it.
    pub fn recycle(&self, connection: PooledConnection) {
        let endpoint = connection.endpoint().clone();
        let returned = if connection.is_broken() {
            self.release_broken(connection)
        } else {
            self.release(connection)
        };
        if let Err(e) = returned {
            warn!("Failed to return connection to {}: {}", endpoint, e);
        }
    }

    /// Run one command on a pooled connection to `endpoint`. The connection
    /// goes back broken if the exchange failed on the transport.
    pub async fn exec<A: AsRef<[u8]>>(
        &self,
        endpoint: &Endpoint,
        args: &[A],
        max_wait: Duration,
    ) -> ShardwireResult<Reply> {
        let mut connection = self.get(endpoint, max_wait).await?;
        let result = connection.exec(args).await;
        self.recycle(connection);
        result
    }

    fn owner(&self, connection: &PooledConnection) -> ShardwireResult<Arc<ResourcePool<ConnectionFactory>>> {
        self.pools
            .read()
            .get(connection.endpoint())
            .cloned()
            .ok_or_else(|| {
                ShardwireError::routing(format!("no pool for endpoint {}", connection.endpoint()))
            })
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.pools.read().keys().cloned().collect()
    }

    pub fn stats(&self, endpoint: &Endpoint) -> Option<PoolStats> {
        self.pools.read().get(endpoint).map(|pool| pool.stats())
    }

    /// Shut down every pool. Waits for checked-out connections to come back.
    pub async fn shutdown(&self) {
        let pools: Vec<_> = self.pools.write().drain().map(|(_, pool)| pool).collect();
        for pool in pools {
            pool.shutdown().await;
        }
    }
}
