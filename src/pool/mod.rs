/// Fixed-size resource pool with background repair
///
/// The pool owns a fixed number of slots. Every slot lives in exactly one
/// place at a time: the `available` queue, the `pending_repair` queue, or
/// checked out by a caller (tracked in `in_use`). Repair workers take slots
/// from `pending_repair`, validate or recreate their resource, and hand them
/// back to `available`.
pub mod endpoint;

pub use endpoint::{ConnectionPools, PooledConnection};

use crate::error::{PoolError, ShardwireResult};
use async_trait::async_trait;
use fnv::FnvHashMap;
use rand::Rng;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Creation, validation and destruction hooks for pooled resources
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Send + 'static;

    async fn create(&self) -> ShardwireResult<Self::Resource>;

    /// Return false if the resource must be replaced
    async fn validate(&self, resource: &mut Self::Resource) -> bool;

    async fn destroy(&self, resource: Self::Resource);
}

/// Pool sizing and timing
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub name: String,
    pub resources_number: usize,
    pub repair_threads_number: usize,
    /// Resources older than this (with ±5% jitter) are revalidated
    pub check_interval: Duration,
    /// Wait used by [`ResourcePool::get`]
    pub default_wait: Duration,
    /// Pause after a failed `create` before the slot is retried
    pub create_retry: Duration,
    /// Periodic status log, disabled when `None`
    pub report_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            resources_number: 10,
            repair_threads_number: 3,
            check_interval: Duration::from_secs(150),
            default_wait: Duration::from_millis(50),
            create_retry: Duration::from_millis(100),
            report_interval: None,
        }
    }
}

/// Pool counters and queue depths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub resources_created: u64,
    pub resources_provided: u64,
    pub resources_returned: u64,
    pub validation_failures: u64,
    pub broken_returns: u64,
    pub available: usize,
    pub pending_repair: usize,
    pub in_use: usize,
}

#[derive(Default)]
struct PoolMetrics {
    created: AtomicU64,
    provided: AtomicU64,
    returned: AtomicU64,
    validation_failures: AtomicU64,
    broken_returns: AtomicU64,
}

/// A pool slot. The id stays with the slot across repairs.
struct Slot<T> {
    id: u64,
    resource: Option<T>,
    broken: bool,
    last_checked: Instant,
}

impl<T> Slot<T> {
    fn empty(id: u64) -> Self {
        Self {
            id,
            resource: None,
            broken: false,
            last_checked: Instant::now(),
        }
    }
}

struct PoolInner<F: ResourceFactory> {
    config: PoolConfig,
    factory: F,
    available_tx: mpsc::Sender<Slot<F::Resource>>,
    available_rx: AsyncMutex<mpsc::Receiver<Slot<F::Resource>>>,
    repair_tx: mpsc::Sender<Slot<F::Resource>>,
    repair_rx: AsyncMutex<mpsc::Receiver<Slot<F::Resource>>>,
    in_use: parking_lot::Mutex<FnvHashMap<u64, Instant>>,
    metrics: PoolMetrics,
    shutdown: watch::Sender<bool>,
    drained: Notify,
}

/// Generic pool over the resources produced by `F`
pub struct ResourcePool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl<F: ResourceFactory> ResourcePool<F> {
    /// Create the pool, queue every slot for repair and start the workers.
    /// Must be called from within a tokio runtime.
    pub fn start(config: PoolConfig, factory: F) -> Self {
        let capacity = config.resources_number.max(1);
        let (available_tx, available_rx) = mpsc::channel(capacity);
        let (repair_tx, repair_rx) = mpsc::channel(capacity);
        let (shutdown, _) = watch::channel(false);

        let inner = Arc::new(PoolInner {
            config,
            factory,
            available_tx,
            available_rx: AsyncMutex::new(available_rx),
            repair_tx,
            repair_rx: AsyncMutex::new(repair_rx),
            in_use: parking_lot::Mutex::new(FnvHashMap::default()),
            metrics: PoolMetrics::default(),
            shutdown,
            drained: Notify::new(),
        });

        for id in 0..capacity as u64 {
            inner.requeue(Slot::empty(id));
        }

        let mut tasks = Vec::new();
        for index in 0..inner.config.repair_threads_number.max(1) {
            let worker = inner.clone();
            let signal = inner.shutdown.subscribe();
            tasks.push(tokio::spawn(async move { worker.repair_loop(index, signal).await }));
        }
        if let Some(interval) = inner.config.report_interval.filter(|i| !i.is_zero()) {
            let reporter = inner.clone();
            let signal = inner.shutdown.subscribe();
            tasks.push(tokio::spawn(async move { reporter.report_loop(interval, signal).await }));
        }

        info!(
            "Initialized pool [{}] with {} resources and {} repair workers",
            inner.config.name,
            capacity,
            inner.config.repair_threads_number.max(1)
        );

        Self {
            inner,
            tasks: parking_lot::Mutex::new(tasks),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Check out a resource, waiting the configured default time.
    pub async fn get(&self) -> ShardwireResult<Pooled<F>> {
        self.get_resource(self.inner.config.default_wait).await
    }

    /// Check out a resource, waiting at most `max_wait`. A zero wait makes a
    /// single attempt without blocking.
    pub async fn get_resource(&self, max_wait: Duration) -> ShardwireResult<Pooled<F>> {
        if self.inner.is_shutting_down() {
            return Err(PoolError::ShuttingDown {
                pool: self.inner.config.name.clone(),
            }
            .into());
        }

        let started = Instant::now();
        let slot = if max_wait.is_zero() {
            match self.inner.available_rx.try_lock() {
                Ok(mut available) => available.try_recv().ok(),
                Err(_) => None,
            }
        } else {
            timeout(max_wait, async {
                let mut available = self.inner.available_rx.lock().await;
                available.recv().await
            })
            .await
            .ok()
            .flatten()
        };

        let slot = slot.ok_or_else(|| PoolError::Timeout {
            pool: self.inner.config.name.clone(),
            waited_ms: started.elapsed().as_millis(),
        })?;

        self.inner.in_use.lock().insert(slot.id, slot.last_checked);
        self.inner.metrics.provided.fetch_add(1, Ordering::Relaxed);
        Ok(Pooled {
            slot,
            pool: self.inner.clone(),
            returned: false,
        })
    }

    /// Give a healthy resource back. It is revalidated first if its check
    /// period has elapsed.
    pub fn return_resource(&self, resource: Pooled<F>) -> ShardwireResult<()> {
        self.check_in(resource, false)
    }

    /// Give back a resource that misbehaved. It always goes to repair.
    pub fn return_broken_resource(&self, resource: Pooled<F>) -> ShardwireResult<()> {
        self.check_in(resource, true)
    }

    fn check_in(&self, mut resource: Pooled<F>, broken: bool) -> ShardwireResult<()> {
        if !Arc::ptr_eq(&resource.pool, &self.inner) {
            // Dropping the handle sends it back to its own pool.
            return Err(PoolError::ForeignResource {
                pool: self.inner.config.name.clone(),
                id: resource.slot.id,
            }
            .into());
        }
        let slot = resource.take_slot();
        self.inner.check_in(slot, broken);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    /// Stop the workers, wait for every checked-out resource to come back,
    /// then destroy everything the pool holds.
    pub async fn shutdown(&self) {
        info!("Shutting down pool [{}]", self.inner.config.name);
        self.inner.shutdown.send_replace(true);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Pool [{}] task ended abnormally: {}", self.inner.config.name, e);
            }
        }

        loop {
            let drained = self.inner.drained.notified();
            let outstanding = self.inner.in_use.lock().len();
            if outstanding == 0 {
                break;
            }
            debug!(
                "Pool [{}] waiting for {} resources to be returned",
                self.inner.config.name, outstanding
            );
            drained.await;
        }

        let mut destroyed = 0usize;
        for queue in [&self.inner.available_rx, &self.inner.repair_rx] {
            let mut queue = queue.lock().await;
            while let Ok(slot) = queue.try_recv() {
                if let Some(resource) = slot.resource {
                    self.inner.factory.destroy(resource).await;
                    destroyed += 1;
                }
            }
        }

        info!(
            "Pool [{}] shut down, {} resources destroyed",
            self.inner.config.name, destroyed
        );
    }
}

impl<F: ResourceFactory> Drop for ResourcePool<F> {
    fn drop(&mut self) {
        // Workers hold the shared state; signal them so it gets released.
        self.inner.shutdown.send_replace(true);
    }
}

impl<F: ResourceFactory> PoolInner<F> {
    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn requeue(&self, slot: Slot<F::Resource>) {
        if let Err(e) = self.repair_tx.try_send(slot) {
            error!("Pool [{}] rejected a slot for repair: {}", self.config.name, e);
        }
    }

    fn make_available(&self, slot: Slot<F::Resource>) {
        if let Err(e) = self.available_tx.try_send(slot) {
            error!("Pool [{}] rejected an available slot: {}", self.config.name, e);
        }
    }

    /// Staleness test with ±5% uniform jitter, so resources stamped together
    /// don't all come up for validation at once.
    fn needs_validation(&self, last_checked: Instant) -> bool {
        let noise: f64 = rand::thread_rng().gen_range(-0.05..=0.05);
        let period = self.config.check_interval.mul_f64(1.0 + noise);
        last_checked.elapsed() > period
    }

    fn check_in(&self, mut slot: Slot<F::Resource>, broken: bool) {
        {
            let mut in_use = self.in_use.lock();
            in_use.remove(&slot.id);
            if in_use.is_empty() {
                self.drained.notify_one();
            }
        }

        self.metrics.returned.fetch_add(1, Ordering::Relaxed);
        if broken {
            self.metrics.broken_returns.fetch_add(1, Ordering::Relaxed);
            slot.broken = true;
            self.requeue(slot);
        } else if self.needs_validation(slot.last_checked) {
            self.requeue(slot);
        } else {
            self.make_available(slot);
        }
    }

    async fn poll_repair(&self) -> Option<Slot<F::Resource>> {
        timeout(self.config.check_interval, async {
            let mut pending = self.repair_rx.lock().await;
            pending.recv().await
        })
        .await
        .ok()
        .flatten()
    }

    async fn repair_loop(self: Arc<Self>, index: usize, mut shutdown: watch::Receiver<bool>) {
        debug!("Repair worker {} started for pool [{}]", index, self.config.name);
        loop {
            if *shutdown.borrow() {
                break;
            }
            let polled = tokio::select! {
                _ = shutdown.changed() => continue,
                polled = self.poll_repair() => polled,
            };
            match polled {
                Some(slot) => self.repair(slot, &mut shutdown).await,
                None => {
                    debug!("Repair worker {} of pool [{}] idle, checking available resources", index, self.config.name);
                    self.check_idles();
                }
            }
        }
        debug!("Repair worker {} of pool [{}] stopped", index, self.config.name);
    }

    async fn repair(&self, mut slot: Slot<F::Resource>, shutdown: &mut watch::Receiver<bool>) {
        let mut valid = false;
        if let Some(resource) = slot.resource.as_mut() {
            if !slot.broken {
                valid = self.factory.validate(resource).await;
                if !valid {
                    self.metrics.validation_failures.fetch_add(1, Ordering::Relaxed);
                    debug!("Pool [{}] resource {} failed validation", self.config.name, slot.id);
                }
            }
        }

        if !valid {
            if let Some(old) = slot.resource.take() {
                self.factory.destroy(old).await;
            }
            slot.broken = false;
            match self.factory.create().await {
                Ok(resource) => {
                    slot.resource = Some(resource);
                    self.metrics.created.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("Pool [{}] failed to create resource {}: {}", self.config.name, slot.id, e);
                    self.requeue(slot);
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(self.config.create_retry) => {}
                    }
                    return;
                }
            }
        }

        slot.last_checked = Instant::now();
        self.make_available(slot);
    }

    /// Move stale available resources to repair, oldest first, stopping at
    /// the first fresh one.
    fn check_idles(&self) {
        let Ok(mut available) = self.available_rx.try_lock() else {
            return;
        };
        while let Ok(slot) = available.try_recv() {
            if self.needs_validation(slot.last_checked) {
                self.requeue(slot);
            } else {
                self.make_available(slot);
                break;
            }
        }
    }

    async fn report_loop(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let stats = self.stats();
                    info!(
                        "Pool [{}] created={} provided={} returned={} validation_failures={} broken_returns={} available={} pending_repair={} in_use={}",
                        self.config.name,
                        stats.resources_created,
                        stats.resources_provided,
                        stats.resources_returned,
                        stats.validation_failures,
                        stats.broken_returns,
                        stats.available,
                        stats.pending_repair,
                        stats.in_use
                    );
                }
            }
        }
    }

    fn stats(&self) -> PoolStats {
        let depth = |tx: &mpsc::Sender<Slot<F::Resource>>| tx.max_capacity() - tx.capacity();
        PoolStats {
            resources_created: self.metrics.created.load(Ordering::Relaxed),
            resources_provided: self.metrics.provided.load(Ordering::Relaxed),
            resources_returned: self.metrics.returned.load(Ordering::Relaxed),
            validation_failures: self.metrics.validation_failures.load(Ordering::Relaxed),
            broken_returns: self.metrics.broken_returns.load(Ordering::Relaxed),
            available: depth(&self.available_tx),
            pending_repair: depth(&self.repair_tx),
            in_use: self.in_use.lock().len(),
        }
    }
}

/// A checked-out resource. Dropping it without returning it counts as a
/// broken return, so the slot is never lost.
pub struct Pooled<F: ResourceFactory> {
    slot: Slot<F::Resource>,
    pool: Arc<PoolInner<F>>,
    returned: bool,
}

impl<F: ResourceFactory> Pooled<F> {
    /// Stable identity of the underlying pool slot
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    fn take_slot(&mut self) -> Slot<F::Resource> {
        self.returned = true;
        let id = self.slot.id;
        std::mem::replace(&mut self.slot, Slot::empty(id))
    }
}

impl<F: ResourceFactory> fmt::Debug for Pooled<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("pool", &self.pool.config.name)
            .field("id", &self.slot.id)
            .finish()
    }
}

impl<F: ResourceFactory> Deref for Pooled<F> {
    type Target = F::Resource;

    fn deref(&self) -> &F::Resource {
        self.slot
            .resource
            .as_ref()
            .expect("checked-out slot always holds a resource")
    }
}

impl<F: ResourceFactory> DerefMut for Pooled<F> {
    fn deref_mut(&mut self) -> &mut F::Resource {
        self.slot
            .resource
            .as_mut()
            .expect("checked-out slot always holds a resource")
    }
}

impl<F: ResourceFactory> Drop for Pooled<F> {
    fn drop(&mut self) {
        if self.returned {
            return;
        }
        let pool = self.pool.clone();
        let slot = self.take_slot();
        debug!("Pool [{}] resource {} dropped without return", pool.config.name, slot.id);
        pool.check_in(slot, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShardwireError;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU32};

    /// Hands out increasing numbers; validation can be switched off.
    #[derive(Default)]
    struct CountingFactory {
        next: AtomicU32,
        destroyed: AtomicU32,
        reject: AtomicBool,
        fail_create: AtomicBool,
    }

    #[async_trait]
    impl ResourceFactory for Arc<CountingFactory> {
        type Resource = u32;

        async fn create(&self) -> ShardwireResult<u32> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(ShardwireError::timeout("create"));
            }
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }

        async fn validate(&self, _resource: &mut u32) -> bool {
            !self.reject.load(Ordering::SeqCst)
        }

        async fn destroy(&self, _resource: u32) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(resources: usize) -> PoolConfig {
        PoolConfig {
            name: "test".to_string(),
            resources_number: resources,
            repair_threads_number: 2,
            check_interval: Duration::from_secs(60),
            default_wait: Duration::from_millis(500),
            create_retry: Duration::from_millis(10),
            report_interval: None,
        }
    }

    async fn wait_until_available<F: ResourceFactory>(pool: &ResourcePool<F>, count: usize) {
        for _ in 0..200 {
            if pool.stats().available >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("pool never reached {} available resources: {:?}", count, pool.stats());
    }

    #[tokio::test]
    async fn test_get_then_return() {
        let factory = Arc::new(CountingFactory::default());
        let pool = ResourcePool::start(config(3), factory.clone());

        let resource = pool.get().await.unwrap();
        assert_eq!(pool.stats().in_use, 1);
        pool.return_resource(resource).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.resources_provided, 1);
        assert_eq!(stats.resources_returned, 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_resource_never_handed_out_twice() {
        let factory = Arc::new(CountingFactory::default());
        let pool = ResourcePool::start(config(4), factory.clone());
        wait_until_available(&pool, 4).await;

        let mut held = Vec::new();
        let mut seen = HashSet::new();
        for _ in 0..4 {
            let resource = pool.get().await.unwrap();
            assert!(seen.insert(*resource));
            held.push(resource);
        }

        let err = pool.get_resource(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, ShardwireError::Pool(PoolError::Timeout { .. })));

        for resource in held {
            pool.return_resource(resource).unwrap();
        }
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_wait_on_empty_pool_times_out() {
        let factory = Arc::new(CountingFactory::default());
        let pool = ResourcePool::start(config(1), factory.clone());
        wait_until_available(&pool, 1).await;

        let held = pool.get().await.unwrap();
        let started = Instant::now();
        let err = pool.get_resource(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ShardwireError::Pool(PoolError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_millis(100));

        pool.return_resource(held).unwrap();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_broken_return_is_recreated() {
        let factory = Arc::new(CountingFactory::default());
        let pool = ResourcePool::start(config(1), factory.clone());

        let resource = pool.get().await.unwrap();
        let first = *resource;
        pool.return_broken_resource(resource).unwrap();

        let resource = pool.get().await.unwrap();
        assert_ne!(*resource, first);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().broken_returns, 1);
        pool.return_resource(resource).unwrap();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropped_handle_goes_to_repair() {
        let factory = Arc::new(CountingFactory::default());
        let pool = ResourcePool::start(config(1), factory.clone());

        let resource = pool.get().await.unwrap();
        drop(resource);
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(pool.stats().broken_returns, 1);

        // Capacity is not lost.
        let resource = pool.get().await.unwrap();
        pool.return_resource(resource).unwrap();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_resource_is_revalidated() {
        let factory = Arc::new(CountingFactory::default());
        let mut cfg = config(1);
        cfg.check_interval = Duration::from_millis(20);
        let pool = ResourcePool::start(cfg, factory.clone());

        let resource = pool.get().await.unwrap();
        let first = *resource;
        tokio::time::sleep(Duration::from_millis(40)).await;
        factory.reject.store(true, Ordering::SeqCst);
        pool.return_resource(resource).unwrap();

        let resource = pool.get().await.unwrap();
        factory.reject.store(false, Ordering::SeqCst);
        assert_ne!(*resource, first);
        assert!(pool.stats().validation_failures >= 1);
        pool.return_resource(resource).unwrap();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_report_interval_disables_reporting() {
        let mut cfg = config(1);
        cfg.report_interval = Some(Duration::ZERO);
        let pool = ResourcePool::start(cfg, Arc::new(CountingFactory::default()));

        let resource = pool.get().await.unwrap();
        assert_eq!(format!("{:?}", resource), "Pooled { pool: \"test\", id: 0 }");
        pool.return_resource(resource).unwrap();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_foreign_resource_rejected() {
        let a = ResourcePool::start(config(1), Arc::new(CountingFactory::default()));
        let b = ResourcePool::start(config(1), Arc::new(CountingFactory::default()));

        let resource = a.get().await.unwrap();
        let err = b.return_resource(resource).unwrap_err();
        assert!(matches!(err, ShardwireError::Pool(PoolError::ForeignResource { .. })));
        // The handle went back to its own pool when it was dropped.
        assert_eq!(a.stats().in_use, 0);

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_failure_is_retried() {
        let factory = Arc::new(CountingFactory::default());
        factory.fail_create.store(true, Ordering::SeqCst);
        let pool = ResourcePool::start(config(1), factory.clone());

        let err = pool.get_resource(Duration::from_millis(30)).await.unwrap_err();
        assert!(matches!(err, ShardwireError::Pool(PoolError::Timeout { .. })));

        factory.fail_create.store(false, Ordering::SeqCst);
        let resource = pool.get().await.unwrap();
        pool.return_resource(resource).unwrap();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_returns_and_destroys() {
        let factory = Arc::new(CountingFactory::default());
        let pool = Arc::new(ResourcePool::start(config(2), factory.clone()));
        wait_until_available(&pool, 2).await;

        let held = pool.get().await.unwrap();
        let closing = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.shutdown().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closing.is_finished());
        let err = pool.get_resource(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ShardwireError::Pool(PoolError::ShuttingDown { .. })));

        pool.return_resource(held).unwrap();
        closing.await.unwrap();
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 2);
    }
}
