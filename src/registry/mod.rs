/// Dynamic shard registry
///
/// Holds the authoritative shard list and tells registered listeners
/// (usually routers) when it changes, so they can rebuild their rings.
use crate::core::ShardDescriptor;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Something that depends on the registry's shard list
pub trait ShardListener: Send + Sync {
    fn on_shards_changed(&self, registry: &ShardRegistry);
}

#[derive(Default)]
struct Dependents {
    listeners: Vec<Arc<dyn ShardListener>>,
    changed: bool,
}

#[derive(Default)]
pub struct ShardRegistry {
    shards: RwLock<Vec<ShardDescriptor>>,
    dependents: Mutex<Dependents>,
    /// Held from an update until its listeners have run, so listeners see
    /// changes in the order they were applied.
    updates: Mutex<()>,
}

impl ShardRegistry {
    pub fn new(shards: Vec<ShardDescriptor>) -> Self {
        Self {
            shards: RwLock::new(shards),
            dependents: Mutex::new(Dependents::default()),
            updates: Mutex::new(()),
        }
    }

    /// Snapshot of the current shard list
    pub fn shards(&self) -> Vec<ShardDescriptor> {
        self.shards.read().clone()
    }

    pub fn len(&self) -> usize {
        self.shards.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.read().is_empty()
    }

    /// Replace the shard list. Listing the same shards in any order is a
    /// no-op; anything else notifies every listener once. Returns true if
    /// the list changed.
    pub fn set_shards(&self, shards: Vec<ShardDescriptor>) -> bool {
        let _update = self.updates.lock();
        {
            let mut current = self.shards.write();
            if same_members(&current, &shards) {
                debug!("Shard list unchanged ({} shards)", shards.len());
                return false;
            }
            info!("Shard list replaced: {} -> {} shards", current.len(), shards.len());
            *current = shards;
        }
        self.mark_changed();
        self.notify_pending();
        true
    }

    /// Add a shard unless an identical one is already registered.
    pub fn add_shard(&self, shard: ShardDescriptor) -> bool {
        let _update = self.updates.lock();
        {
            let mut current = self.shards.write();
            if current.contains(&shard) {
                return false;
            }
            info!("Shard added: {}", shard);
            current.push(shard);
        }
        self.mark_changed();
        self.notify_pending();
        true
    }

    pub fn remove_shard(&self, shard: &ShardDescriptor) -> bool {
        let _update = self.updates.lock();
        {
            let mut current = self.shards.write();
            let before = current.len();
            current.retain(|s| s != shard);
            if current.len() == before {
                return false;
            }
            info!("Shard removed: {}", shard);
        }
        self.mark_changed();
        self.notify_pending();
        true
    }

    pub fn register(&self, listener: Arc<dyn ShardListener>) {
        self.dependents.lock().listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.dependents.lock().listeners.len()
    }

    fn mark_changed(&self) {
        self.dependents.lock().changed = true;
    }

    /// Notify listeners of a pending change, most recently registered
    /// first. Listeners may read the registry but must not update it.
    pub fn notify_dependents(&self) {
        let _update = self.updates.lock();
        self.notify_pending();
    }

    fn notify_pending(&self) {
        let listeners = {
            let mut dependents = self.dependents.lock();
            if !dependents.changed {
                return;
            }
            dependents.changed = false;
            dependents.listeners.clone()
        };

        debug!("Notifying {} shard listeners", listeners.len());
        for listener in listeners.iter().rev() {
            listener.on_shards_changed(self);
        }
    }
}

/// Same shards with the same multiplicities, in any order
fn same_members(a: &[ShardDescriptor], b: &[ShardDescriptor]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<&ShardDescriptor, isize> = HashMap::new();
    for shard in a {
        *counts.entry(shard).or_default() += 1;
    }
    for shard in b {
        *counts.entry(shard).or_default() -= 1;
    }
    counts.values().all(|&count| count == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Endpoint;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<(&'static str, usize)>>>,
    }

    impl ShardListener for Recorder {
        fn on_shards_changed(&self, registry: &ShardRegistry) {
            self.log.lock().push((self.name, registry.len()));
        }
    }

    fn shard(port: u16) -> ShardDescriptor {
        ShardDescriptor::new(Endpoint::new("127.0.0.1", port))
    }

    fn registry_with_listeners() -> (ShardRegistry, Arc<Mutex<Vec<(&'static str, usize)>>>) {
        let registry = ShardRegistry::new(vec![shard(1), shard(2)]);
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            registry.register(Arc::new(Recorder { name, log: log.clone() }));
        }
        (registry, log)
    }

    #[test]
    fn test_same_members_is_noop() {
        let (registry, log) = registry_with_listeners();
        assert!(!registry.set_shards(vec![shard(2), shard(1)]));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_duplicate_counts_are_a_change() {
        let registry = ShardRegistry::new(vec![shard(1), shard(1), shard(2)]);
        assert!(registry.set_shards(vec![shard(1), shard(2), shard(2)]));
        assert!(!registry.set_shards(vec![shard(2), shard(1), shard(2)]));
    }

    #[test]
    fn test_concurrent_updates_reach_listeners_in_order() {
        struct SlowFirst {
            calls: Mutex<usize>,
            seen: Mutex<Vec<ShardDescriptor>>,
        }
        impl ShardListener for SlowFirst {
            fn on_shards_changed(&self, registry: &ShardRegistry) {
                let shards = registry.shards();
                let first = {
                    let mut calls = self.calls.lock();
                    *calls += 1;
                    *calls == 1
                };
                if first {
                    std::thread::sleep(std::time::Duration::from_millis(200));
                }
                *self.seen.lock() = shards;
            }
        }

        let registry = ShardRegistry::new(vec![shard(1)]);
        let listener = Arc::new(SlowFirst {
            calls: Mutex::new(0),
            seen: Mutex::new(Vec::new()),
        });
        registry.register(listener.clone());

        std::thread::scope(|scope| {
            scope.spawn(|| registry.set_shards(vec![shard(2)]));
            std::thread::sleep(std::time::Duration::from_millis(50));
            scope.spawn(|| registry.set_shards(vec![shard(3)]));
        });

        assert_eq!(registry.shards(), vec![shard(3)]);
        assert_eq!(*listener.seen.lock(), vec![shard(3)]);
        assert_eq!(*listener.calls.lock(), 2);
    }

    #[test]
    fn test_change_notifies_in_reverse_order() {
        let (registry, log) = registry_with_listeners();
        assert!(registry.set_shards(vec![shard(1), shard(3), shard(4)]));
        assert_eq!(*log.lock(), vec![("third", 3), ("second", 3), ("first", 3)]);

        // nothing pending any more
        registry.notify_dependents();
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    fn test_weight_difference_is_a_change() {
        let (registry, log) = registry_with_listeners();
        assert!(registry.set_shards(vec![shard(1), shard(2).with_weight(2)]));
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    fn test_add_and_remove() {
        let (registry, log) = registry_with_listeners();
        assert!(!registry.add_shard(shard(1)));
        assert!(registry.add_shard(shard(3)));
        assert_eq!(registry.len(), 3);
        assert!(registry.remove_shard(&shard(2)));
        assert!(!registry.remove_shard(&shard(2)));
        assert_eq!(registry.shards(), vec![shard(1), shard(3)]);
        assert_eq!(log.lock().len(), 6);
    }

    #[test]
    fn test_listener_may_read_registry() {
        struct Reader(Mutex<Vec<ShardDescriptor>>);
        impl ShardListener for Reader {
            fn on_shards_changed(&self, registry: &ShardRegistry) {
                *self.0.lock() = registry.shards();
            }
        }

        let registry = ShardRegistry::default();
        let reader = Arc::new(Reader(Mutex::new(Vec::new())));
        registry.register(reader.clone());
        registry.add_shard(shard(9));
        assert_eq!(*reader.0.lock(), vec![shard(9)]);
        assert_eq!(registry.listener_count(), 1);
    }
}
