//! Three-tier instance storage
//!
//! - **final**: fully built components, readable without the registry lock
//! - **early**: memoized early references of components still in creation
//! - **factory**: pending early-reference producers, consumed on first use
//!
//! Every mutation is expected to happen while the caller holds the registry
//! lock; the inner tier mutex only keeps the maps coherent and is never held
//! across a call out of this module.

use crate::factory::{EarlyReferenceFactory, Instance};
use ahash::RandomState;
use dashmap::DashMap;
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Tiers that only exist while a component is mid-construction
#[derive(Default)]
struct StagedTiers {
    early: HashMap<Arc<str>, Instance, RandomState>,
    factories: HashMap<Arc<str>, EarlyReferenceFactory, RandomState>,
    /// Registration order of every name that reached the final or factory tier
    registered: IndexSet<Arc<str>, RandomState>,
}

/// Storage for component instances, keyed by name
pub(crate) struct InstanceCache {
    /// Map from name to final instance (lock-free reads)
    finals: DashMap<Arc<str>, Instance, RandomState>,
    staged: Mutex<StagedTiers>,
}

impl InstanceCache {
    /// Create storage sized for `capacity` components.
    ///
    /// Shard count scales like the final tier's expected concurrency; most
    /// registries hold well under a hundred components.
    pub fn with_capacity(capacity: usize) -> Self {
        let shard_amount = if capacity <= 16 {
            8
        } else if capacity <= 64 {
            16
        } else {
            32
        };
        Self {
            finals: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount,
            ),
            staged: Mutex::new(StagedTiers {
                registered: IndexSet::with_capacity_and_hasher(capacity, RandomState::new()),
                ..StagedTiers::default()
            }),
        }
    }

    /// Look up a fully built instance
    #[inline]
    pub fn get_final(&self, name: &str) -> Option<Instance> {
        self.finals.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Check whether a fully built instance exists
    #[inline]
    pub fn contains_final(&self, name: &str) -> bool {
        self.finals.contains_key(name)
    }

    /// Promote `name` to the final tier, purging its staged entries
    pub fn put_final(&self, name: &str, instance: Instance) {
        let key: Arc<str> = Arc::from(name);
        let mut staged = self.staged.lock();
        self.finals.insert(Arc::clone(&key), instance);
        staged.early.remove(name);
        staged.factories.remove(name);
        staged.registered.insert(key);
    }

    /// Register an early-reference producer.
    ///
    /// Ignored when `name` is already final. Returns whether it was stored.
    pub fn put_factory(&self, name: &str, factory: EarlyReferenceFactory) -> bool {
        let mut staged = self.staged.lock();
        if self.finals.contains_key(name) {
            return false;
        }
        let key: Arc<str> = Arc::from(name);
        staged.factories.insert(Arc::clone(&key), factory);
        staged.early.remove(name);
        staged.registered.insert(key);
        true
    }

    /// Return the memoized early instance without invoking any producer
    #[inline]
    pub fn get_early(&self, name: &str) -> Option<Instance> {
        self.staged.lock().early.get(name).cloned()
    }

    /// Return the early instance for `name`, producing and memoizing it from
    /// the registered factory on first use.
    ///
    /// The producer runs with the tier mutex released so it may call back
    /// into the registry. Callers hold the registry lock, which keeps other
    /// threads out while it runs.
    pub fn get_early_or_factory(&self, name: &str) -> Option<Instance> {
        let factory = {
            let mut staged = self.staged.lock();
            if let Some(early) = staged.early.get(name) {
                return Some(Arc::clone(early));
            }
            staged.factories.remove(name)?
        };

        let produced = factory.produce(name);

        let mut staged = self.staged.lock();
        // A nested lookup for the same name may have memoized first
        let early = staged
            .early
            .entry(Arc::from(name))
            .or_insert(produced);
        Some(Arc::clone(early))
    }

    /// Purge `name` from every tier and the registered index
    pub fn remove(&self, name: &str) -> Option<Instance> {
        let mut staged = self.staged.lock();
        staged.early.remove(name);
        staged.factories.remove(name);
        staged.registered.shift_remove(name);
        self.finals.remove(name).map(|(_, instance)| instance)
    }

    /// Drop staged entries left behind by a failed build.
    ///
    /// A name that did reach the final tier keeps its registration.
    pub fn discard_staged(&self, name: &str) {
        let mut staged = self.staged.lock();
        staged.early.remove(name);
        staged.factories.remove(name);
        if !self.finals.contains_key(name) {
            staged.registered.shift_remove(name);
        }
    }

    /// Check whether `name` has a pending producer or memoized early instance
    #[inline]
    pub fn is_staged(&self, name: &str) -> bool {
        let staged = self.staged.lock();
        staged.early.contains_key(name) || staged.factories.contains_key(name)
    }

    /// Registered names in registration order
    pub fn registered_names(&self) -> Vec<String> {
        self.staged
            .lock()
            .registered
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// Number of registered names
    #[inline]
    pub fn registered_count(&self) -> usize {
        self.staged.lock().registered.len()
    }

    /// Number of final instances
    #[inline]
    pub fn final_count(&self) -> usize {
        self.finals.len()
    }

    /// Clear every tier
    pub fn clear(&self) {
        let mut staged = self.staged.lock();
        self.finals.clear();
        staged.early.clear();
        staged.factories.clear();
        staged.registered.clear();
    }
}

impl Default for InstanceCache {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl std::fmt::Debug for InstanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCache")
            .field("finals", &self.final_count())
            .field("registered", &self.registered_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::erase;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Widget {
        value: i32,
    }

    fn widget(value: i32) -> Instance {
        erase(Arc::new(Widget { value }))
    }

    #[test]
    fn test_put_final_purges_staged() {
        let cache = InstanceCache::default();
        assert!(cache.put_factory("w", EarlyReferenceFactory::new(|| widget(1))));
        assert!(cache.get_early_or_factory("w").is_some());
        assert!(cache.is_staged("w"));

        cache.put_final("w", widget(2));

        assert!(!cache.is_staged("w"));
        assert!(cache.get_early("w").is_none());
        let got = cache.get_final("w").unwrap().downcast::<Widget>().unwrap();
        assert_eq!(got.value, 2);
    }

    #[test]
    fn test_factory_ignored_once_final() {
        let cache = InstanceCache::default();
        cache.put_final("w", widget(1));

        assert!(!cache.put_factory("w", EarlyReferenceFactory::new(|| widget(9))));
        assert!(!cache.is_staged("w"));
    }

    #[test]
    fn test_factory_invoked_once_and_memoized() {
        static CALLS: AtomicU32 = AtomicU32::new(0);

        let cache = InstanceCache::default();
        cache.put_factory(
            "w",
            EarlyReferenceFactory::new(|| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                widget(5)
            }),
        );

        let a = cache.get_early_or_factory("w").unwrap();
        let b = cache.get_early_or_factory("w").unwrap();

        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &cache.get_early("w").unwrap()));
    }

    #[test]
    fn test_early_lookup_without_factory() {
        let cache = InstanceCache::default();
        assert!(cache.get_early_or_factory("missing").is_none());
        assert!(cache.get_early("missing").is_none());
    }

    #[test]
    fn test_registration_order_and_remove() {
        let cache = InstanceCache::default();
        cache.put_final("c", widget(3));
        cache.put_factory("a", EarlyReferenceFactory::new(|| widget(1)));
        cache.put_final("b", widget(2));

        assert_eq!(cache.registered_names(), vec!["c", "a", "b"]);

        assert!(cache.remove("c").is_some());
        assert_eq!(cache.registered_names(), vec!["a", "b"]);
        assert!(!cache.contains_final("c"));
    }

    #[test]
    fn test_discard_staged_keeps_finals() {
        let cache = InstanceCache::default();
        cache.put_factory("a", EarlyReferenceFactory::new(|| widget(1)));
        cache.put_final("b", widget(2));

        cache.discard_staged("a");
        cache.discard_staged("b");

        assert!(!cache.is_staged("a"));
        assert_eq!(cache.registered_names(), vec!["b"]);
    }

    #[test]
    fn test_clear() {
        let cache = InstanceCache::with_capacity(100);
        cache.put_final("a", widget(1));
        cache.put_factory("b", EarlyReferenceFactory::new(|| widget(2)));

        cache.clear();

        assert_eq!(cache.final_count(), 0);
        assert_eq!(cache.registered_count(), 0);
        assert!(!cache.is_staged("b"));
    }
}
