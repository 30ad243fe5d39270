//! Singleton registry with early-reference cycle resolution
//!
//! The `SingletonRegistry` owns every cache and record and is the single
//! synchronization point for building components. A build runs the
//! caller's construct closure while holding a re-entrant lock, so nested
//! builds on the same thread proceed while other threads wait.

use crate::config::{RegistryBuilder, RegistryConfig};
use crate::creation::CreationTracker;
use crate::factory::{EarlyReferenceFactory, Instance, downcast_instance, erase};
use crate::graph::DependencyGraph;
use crate::lifecycle::ShutdownRegistry;
use crate::storage::InstanceCache;
use crate::error::check_name;
use crate::{Injectable, RegistryError, Result};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Proof that the current thread holds the registry lock.
///
/// Obtained from [`SingletonRegistry::lock_handle`]. Layers that extend a
/// construction episode hold this instead of introducing a second lock.
/// The lock is re-entrant, so registry calls made while holding it proceed.
pub struct SingletonLock<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
}

impl std::fmt::Debug for SingletonLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonLock").finish_non_exhaustive()
    }
}

/// Registry of shared, named component instances.
///
/// Components are built at most once. While a component is being built it
/// may publish an early reference so that peers it (indirectly) requests
/// can point back at it; without one, such a cycle fails with
/// [`RegistryError::CycleDetected`].
///
/// # Examples
///
/// ```rust
/// use component_registry::SingletonRegistry;
/// use std::sync::Arc;
///
/// struct Database { url: String }
///
/// let registry = SingletonRegistry::new();
/// let db = registry
///     .get_or_create("db", || Ok(Arc::new(Database { url: "postgres://localhost".into() })))
///     .unwrap();
///
/// assert_eq!(db.url, "postgres://localhost");
/// assert!(registry.contains_final("db"));
/// ```
pub struct SingletonRegistry {
    /// Instance tiers
    pub(crate) cache: InstanceCache,
    /// Names currently being built
    pub(crate) creation: CreationTracker,
    /// Dependency and containment records
    pub(crate) graph: DependencyGraph,
    /// Shutdown hooks in registration order
    pub(crate) shutdown: ShutdownRegistry,
    /// Serializes every build and every cache mutation
    pub(crate) lock: ReentrantMutex<()>,
    /// Set while `destroy_all` runs
    pub(crate) in_destruction: AtomicBool,
    /// Errors recorded during the outermost active build
    suppressed: Mutex<Option<Vec<RegistryError>>>,
    config: RegistryConfig,
}

/// One active build of one name.
///
/// Ends the in-creation mark on every exit path; if dropped while still
/// open (the construct closure unwound) staged entries are discarded too.
struct CreationEpisode<'a> {
    registry: &'a SingletonRegistry,
    name: &'a str,
    owns_suppressed: bool,
    open: bool,
}

impl<'a> CreationEpisode<'a> {
    fn begin(registry: &'a SingletonRegistry, name: &'a str) -> Result<Self> {
        registry.creation.begin_creation(name)?;

        let owns_suppressed = {
            let mut suppressed = registry.suppressed.lock();
            if suppressed.is_none() {
                *suppressed = Some(Vec::new());
                true
            } else {
                false
            }
        };

        Ok(Self {
            registry,
            name,
            owns_suppressed,
            open: true,
        })
    }

    /// Suppressed errors collected so far, if this is the outermost episode
    fn take_suppressed(&self) -> Vec<RegistryError> {
        if !self.owns_suppressed {
            return Vec::new();
        }
        self.registry
            .suppressed
            .lock()
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn end(mut self) -> Result<()> {
        self.open = false;
        self.close()
    }

    fn close(&self) -> Result<()> {
        if self.owns_suppressed {
            *self.registry.suppressed.lock() = None;
        }
        self.registry.creation.end_creation(self.name)
    }
}

impl Drop for CreationEpisode<'_> {
    fn drop(&mut self) {
        if self.open {
            self.registry.cache.discard_staged(self.name);
            let _ = self.close();
        }
    }
}

impl SingletonRegistry {
    /// Create an empty registry with default settings.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry pre-sized for `capacity` components.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(RegistryConfig {
            initial_capacity: capacity,
            ..RegistryConfig::default()
        })
    }

    /// Start configuring a registry.
    #[inline]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Create a registry from explicit settings.
    pub fn with_config(config: RegistryConfig) -> Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "component_registry",
            capacity = config.initial_capacity,
            allow_circular_references = config.allow_circular_references,
            "Creating new singleton registry"
        );

        Self {
            cache: InstanceCache::with_capacity(config.initial_capacity),
            creation: CreationTracker::new(),
            graph: DependencyGraph::new(),
            shutdown: ShutdownRegistry::new(),
            lock: ReentrantMutex::new(()),
            in_destruction: AtomicBool::new(false),
            suppressed: Mutex::new(None),
            config,
        }
    }

    /// Settings this registry was built with
    #[inline]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Acquire the registry lock.
    ///
    /// Every build and cache mutation happens under this lock. It is
    /// re-entrant, so the holder may keep calling into the registry.
    #[inline]
    pub fn lock_handle(&self) -> SingletonLock<'_> {
        SingletonLock {
            _guard: self.lock.lock(),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Bind a pre-built instance to `name`.
    ///
    /// Registering the identical instance again is a no-op; a different
    /// instance fails with [`RegistryError::DuplicateRegistration`].
    pub fn register(&self, name: &str, instance: Instance) -> Result<()> {
        check_name(name)?;
        let _guard = self.lock.lock();

        if let Some(existing) = self.cache.get_final(name) {
            if Arc::ptr_eq(&existing, &instance) {
                return Ok(());
            }
            return Err(RegistryError::DuplicateRegistration {
                name: name.to_string(),
            });
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "component_registry",
            component = name,
            registered = self.cache.registered_count() + 1,
            "Registering singleton instance"
        );

        self.cache.put_final(name, instance);
        Ok(())
    }

    /// Bind a typed value to `name`, returning the shared handle.
    pub fn register_instance<T: Injectable>(&self, name: &str, value: T) -> Result<Arc<T>> {
        let component = Arc::new(value);
        self.register(name, erase(Arc::clone(&component)))?;
        Ok(component)
    }

    /// Publish an early-reference producer for a component being built.
    ///
    /// Ignored (returns false) once `name` is final, when `name` is not
    /// being built, or when circular references are disabled.
    pub fn add_early_reference_factory(&self, name: &str, factory: EarlyReferenceFactory) -> bool {
        if !self.config.allow_circular_references {
            #[cfg(feature = "logging")]
            trace!(
                target: "component_registry",
                component = name,
                "Circular references disabled, early reference not published"
            );
            return false;
        }

        let _guard = self.lock.lock();
        if !self.creation.is_actually_in_creation(name) && !self.creation.is_excluded(name) {
            #[cfg(feature = "logging")]
            trace!(
                target: "component_registry",
                component = name,
                "Component is not in creation, early reference not published"
            );
            return false;
        }
        let added = self.cache.put_factory(name, factory);

        #[cfg(feature = "logging")]
        trace!(
            target: "component_registry",
            component = name,
            added,
            "Eagerly caching component to allow for resolving circular references"
        );

        added
    }

    /// Publish `component` itself as the early reference for `name`.
    #[inline]
    pub fn add_early_reference<T: Injectable>(&self, name: &str, component: Arc<T>) -> bool {
        self.add_early_reference_factory(name, EarlyReferenceFactory::exposing(component))
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Look up `name`, accepting an early reference if it is mid-construction.
    #[inline]
    pub fn obtain(&self, name: &str) -> Option<Instance> {
        self.obtain_with(name, true)
    }

    /// Look up `name`.
    ///
    /// Returns the final instance if there is one. Otherwise, if the name is
    /// in creation, returns its early reference, producing it from the
    /// published factory only when `allow_early_reference` is set.
    pub fn obtain_with(&self, name: &str, allow_early_reference: bool) -> Option<Instance> {
        if let Some(instance) = self.cache.get_final(name) {
            return Some(instance);
        }
        if !self.creation.is_actually_in_creation(name) {
            return None;
        }

        let _guard = self.lock.lock();
        // Another thread may have finished while we waited
        if let Some(instance) = self.cache.get_final(name) {
            return Some(instance);
        }

        let early = if allow_early_reference && self.config.allow_circular_references {
            self.cache.get_early_or_factory(name)
        } else {
            self.cache.get_early(name)
        };

        #[cfg(feature = "logging")]
        if early.is_some() {
            trace!(
                target: "component_registry",
                component = name,
                "Returning early reference of component that is not fully initialized yet"
            );
        }

        early
    }

    /// Look up a final instance and downcast it to `T`.
    pub fn get<T: Injectable>(&self, name: &str) -> Result<Arc<T>> {
        let instance = self
            .cache
            .get_final(name)
            .ok_or_else(|| RegistryError::not_found(name))?;
        downcast_instance(name, instance)
    }

    /// Check whether `name` has a final instance
    #[inline]
    pub fn contains_final(&self, name: &str) -> bool {
        self.cache.contains_final(name)
    }

    /// Registered names, in registration order
    pub fn registered_names(&self) -> Vec<String> {
        let _guard = self.lock.lock();
        self.cache.registered_names()
    }

    /// Number of registered names
    pub fn count(&self) -> usize {
        let _guard = self.lock.lock();
        self.cache.registered_count()
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Return the final instance for `name`, building it with `construct`
    /// if there is none.
    ///
    /// Builds are serialized: only one thread ever runs `construct` for a
    /// given name and every concurrent caller observes its outcome. If
    /// `construct` fails with [`RegistryError::CreationRace`] (or a
    /// `DuplicateRegistration` of this same name) and the name has become
    /// final meanwhile, that instance is returned instead. The same holds
    /// when `construct` succeeds after the name was registered elsewhere:
    /// the earlier instance is kept and the built one dropped.
    pub fn obtain_or_create<F>(&self, name: &str, construct: F) -> Result<Instance>
    where
        F: FnOnce() -> Result<Instance>,
    {
        check_name(name)?;
        if let Some(instance) = self.cache.get_final(name) {
            #[cfg(feature = "logging")]
            trace!(
                target: "component_registry",
                component = name,
                location = "fast_path",
                "Returning cached instance of singleton"
            );
            return Ok(instance);
        }

        let _guard = self.lock.lock();
        if let Some(instance) = self.cache.get_final(name) {
            return Ok(instance);
        }
        if self.in_destruction.load(Ordering::Acquire) {
            return Err(RegistryError::CreationDuringTeardown {
                name: name.to_string(),
            });
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "component_registry",
            component = name,
            "Creating shared instance of singleton"
        );

        let episode = CreationEpisode::begin(self, name)?;

        let outcome = match construct() {
            Ok(instance) => Ok((instance, true)),
            Err(err) if err.is_creation_race(name) => self
                .cache
                .get_final(name)
                .map(|existing| (existing, false))
                .ok_or(err),
            Err(err) => Err(err.with_related(episode.take_suppressed())),
        };

        if outcome.is_err() {
            self.cache.discard_staged(name);
        }
        episode.end()?;

        // Registered while construct ran: the earlier instance stays
        let (instance, fresh) = match outcome? {
            (built, true) => match self.cache.get_final(name) {
                Some(existing) => (existing, false),
                None => (built, true),
            },
            recovered => recovered,
        };
        if fresh {
            self.cache.put_final(name, Arc::clone(&instance));

            #[cfg(feature = "logging")]
            debug!(
                target: "component_registry",
                component = name,
                registered = self.cache.registered_count(),
                "Finished creating shared instance of singleton"
            );
        } else {
            #[cfg(feature = "logging")]
            debug!(
                target: "component_registry",
                component = name,
                "Component appeared concurrently, discarding this build"
            );
        }

        Ok(instance)
    }

    /// Typed form of [`obtain_or_create`](Self::obtain_or_create).
    pub fn get_or_create<T, F>(&self, name: &str, construct: F) -> Result<Arc<T>>
    where
        T: Injectable,
        F: FnOnce() -> Result<Arc<T>>,
    {
        let instance = self.obtain_or_create(name, || construct().map(erase))?;
        downcast_instance(name, instance)
    }

    /// Look up `name` (early references included), building it only if it
    /// is unknown.
    ///
    /// This is how a construction strategy requests a peer. A peer that is
    /// in creation without an early reference falls through to
    /// `obtain_or_create` and fails with [`RegistryError::CycleDetected`].
    pub fn resolve<F>(&self, name: &str, construct: F) -> Result<Instance>
    where
        F: FnOnce() -> Result<Instance>,
    {
        match self.obtain(name) {
            Some(instance) => Ok(instance),
            None => self.obtain_or_create(name, construct),
        }
    }

    /// Typed form of [`resolve`](Self::resolve).
    pub fn resolve_as<T, F>(&self, name: &str, construct: F) -> Result<Arc<T>>
    where
        T: Injectable,
        F: FnOnce() -> Result<Arc<T>>,
    {
        let instance = self.resolve(name, || construct().map(erase))?;
        downcast_instance(name, instance)
    }

    /// Record an error swallowed during the current build.
    ///
    /// If the outermost build then fails with `CreationFailed`, recorded
    /// errors are attached as its related causes. Outside a build this is a
    /// no-op.
    pub fn record_suppressed(&self, error: RegistryError) {
        let _guard = self.lock.lock();
        if let Some(suppressed) = self.suppressed.lock().as_mut() {
            suppressed.push(error);
        }
    }

    /// Purge `name` from every instance tier without running its hook.
    pub fn remove(&self, name: &str) -> Option<Instance> {
        let _guard = self.lock.lock();
        self.cache.remove(name)
    }

    // =========================================================================
    // Creation tracking
    // =========================================================================

    /// Check whether `name` is being built, unless excluded from tracking
    #[inline]
    pub fn is_in_creation(&self, name: &str) -> bool {
        self.creation.is_in_creation(name)
    }

    /// Check whether `name` is being built, ignoring exclusions
    #[inline]
    pub fn is_actually_in_creation(&self, name: &str) -> bool {
        self.creation.is_actually_in_creation(name)
    }

    /// Opt `name` out of (or back into) in-creation tracking.
    ///
    /// Used for names whose creation is tracked by an outer mechanism.
    pub fn set_excluded_from_creation_tracking(&self, name: &str, excluded: bool) {
        self.creation.set_excluded(name, excluded);
    }

    // =========================================================================
    // Dependency records
    // =========================================================================

    /// Record that `dependent` depends on `dependency` and must be
    /// destroyed before it. Duplicate edges are ignored.
    pub fn register_dependency(&self, dependency: &str, dependent: &str) -> Result<()> {
        check_name(dependency)?;
        check_name(dependent)?;

        #[cfg(feature = "logging")]
        if self.graph.register_dependency(dependency, dependent) {
            trace!(
                target: "component_registry",
                dependency,
                dependent,
                "Registered dependency"
            );
        }
        #[cfg(not(feature = "logging"))]
        self.graph.register_dependency(dependency, dependent);

        Ok(())
    }

    /// Record that `outer` contains `inner`.
    ///
    /// The container is then also a dependent of its part: destroying the
    /// part destroys the container first.
    pub fn register_containment(&self, inner: &str, outer: &str) -> Result<()> {
        check_name(inner)?;
        check_name(outer)?;
        self.graph.register_containment(inner, outer);
        Ok(())
    }

    /// Check whether `candidate` depends on `name`, directly or transitively
    #[inline]
    pub fn is_dependent(&self, name: &str, candidate: &str) -> bool {
        self.graph.is_dependent(name, candidate)
    }

    /// Check whether any component depends on `name`
    #[inline]
    pub fn has_dependents(&self, name: &str) -> bool {
        self.graph.has_dependents(name)
    }

    /// Components that depend on `name`, in registration order
    #[inline]
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.graph.dependents_of(name)
    }

    /// Components `name` depends on, in registration order
    #[inline]
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.graph.dependencies_of(name)
    }

    /// Components contained by `outer`, in registration order
    #[inline]
    pub fn contained(&self, outer: &str) -> Vec<String> {
        self.graph.contained_in(outer)
    }
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("finals", &self.cache.final_count())
            .field("in_creation", &self.creation.len())
            .field("shutdown_hooks", &self.shutdown.len())
            .field("in_destruction", &self.in_destruction.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LateBound;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicU32;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug)]
    struct Database {
        url: String,
    }

    struct ServiceA {
        b: LateBound<ServiceB>,
    }

    struct ServiceB {
        a: Arc<ServiceA>,
    }

    #[test]
    fn test_register_and_obtain() {
        let registry = SingletonRegistry::new();
        let db = registry
            .register_instance("db", Database { url: "pg".into() })
            .unwrap();

        let got = registry.get::<Database>("db").unwrap();
        assert!(Arc::ptr_eq(&db, &got));
        assert!(registry.obtain("db").is_some());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_register_duplicate() {
        let registry = SingletonRegistry::new();
        let first = erase(Arc::new(Database { url: "a".into() }));
        registry.register("db", Arc::clone(&first)).unwrap();

        // Same instance is accepted again
        registry.register("db", first).unwrap();

        let err = registry
            .register("db", erase(Arc::new(Database { url: "b".into() })))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = SingletonRegistry::new();
        let err = registry
            .register("", erase(Arc::new(Database { url: "a".into() })))
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyName);
        assert!(registry.obtain("").is_none());
    }

    #[test]
    fn test_obtain_unknown_is_absent() {
        let registry = SingletonRegistry::new();
        assert!(registry.obtain("missing").is_none());
        assert!(matches!(
            registry.get::<Database>("missing"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_get_wrong_type() {
        let registry = SingletonRegistry::new();
        registry
            .register_instance("db", Database { url: "pg".into() })
            .unwrap();
        assert!(matches!(
            registry.get::<String>("db"),
            Err(RegistryError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_obtain_or_create_builds_once() {
        let calls = AtomicU32::new(0);
        let registry = SingletonRegistry::new();

        let first = registry
            .obtain_or_create("db", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(erase(Arc::new(Database { url: "pg".into() })))
            })
            .unwrap();
        let second = registry
            .obtain_or_create("db", || unreachable!("already built"))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!registry.is_in_creation("db"));
    }

    #[test]
    fn test_failure_is_not_cached() {
        let registry = SingletonRegistry::new();

        let err = registry
            .obtain_or_create("db", || {
                Err(RegistryError::creation_failed("db", "connection refused"))
            })
            .unwrap_err();
        assert!(matches!(err, RegistryError::CreationFailed { .. }));
        assert!(!registry.contains_final("db"));
        assert!(!registry.is_in_creation("db"));

        // A second attempt starts fresh
        let db = registry
            .get_or_create("db", || Ok(Arc::new(Database { url: "pg".into() })))
            .unwrap();
        assert_eq!(db.url, "pg");
    }

    #[test]
    fn test_failure_discards_staged_entries() {
        let registry = SingletonRegistry::new();
        let _ = registry.obtain_or_create("a", || {
            let raw = Arc::new(Database { url: "half".into() });
            registry.add_early_reference("a", raw);
            assert!(registry.obtain("a").is_some());
            Err(RegistryError::creation_failed("a", "boom"))
        });

        assert!(!registry.cache.is_staged("a"));
        assert!(registry.registered_names().is_empty());
        assert!(registry.obtain("a").is_none());
    }

    #[test]
    fn test_panicking_construct_ends_creation() {
        let registry = SingletonRegistry::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = registry.obtain_or_create("a", || {
                registry.add_early_reference("a", Arc::new(Database { url: "x".into() }));
                panic!("constructor exploded");
            });
        }));

        assert!(outcome.is_err());
        assert!(!registry.is_in_creation("a"));
        assert!(!registry.cache.is_staged("a"));
        // The registry stays usable
        assert!(
            registry
                .get_or_create("a", || Ok(Arc::new(Database { url: "y".into() })))
                .is_ok()
        );
    }

    #[test]
    fn test_creation_race_recovered() {
        let registry = SingletonRegistry::new();
        let winner = erase(Arc::new(Database { url: "winner".into() }));

        let got = registry
            .obtain_or_create("db", || {
                // Another path finishes first and then the loser reports it
                registry.register("db", Arc::clone(&winner))?;
                Err(RegistryError::race("db"))
            })
            .unwrap();

        assert!(Arc::ptr_eq(&got, &winner));
    }

    #[test]
    fn test_registered_during_build_is_kept() {
        let registry = SingletonRegistry::new();
        let first = erase(Arc::new(Database { url: "first".into() }));

        let got = registry
            .obtain_or_create("db", || {
                registry.register("db", Arc::clone(&first))?;
                Ok(erase(Arc::new(Database { url: "second".into() })))
            })
            .unwrap();

        assert!(Arc::ptr_eq(&got, &first));
        assert!(Arc::ptr_eq(&registry.obtain("db").unwrap(), &first));
        assert_eq!(registry.get::<Database>("db").unwrap().url, "first");
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_early_factory_rejected_when_not_in_creation() {
        let registry = SingletonRegistry::new();
        assert!(!registry.add_early_reference("z", Arc::new(Database { url: "z".into() })));

        registry
            .obtain_or_create("a", || {
                // Only the component being built may publish
                assert!(!registry.add_early_reference("z", Arc::new(Database { url: "z".into() })));
                Ok(erase(Arc::new(Database { url: "a".into() })))
            })
            .unwrap();

        assert_eq!(registry.registered_names(), vec!["a"]);
        assert!(!registry.cache.is_staged("z"));
        assert!(registry.obtain("z").is_none());
    }

    #[test]
    fn test_excluded_name_may_publish_early_reference() {
        let registry = SingletonRegistry::new();
        registry.set_excluded_from_creation_tracking("outer", true);

        registry
            .obtain_or_create("outer", || {
                let raw = Arc::new(Database { url: "o".into() });
                assert!(registry.add_early_reference("outer", Arc::clone(&raw)));
                Ok(erase(raw))
            })
            .unwrap();
        assert!(!registry.cache.is_staged("outer"));
    }

    #[test]
    fn test_creation_race_without_instance_propagates() {
        let registry = SingletonRegistry::new();
        let err = registry
            .obtain_or_create("db", || Err(RegistryError::race("db")))
            .unwrap_err();
        assert_eq!(err, RegistryError::race("db"));
    }

    #[test]
    fn test_early_reference_breaks_cycle() {
        let registry = SingletonRegistry::new();

        let a = registry
            .get_or_create("a", || {
                let a = Arc::new(ServiceA {
                    b: LateBound::new(),
                });
                registry.add_early_reference("a", Arc::clone(&a));

                let b = registry.resolve_as("b", || {
                    let early_a = registry.resolve_as::<ServiceA, _>("a", || {
                        unreachable!("a must come from its early reference")
                    })?;
                    Ok(Arc::new(ServiceB { a: early_a }))
                })?;

                a.b.bind(b).ok();
                Ok(a)
            })
            .unwrap();

        let b = registry.get::<ServiceB>("b").unwrap();
        assert!(Arc::ptr_eq(&b.a, &a));
        assert!(Arc::ptr_eq(&a.b.get().unwrap(), &b));
        assert!(!registry.cache.is_staged("a"));
    }

    #[test]
    fn test_cycle_without_early_reference_fails() {
        let registry = SingletonRegistry::new();

        let err = registry
            .obtain_or_create("a", || {
                registry.resolve("b", || {
                    registry.resolve("a", || unreachable!("a is already in creation"))
                })
            })
            .unwrap_err();

        assert_eq!(err, RegistryError::cycle("a"));
        assert!(!registry.is_in_creation("a"));
        assert!(!registry.is_in_creation("b"));
        assert!(!registry.contains_final("a"));
        assert!(!registry.contains_final("b"));
    }

    #[test]
    fn test_early_reference_memoized() {
        let produced = Arc::new(AtomicU32::new(0));
        let registry = SingletonRegistry::new();

        registry
            .obtain_or_create("a", || {
                let raw = Arc::new(Database { url: "a".into() });
                let counter = Arc::clone(&produced);
                registry.add_early_reference_factory(
                    "a",
                    EarlyReferenceFactory::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        erase(raw)
                    }),
                );

                let first = registry.obtain("a").unwrap();
                let second = registry.obtain("a").unwrap();
                assert!(Arc::ptr_eq(&first, &second));
                Ok(first)
            })
            .unwrap();

        assert_eq!(produced.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_obtain_without_early_reference_flag() {
        let registry = SingletonRegistry::new();
        registry
            .obtain_or_create("a", || {
                let raw = Arc::new(Database { url: "a".into() });
                registry.add_early_reference("a", Arc::clone(&raw));

                // No factory invocation without permission
                assert!(registry.obtain_with("a", false).is_none());
                let early = registry.obtain_with("a", true).unwrap();
                // Memoized early instance is visible either way
                assert!(registry.obtain_with("a", false).is_some());
                Ok(early)
            })
            .unwrap();
    }

    #[test]
    fn test_circular_references_disabled() {
        let registry = SingletonRegistry::builder()
            .allow_circular_references(false)
            .build();

        let err = registry
            .obtain_or_create("a", || {
                let a = Arc::new(Database { url: "a".into() });
                assert!(!registry.add_early_reference("a", Arc::clone(&a)));
                registry.resolve("b", || registry.resolve("a", || Ok(erase(a))))
            })
            .unwrap_err();

        assert_eq!(err, RegistryError::cycle("a"));
    }

    #[test]
    fn test_early_factory_ignored_once_final() {
        let registry = SingletonRegistry::new();
        registry
            .register_instance("a", Database { url: "a".into() })
            .unwrap();
        assert!(!registry.add_early_reference("a", Arc::new(Database { url: "b".into() })));
        assert!(!registry.cache.is_staged("a"));
    }

    #[test]
    fn test_suppressed_errors_attached() {
        let registry = SingletonRegistry::new();

        let err = registry
            .obtain_or_create("a", || {
                registry.record_suppressed(RegistryError::not_found("optional"));
                registry
                    .obtain_or_create("b", || {
                        registry.record_suppressed(RegistryError::not_found("inner"));
                        Ok(erase(Arc::new(Database { url: "b".into() })))
                    })
                    .unwrap();
                Err(RegistryError::creation_failed("a", "boom"))
            })
            .unwrap_err();

        assert_eq!(
            err.related(),
            &[
                RegistryError::not_found("optional"),
                RegistryError::not_found("inner"),
            ]
        );

        // Recording outside a build is ignored
        registry.record_suppressed(RegistryError::not_found("late"));
        let err = registry
            .obtain_or_create("c", || Err(RegistryError::creation_failed("c", "boom")))
            .unwrap_err();
        assert!(err.related().is_empty());
    }

    #[test]
    fn test_excluded_name_can_nest() {
        let registry = SingletonRegistry::new();
        registry.set_excluded_from_creation_tracking("outer", true);

        registry
            .obtain_or_create("outer", || {
                assert!(!registry.is_in_creation("outer"));
                Ok(erase(Arc::new(Database { url: "o".into() })))
            })
            .unwrap();
        assert!(registry.contains_final("outer"));
    }

    #[test]
    fn test_concurrent_obtain_or_create_single_construction() {
        let registry = SingletonRegistry::new();
        let calls = AtomicU32::new(0);
        let barrier = Barrier::new(2);

        let results: Vec<Instance> = thread::scope(|s| {
            let mut handles = Vec::new();
            for _ in 0..2 {
                handles.push(s.spawn(|| {
                    barrier.wait();
                    registry
                        .obtain_or_create("cache", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(erase(Arc::new(Database { url: "c".into() })))
                        })
                        .unwrap()
                }));
            }
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stored = registry.obtain("cache").unwrap();
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &stored)));
    }

    #[test]
    fn test_concurrent_failure_seen_by_waiters() {
        let registry = SingletonRegistry::new();
        let calls = AtomicU32::new(0);
        let barrier = Barrier::new(4);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    barrier.wait();
                    let _ = registry.obtain_or_create("flaky", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(RegistryError::creation_failed("flaky", "nope"))
                    });
                });
            }
        });

        // Failures are not cached, each serialized attempt retries from scratch
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(!registry.contains_final("flaky"));
    }

    #[test]
    fn test_lock_handle_is_reentrant() {
        let registry = SingletonRegistry::new();
        let _outer = registry.lock_handle();
        let db = registry
            .get_or_create("db", || Ok(Arc::new(Database { url: "pg".into() })))
            .unwrap();
        assert_eq!(db.url, "pg");
    }

    #[test]
    fn test_registered_names_in_order() {
        let registry = SingletonRegistry::new();
        for name in ["c", "a", "b"] {
            registry
                .register_instance(name, Database { url: name.into() })
                .unwrap();
        }
        assert_eq!(registry.registered_names(), vec!["c", "a", "b"]);

        registry.remove("a");
        assert_eq!(registry.registered_names(), vec!["c", "b"]);
        assert_eq!(registry.count(), 2);
    }
}
