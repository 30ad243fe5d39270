//! Ordered, dependency-aware teardown
//!
//! Components are destroyed dependents-first: before a component's shutdown
//! hook runs, everything registered as depending on it is destroyed, and
//! after the hook, everything it contains. Hook failures (errors or panics)
//! are logged and never stop the walk.

use crate::{Injectable, RegistryError, SingletonRegistry};
use ahash::RandomState;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

/// Error returned by a shutdown hook
pub type ShutdownError = Box<dyn std::error::Error + Send + Sync>;

/// A one-shot teardown action for a component
pub type ShutdownHook = Box<dyn FnOnce() -> Result<(), ShutdownError> + Send>;

/// A component that knows how to release its own resources.
pub trait DisposableComponent: Injectable {
    /// Release resources held by this component
    fn destroy(&self) -> Result<(), ShutdownError>;
}

/// Shutdown hooks keyed by name, in registration order
pub(crate) struct ShutdownRegistry {
    hooks: Mutex<IndexMap<Arc<str>, ShutdownHook, RandomState>>,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(IndexMap::default()),
        }
    }

    /// Register (or replace, keeping the original position) a hook
    pub fn insert(&self, name: &str, hook: ShutdownHook) {
        self.hooks.lock().insert(Arc::from(name), hook);
    }

    /// Detach the hook for `name`
    pub fn take(&self, name: &str) -> Option<ShutdownHook> {
        self.hooks.lock().shift_remove(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.hooks.lock().contains_key(name)
    }

    /// Snapshot of registered names in registration order
    pub fn names(&self) -> Vec<Arc<str>> {
        self.hooks.lock().keys().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn clear(&self) {
        self.hooks.lock().clear();
    }
}

impl Default for ShutdownRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "shutdown hook panicked".to_string()
    }
}

/// Run a hook, absorbing any failure
fn run_hook(name: &str, hook: ShutdownHook) {
    let reason = match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => {
            #[cfg(feature = "logging")]
            trace!(
                target: "component_registry",
                component = name,
                "Invoked shutdown hook"
            );
            return;
        }
        Ok(Err(err)) => err.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    let failure = RegistryError::ShutdownHookFailed {
        name: name.to_string(),
        reason,
    };

    #[cfg(feature = "logging")]
    warn!(
        target: "component_registry",
        component = name,
        error = %failure,
        "Shutdown hook failed, continuing teardown"
    );
    #[cfg(not(feature = "logging"))]
    drop(failure);
}

impl SingletonRegistry {
    /// Register the teardown action for `name`.
    ///
    /// Hooks run in reverse registration order during [`destroy_all`](Self::destroy_all),
    /// always after the hooks of every dependent.
    pub fn register_shutdown_hook<F>(&self, name: &str, hook: F)
    where
        F: FnOnce() -> Result<(), ShutdownError> + Send + 'static,
    {
        #[cfg(feature = "logging")]
        trace!(
            target: "component_registry",
            component = name,
            "Registering shutdown hook"
        );

        self.shutdown.insert(name, Box::new(hook));
    }

    /// Register `component`'s own [`DisposableComponent::destroy`] as its hook.
    pub fn register_disposable<T: DisposableComponent>(&self, name: &str, component: Arc<T>) {
        self.register_shutdown_hook(name, move || component.destroy());
    }

    /// Check whether `name` has a pending shutdown hook
    #[inline]
    pub fn has_shutdown_hook(&self, name: &str) -> bool {
        self.shutdown.contains(name)
    }

    /// Check whether `destroy_all` is running
    #[inline]
    pub fn is_in_destruction(&self) -> bool {
        self.in_destruction.load(Ordering::Acquire)
    }

    /// Destroy every component with a shutdown hook, then clear all state.
    ///
    /// While this runs, `obtain_or_create` fails with
    /// [`RegistryError::CreationDuringTeardown`].
    pub fn destroy_all(&self) {
        #[cfg(feature = "logging")]
        debug!(
            target: "component_registry",
            hooks = self.shutdown.len(),
            "Destroying singletons"
        );

        {
            let _guard = self.lock.lock();
            self.in_destruction.store(true, Ordering::Release);
        }

        let names = self.shutdown.names();
        for name in names.iter().rev() {
            self.destroy_one(name);
        }

        self.graph.clear();
        self.clear_singleton_cache();
    }

    /// Destroy `name`: its dependents first, then its own hook, then the
    /// components it contains.
    pub fn destroy_one(&self, name: &str) {
        {
            let _guard = self.lock.lock();
            self.cache.remove(name);
        }
        let hook = self.shutdown.take(name);
        self.destroy_component(name, hook);
    }

    fn destroy_component(&self, name: &str, hook: Option<ShutdownHook>) {
        let dependents = self.graph.take_dependents(name);

        #[cfg(feature = "logging")]
        if !dependents.is_empty() {
            trace!(
                target: "component_registry",
                component = name,
                dependents = ?dependents,
                "Destroying dependents first"
            );
        }

        for dependent in &dependents {
            self.destroy_one(dependent);
        }

        if let Some(hook) = hook {
            run_hook(name, hook);
        }

        for inner in self.graph.take_contained(name) {
            self.destroy_one(&inner);
        }

        self.graph.scrub(name);
    }

    /// Drop every instance and reset the destruction flag
    fn clear_singleton_cache(&self) {
        let _guard = self.lock.lock();
        self.cache.clear();
        self.in_destruction.store(false, Ordering::Release);
    }

    /// Reset the registry without running any hook.
    ///
    /// Drops every instance, shutdown hook and dependency record. Meant for
    /// error recovery; prefer [`destroy_all`](Self::destroy_all).
    pub fn clear_all(&self) {
        #[cfg(feature = "logging")]
        debug!(
            target: "component_registry",
            finals = self.cache.final_count(),
            "Clearing registry without running shutdown hooks"
        );

        let _guard = self.lock.lock();
        self.shutdown.clear();
        self.graph.clear();
        self.cache.clear();
        self.in_destruction.store(false, Ordering::Release);
    }
}
