//! Instance handles and early-reference factories
//!
//! Every component lives in the registry as a type-erased [`Instance`].
//! Components that are allocated but not yet fully populated can be exposed
//! to their peers through an [`EarlyReferenceFactory`], a one-shot producer
//! whose result the registry memoizes.

use crate::{Injectable, RegistryError, Result};
use std::any::Any;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Opaque, shared handle to a component.
///
/// The registry never looks inside; it only stores and hands out clones.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Erase a typed component into an [`Instance`]
#[inline]
pub fn erase<T: Injectable>(component: Arc<T>) -> Instance {
    component as Instance
}

/// Downcast an [`Instance`] bound to `name` back to `Arc<T>`
#[inline]
pub fn downcast_instance<T: Injectable>(name: &str, instance: Instance) -> Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| RegistryError::type_mismatch::<T>(name))
}

/// Type-erased producer of an early reference
type EarlyFn = Box<dyn FnOnce() -> Instance + Send>;

/// One-shot producer of the instance exposed to peers before a component
/// finishes construction.
///
/// The produced instance may be the raw allocation or a wrapped view of it.
/// It is invoked at most once; the registry caches the result so every peer
/// observes the identical early instance.
pub struct EarlyReferenceFactory {
    produce: EarlyFn,
}

impl EarlyReferenceFactory {
    /// Create a factory from an arbitrary producer
    #[inline]
    pub fn new<F>(produce: F) -> Self
    where
        F: FnOnce() -> Instance + Send + 'static,
    {
        Self {
            produce: Box::new(produce),
        }
    }

    /// Expose an already allocated component as-is
    #[inline]
    pub fn exposing<T: Injectable>(component: Arc<T>) -> Self {
        Self::new(move || erase(component))
    }

    /// Expose a view of the component produced by `wrap` on first use
    #[inline]
    pub fn wrapping<T, F>(component: Arc<T>, wrap: F) -> Self
    where
        T: Injectable,
        F: FnOnce(Arc<T>) -> Instance + Send + 'static,
    {
        Self::new(move || wrap(component))
    }

    /// Consume the factory and produce the early instance
    #[inline]
    pub(crate) fn produce(self, _name: &str) -> Instance {
        #[cfg(feature = "logging")]
        trace!(
            target: "component_registry",
            component = _name,
            "Producing early reference"
        );

        (self.produce)()
    }
}

impl std::fmt::Debug for EarlyReferenceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EarlyReferenceFactory").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Engine {
        id: u32,
    }

    struct Proxy {
        target: Arc<Engine>,
    }

    #[test]
    fn test_exposing_returns_same_allocation() {
        let engine = Arc::new(Engine { id: 7 });
        let factory = EarlyReferenceFactory::exposing(Arc::clone(&engine));

        let early = factory.produce("engine");
        let early = downcast_instance::<Engine>("engine", early).unwrap();

        assert_eq!(early.id, 7);
        assert!(Arc::ptr_eq(&early, &engine));
    }

    #[test]
    fn test_wrapping_produces_view() {
        let engine = Arc::new(Engine { id: 1 });
        let factory = EarlyReferenceFactory::wrapping(Arc::clone(&engine), |target| {
            erase(Arc::new(Proxy { target }))
        });

        let proxy = downcast_instance::<Proxy>("engine", factory.produce("engine")).unwrap();
        assert!(Arc::ptr_eq(&proxy.target, &engine));
    }

    #[test]
    fn test_producer_runs_lazily() {
        static CALLS: AtomicU32 = AtomicU32::new(0);

        let factory = EarlyReferenceFactory::new(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            erase(Arc::new(Engine { id: 2 }))
        });
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        let _ = factory.produce("engine");
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_downcast_mismatch() {
        let instance = erase(Arc::new(Engine { id: 3 }));
        let err = downcast_instance::<String>("engine", instance).unwrap_err();
        assert!(matches!(err, RegistryError::TypeMismatch { .. }));
    }
}
