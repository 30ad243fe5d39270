//! Contract types shared with the construction strategy
//!
//! These traits and slots describe what can live in the registry and how
//! components refer to peers that may not be finished yet.

use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Marker trait for types that can be stored in the registry.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
pub trait Injectable: Send + Sync + 'static {
    /// Returns the type name for debugging
    #[inline]
    fn type_name_of() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// A set-once reference to a peer component.
///
/// Property-style injection fills these after the owning component has
/// already been allocated (and possibly exposed as an early reference).
/// The registry only decides *which* handle a peer receives; it never
/// touches these slots.
///
/// Two components pointing at each other through `LateBound` form a strong
/// `Arc` cycle that outlives the registry. Store `LateBound<T>` on one side
/// only, or keep a `Weak` on the other, when that matters.
///
/// # Examples
///
/// ```rust
/// use component_registry::LateBound;
/// use std::sync::Arc;
///
/// struct Repo;
/// struct Service { repo: LateBound<Repo> }
///
/// let service = Service { repo: LateBound::new() };
/// assert!(!service.repo.is_bound());
///
/// service.repo.bind(Arc::new(Repo)).ok();
/// assert!(service.repo.is_bound());
/// ```
pub struct LateBound<T> {
    slot: OnceCell<Arc<T>>,
}

impl<T> LateBound<T> {
    /// Create an empty slot
    #[inline]
    pub fn new() -> Self {
        Self {
            slot: OnceCell::new(),
        }
    }

    /// Bind the slot. Fails with the rejected handle if already bound.
    #[inline]
    pub fn bind(&self, peer: Arc<T>) -> Result<(), Arc<T>> {
        self.slot.set(peer)
    }

    /// Get the bound peer, if any
    #[inline]
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.get().cloned()
    }

    /// Check whether the slot has been bound
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl<T> Default for LateBound<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for LateBound<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LateBound")
            .field("bound", &self.is_bound())
            .finish()
    }
}
