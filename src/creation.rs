//! In-creation tracking
//!
//! A name sits in the in-creation set for exactly the duration of one build.
//! Asking to begin a build for a name that is already there means the build
//! re-entered itself: an unresolvable cycle.

use crate::{RegistryError, Result};
use ahash::RandomState;
use dashmap::DashSet;
use std::sync::Arc;

/// Set of names currently being built, plus names opted out of tracking
pub(crate) struct CreationTracker {
    in_creation: DashSet<Arc<str>, RandomState>,
    excluded: DashSet<Arc<str>, RandomState>,
}

impl CreationTracker {
    pub fn new() -> Self {
        Self {
            in_creation: DashSet::with_hasher(RandomState::new()),
            excluded: DashSet::with_hasher(RandomState::new()),
        }
    }

    /// Check whether `name` is in creation, honoring exclusions
    #[inline]
    pub fn is_in_creation(&self, name: &str) -> bool {
        !self.excluded.contains(name) && self.in_creation.contains(name)
    }

    /// Raw membership, ignoring exclusions
    #[inline]
    pub fn is_actually_in_creation(&self, name: &str) -> bool {
        self.in_creation.contains(name)
    }

    /// Check whether `name` is opted out of tracking
    #[inline]
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(name)
    }

    /// Mark `name` as in creation
    pub fn begin_creation(&self, name: &str) -> Result<()> {
        if !self.excluded.contains(name) && !self.in_creation.insert(Arc::from(name)) {
            return Err(RegistryError::cycle(name));
        }
        Ok(())
    }

    /// Clear the in-creation mark for `name`
    pub fn end_creation(&self, name: &str) -> Result<()> {
        if !self.excluded.contains(name) && self.in_creation.remove(name).is_none() {
            return Err(RegistryError::NotInCreation {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Opt `name` out of (or back into) in-creation tracking
    pub fn set_excluded(&self, name: &str, excluded: bool) {
        if excluded {
            self.excluded.insert(Arc::from(name));
        } else {
            self.excluded.remove(name);
        }
    }

    /// Number of names currently in creation
    #[inline]
    pub fn len(&self) -> usize {
        self.in_creation.len()
    }
}

impl Default for CreationTracker {
    fn default() -> Self {
        Self::new()
    }
}
