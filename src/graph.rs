//! Dependency and containment records
//!
//! Edges only drive teardown order. Each map has its own lock; when both
//! dependency maps are needed the order is always dependents, then
//! dependencies, so the two stay exact inverses.

use ahash::RandomState;
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type NameSet = IndexSet<Arc<str>, RandomState>;
type EdgeMap = HashMap<Arc<str>, NameSet, RandomState>;

pub(crate) struct DependencyGraph {
    /// name -> components that depend on it (destroyed first)
    dependents: Mutex<EdgeMap>,
    /// name -> components it depends on
    dependencies: Mutex<EdgeMap>,
    /// outer -> inner components it contains
    contained: Mutex<EdgeMap>,
}

fn to_names(set: Option<&NameSet>) -> Vec<String> {
    set.map(|s| s.iter().map(|n| n.to_string()).collect())
        .unwrap_or_default()
}

/// Remove `name` from `map[key]`, dropping the entry once empty
fn unlink(map: &mut EdgeMap, key: &str, name: &str) {
    if let Some(set) = map.get_mut(key) {
        set.shift_remove(name);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            dependents: Mutex::new(EdgeMap::default()),
            dependencies: Mutex::new(EdgeMap::default()),
            contained: Mutex::new(EdgeMap::default()),
        }
    }

    /// Record that `dependent` depends on `dependency`.
    ///
    /// Returns false when the edge already existed.
    pub fn register_dependency(&self, dependency: &str, dependent: &str) -> bool {
        let mut dependents = self.dependents.lock();
        let added = dependents
            .entry(Arc::from(dependency))
            .or_default()
            .insert(Arc::from(dependent));
        if !added {
            return false;
        }

        let mut dependencies = self.dependencies.lock();
        dependencies
            .entry(Arc::from(dependent))
            .or_default()
            .insert(Arc::from(dependency));
        true
    }

    /// Record that `outer` contains `inner`; the container then also counts
    /// as a dependent of its part.
    pub fn register_containment(&self, inner: &str, outer: &str) -> bool {
        {
            let mut contained = self.contained.lock();
            let added = contained
                .entry(Arc::from(outer))
                .or_default()
                .insert(Arc::from(inner));
            if !added {
                return false;
            }
        }
        self.register_dependency(inner, outer);
        true
    }

    /// Transitive check: does `candidate` (directly or indirectly) depend on `name`?
    pub fn is_dependent(&self, name: &str, candidate: &str) -> bool {
        let dependents = self.dependents.lock();
        let mut seen = HashSet::new();
        Self::reaches(&dependents, name, candidate, &mut seen)
    }

    fn reaches<'a>(
        dependents: &'a EdgeMap,
        name: &'a str,
        candidate: &str,
        seen: &mut HashSet<&'a str>,
    ) -> bool {
        if !seen.insert(name) {
            return false;
        }
        let Some(direct) = dependents.get(name) else {
            return false;
        };
        if direct.contains(candidate) {
            return true;
        }
        direct
            .iter()
            .any(|next| Self::reaches(dependents, next, candidate, seen))
    }

    /// Check whether anything depends on `name`
    #[inline]
    pub fn has_dependents(&self, name: &str) -> bool {
        self.dependents.lock().contains_key(name)
    }

    /// Components depending on `name`, in registration order
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        to_names(self.dependents.lock().get(name))
    }

    /// Components `name` depends on, in registration order
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        to_names(self.dependencies.lock().get(name))
    }

    /// Components contained by `outer`, in registration order
    pub fn contained_in(&self, outer: &str) -> Vec<String> {
        to_names(self.contained.lock().get(outer))
    }

    /// Detach and return the dependents of `name` as a snapshot.
    ///
    /// The reverse records are unlinked so the maps stay inverse.
    pub fn take_dependents(&self, name: &str) -> Vec<Arc<str>> {
        let mut dependents = self.dependents.lock();
        let Some(taken) = dependents.remove(name) else {
            return Vec::new();
        };
        let mut dependencies = self.dependencies.lock();
        for dependent in &taken {
            unlink(&mut dependencies, dependent, name);
        }
        taken.into_iter().collect()
    }

    /// Detach and return the components contained by `outer`
    pub fn take_contained(&self, outer: &str) -> Vec<Arc<str>> {
        self.contained
            .lock()
            .remove(outer)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Erase every edge touching `name`
    pub fn scrub(&self, name: &str) {
        let mut dependents = self.dependents.lock();
        let mut dependencies = self.dependencies.lock();

        // Edges where `name` is the dependency
        if let Some(own) = dependents.remove(name) {
            for dependent in &own {
                unlink(&mut dependencies, dependent, name);
            }
        }
        // Edges where `name` is the dependent
        if let Some(needs) = dependencies.remove(name) {
            for dependency in &needs {
                unlink(&mut dependents, dependency, name);
            }
        }
    }

    /// Drop every record
    pub fn clear(&self) {
        self.contained.lock().clear();
        let mut dependents = self.dependents.lock();
        let mut dependencies = self.dependencies.lock();
        dependents.clear();
        dependencies.clear();
    }

    /// Check that the two dependency maps are exact inverses
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        let dependents = self.dependents.lock();
        let dependencies = self.dependencies.lock();
        let forward = dependents.iter().all(|(dep, set)| {
            set.iter().all(|d| {
                dependencies
                    .get(d)
                    .is_some_and(|back| back.contains(&**dep))
            })
        });
        let backward = dependencies.iter().all(|(d, set)| {
            set.iter().all(|dep| {
                dependents
                    .get(dep)
                    .is_some_and(|fwd| fwd.contains(&**d))
            })
        });
        forward && backward
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
