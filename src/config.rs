//! Registry configuration

use crate::SingletonRegistry;

/// Settings fixed at registry construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Expected number of components, used to pre-size the caches
    pub initial_capacity: usize,
    /// Whether early references may be exposed to break circular references
    pub allow_circular_references: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            allow_circular_references: true,
        }
    }
}

/// Builder for [`SingletonRegistry`]
///
/// # Examples
///
/// ```rust
/// use component_registry::SingletonRegistry;
///
/// let registry = SingletonRegistry::builder()
///     .capacity(64)
///     .allow_circular_references(false)
///     .build();
///
/// assert!(!registry.config().allow_circular_references);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    config: RegistryConfig,
}

impl RegistryBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the caches for `capacity` components
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.initial_capacity = capacity;
        self
    }

    /// Allow or forbid early-reference exposure.
    ///
    /// When forbidden every circular reference fails with `CycleDetected`.
    pub fn allow_circular_references(mut self, allow: bool) -> Self {
        self.config.allow_circular_references = allow;
        self
    }

    /// Finish configuration
    pub fn config(self) -> RegistryConfig {
        self.config
    }

    /// Build the registry
    pub fn build(self) -> SingletonRegistry {
        SingletonRegistry::with_config(self.config)
    }
}
