//! Error types for the singleton registry

use crate::Injectable;
use thiserror::Error;

/// Errors that can occur while registering, building or tearing down components
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A different instance is already bound to this name
    #[error("Could not register component '{name}': an instance is already bound")]
    DuplicateRegistration { name: String },

    /// The name is already in creation and no early reference could break the cycle
    #[error(
        "Component '{name}' is currently in creation: is there an unresolvable circular reference?"
    )]
    CycleDetected { name: String },

    /// Another path finished building the component first
    #[error("Component '{name}' was created concurrently")]
    CreationRace { name: String },

    /// A build was requested while the registry is tearing down
    #[error(
        "Creation of component '{name}' not allowed while singletons are in destruction \
         (do not request a component from a shutdown hook)"
    )]
    CreationDuringTeardown { name: String },

    /// Creation was ended for a name that was never begun
    #[error("Component '{name}' isn't currently in creation")]
    NotInCreation { name: String },

    /// The construction strategy failed to build the component
    #[error("Failed to create component '{name}': {reason}")]
    CreationFailed {
        name: String,
        reason: String,
        /// Errors recorded as suppressed during the same construction episode
        related: Vec<RegistryError>,
    },

    /// A shutdown hook failed; only ever logged
    #[error("Destruction of component '{name}' failed: {reason}")]
    ShutdownHookFailed { name: String, reason: String },

    /// No final instance is bound to this name
    #[error("Component not found: {name}")]
    NotFound { name: String },

    /// The bound instance is not of the requested type
    #[error("Component '{name}' is not of type {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    /// Component names must not be empty
    #[error("Component name must not be empty")]
    EmptyName,
}

impl RegistryError {
    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            name: name.into(),
            reason: reason.into(),
            related: Vec::new(),
        }
    }

    /// Create a CycleDetected error
    #[inline]
    pub fn cycle(name: impl Into<String>) -> Self {
        Self::CycleDetected { name: name.into() }
    }

    /// Create a CreationRace error
    #[inline]
    pub fn race(name: impl Into<String>) -> Self {
        Self::CreationRace { name: name.into() }
    }

    /// Create a NotFound error
    #[inline]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a TypeMismatch error for `T`
    #[inline]
    pub fn type_mismatch<T: Injectable>(name: impl Into<String>) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: T::type_name_of(),
        }
    }

    /// True when a construct closure signals that `name` already appeared
    /// in the final tier through another path.
    pub(crate) fn is_creation_race(&self, name: &str) -> bool {
        match self {
            Self::CreationRace { name: n } | Self::DuplicateRegistration { name: n } => n == name,
            _ => false,
        }
    }

    /// Attach suppressed errors as related causes of a `CreationFailed`.
    /// Other kinds are returned untouched.
    pub(crate) fn with_related(self, suppressed: Vec<RegistryError>) -> Self {
        match self {
            Self::CreationFailed {
                name,
                reason,
                mut related,
            } => {
                related.extend(suppressed);
                Self::CreationFailed {
                    name,
                    reason,
                    related,
                }
            }
            other => other,
        }
    }

    /// Errors recorded alongside a `CreationFailed`
    pub fn related(&self) -> &[RegistryError] {
        match self {
            Self::CreationFailed { related, .. } => related,
            _ => &[],
        }
    }
}

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Reject empty component names
#[inline]
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        Err(RegistryError::EmptyName)
    } else {
        Ok(())
    }
}
