//! # Component Registry - Shared Singletons with Circular Reference Resolution
//!
//! A thread-safe registry of named, shared component instances. Components
//! are built at most once, may publish an early reference while they are
//! still being built so that mutually-referencing peers can be wired up,
//! and are torn down dependents-first.
//!
//! ## Features
//!
//! - 🔁 **Circular references** - Early references break setter-style cycles
//! - 🛑 **Cycle detection** - Constructor-style cycles fail fast with a clear error
//! - 🧵 **Build once** - Concurrent callers for one name observe a single build
//! - ⚡ **Lock-free reads** - Final instances live in a `DashMap`
//! - 🧹 **Ordered teardown** - Dependents are destroyed before their dependencies
//! - 📊 **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use component_registry::SingletonRegistry;
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let registry = SingletonRegistry::new();
//!
//! // Register a pre-built instance
//! registry
//!     .register_instance("db", Database { url: "postgres://localhost".into() })
//!     .unwrap();
//!
//! // Build on first request, reuse afterwards
//! let users = registry
//!     .get_or_create("users", || {
//!         let db = registry.get::<Database>("db")?;
//!         registry.register_dependency("db", "users")?;
//!         Ok(Arc::new(UserService { db }))
//!     })
//!     .unwrap();
//!
//! assert_eq!(users.db.url, "postgres://localhost");
//! assert!(registry.is_dependent("db", "users"));
//! ```
//!
//! ## Circular References
//!
//! ```rust
//! use component_registry::{LateBound, SingletonRegistry};
//! use std::sync::Arc;
//!
//! struct Orders {
//!     customers: LateBound<Customers>,
//! }
//!
//! struct Customers {
//!     orders: Arc<Orders>,
//! }
//!
//! let registry = SingletonRegistry::new();
//!
//! let orders = registry
//!     .get_or_create("orders", || {
//!         let orders = Arc::new(Orders { customers: LateBound::new() });
//!         // Let peers see the half-built instance
//!         registry.add_early_reference("orders", Arc::clone(&orders));
//!
//!         let customers = registry.resolve_as("customers", || {
//!             let orders = registry.resolve_as::<Orders, _>("orders", || unreachable!())?;
//!             Ok(Arc::new(Customers { orders }))
//!         })?;
//!
//!         let _ = orders.customers.bind(customers);
//!         Ok(orders)
//!     })
//!     .unwrap();
//!
//! let customers = registry.get::<Customers>("customers").unwrap();
//! assert!(Arc::ptr_eq(&customers.orders, &orders));
//! ```
//!
//! ## Teardown
//!
//! ```rust
//! use component_registry::SingletonRegistry;
//!
//! let registry = SingletonRegistry::new();
//! registry.register_shutdown_hook("db", || Ok(()));
//! registry.register_shutdown_hook("repo", || Ok(()));
//! registry.register_dependency("db", "repo").unwrap();
//!
//! // "repo" is destroyed before "db"
//! registry.destroy_all();
//! assert!(!registry.has_shutdown_hook("db"));
//! ```

mod config;
mod creation;
mod error;
mod factory;
mod graph;
mod lifecycle;
#[cfg(feature = "logging")]
pub mod logging;
mod provider;
mod registry;
mod storage;

pub use config::*;
pub use error::{RegistryError, Result};
pub use factory::*;
pub use lifecycle::{DisposableComponent, ShutdownError, ShutdownHook};
pub use provider::*;
pub use registry::*;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        DisposableComponent, EarlyReferenceFactory, Injectable, Instance, LateBound,
        RegistryBuilder, RegistryError, Result, ShutdownError, SingletonRegistry, erase,
    };
    pub use std::sync::Arc;
}
