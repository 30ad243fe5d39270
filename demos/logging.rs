//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use component_registry::{LateBound, RegistryError, SingletonRegistry};
use std::sync::Arc;

#[allow(dead_code)]
struct Database {
    url: String,
}

struct UserService {
    audit: LateBound<AuditLog>,
}

#[allow(dead_code)]
struct AuditLog {
    users: Arc<UserService>,
}

fn main() {
    // Initialize logging - uses JSON if logging-json feature enabled,
    // pretty if logging-pretty enabled
    component_registry::logging::builder()
        .trace()
        .registry_only()
        .init();

    println!("=== Component Registry Logging Demo ===\n");

    // Create the registry (logs: "Creating new singleton registry")
    let registry = SingletonRegistry::new();

    // Register a pre-built instance (logs: "Registering singleton instance")
    registry
        .register_instance(
            "db",
            Database {
                url: "postgres://localhost/mydb".into(),
            },
        )
        .unwrap();

    // Build a cycle through an early reference
    // (logs: "Creating shared instance of singleton",
    //        "Eagerly caching component to allow for resolving circular references",
    //        "Returning early reference of component that is not fully initialized yet")
    let users = registry
        .get_or_create("users", || {
            let users = Arc::new(UserService {
                audit: LateBound::new(),
            });
            registry.add_early_reference("users", Arc::clone(&users));

            let audit = registry.resolve_as("audit", || {
                let users = registry.resolve_as::<UserService, _>("users", || unreachable!())?;
                registry.register_dependency("users", "audit")?;
                Ok(Arc::new(AuditLog { users }))
            })?;
            registry.register_dependency("db", "users")?;

            let _ = users.audit.bind(audit);
            Ok(users)
        })
        .unwrap();
    assert!(users.audit.is_bound());

    // Fast path lookup (logs: "Returning cached instance of singleton")
    let _again = registry
        .obtain_or_create("users", || Err(RegistryError::not_found("users")))
        .unwrap();

    // A failing hook is logged and teardown continues
    // (logs: "Shutdown hook failed, continuing teardown")
    registry.register_shutdown_hook("db", || Ok(()));
    registry.register_shutdown_hook("users", || Err("connection pool still busy".into()));
    registry.register_shutdown_hook("audit", || Ok(()));

    // Tear down (logs: "Destroying singletons", "Destroying dependents first")
    registry.destroy_all();

    println!("\n=== Demo Complete ===");
    println!("Check the log output above to see structured logging in action!");
    println!("\nTip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
}
