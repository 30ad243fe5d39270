//! Resolving circular references between components
//!
//! ```bash
//! cargo run --example circular
//! ```
//!
//! `OrderService` and `CustomerService` point at each other. The order
//! service publishes an early reference before resolving its peer, so the
//! customer service receives the half-built order service and the order
//! service binds its peer afterwards. Two components that both need the
//! other fully built at construction time cannot be wired and fail with
//! `CycleDetected`.

use component_registry::{
    DisposableComponent, LateBound, RegistryError, ShutdownError, SingletonRegistry,
};
use std::sync::Arc;

struct OrderService {
    customers: LateBound<CustomerService>,
}

impl OrderService {
    fn describe(&self) -> String {
        match self.customers.get() {
            Some(customers) => format!("orders -> {}", customers.name),
            None => "orders -> (unbound)".to_string(),
        }
    }
}

impl DisposableComponent for OrderService {
    fn destroy(&self) -> Result<(), ShutdownError> {
        println!("  closing order service");
        Ok(())
    }
}

struct CustomerService {
    name: String,
    orders: Arc<OrderService>,
}

impl DisposableComponent for CustomerService {
    fn destroy(&self) -> Result<(), ShutdownError> {
        println!("  closing customer service");
        Ok(())
    }
}

fn wire_setter_style(
    registry: &SingletonRegistry,
) -> component_registry::Result<Arc<OrderService>> {
    registry.get_or_create("orders", || {
        let orders = Arc::new(OrderService {
            customers: LateBound::new(),
        });
        registry.add_early_reference("orders", Arc::clone(&orders));

        let customers = registry.resolve_as("customers", || {
            let orders = registry.resolve_as::<OrderService, _>("orders", || {
                Err(RegistryError::cycle("orders"))
            })?;
            let customers = Arc::new(CustomerService {
                name: "customers".into(),
                orders,
            });
            registry.register_dependency("orders", "customers")?;
            registry.register_disposable("customers", Arc::clone(&customers));
            Ok(customers)
        })?;

        let _ = orders.customers.bind(customers);
        registry.register_disposable("orders", Arc::clone(&orders));
        Ok(orders)
    })
}

fn wire_constructor_style(registry: &SingletonRegistry) -> component_registry::Result<()> {
    registry
        .obtain_or_create("left", || {
            registry.resolve("right", || {
                registry.resolve("left", || unreachable!("left is already in creation"))
            })
        })
        .map(|_| ())
}

fn main() {
    #[cfg(feature = "logging")]
    component_registry::logging::init();

    println!("=== Setter-style cycle ===");
    let registry = SingletonRegistry::new();
    let orders = wire_setter_style(&registry).expect("early reference resolves the cycle");
    let customers = registry
        .get::<CustomerService>("customers")
        .expect("customers was built");

    println!("  {}", orders.describe());
    println!(
        "  customers -> same order service: {}",
        Arc::ptr_eq(&customers.orders, &orders)
    );

    println!("\n=== Constructor-style cycle ===");
    match wire_constructor_style(&registry) {
        Ok(()) => println!("  unexpectedly wired"),
        Err(err) => println!("  {err}"),
    }

    println!("\n=== Teardown ===");
    registry.destroy_all();
}
