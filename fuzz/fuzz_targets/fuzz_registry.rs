#![no_main]

//! Fuzz target for registration, lookup and nested creation
//!
//! Drives arbitrary sequences of builds over a small name space so that
//! cycles (with and without early references) are common, then checks that
//! the registry is left consistent after every operation.

use arbitrary::Arbitrary;
use component_registry::{
    EarlyReferenceFactory, Instance, RegistryError, SingletonRegistry, erase,
};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn name(idx: u8) -> &'static str {
    NAMES[idx as usize % NAMES.len()]
}

#[derive(Debug)]
struct Component {
    value: u32,
}

/// One step of a nested build
#[derive(Debug, Clone, Arbitrary)]
struct Step {
    target: u8,
    expose_early: bool,
    fail: bool,
}

#[derive(Debug, Arbitrary)]
enum RegistryOp {
    Register(u8, u32),
    Obtain(u8, bool),
    Build(Vec<Step>),
    Remove(u8),
    Depend(u8, u8),
    Contain(u8, u8),
    IsDependent(u8, u8),
    Exclude(u8, bool),
}

/// Build `steps[0]`, resolving `steps[1..]` as a chain of peers
fn build(registry: &SingletonRegistry, steps: &[Step]) -> Result<Instance, RegistryError> {
    let Some((step, rest)) = steps.split_first() else {
        return Err(RegistryError::not_found("empty chain"));
    };
    let current = name(step.target);

    registry.obtain_or_create(current, || {
        let raw = erase(Arc::new(Component {
            value: step.target as u32,
        }));
        if step.expose_early {
            let early = Arc::clone(&raw);
            registry.add_early_reference_factory(current, EarlyReferenceFactory::new(move || early));
        }

        if let Some(next) = rest.first() {
            let peer = name(next.target);
            registry.resolve(peer, || build(registry, rest))?;
            registry.register_dependency(peer, current)?;
        }

        if step.fail {
            return Err(RegistryError::creation_failed(current, "fuzzed failure"));
        }
        Ok(raw)
    })
}

fn check_invariants(registry: &SingletonRegistry) {
    for n in NAMES {
        // Nothing stays in creation between top-level calls
        assert!(!registry.is_actually_in_creation(n));
        if registry.contains_final(n) {
            assert!(registry.obtain(n).is_some());
        }
    }

    let names = registry.registered_names();
    let mut deduped = names.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(names.len(), deduped.len(), "duplicate registered name");
    assert_eq!(names.len(), registry.count());
}

fuzz_target!(|ops: Vec<RegistryOp>| {
    let registry = SingletonRegistry::new();

    for op in ops.into_iter().take(100) {
        match op {
            RegistryOp::Register(idx, value) => {
                let n = name(idx);
                let had = registry.contains_final(n);
                let result = registry.register_instance(n, Component { value });
                assert_eq!(result.is_err(), had);
            }
            RegistryOp::Obtain(idx, allow_early) => {
                let found = registry.obtain_with(name(idx), allow_early);
                assert_eq!(found.is_some(), registry.contains_final(name(idx)));
            }
            RegistryOp::Build(steps) => {
                let steps: Vec<Step> = steps.into_iter().take(8).collect();
                if let Ok(instance) = build(&registry, &steps) {
                    let n = name(steps[0].target);
                    let stored = registry.obtain(n).expect("built component is final");
                    assert!(Arc::ptr_eq(&instance, &stored));
                    assert!(instance.downcast_ref::<Component>().is_some());
                }
            }
            RegistryOp::Remove(idx) => {
                registry.remove(name(idx));
                assert!(!registry.contains_final(name(idx)));
            }
            RegistryOp::Depend(a, b) => {
                registry.register_dependency(name(a), name(b)).unwrap();
                assert!(registry.is_dependent(name(a), name(b)));
                assert!(registry.dependencies(name(b)).iter().any(|d| d == name(a)));
            }
            RegistryOp::Contain(inner, outer) => {
                registry.register_containment(name(inner), name(outer)).unwrap();
                assert!(registry.contained(name(outer)).iter().any(|c| c == name(inner)));
            }
            RegistryOp::IsDependent(a, b) => {
                let _ = registry.is_dependent(name(a), name(b));
            }
            RegistryOp::Exclude(idx, excluded) => {
                registry.set_excluded_from_creation_tracking(name(idx), excluded);
            }
        }
        check_invariants(&registry);
    }
});
