#![no_main]

//! Fuzz target for teardown ordering
//!
//! Registers shutdown hooks, dependency and containment edges over a small
//! name space, then destroys components one at a time or all at once and
//! checks that every hook runs at most once and dependents go first.

use arbitrary::Arbitrary;
use component_registry::SingletonRegistry;
use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, Mutex};

const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn name(idx: u8) -> &'static str {
    NAMES[idx as usize % NAMES.len()]
}

#[derive(Debug, Arbitrary)]
enum LifecycleOp {
    Hook(u8, bool),
    Instance(u8, u32),
    Depend(u8, u8),
    Contain(u8, u8),
    DestroyOne(u8),
    DestroyAll,
    ClearAll,
}

/// Hook invocations as (hook id, name)
type Log = Arc<Mutex<Vec<(u64, &'static str)>>>;

fn position(log: &[(u64, &'static str)], start: usize, n: &str) -> Option<usize> {
    log[start..].iter().position(|(_, logged)| *logged == n)
}

fuzz_target!(|ops: Vec<LifecycleOp>| {
    let registry = SingletonRegistry::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut next_id = 0u64;

    for op in ops.into_iter().take(100) {
        match op {
            LifecycleOp::Hook(idx, fails) => {
                let id = next_id;
                next_id += 1;
                let n = name(idx);
                let log = Arc::clone(&log);
                registry.register_shutdown_hook(n, move || {
                    log.lock().unwrap().push((id, n));
                    if fails {
                        return Err("fuzzed hook failure".into());
                    }
                    Ok(())
                });
                assert!(registry.has_shutdown_hook(n));
            }
            LifecycleOp::Instance(idx, value) => {
                let _ = registry.register_instance(name(idx), value);
            }
            LifecycleOp::Depend(a, b) => {
                registry.register_dependency(name(a), name(b)).unwrap();
            }
            LifecycleOp::Contain(inner, outer) => {
                registry.register_containment(name(inner), name(outer)).unwrap();
            }
            LifecycleOp::DestroyOne(idx) => {
                registry.destroy_one(name(idx));
                assert!(!registry.has_shutdown_hook(name(idx)));
                assert!(!registry.contains_final(name(idx)));
                assert!(!registry.has_dependents(name(idx)));
            }
            LifecycleOp::DestroyAll => {
                let hooked: Vec<&str> = NAMES
                    .into_iter()
                    .filter(|n| registry.has_shutdown_hook(n))
                    .collect();

                // Edges between hooked names that are not part of a cycle
                let mut ordered = Vec::new();
                for dependency in &hooked {
                    for dependent in registry.dependents(dependency) {
                        let Some(dependent) = hooked.iter().find(|h| **h == dependent) else {
                            continue;
                        };
                        if !registry.is_dependent(dependent, dependency) {
                            ordered.push((*dependency, *dependent));
                        }
                    }
                }

                let start = log.lock().unwrap().len();
                registry.destroy_all();
                let log = log.lock().unwrap();

                for n in &hooked {
                    assert_eq!(
                        log[start..].iter().filter(|(_, logged)| logged == n).count(),
                        1,
                        "hook for {n} must run exactly once"
                    );
                }
                for (dependency, dependent) in ordered {
                    assert!(
                        position(&log, start, dependent) < position(&log, start, dependency),
                        "{dependent} must be destroyed before {dependency}"
                    );
                }

                assert!(!registry.is_in_destruction());
                assert_eq!(registry.count(), 0);
                for n in NAMES {
                    assert!(!registry.has_shutdown_hook(n));
                    assert!(!registry.has_dependents(n));
                }
            }
            LifecycleOp::ClearAll => {
                let before = log.lock().unwrap().len();
                registry.clear_all();
                assert_eq!(log.lock().unwrap().len(), before, "clear_all runs no hooks");
                assert_eq!(registry.count(), 0);
            }
        }

        // No hook ever runs twice
        let log = log.lock().unwrap();
        let mut ids: Vec<u64> = log.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), log.len());
    }
});
