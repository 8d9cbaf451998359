use std::collections::HashMap;
use std::sync::Arc;

use speculate2::speculate;

use flagpost::cache::{Cache, CachePolicy, MemoryCache};
use flagpost::db::Database;
use flagpost::error::FlagError;
use flagpost::flags::FlagService;
use flagpost::graph::GraphSnapshot;
use flagpost::models::*;

fn create(service: &FlagService, name: &str, deps: &[&str]) -> Flag {
    service
        .create(CreateFlagInput {
            name: name.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            actor: "tester".to_string(),
            reason: None,
        })
        .expect("Failed to create flag")
}

fn toggle(service: &FlagService, name: &str, enabled: bool) -> Result<ToggleOutcome, FlagError> {
    service.set_enabled(
        name,
        ToggleFlagInput {
            enabled,
            actor: "tester".to_string(),
            reason: Some("test".to_string()),
        },
    )
}

/// Asserts the two global invariants the service must uphold after every
/// committed operation: no enabled flag has a disabled dependency, and the
/// dependency graph at rest is acyclic.
fn assert_invariants(db: &Database) {
    let flags = db.list_flags().expect("Failed to list flags");
    let enabled: HashMap<&str, bool> = flags
        .iter()
        .map(|f| (f.name.as_str(), f.enabled))
        .collect();

    for flag in &flags {
        if flag.enabled {
            for dep in &flag.dependencies {
                assert!(
                    enabled.get(dep.as_str()).copied().unwrap_or(false),
                    "{} is enabled but its dependency {} is not",
                    flag.name,
                    dep
                );
            }
        }
    }

    let graph = GraphSnapshot::new(&flags);
    for flag in &flags {
        assert!(
            !graph.would_create_cycle(&flag.name, &flag.dependencies),
            "graph at rest contains a cycle through {}",
            flag.name
        );
    }
}

/// A cache backend that fails every call, for degraded-mode coverage.
struct BrokenCache;

impl Cache for BrokenCache {
    fn get(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Err(anyhow::anyhow!("cache down"))
    }

    fn set_with_ttl(
        &self,
        _key: &str,
        _value: Vec<u8>,
        _ttl: std::time::Duration,
    ) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("cache down"))
    }

    fn invalidate(&self, _key: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("cache down"))
    }
}

/// Deterministic xorshift generator for the randomized sequences below, so
/// failures reproduce from the seed without pulling a PRNG crate into the
/// dev-dependencies.
struct SeededRng(u64);

impl SeededRng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next(&mut self, bound: usize) -> usize {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x % bound as u64) as usize
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        let service = FlagService::new(
            db.clone(),
            Arc::new(MemoryCache::new()),
            CachePolicy::default(),
        );
    }

    describe "create" {
        it "assigns ids from the store" {
            let a = create(&service, "a", &[]);
            let b = create(&service, "b", &[]);
            assert!(b.id > a.id);
        }

        it "rejects a dependency list naming the flag itself" {
            // "a" does not exist yet, so the existence check fires first.
            let result = service.create(CreateFlagInput {
                name: "a".to_string(),
                dependencies: vec!["a".to_string()],
                actor: "tester".to_string(),
                reason: None,
            });
            assert!(matches!(result, Err(FlagError::UnresolvedDependencies(deps)) if deps == vec!["a"]));
        }

        it "appends a create audit entry" {
            create(&service, "a", &[]);
            let entries = service.audit_for_flag("a").expect("Failed to list audit");
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].action, AuditAction::Create);
            assert_eq!(entries[0].actor, "tester");
        }
    }

    describe "update" {
        it "leaves the enabled state untouched" {
            create(&service, "dep", &[]);
            create(&service, "a", &[]);
            toggle(&service, "dep", true).expect("Failed to enable");
            toggle(&service, "a", true).expect("Failed to enable");

            let updated = service.update("a", UpdateFlagInput {
                dependencies: vec!["dep".to_string()],
                actor: "tester".to_string(),
                reason: None,
            }).expect("Failed to update");

            assert!(updated.enabled);
            assert_eq!(updated.dependencies, vec!["dep"]);
        }

        it "refuses inactive dependencies while the flag is enabled" {
            create(&service, "dep_off", &[]);
            create(&service, "live", &[]);
            toggle(&service, "live", true).expect("Failed to enable");

            let result = service.update("live", UpdateFlagInput {
                dependencies: vec!["dep_off".to_string()],
                actor: "tester".to_string(),
                reason: None,
            });
            assert!(matches!(result, Err(FlagError::InactiveDependencies(deps)) if deps == vec!["dep_off"]));

            // Nothing was mutated: live stays enabled with no dependencies.
            let live = service.get("live").expect("Failed to read flag");
            assert!(live.enabled);
            assert!(live.dependencies.is_empty());
            assert_invariants(&db);
        }

        it "accepts inactive dependencies once the flag is disabled" {
            create(&service, "dep_off", &[]);
            create(&service, "live", &[]);
            toggle(&service, "live", true).expect("Failed to enable");
            toggle(&service, "live", false).expect("Failed to disable");

            let updated = service.update("live", UpdateFlagInput {
                dependencies: vec!["dep_off".to_string()],
                actor: "tester".to_string(),
                reason: None,
            }).expect("Failed to update");

            assert_eq!(updated.dependencies, vec!["dep_off"]);
            assert_invariants(&db);
        }

        it "refuses a replacement list that closes a cycle" {
            create(&service, "a", &[]);
            create(&service, "b", &["a"]);
            create(&service, "c", &["b"]);

            let result = service.update("a", UpdateFlagInput {
                dependencies: vec!["c".to_string()],
                actor: "tester".to_string(),
                reason: None,
            });
            assert!(matches!(result, Err(FlagError::CycleDetected(_))));

            // Nothing was mutated.
            let a = service.get("a").expect("Failed to read flag");
            assert!(a.dependencies.is_empty());
        }
    }

    describe "cascade" {
        it "disables the whole dependent chain and audits each step" {
            create(&service, "a", &[]);
            create(&service, "b", &["a"]);
            create(&service, "c", &["b"]);
            create(&service, "d", &["c"]);
            for name in ["a", "b", "c", "d"] {
                toggle(&service, name, true).expect("Failed to enable");
            }

            let outcome = toggle(&service, "a", false).expect("Failed to disable");
            assert_eq!(outcome.auto_disabled, vec!["b", "c", "d"]);

            for name in ["b", "c", "d"] {
                let entries = service.audit_for_flag(name).expect("Failed to list audit");
                let auto: Vec<_> = entries.iter()
                    .filter(|e| e.action == AuditAction::AutoDisable)
                    .collect();
                assert_eq!(auto.len(), 1, "exactly one auto-disable for {}", name);
                assert!(auto[0].reason.as_deref().unwrap_or("").contains("Cascading disable"));
            }
            assert_invariants(&db);
        }

        it "fans out across branching dependents" {
            create(&service, "base", &[]);
            create(&service, "left", &["base"]);
            create(&service, "right", &["base"]);
            create(&service, "top", &["left", "right"]);
            for name in ["base", "left", "right", "top"] {
                toggle(&service, name, true).expect("Failed to enable");
            }

            let outcome = toggle(&service, "base", false).expect("Failed to disable");
            assert_eq!(outcome.auto_disabled.len(), 3);

            // "top" is reachable through both branches but disabled once.
            let entries = service.audit_for_flag("top").expect("Failed to list audit");
            let auto = entries.iter()
                .filter(|e| e.action == AuditAction::AutoDisable)
                .count();
            assert_eq!(auto, 1);
            assert_invariants(&db);
        }

        it "does nothing when the flag is already disabled" {
            create(&service, "a", &[]);
            create(&service, "b", &["a"]);

            let outcome = toggle(&service, "a", false).expect("Toggle failed");
            assert!(outcome.auto_disabled.is_empty());
            // No-op toggles leave no audit trail.
            let entries = service.audit_for_flag("a").expect("Failed to list audit");
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].action, AuditAction::Create);
        }
    }

    describe "delete" {
        it "lists every blocking dependent" {
            create(&service, "a", &[]);
            create(&service, "b", &["a"]);
            create(&service, "c", &["a"]);

            let result = service.delete("a", "tester", None);
            assert!(matches!(result, Err(FlagError::DependentsExist(deps)) if deps == vec!["b", "c"]));
        }

        it "removes the flag once dependents are gone" {
            create(&service, "a", &[]);
            create(&service, "b", &["a"]);

            service.delete("b", "tester", None).expect("Failed to delete b");
            service.delete("a", "tester", None).expect("Failed to delete a");
            assert!(matches!(service.get("a"), Err(FlagError::NotFound(_))));
        }
    }

    describe "invariants" {
        it "hold after every step of a mixed operation sequence" {
            create(&service, "core", &[]);
            assert_invariants(&db);
            create(&service, "api", &["core"]);
            assert_invariants(&db);
            create(&service, "ui", &["api", "core"]);
            assert_invariants(&db);

            toggle(&service, "core", true).expect("enable core");
            assert_invariants(&db);
            toggle(&service, "api", true).expect("enable api");
            assert_invariants(&db);
            toggle(&service, "ui", true).expect("enable ui");
            assert_invariants(&db);

            // Enabling out of order must fail without breaking anything.
            toggle(&service, "core", false).expect("disable core");
            assert_invariants(&db);
            assert!(matches!(toggle(&service, "ui", true), Err(FlagError::InactiveDependencies(_))));
            assert_invariants(&db);

            service.update("api", UpdateFlagInput {
                dependencies: vec![],
                actor: "tester".to_string(),
                reason: None,
            }).expect("update api");
            assert_invariants(&db);
            toggle(&service, "api", true).expect("enable api without deps");
            assert_invariants(&db);
        }

        it "hold across randomized operation sequences" {
            let names: Vec<String> = (0..6).map(|i| format!("f{}", i)).collect();

            for seed in [11u64, 29, 47] {
                let db = Database::open_memory().expect("Failed to create in-memory database");
                db.migrate().expect("Failed to run migrations");
                let service = FlagService::new(
                    db.clone(),
                    Arc::new(MemoryCache::new()),
                    CachePolicy::default(),
                );
                let mut rng = SeededRng::new(seed);

                // Random acyclic seed graph: edges only point at
                // already-created flags.
                for (i, name) in names.iter().enumerate() {
                    let deps: Vec<String> = names[..i]
                        .iter()
                        .filter(|_| rng.next(2) == 0)
                        .cloned()
                        .collect();
                    service.create(CreateFlagInput {
                        name: name.clone(),
                        dependencies: deps,
                        actor: "tester".to_string(),
                        reason: None,
                    }).expect("Failed to create flag");
                    assert_invariants(&db);
                }

                for _ in 0..200 {
                    let name = &names[rng.next(names.len())];
                    let result = match rng.next(3) {
                        0 => toggle(&service, name, true).map(|_| ()),
                        1 => toggle(&service, name, false).map(|_| ()),
                        _ => {
                            let deps: Vec<String> = names
                                .iter()
                                .filter(|_| rng.next(3) == 0)
                                .cloned()
                                .collect();
                            service.update(name, UpdateFlagInput {
                                dependencies: deps,
                                actor: "tester".to_string(),
                                reason: None,
                            }).map(|_| ())
                        }
                    };

                    match result {
                        Ok(())
                        | Err(FlagError::InactiveDependencies(_))
                        | Err(FlagError::CycleDetected(_)) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                    assert_invariants(&db);
                }
            }
        }
    }

    describe "degraded cache" {
        it "operations still work when every cache call fails" {
            let service = FlagService::new(
                db.clone(),
                Arc::new(BrokenCache),
                CachePolicy::default(),
            );

            create(&service, "a", &[]);
            toggle(&service, "a", true).expect("Failed to enable");

            let flag = service.get("a").expect("Failed to read flag");
            assert!(flag.enabled);
            assert_eq!(service.list().expect("Failed to list").len(), 1);
            assert_eq!(service.audit_log().expect("Failed to list audit").len(), 2);
        }
    }

    describe "store" {
        it "persists flags across reopen" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("flags.db");

            {
                let db = Database::open(path.clone()).expect("Failed to open database");
                db.migrate().expect("Failed to migrate");
                db.insert_flag("persisted", &[]).expect("Failed to insert");
            }

            let db = Database::open(path).expect("Failed to reopen database");
            db.migrate().expect("Failed to migrate");
            let flag = db.get_flag("persisted").expect("Query failed");
            assert!(flag.is_some());
        }

        it "finds dependents regardless of enabled state" {
            create(&service, "a", &[]);
            create(&service, "b", &["a"]);

            let dependents = db.find_dependents("a").expect("Query failed");
            assert_eq!(dependents.len(), 1);
            assert_eq!(dependents[0].name, "b");
        }

        it "clear_flags keeps the audit trail" {
            create(&service, "a", &[]);
            db.clear_flags().expect("Failed to clear");

            assert!(db.get_flag("a").expect("Query failed").is_none());
            assert_eq!(db.list_audit().expect("Query failed").len(), 1);
        }
    }
}
