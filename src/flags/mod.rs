//! Flag lifecycle coordinator.
//!
//! [`FlagService`] composes the graph engine, the cascade, the store and the
//! cache into the operations the HTTP layer exposes. Every mutating
//! operation holds the service-wide write lock for its whole
//! validate-then-commit sequence and validates against a fresh store
//! snapshot, so two concurrent writers can never both pass validation
//! against stale state. Reads go through the cache; writes invalidate it
//! after the store commit so readers never see a value staler than the last
//! committed write.

mod cascade;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{Cache, CachePolicy};
use crate::db::Database;
use crate::error::{FlagError, FlagResult};
use crate::graph::GraphSnapshot;
use crate::models::{
    AuditAction, AuditLogEntry, CreateFlagInput, Flag, ToggleFlagInput, ToggleOutcome,
    UpdateFlagInput,
};

const FLAGS_ALL_KEY: &str = "flags:all";
const AUDIT_ALL_KEY: &str = "audit:all";

fn flag_key(name: &str) -> String {
    format!("flag:{name}")
}

#[derive(Clone)]
pub struct FlagService {
    db: Database,
    cache: Arc<dyn Cache>,
    policy: CachePolicy,
    // Serializes validate-then-commit across all mutations. Single write
    // authority per process; readers are not blocked.
    write_lock: Arc<Mutex<()>>,
}

impl FlagService {
    pub fn new(db: Database, cache: Arc<dyn Cache>, policy: CachePolicy) -> Self {
        Self {
            db,
            cache,
            policy,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    // ============================================================
    // Mutations
    // ============================================================

    /// Creates a flag in the disabled state.
    ///
    /// Fails before any mutation if the name is taken, if any dependency
    /// does not exist (complete list reported), or if the proposed edges
    /// would close a cycle.
    pub fn create(&self, input: CreateFlagInput) -> FlagResult<Flag> {
        let _guard = self.write_lock.lock().expect("write lock poisoned");

        if self.db.get_flag(&input.name)?.is_some() {
            return Err(FlagError::AlreadyExists(input.name));
        }

        let graph = GraphSnapshot::new(&self.db.list_flags()?);
        let unresolved = graph.unresolved_dependencies(&input.dependencies);
        if !unresolved.is_empty() {
            return Err(FlagError::UnresolvedDependencies(unresolved));
        }
        if graph.would_create_cycle(&input.name, &input.dependencies) {
            return Err(FlagError::CycleDetected(input.name));
        }

        let flag = self.db.insert_flag(&input.name, &input.dependencies)?;
        self.record_audit(
            &flag.name,
            AuditAction::Create,
            &input.actor,
            input.reason.as_deref(),
        );
        self.invalidate_flag_views(&flag.name);
        Ok(flag)
    }

    /// Replaces a flag's dependency list. The name and enabled state are
    /// untouched.
    ///
    /// While the flag is enabled, every entry of the replacement list must
    /// already be enabled too; otherwise the commit would leave an enabled
    /// flag with a disabled dependency. Disable the flag first to take on
    /// inactive dependencies.
    pub fn update(&self, name: &str, input: UpdateFlagInput) -> FlagResult<Flag> {
        let _guard = self.write_lock.lock().expect("write lock poisoned");

        let flag = self
            .db
            .get_flag(name)?
            .ok_or_else(|| FlagError::NotFound(name.to_string()))?;

        let graph = GraphSnapshot::new(&self.db.list_flags()?);
        let unresolved = graph.unresolved_dependencies(&input.dependencies);
        if !unresolved.is_empty() {
            return Err(FlagError::UnresolvedDependencies(unresolved));
        }
        if graph.would_create_cycle(name, &input.dependencies) {
            return Err(FlagError::CycleDetected(name.to_string()));
        }
        if flag.enabled {
            let inactive = graph.inactive_dependencies(&input.dependencies);
            if !inactive.is_empty() {
                return Err(FlagError::InactiveDependencies(inactive));
            }
        }

        self.db.update_dependencies(name, &input.dependencies)?;
        self.record_audit(
            name,
            AuditAction::Update,
            &input.actor,
            input.reason.as_deref(),
        );
        self.invalidate_flag_views(name);

        self.db
            .get_flag(name)?
            .ok_or_else(|| FlagError::NotFound(name.to_string()))
    }

    /// Flips a flag on or off.
    ///
    /// Enabling refuses with the complete list of missing or disabled
    /// dependencies; the check and the flip happen under the same lock, so a
    /// flag is never observably enabled alongside a disabled dependency.
    /// Disabling commits the flip, then runs the cascade to completion
    /// before returning; every auto-disabled name is reported back.
    /// A toggle to the current state is a no-op: no audit entry, no cascade.
    pub fn set_enabled(&self, name: &str, input: ToggleFlagInput) -> FlagResult<ToggleOutcome> {
        let _guard = self.write_lock.lock().expect("write lock poisoned");

        let flag = self
            .db
            .get_flag(name)?
            .ok_or_else(|| FlagError::NotFound(name.to_string()))?;

        if flag.enabled == input.enabled {
            return Ok(ToggleOutcome {
                flag,
                auto_disabled: Vec::new(),
            });
        }

        let auto_disabled = if input.enabled {
            let graph = GraphSnapshot::new(&self.db.list_flags()?);
            let inactive = graph.inactive_dependencies(&flag.dependencies);
            if !inactive.is_empty() {
                return Err(FlagError::InactiveDependencies(inactive));
            }
            self.db.set_enabled(name, true)?;
            self.record_audit(
                name,
                AuditAction::Enable,
                &input.actor,
                input.reason.as_deref(),
            );
            Vec::new()
        } else {
            self.db.set_enabled(name, false)?;
            self.record_audit(
                name,
                AuditAction::Disable,
                &input.actor,
                input.reason.as_deref(),
            );
            let entries =
                cascade::cascade_disable(&self.db, name, &input.actor, input.reason.as_deref())?;
            entries.into_iter().map(|e| e.flag_name).collect()
        };

        self.invalidate_flag_views(name);
        for disabled in &auto_disabled {
            self.cache_drop(&flag_key(disabled));
        }

        let flag = self
            .db
            .get_flag(name)?
            .ok_or_else(|| FlagError::NotFound(name.to_string()))?;
        Ok(ToggleOutcome {
            flag,
            auto_disabled,
        })
    }

    /// Deletes a flag. Blocked unconditionally while any flag, enabled or
    /// not, lists it as a dependency.
    pub fn delete(&self, name: &str, actor: &str, reason: Option<&str>) -> FlagResult<()> {
        let _guard = self.write_lock.lock().expect("write lock poisoned");

        if self.db.get_flag(name)?.is_none() {
            return Err(FlagError::NotFound(name.to_string()));
        }

        let dependents: Vec<String> = self
            .db
            .find_dependents(name)?
            .into_iter()
            .map(|f| f.name)
            .collect();
        if !dependents.is_empty() {
            return Err(FlagError::DependentsExist(dependents));
        }

        self.db.delete_flag(name)?;
        self.record_audit(name, AuditAction::Delete, actor, reason);
        self.invalidate_flag_views(name);
        Ok(())
    }

    // ============================================================
    // Reads (cache-first)
    // ============================================================

    pub fn get(&self, name: &str) -> FlagResult<Flag> {
        let key = flag_key(name);
        if let Some(flag) = self.cache_fetch::<Flag>(&key) {
            return Ok(flag);
        }

        let flag = self
            .db
            .get_flag(name)?
            .ok_or_else(|| FlagError::NotFound(name.to_string()))?;
        self.cache_store(&key, &flag, self.policy.flag_ttl);
        Ok(flag)
    }

    pub fn list(&self) -> FlagResult<Vec<Flag>> {
        if let Some(flags) = self.cache_fetch::<Vec<Flag>>(FLAGS_ALL_KEY) {
            return Ok(flags);
        }

        let flags = self.db.list_flags()?;
        self.cache_store(FLAGS_ALL_KEY, &flags, self.policy.list_ttl);
        Ok(flags)
    }

    /// Every audit entry, newest first.
    pub fn audit_log(&self) -> FlagResult<Vec<AuditLogEntry>> {
        if let Some(entries) = self.cache_fetch::<Vec<AuditLogEntry>>(AUDIT_ALL_KEY) {
            return Ok(entries);
        }

        let entries = self.db.list_audit()?;
        self.cache_store(AUDIT_ALL_KEY, &entries, self.policy.audit_ttl);
        Ok(entries)
    }

    pub fn audit_for_flag(&self, name: &str) -> FlagResult<Vec<AuditLogEntry>> {
        if self.db.get_flag(name)?.is_none() {
            return Err(FlagError::NotFound(name.to_string()));
        }
        Ok(self.db.list_audit_for_flag(name)?)
    }

    // ============================================================
    // Cache plumbing
    // ============================================================

    // Cache errors never fail an operation; they degrade to store access
    // with a warning.

    fn cache_fetch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.cache.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("cache read failed for {}: {}", key, e);
                return None;
            }
        };
        serde_json::from_slice(&bytes).ok()
    }

    fn cache_store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("cache encode failed for {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set_with_ttl(key, bytes, ttl) {
            tracing::warn!("cache write failed for {}: {}", key, e);
        }
    }

    fn cache_drop(&self, key: &str) {
        if let Err(e) = self.cache.invalidate(key) {
            tracing::warn!("cache invalidation failed for {}: {}", key, e);
        }
    }

    /// Invalidates (never overwrites) everything a mutation of `name` can
    /// stale: the flag itself, the full listing and the audit listing.
    /// Called only after the store commit.
    fn invalidate_flag_views(&self, name: &str) {
        self.cache_drop(&flag_key(name));
        self.cache_drop(FLAGS_ALL_KEY);
        self.cache_drop(AUDIT_ALL_KEY);
    }

    /// The primary state transition is already durable when this runs, so an
    /// audit failure is reported, not propagated.
    fn record_audit(&self, name: &str, action: AuditAction, actor: &str, reason: Option<&str>) {
        if let Err(e) = self.db.append_audit(name, action, actor, reason) {
            tracing::warn!(
                "audit append failed for {} ({}): {}",
                name,
                action.as_str(),
                e
            );
        }
    }
}
