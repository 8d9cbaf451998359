use std::collections::VecDeque;

use anyhow::Result;

use crate::db::Database;
use crate::models::{AuditAction, AuditLogEntry};

/// Disables every flag that transitively depends on `trigger`, appending one
/// `auto-disable` audit entry per flag.
///
/// Iterative worklist instead of recursion: each dequeued name has just been
/// disabled, and only its *currently enabled* dependents are touched. The
/// graph is acyclic and the set of enabled flags strictly shrinks on every
/// step, so every flag is disabled at most once and the loop terminates.
/// Dependents that are already disabled are skipped, which keeps overlapping
/// cascades idempotent (no double entries).
///
/// Each step's flip and audit entry commit together before the step's own
/// dependents are visited. A store failure mid-cascade aborts the remainder
/// but leaves every already-visited flag durably disabled and audited.
pub(crate) fn cascade_disable(
    db: &Database,
    trigger: &str,
    actor: &str,
    reason: Option<&str>,
) -> Result<Vec<AuditLogEntry>> {
    let mut entries = Vec::new();
    let mut queue = VecDeque::from([trigger.to_string()]);

    while let Some(current) = queue.pop_front() {
        for dependent in db.find_dependents(&current)? {
            if !dependent.enabled {
                continue;
            }
            let text = match reason {
                Some(r) => format!("Cascading disable due to {current} being disabled: {r}"),
                None => format!("Cascading disable due to {current} being disabled"),
            };
            let entry = db.disable_with_audit(
                &dependent.name,
                AuditAction::AutoDisable,
                actor,
                Some(&text),
            )?;
            entries.push(entry);
            queue.push_back(dependent.name);
        }
    }

    Ok(entries)
}
