mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row};

use crate::models::{AuditAction, AuditLogEntry, Flag};

/// Authoritative store for flags and the audit trail.
///
/// All access funnels through one SQLite connection behind a mutex; mutating
/// calls that must land together (a cascade step's flip plus its audit entry)
/// run inside a single transaction.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "flagpost")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("flagpost.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Flag operations
    // ============================================================

    pub fn get_flag(&self, name: &str) -> Result<Option<Flag>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, enabled, dependencies FROM feature_flags WHERE name = ?",
        )?;

        let mut rows = stmt.query([name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(flag_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_flags(&self) -> Result<Vec<Flag>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn
            .prepare("SELECT id, name, enabled, dependencies FROM feature_flags ORDER BY name")?;

        let flags = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(flags
            .into_iter()
            .map(|(id, name, enabled, deps)| Flag {
                id,
                name,
                enabled: enabled != 0,
                dependencies: parse_deps(&deps),
            })
            .collect())
    }

    /// Flags whose dependency list contains `name`, regardless of their own
    /// enabled state. Used by the deletion guard and the cascade.
    pub fn find_dependents(&self, name: &str) -> Result<Vec<Flag>> {
        Ok(self
            .list_flags()?
            .into_iter()
            .filter(|f| f.dependencies.iter().any(|d| d == name))
            .collect())
    }

    /// Inserts a new flag. Flags always start disabled.
    pub fn insert_flag(&self, name: &str, dependencies: &[String]) -> Result<Flag> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO feature_flags (name, enabled, dependencies) VALUES (?, 0, ?)",
            (name, serde_json::to_string(dependencies)?),
        )?;
        let id = conn.last_insert_rowid();

        Ok(Flag {
            id,
            name: name.to_string(),
            enabled: false,
            dependencies: dependencies.to_vec(),
        })
    }

    pub fn update_dependencies(&self, name: &str, dependencies: &[String]) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE feature_flags SET dependencies = ? WHERE name = ?",
            (serde_json::to_string(dependencies)?, name),
        )?;
        Ok(rows > 0)
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE feature_flags SET enabled = ? WHERE name = ?",
            (enabled as i64, name),
        )?;
        Ok(rows > 0)
    }

    /// Disables a flag and appends its audit entry in one transaction, so a
    /// cascade step is durable as a unit before its dependents are visited.
    pub fn disable_with_audit(
        &self,
        name: &str,
        action: AuditAction,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<AuditLogEntry> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE feature_flags SET enabled = 0 WHERE name = ?",
            [name],
        )?;
        let entry = insert_audit(&tx, name, action, actor, reason)?;
        tx.commit()?;
        Ok(entry)
    }

    pub fn delete_flag(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM feature_flags WHERE name = ?", [name])?;
        Ok(rows > 0)
    }

    /// Removes every flag. Admin/test helper; audit entries are kept.
    pub fn clear_flags(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute("DELETE FROM feature_flags", [])?;
        Ok(())
    }

    // ============================================================
    // Audit log operations
    // ============================================================

    pub fn append_audit(
        &self,
        flag_name: &str,
        action: AuditAction,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<AuditLogEntry> {
        let conn = self.conn.lock().expect("database lock poisoned");
        insert_audit(&conn, flag_name, action, actor, reason)
    }

    /// Every audit entry, newest first.
    pub fn list_audit(&self) -> Result<Vec<AuditLogEntry>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, flag_name, action, actor, reason, timestamp
             FROM audit_log ORDER BY id DESC",
        )?;
        collect_audit(&mut stmt, [])
    }

    pub fn list_audit_for_flag(&self, flag_name: &str) -> Result<Vec<AuditLogEntry>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, flag_name, action, actor, reason, timestamp
             FROM audit_log WHERE flag_name = ? ORDER BY id DESC",
        )?;
        collect_audit(&mut stmt, [flag_name])
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn insert_audit(
    conn: &Connection,
    flag_name: &str,
    action: AuditAction,
    actor: &str,
    reason: Option<&str>,
) -> Result<AuditLogEntry> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO audit_log (flag_name, action, actor, reason, timestamp)
         VALUES (?, ?, ?, ?, ?)",
        (flag_name, action.as_str(), actor, reason, now.to_rfc3339()),
    )?;

    Ok(AuditLogEntry {
        id: conn.last_insert_rowid(),
        flag_name: flag_name.to_string(),
        action,
        actor: actor.to_string(),
        reason: reason.map(str::to_string),
        timestamp: now,
    })
}

fn collect_audit<P: rusqlite::Params>(
    stmt: &mut rusqlite::Statement<'_>,
    params: P,
) -> Result<Vec<AuditLogEntry>> {
    let entries = stmt
        .query_map(params, |row| {
            Ok(AuditLogEntry {
                id: row.get(0)?,
                flag_name: row.get(1)?,
                action: AuditAction::from_str(&row.get::<_, String>(2)?)
                    .unwrap_or(AuditAction::Update),
                actor: row.get(3)?,
                reason: row.get(4)?,
                timestamp: parse_datetime(row.get::<_, String>(5)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

fn flag_from_row(row: &Row<'_>) -> Result<Flag> {
    Ok(Flag {
        id: row.get(0)?,
        name: row.get(1)?,
        enabled: row.get::<_, i64>(2)? != 0,
        dependencies: parse_deps(&row.get::<_, String>(3)?),
    })
}

fn parse_deps(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
