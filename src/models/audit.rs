use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable record of one state-changing action taken on a flag.
///
/// Entries are append-only and never mutated or deleted. The service only
/// writes them and serves listings; no decision logic reads them back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub flag_name: String,
    pub action: AuditAction,
    pub actor: String,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What happened to the flag.
///
/// `AutoDisable` is reserved for cascade steps, so a listing distinguishes
/// an operator turning a flag off from the system doing it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    Create,
    Update,
    Enable,
    Disable,
    AutoDisable,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::AutoDisable => "auto-disable",
            Self::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "enable" => Some(Self::Enable),
            "disable" => Some(Self::Disable),
            "auto-disable" => Some(Self::AutoDisable),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}
