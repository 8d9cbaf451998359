use serde::{Deserialize, Serialize};

/// A named boolean toggle with a declared dependency list.
///
/// Flags form a directed acyclic graph via `dependencies`, where an edge
/// means "this flag requires that flag to be enabled first". A flag can only
/// be enabled while every dependency is enabled, and disabling a flag
/// cascades to every flag that transitively depends on it.
///
/// The store owns the authoritative copy; cached copies are time-bounded and
/// never consulted for write decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flag {
    /// Row id assigned by the store.
    pub id: i64,
    /// Unique name, immutable after creation.
    pub name: String,
    /// New flags always start disabled.
    pub enabled: bool,
    /// Names of flags this flag requires, in declared order.
    pub dependencies: Vec<String>,
}

/// Input for creating a new flag. The flag starts disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFlagInput {
    pub name: String,
    /// Every entry must name an existing flag.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Who or what is performing the change.
    pub actor: String,
    pub reason: Option<String>,
}

/// Input for replacing a flag's dependency list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFlagInput {
    pub dependencies: Vec<String>,
    pub actor: String,
    pub reason: Option<String>,
}

/// Input for flipping a flag on or off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleFlagInput {
    pub enabled: bool,
    pub actor: String,
    pub reason: Option<String>,
}

/// Result of a toggle, including any flags disabled by the cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleOutcome {
    #[serde(flatten)]
    pub flag: Flag,
    /// Names of dependents the cascade disabled, in the order they were
    /// visited. Empty unless this toggle disabled the flag.
    pub auto_disabled: Vec<String>,
}
