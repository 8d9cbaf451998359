use thiserror::Error;

/// Everything a flag operation can fail with.
///
/// Validation variants are raised before any durable mutation and carry the
/// complete set of offending names, not just the first one found. `Store` and
/// `Cache` wrap collaborator failures; cache failures are normally swallowed
/// by the service (the cache is an optimization) and only surface here when a
/// caller uses the cache directly.
#[derive(Error, Debug)]
pub enum FlagError {
    #[error("flag not found: {0}")]
    NotFound(String),

    #[error("flag already exists: {0}")]
    AlreadyExists(String),

    #[error("circular dependency detected for flag: {0}")]
    CycleDetected(String),

    #[error("missing active dependencies: {}", .0.join(", "))]
    InactiveDependencies(Vec<String>),

    #[error("unknown dependencies: {}", .0.join(", "))]
    UnresolvedDependencies(Vec<String>),

    #[error("flag has dependent flags: {}", .0.join(", "))]
    DependentsExist(Vec<String>),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("cache error: {0}")]
    Cache(String),
}

pub type FlagResult<T> = Result<T, FlagError>;
