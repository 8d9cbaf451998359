//! Domain models for flagpost.
//!
//! - [`Flag`]: a named toggle with a dependency list, owned by the store.
//! - [`AuditLogEntry`]: append-only record of every mutation.
//!
//! Request inputs (`CreateFlagInput`, `UpdateFlagInput`, `ToggleFlagInput`)
//! live alongside the entities they mutate.

mod audit;
mod flag;

pub use audit::*;
pub use flag::*;
