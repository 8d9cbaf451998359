//! Read-through cache for flag lookups and listings.
//!
//! One interface for every caller: opaque bytes in, bytes out, explicit
//! invalidation on writes. The service layer serializes with `serde_json`
//! and treats any cache error as a miss, so a broken cache degrades to
//! store reads instead of failing requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

/// Key-value store with expiry. Implementations must be cheap to clone into
/// handler state and safe under concurrent access.
pub trait Cache: Send + Sync {
    /// Returns the value if present and not expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    fn invalidate(&self, key: &str) -> Result<()>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process cache backing the single-node deployment.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                // Expired, drop it eagerly.
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Time-to-live settings for the three cached views.
///
/// Per-flag entries expire quickly; the full listing and the audit listing
/// tolerate more staleness. Invalidation on write keeps readers ahead of the
/// TTLs in the common case; the TTLs bound staleness if an invalidation is
/// ever lost.
#[derive(Clone, Copy, Debug)]
pub struct CachePolicy {
    pub flag_ttl: Duration,
    pub list_ttl: Duration,
    pub audit_ttl: Duration,
}

impl CachePolicy {
    /// Load TTLs from `FLAGPOST_FLAG_TTL_SECS`, `FLAGPOST_LIST_TTL_SECS`
    /// and `FLAGPOST_AUDIT_TTL_SECS`, falling back to the defaults.
    pub fn from_env() -> Self {
        fn secs(var: &str, default: u64) -> Duration {
            let secs = std::env::var(var)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(default);
            Duration::from_secs(secs)
        }

        Self {
            flag_ttl: secs("FLAGPOST_FLAG_TTL_SECS", 60),
            list_ttl: secs("FLAGPOST_LIST_TTL_SECS", 300),
            audit_ttl: secs("FLAGPOST_AUDIT_TTL_SECS", 300),
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            flag_ttl: Duration::from_secs(60),
            list_ttl: Duration::from_secs(300),
            audit_ttl: Duration::from_secs(300),
        }
    }
}
