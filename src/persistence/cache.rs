//! In-process TTL cache for derived lookups (news-by-id, candidate lists,
//! config values): a `parking_lot`-guarded map, entries expired lazily on read.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

pub struct TtlCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Invalidate every key matching a glob-free prefix pattern (e.g. `news:`).
    pub fn invalidate_pattern(&self, prefix: &str) {
        self.entries.lock().retain(|k, _| !k.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named TTLs for the shared cache's well-known key families.
pub const NEWS_BY_ID_TTL: Duration = Duration::from_secs(3600);
pub const CANDIDATE_LIST_TTL: Duration = Duration::from_secs(300);
pub const CONFIG_VALUE_TTL: Duration = Duration::from_secs(60);
