//! Process-wide TTL caches.
//!
//! Leaderboard and user-info lookups are enrichment: cheap to serve stale,
//! expensive to refetch. Entries evict on TTL expiry (≤ 5 minutes) or an
//! explicit flush; all access goes through a mutex.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use parking_lot::Mutex;

pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, (V, Instant)>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, stored)) if stored.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, value: V) {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now()));
    }

    pub fn flush(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

lazy_static! {
    /// Display names / leaderboard ranks keyed by wallet address.
    pub static ref LEADERBOARD_CACHE: TtlCache<serde_json::Value> =
        TtlCache::new(Duration::from_secs(300));
    /// Per-wallet profile enrichment.
    pub static ref USER_INFO_CACHE: TtlCache<serde_json::Value> =
        TtlCache::new(Duration::from_secs(300));
}

/// Explicit teardown for tests and graceful shutdown.
pub fn flush_all() {
    LEADERBOARD_CACHE.flush();
    USER_INFO_CACHE.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let cache: TtlCache<i32> = TtlCache::new(Duration::from_millis(20));
        cache.put("k", 7);
        assert_eq!(cache.get("k"), Some(7));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn flush_clears_everything() {
        let cache: TtlCache<i32> = TtlCache::new(Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("b", 2);
        cache.flush();
        assert!(cache.is_empty());
    }
}
