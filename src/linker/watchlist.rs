//! Operator watchlist for linked alerts.
//!
//! In exclusive mode only watched markets survive the affected-market
//! filter; otherwise watched markets get a relevance boost. A per-market
//! minimum confidence can suppress alerts that arrive below the bar.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::Confidence;

/// Relevance added to watched markets in non-exclusive mode.
pub const WATCHLIST_BOOST: f64 = 0.2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchEntry {
    pub min_confidence: Option<Confidence>,
}

#[derive(Debug, Clone, Default)]
pub struct WatchlistManager {
    entries: HashMap<String, WatchEntry>,
    exclusive: bool,
}

impl WatchlistManager {
    pub fn new(exclusive: bool) -> Self {
        Self {
            entries: HashMap::new(),
            exclusive,
        }
    }

    pub fn watch(&mut self, asset_id: &str, min_confidence: Option<Confidence>) {
        self.entries
            .insert(asset_id.to_string(), WatchEntry { min_confidence });
    }

    pub fn unwatch(&mut self, asset_id: &str) {
        self.entries.remove(asset_id);
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.entries.contains_key(asset_id)
    }

    pub fn min_confidence(&self, asset_id: &str) -> Option<Confidence> {
        self.entries.get(asset_id).and_then(|e| e.min_confidence)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_and_gate() {
        let mut wl = WatchlistManager::new(false);
        wl.watch("A", Some(Confidence::High));
        wl.watch("B", None);

        assert!(wl.contains("A"));
        assert_eq!(wl.min_confidence("A"), Some(Confidence::High));
        assert_eq!(wl.min_confidence("B"), None);
        assert!(!wl.contains("C"));

        wl.unwatch("B");
        assert!(!wl.contains("B"));
    }
}
