//! Per-source health registry backing the status surface.
//!
//! Source tasks report connectivity, last-update times and last errors here;
//! transient upstream failures become visible state instead of alerts.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceHealth {
    pub connected: bool,
    pub last_update_ms: Option<i64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Default)]
pub struct SourceRegistry {
    inner: RwLock<HashMap<&'static str, SourceHealth>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &'static str) {
        self.inner.write().entry(name).or_default();
    }

    pub fn mark_connected(&self, name: &'static str, connected: bool) {
        let mut inner = self.inner.write();
        let entry = inner.entry(name).or_default();
        entry.connected = connected;
        if connected {
            entry.last_error = None;
        }
    }

    pub fn mark_update(&self, name: &'static str, ts_ms: i64) {
        let mut inner = self.inner.write();
        let entry = inner.entry(name).or_default();
        entry.last_update_ms = Some(ts_ms);
        entry.connected = true;
    }

    pub fn mark_error(&self, name: &'static str, error: &str) {
        let mut inner = self.inner.write();
        let entry = inner.entry(name).or_default();
        entry.last_error = Some(error.to_string());
    }

    pub fn snapshot(&self) -> HashMap<&'static str, SourceHealth> {
        self.inner.read().clone()
    }

    /// Healthy when every source is connected or error-free, degraded when
    /// only some are, unhealthy when none is.
    pub fn overall(&self) -> OverallStatus {
        let inner = self.inner.read();
        if inner.is_empty() {
            return OverallStatus::Healthy;
        }
        let ok = inner
            .values()
            .filter(|s| s.connected || s.last_error.is_none())
            .count();
        if ok == inner.len() {
            OverallStatus::Healthy
        } else if ok > 0 {
            OverallStatus::Degraded
        } else {
            OverallStatus::Unhealthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_rollup() {
        let registry = SourceRegistry::new();
        registry.register("venue");
        registry.register("congress");
        assert_eq!(registry.overall(), OverallStatus::Healthy);

        registry.mark_connected("venue", true);
        registry.mark_error("congress", "timeout");
        assert_eq!(registry.overall(), OverallStatus::Degraded);

        registry.mark_connected("venue", false);
        registry.mark_error("venue", "socket closed");
        assert_eq!(registry.overall(), OverallStatus::Unhealthy);

        // Reconnect clears the error.
        registry.mark_connected("venue", true);
        assert!(registry.snapshot()["venue"].last_error.is_none());
    }
}
