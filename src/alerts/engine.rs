//! Alert engine: normalize, de-duplicate, rate-limit, fan out.
//!
//! Every producer converges here. Producers push well-formed alerts; the
//! engine never receives errors, only alerts. The dedupe window and rate
//! limiter sit behind mutexes; the channel list is immutable after
//! construction and each channel fails in isolation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::alerts::channels::AlertChannel;
use crate::arbitrage::ArbOpportunity;
use crate::edge::{EdgeOpportunity, EdgeSignalType};
use crate::linker::LinkedAlert;
use crate::models::{
    env_parse, now_ms, Alert, AlertSource, Confidence, Priority, Significance, SignalStrength,
};
use crate::signals::MarketSignal;
use crate::truth::TruthSourceEvent;

#[derive(Debug, Clone)]
pub struct AlertEngineConfig {
    pub dedupe_window_ms: i64,
    pub rate_per_minute: usize,
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 60_000,
            rate_per_minute: 60,
        }
    }
}

impl AlertEngineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            dedupe_window_ms: env_parse("ALERT_DEDUPE_WINDOW_MS", d.dedupe_window_ms),
            rate_per_minute: env_parse("ALERT_RATE_PER_MINUTE", d.rate_per_minute),
        }
    }
}

/// Sliding-window limiter over non-critical emissions: at most
/// `rate_per_minute` of them in any 60-second window. Critical bypasses.
#[derive(Default)]
struct RateWindow {
    emitted: VecDeque<i64>,
}

impl RateWindow {
    fn allow(&mut self, priority: Priority, now_ms: i64, limit: usize) -> bool {
        if priority == Priority::Critical {
            return true;
        }
        while self.emitted.front().is_some_and(|t| now_ms - t >= 60_000) {
            self.emitted.pop_front();
        }
        if self.emitted.len() >= limit {
            return false;
        }
        self.emitted.push_back(now_ms);
        true
    }
}

pub struct AlertEngine {
    config: AlertEngineConfig,
    channels: Vec<Arc<dyn AlertChannel>>,
    dedupe: Mutex<HashMap<String, i64>>,
    rate: Mutex<RateWindow>,
    suppressed_duplicates: AtomicU64,
    dropped_rate_limited: AtomicU64,
    channel_failures: AtomicU64,
}

impl AlertEngine {
    pub fn new(config: AlertEngineConfig, channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self {
            config,
            channels,
            dedupe: Mutex::new(HashMap::new()),
            rate: Mutex::new(RateWindow::default()),
            suppressed_duplicates: AtomicU64::new(0),
            dropped_rate_limited: AtomicU64::new(0),
            channel_failures: AtomicU64::new(0),
        }
    }

    pub fn suppressed_duplicates(&self) -> u64 {
        self.suppressed_duplicates.load(Ordering::Relaxed)
    }

    pub fn dropped_rate_limited(&self) -> u64 {
        self.dropped_rate_limited.load(Ordering::Relaxed)
    }

    pub fn channel_failures(&self) -> u64 {
        self.channel_failures.load(Ordering::Relaxed)
    }

    /// Push one alert through dedupe, rate limiting and fan-out.
    /// Returns true if the alert reached the channel stage.
    pub async fn process(&self, alert: Alert) -> bool {
        self.process_at(alert, now_ms()).await
    }

    pub async fn process_at(&self, alert: Alert, now_ms: i64) -> bool {
        let key = dedupe_key(&alert);
        {
            let mut seen = self.dedupe.lock();
            seen.retain(|_, t| now_ms - *t < self.config.dedupe_window_ms);
            if seen.contains_key(&key) {
                self.suppressed_duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(title = %alert.title, "duplicate alert suppressed");
                return false;
            }
            seen.insert(key, now_ms);
        }

        if !self
            .rate
            .lock()
            .allow(alert.priority, now_ms, self.config.rate_per_minute)
        {
            self.dropped_rate_limited.fetch_add(1, Ordering::Relaxed);
            warn!(
                title = %alert.title,
                priority = alert.priority.as_str(),
                "🛑 alert dropped by rate limit"
            );
            return false;
        }

        for channel in &self.channels {
            if alert.priority < channel.min_priority() {
                continue;
            }
            if let Err(e) = channel.deliver(&alert).await {
                self.channel_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = channel.name(),
                    error = %e,
                    "⚠️ channel delivery failed; other channels unaffected"
                );
            }
        }
        true
    }
}

/// Stable dedupe key: source kind, title, and a normalized body prefix.
pub fn dedupe_key(alert: &Alert) -> String {
    let normalized: String = alert
        .body
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let prefix: String = normalized.chars().take(80).collect();
    let mut hasher = Sha256::new();
    hasher.update(alert.source.as_str());
    hasher.update(b"|");
    hasher.update(&alert.title);
    hasher.update(b"|");
    hasher.update(&prefix);
    hex::encode(hasher.finalize())
}

fn priority_from_strength(strength: SignalStrength) -> Priority {
    match strength {
        SignalStrength::Low => Priority::Low,
        SignalStrength::Medium => Priority::Medium,
        SignalStrength::High => Priority::High,
        SignalStrength::VeryHigh => Priority::Critical,
    }
}

fn priority_from_confidence(confidence: Confidence) -> Priority {
    match confidence {
        Confidence::Low => Priority::Low,
        Confidence::Medium => Priority::Medium,
        Confidence::High => Priority::High,
        Confidence::VeryHigh => Priority::Critical,
    }
}

fn priority_from_significance(significance: Significance) -> Priority {
    match significance {
        Significance::Low => Priority::Low,
        Significance::Medium => Priority::Medium,
        Significance::High => Priority::High,
        Significance::Critical => Priority::Critical,
    }
}

/// Normalize a micro-structure signal.
pub fn format_signal(signal: &MarketSignal) -> Alert {
    let subject = signal
        .question
        .clone()
        .unwrap_or_else(|| signal.asset_id.clone());
    let kind = signal.kind.family().as_str();
    Alert {
        id: Uuid::new_v4().to_string(),
        timestamp_ms: signal.timestamp_ms,
        priority: priority_from_strength(signal.strength),
        title: format!("{kind} on {subject}"),
        body: format!(
            "{} @ {:.3}: {}",
            signal.asset_id,
            signal.current_price,
            serde_json::to_string(&signal.kind).unwrap_or_default()
        ),
        source: AlertSource::Signal,
        metadata: serde_json::to_value(signal).unwrap_or_default(),
    }
}

/// Normalize a raw truth-source event (unlinked path).
pub fn format_truth_event(event: &TruthSourceEvent) -> Alert {
    let (source, title, body) = match event {
        TruthSourceEvent::Congress(e) => (
            AlertSource::Congress,
            format!("Congress: {:?}: {}", e.action_type, e.title),
            format!("{}: {}", e.bill_id, e.action_text),
        ),
        TruthSourceEvent::Weather(e) => (
            AlertSource::Weather,
            format!("Weather: {}", e.event_name),
            e.headline.clone(),
        ),
        TruthSourceEvent::Fed(e) => (
            AlertSource::Fed,
            format!("Fed: {}", e.headline),
            format!("{:?} sentiment={:?}", e.event_type, e.sentiment),
        ),
        TruthSourceEvent::Sports(e) => (
            AlertSource::Sports,
            format!("{} ({}) now {:?}", e.player, e.team_abbr, e.status),
            format!("{} {:?} (was {:?})", e.team, e.status, e.previous_status),
        ),
    };
    Alert {
        id: Uuid::new_v4().to_string(),
        timestamp_ms: event.timestamp_ms(),
        priority: priority_from_significance(event.significance()),
        title,
        body,
        source,
        metadata: serde_json::to_value(event).unwrap_or_default(),
    }
}

/// Normalize a linked (event → markets) alert.
pub fn format_linked(linked: &LinkedAlert) -> Alert {
    let top = &linked.affected_markets[0];
    Alert {
        id: linked.id.clone(),
        timestamp_ms: linked.timestamp_ms,
        priority: priority_from_confidence(linked.confidence),
        title: linked.title.clone(),
        body: format!(
            "{} | {} market(s), top: \"{}\" expected {:?} (relevance {:.2})",
            linked.summary,
            linked.affected_markets.len(),
            top.question,
            top.expected_direction,
            top.relevance
        ),
        source: AlertSource::Linked,
        metadata: serde_json::to_value(linked).unwrap_or_default(),
    }
}

/// Normalize an edge-detector opportunity.
pub fn format_edge(opportunity: &EdgeOpportunity) -> Alert {
    let subject = opportunity
        .question
        .clone()
        .unwrap_or_else(|| opportunity.market_id.clone());
    let label = match opportunity.signal_type {
        EdgeSignalType::TruthEvent => "truth edge",
        EdgeSignalType::Accumulation => "whale accumulation",
        EdgeSignalType::Consensus => "whale consensus",
        EdgeSignalType::Exit => "whale exit",
    };
    Alert {
        id: opportunity.id.clone(),
        timestamp_ms: opportunity.detected_at_ms,
        priority: priority_from_confidence(opportunity.confidence),
        title: format!("{label} on {subject}"),
        body: format!(
            "{:?} gap {:.2} → {:?} ({:?})",
            opportunity.direction, opportunity.magnitude, opportunity.action, opportunity.urgency
        ),
        source: AlertSource::WhaleEdge,
        metadata: serde_json::to_value(opportunity).unwrap_or_default(),
    }
}

/// Normalize an arbitrage opportunity.
pub fn format_arbitrage(opportunity: &ArbOpportunity) -> Alert {
    let legs: Vec<String> = opportunity
        .legs
        .iter()
        .map(|l| format!("{} {:?}", l.market_id, l.action))
        .collect();
    let priority = if opportunity.expected_edge >= 0.10 {
        Priority::Critical
    } else if opportunity.expected_edge >= 0.05 {
        Priority::High
    } else {
        Priority::Medium
    };
    Alert {
        id: opportunity.id.clone(),
        timestamp_ms: opportunity.detected_at_ms,
        priority,
        title: format!("{:?} arbitrage: {}", opportunity.kind, legs.join(" / ")),
        body: format!(
            "edge {:.3} ({:?})",
            opportunity.expected_edge, opportunity.urgency
        ),
        source: AlertSource::Arbitrage,
        metadata: serde_json::to_value(opportunity).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct RecordingChannel {
        min_priority: Priority,
        delivered: AtomicUsize,
        fail: bool,
    }

    impl RecordingChannel {
        fn new(min_priority: Priority, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                min_priority,
                delivered: AtomicUsize::new(0),
                fail,
            })
        }

        fn count(&self) -> usize {
            self.delivered.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl AlertChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn min_priority(&self) -> Priority {
            self.min_priority
        }

        async fn deliver(&self, _alert: &Alert) -> Result<()> {
            if self.fail {
                anyhow::bail!("boom");
            }
            self.delivered.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn alert(title: &str, priority: Priority) -> Alert {
        Alert {
            id: Uuid::new_v4().to_string(),
            timestamp_ms: 0,
            priority,
            title: title.to_string(),
            body: format!("body of {title}"),
            source: AlertSource::Signal,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn duplicates_suppressed_within_window() {
        let channel = RecordingChannel::new(Priority::Low, false);
        let engine = AlertEngine::new(AlertEngineConfig::default(), vec![channel.clone()]);

        assert!(engine.process_at(alert("same", Priority::High), 0).await);
        assert!(!engine.process_at(alert("same", Priority::High), 30_000).await);
        assert_eq!(engine.suppressed_duplicates(), 1);
        // Window expired: same alert flows again.
        assert!(engine.process_at(alert("same", Priority::High), 61_000).await);
        assert_eq!(channel.count(), 2);
    }

    #[tokio::test]
    async fn rate_limit_caps_non_critical_but_passes_critical() {
        let channel = RecordingChannel::new(Priority::Low, false);
        let engine = AlertEngine::new(
            AlertEngineConfig {
                dedupe_window_ms: 60_000,
                rate_per_minute: 5,
            },
            vec![channel.clone()],
        );

        let mut passed = 0;
        for i in 0..10 {
            if engine
                .process_at(alert(&format!("n{i}"), Priority::High), i)
                .await
            {
                passed += 1;
            }
        }
        assert_eq!(passed, 5);
        assert_eq!(engine.dropped_rate_limited(), 5);

        // Critical bypasses the empty bucket.
        assert!(
            engine
                .process_at(alert("emergency", Priority::Critical), 20)
                .await
        );
    }

    #[tokio::test]
    async fn channel_failure_is_isolated() {
        let failing = RecordingChannel::new(Priority::Low, true);
        let healthy = RecordingChannel::new(Priority::Low, false);
        let engine = AlertEngine::new(
            AlertEngineConfig::default(),
            vec![failing.clone(), healthy.clone()],
        );

        assert!(engine.process_at(alert("a", Priority::High), 0).await);
        assert_eq!(healthy.count(), 1);
        assert_eq!(engine.channel_failures(), 1);
    }

    #[tokio::test]
    async fn min_priority_skips_low_alerts() {
        let picky = RecordingChannel::new(Priority::High, false);
        let engine = AlertEngine::new(AlertEngineConfig::default(), vec![picky.clone()]);

        engine.process_at(alert("quiet", Priority::Low), 0).await;
        engine.process_at(alert("loud", Priority::Critical), 1).await;
        assert_eq!(picky.count(), 1);
    }

    #[test]
    fn dedupe_key_ignores_whitespace_noise() {
        let a = alert("t", Priority::Low);
        let mut b = alert("t", Priority::High);
        b.body = "  BODY   of t ".to_string();
        // Same title+normalized body → same key, regardless of priority.
        assert_eq!(dedupe_key(&a), dedupe_key(&b));
    }
}
