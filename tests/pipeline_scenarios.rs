//! End-to-end pipeline scenarios: venue events, truth events and whale flow
//! pushed through the real components, asserting on the alerts and
//! opportunities that come out the other side.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use intelbot_backend::alerts::{format_signal, AlertChannel, AlertEngine, AlertEngineConfig};
use intelbot_backend::arbitrage::{ArbAction, ArbConfig, ArbitrageDetector, RelationKind};
use intelbot_backend::edge::{
    EdgeAction, EdgeConfig, EdgeDetector, EdgeSignalType, EdgeUrgency,
};
use intelbot_backend::linker::{categorize, TruthMarketLinker};
use intelbot_backend::models::{
    Alert, Confidence, Direction, Market, Outcome, Priority, Side, Significance, VenueEvent,
};
use intelbot_backend::signals::{MidPriceBoard, SignalConfig, SignalDetector, SignalFamily};
use intelbot_backend::truth::{CongressAction, CongressEvent, TruthSourceEvent};
use intelbot_backend::whales::{Behavior, UniverseConfig, VenueTrade, WhaleTier, WhaleTracker, WhaleTrade};

const HOUR_MS: i64 = 3_600_000;

struct CollectingChannel {
    alerts: Mutex<Vec<Alert>>,
    delivered: AtomicUsize,
}

impl CollectingChannel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            alerts: Mutex::new(Vec::new()),
            delivered: AtomicUsize::new(0),
        })
    }

    fn titles(&self) -> Vec<String> {
        self.alerts.lock().iter().map(|a| a.title.clone()).collect()
    }

    fn count(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AlertChannel for CollectingChannel {
    fn name(&self) -> &'static str {
        "collect"
    }

    fn min_priority(&self) -> Priority {
        Priority::Low
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}

fn price_event(asset: &str, price: f64, ts: i64) -> VenueEvent {
    VenueEvent::Price {
        asset_id: asset.to_string(),
        best_bid: price,
        best_ask: price,
        timestamp_ms: ts,
    }
}

/// S1 — a price spike fires exactly once inside the cooldown window.
#[tokio::test]
async fn s1_price_spike_fires_exactly_once() {
    let channel = CollectingChannel::new();
    let engine = AlertEngine::new(AlertEngineConfig::default(), vec![channel.clone()]);
    let mut detector = SignalDetector::new(SignalConfig::default(), MidPriceBoard::default());

    let feed = [
        (0.50, 0),
        (0.50, 35_000),
        (0.55, 40_000), // +10% vs window baseline
        (0.56, 50_000),
        (0.57, 70_000),
    ];
    let mut fired = Vec::new();
    for (price, ts) in feed {
        for signal in detector.on_event(&price_event("A", price, ts)) {
            fired.push(signal.clone());
            engine.process_at(format_signal(&signal), ts).await;
        }
    }

    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].timestamp_ms, 40_000);
    assert_eq!(fired[0].kind.family(), SignalFamily::PriceSpike);
    match &fired[0].kind {
        intelbot_backend::signals::SignalKind::PriceSpike {
            change_pct,
            direction,
            ..
        } => {
            assert_eq!(*direction, Direction::Up);
            assert!((change_pct - 10.0).abs() < 0.5);
        }
        other => panic!("unexpected kind {other:?}"),
    }
    assert_eq!(channel.count(), 1);
}

/// S2 — the 30-second warm-up suppresses a fresh market's first moves.
#[test]
fn s2_warmup_suppresses_new_market() {
    let mut detector = SignalDetector::new(SignalConfig::default(), MidPriceBoard::default());
    assert!(detector.on_event(&price_event("B", 0.30, 5_000)).is_empty());
    assert!(detector.on_event(&price_event("B", 0.40, 10_000)).is_empty());
}

/// S3 — mutually-exclusive winners summing above one.
#[test]
fn s3_mutually_exclusive_arbitrage() {
    let mut detector = ArbitrageDetector::new(ArbConfig::default());
    detector.update_market("M1", "Team A wins the championship", 0.60);
    detector.update_market("M2", "Team B wins the championship", 0.55);

    let opportunities = detector.check_all(0);
    assert_eq!(opportunities.len(), 1);
    let opp = &opportunities[0];
    assert_eq!(opp.kind, RelationKind::MutuallyExclusive);
    assert!((opp.expected_edge - 0.15).abs() < 1e-9);
    assert_eq!(opp.urgency, EdgeUrgency::Immediate);
    assert!(opp.legs.iter().all(|l| l.action == ArbAction::BuyNo));
    let ids: Vec<&str> = opp.legs.iter().map(|l| l.market_id.as_str()).collect();
    assert!(ids.contains(&"M1") && ids.contains(&"M2"));
}

/// S4 — a signed appropriations bill links to the shutdown market, down.
#[test]
fn s4_linked_shutdown_alert() {
    let mut linker = TruthMarketLinker::new(categorize::default_rules());
    linker.refresh_universe(
        &[Market {
            asset_id: "SHUT".to_string(),
            condition_id: "c1".to_string(),
            question: "Government shutdown before 2025-12-01?".to_string(),
            slug: "government-shutdown-2025".to_string(),
            outcome_prices: vec![0.42, 0.58],
        }],
        0,
    );

    let alert = linker
        .handle_event(&TruthSourceEvent::Congress(CongressEvent {
            bill_id: "hr-5371-119".to_string(),
            title: "Continuing Appropriations Act 2025".to_string(),
            action_type: CongressAction::BecameLaw,
            action_text: "Signed by the President. Became Public Law.".to_string(),
            significance: Significance::Critical,
            is_new: true,
            timestamp_ms: 1_000,
        }))
        .expect("linked alert");

    assert_eq!(alert.affected_markets.len(), 1);
    assert_eq!(alert.affected_markets[0].asset_id, "SHUT");
    assert_eq!(
        alert.affected_markets[0].expected_direction,
        Direction::Down
    );
    assert!(alert.confidence >= Confidence::High);
    assert!(alert.title.contains("Continuing Appropriations Act"));
}

/// S5 — top-10 whale accumulation surfaces a COPY edge.
#[test]
fn s5_whale_accumulation_edge() {
    let now = 30 * 24 * HOUR_MS;
    let mut tracker = WhaleTracker::new(UniverseConfig::default());

    // Qualify 0xW as the only (hence top-10) whale: 12 prints, $24k volume.
    for i in 0..12 {
        tracker.on_venue_trade(VenueTrade {
            market_id: "K".to_string(),
            outcome: Outcome::Yes,
            price: 0.40,
            shares: 5_000.0,
            buyer: "0xW".to_string(),
            seller: format!("0xc{i}"),
            buyer_is_maker: false,
            timestamp_ms: now - (i + 1) * HOUR_MS,
        });
    }
    tracker.rebuild_universe(now);
    assert_eq!(tracker.universe().get("0xW").unwrap().tier, WhaleTier::Top10);

    let board = MidPriceBoard::default();
    board.set("K", 0.43);
    let mut edge = EdgeDetector::new(EdgeConfig::default(), Arc::new(board));
    edge.record_spread("K", 0.01);
    for i in 0..30 {
        edge.record_trade_activity("K", 1_500.0, now - i * 60_000);
    }

    // Four YES buys over the hour: $8k@0.41, $7k@0.42, $6k@0.42, $5k@0.43.
    for (usd, price, offset) in [
        (8_000.0, 0.41, 0),
        (7_000.0, 0.42, HOUR_MS / 4),
        (6_000.0, 0.42, HOUR_MS / 2),
        (5_000.0, 0.43, 3 * HOUR_MS / 4),
    ] {
        let classified = tracker.on_whale_trade(WhaleTrade {
            whale: "0xW".to_string(),
            market_id: "K".to_string(),
            outcome: Outcome::Yes,
            side: Side::Buy,
            price,
            shares: usd / price,
            size_usdc: usd,
            is_maker: false,
            timestamp_ms: now - HOUR_MS + offset,
        });
        edge.on_whale_trade(classified);
    }

    let scan = edge.scan_at(now);
    let opp = scan
        .opportunities
        .iter()
        .find(|o| o.signal_type == EdgeSignalType::Accumulation)
        .expect("accumulation opportunity");
    assert_eq!(opp.outcome, Some(Outcome::Yes));
    assert!((opp.magnitude - 0.15).abs() < 1e-9);
    assert_eq!(opp.confidence, Confidence::High);
    assert_eq!(opp.action, EdgeAction::Copy);
    assert_eq!(opp.participants, vec!["0xW".to_string()]);
}

/// S6 — a whale dumping most of its position classifies EXIT and produces a
/// FADE edge on the opposite outcome.
#[test]
fn s6_exit_pattern_fades_opposite_outcome() {
    let now = 10 * HOUR_MS;
    let mut tracker = WhaleTracker::new(UniverseConfig::default());

    let buy = |price: f64, shares: f64, ts: i64| WhaleTrade {
        whale: "0xW".to_string(),
        market_id: "K".to_string(),
        outcome: Outcome::Yes,
        side: Side::Buy,
        price,
        shares,
        size_usdc: price * shares,
        is_maker: false,
        timestamp_ms: ts,
    };

    // Build the position: peak 30k shares at a $13.5k basis (above the
    // $10k exit gate).
    let entry = tracker.on_whale_trade(buy(0.45, 30_000.0, now - 5 * HOUR_MS));
    assert!((entry.peak_shares - 30_000.0).abs() < 1e-9);
    // Trim to 21k so the final sell clears the 80% exit bar.
    let mut trim = buy(0.46, 9_000.0, now - 2 * HOUR_MS);
    trim.side = Side::Sell;
    tracker.on_whale_trade(trim);

    let board = MidPriceBoard::default();
    board.set("K", 0.46);
    let mut edge = EdgeDetector::new(EdgeConfig::default(), Arc::new(board));
    edge.record_spread("K", 0.01);
    for i in 0..30 {
        edge.record_trade_activity("K", 1_500.0, now - i * 60_000);
    }

    let mut sell = buy(0.46, 18_000.0, now - 60_000);
    sell.side = Side::Sell;
    let classified = tracker.on_whale_trade(sell);
    assert_eq!(classified.behavior, Behavior::Exit);
    assert!(classified.reduction_from_peak >= 0.5);
    edge.on_whale_trade(classified);

    let scan = edge.scan_at(now);
    let opp = scan
        .opportunities
        .iter()
        .find(|o| o.signal_type == EdgeSignalType::Exit)
        .expect("exit opportunity");
    assert_eq!(opp.action, EdgeAction::Fade);
    assert_eq!(opp.outcome, Some(Outcome::No));
}

/// Invariant 5 — the engine emits at most rate-per-minute non-critical
/// alerts in any 60-second window, while critical always passes.
#[tokio::test]
async fn alert_rate_invariant_holds_under_burst() {
    let channel = CollectingChannel::new();
    let engine = AlertEngine::new(
        AlertEngineConfig {
            dedupe_window_ms: 1,
            rate_per_minute: 10,
        },
        vec![channel.clone()],
    );

    let mut non_critical_delivered = 0;
    for i in 0..50i64 {
        let alert = Alert {
            id: format!("{i}"),
            timestamp_ms: i * 100,
            priority: if i % 10 == 0 {
                Priority::Critical
            } else {
                Priority::High
            },
            title: format!("alert {i}"),
            body: format!("body {i}"),
            source: intelbot_backend::models::AlertSource::Signal,
            metadata: serde_json::json!({}),
        };
        let critical = alert.priority == Priority::Critical;
        if engine.process_at(alert, i * 100).await && !critical {
            non_critical_delivered += 1;
        }
    }
    assert!(non_critical_delivered <= 10);
    // All five critical alerts passed the limiter.
    let critical_titles = channel
        .titles()
        .iter()
        .filter(|t| {
            t.strip_prefix("alert ")
                .and_then(|n| n.parse::<i64>().ok())
                .is_some_and(|n| n % 10 == 0)
        })
        .count();
    assert_eq!(critical_titles, 5);
}
