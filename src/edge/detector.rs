//! Edge detection: mispricings surfaced by joining truth events and whale
//! flow against current prices.
//!
//! `scan()` walks two families of patterns:
//! - truth-event edges: a recent linked event predicts a move the market has
//!   not absorbed yet (price cached at event time, gap measured now);
//! - whale edges: accumulation, consensus and exit patterns over the cached
//!   whale flow, gated by market quality and a per-market cooldown.
//!
//! Scan results are cached for the configured TTL, so repeated calls inside
//! the window are idempotent and cheap.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::edge::quality::{MarketQuality, QualityThresholds, SignalCooldowns};
use crate::linker::LinkedAlert;
use crate::models::{env_parse, Confidence, Direction, Outcome, Side, Significance};
use crate::signals::PriceProvider;
use crate::whales::{ClassifiedWhaleTrade, Behavior, WhaleTier};

const HOUR_MS: i64 = 3_600_000;

#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub cache_ms: i64,
    pub congress_horizon_ms: i64,
    pub sports_horizon_ms: i64,
    pub fed_horizon_ms: i64,
    pub weather_horizon_ms: i64,
    pub min_remaining_gap: f64,
    pub accumulation_window_ms: i64,
    pub accumulation_min_buys: usize,
    pub accumulation_min_usd: f64,
    pub accumulation_max_drift: f64,
    pub consensus_window_ms: i64,
    pub consensus_min_whales: usize,
    pub exit_window_ms: i64,
    pub exit_min_reduction: f64,
    pub exit_min_position_usd: f64,
    pub market_cooldown_ms: i64,
    pub quality: QualityThresholds,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            cache_ms: 60_000,
            congress_horizon_ms: 24 * HOUR_MS,
            sports_horizon_ms: 12 * HOUR_MS,
            fed_horizon_ms: 24 * HOUR_MS,
            weather_horizon_ms: 12 * HOUR_MS,
            min_remaining_gap: 0.03,
            accumulation_window_ms: 2 * HOUR_MS,
            accumulation_min_buys: 3,
            accumulation_min_usd: 20_000.0,
            accumulation_max_drift: 0.03,
            consensus_window_ms: 4 * HOUR_MS,
            consensus_min_whales: 3,
            exit_window_ms: 2 * HOUR_MS,
            exit_min_reduction: 0.50,
            exit_min_position_usd: 10_000.0,
            market_cooldown_ms: 300_000,
            quality: QualityThresholds::default(),
        }
    }
}

impl EdgeConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            cache_ms: env_parse("EDGE_CACHE_MS", d.cache_ms),
            ..d
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSignalType {
    TruthEvent,
    Accumulation,
    Consensus,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeAction {
    BuyYes,
    BuyNo,
    Copy,
    Fade,
    Monitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeUrgency {
    Immediate,
    Hours,
    Day,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeOpportunity {
    pub id: String,
    pub market_id: String,
    pub question: Option<String>,
    pub signal_type: EdgeSignalType,
    /// Expected price direction for the YES side.
    pub direction: Direction,
    /// Outcome to take for whale-flow edges.
    pub outcome: Option<Outcome>,
    pub magnitude: f64,
    pub confidence: Confidence,
    pub action: EdgeAction,
    pub urgency: EdgeUrgency,
    pub urgency_score: f64,
    pub size_usd: f64,
    pub participants: Vec<String>,
    pub detected_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeScanResponse {
    pub generated_at_ms: i64,
    pub opportunities: Vec<EdgeOpportunity>,
}

#[derive(Debug, Clone)]
struct TruthEdgeContext {
    source: String,
    question: String,
    expected_direction: Direction,
    significance: Significance,
    event_ts_ms: i64,
    /// Market price cached on first observation of the event.
    price_at_event: f64,
}

#[derive(Debug, Clone)]
struct ExitRecord {
    whale: String,
    market_id: String,
    outcome: Outcome,
    tier: WhaleTier,
    copy_suitability: f64,
    reduction: f64,
    prior_position_usd: f64,
    timestamp_ms: i64,
}

#[derive(Debug, Default)]
struct MarketActivity {
    trades: VecDeque<(i64, f64)>,
    last_spread: f64,
}

impl MarketActivity {
    fn record(&mut self, ts_ms: i64, notional: f64) {
        self.trades.push_back((ts_ms, notional));
        while self
            .trades
            .front()
            .is_some_and(|(t, _)| *t < ts_ms - 24 * HOUR_MS)
        {
            self.trades.pop_front();
        }
    }

    fn volume_24h(&self) -> f64 {
        self.trades.iter().map(|(_, n)| n).sum()
    }

    fn trade_count_24h(&self) -> u64 {
        self.trades.len() as u64
    }
}

pub struct EdgeDetector {
    config: EdgeConfig,
    prices: Arc<dyn PriceProvider>,
    truth_events: HashMap<String, TruthEdgeContext>,
    whale_trades: VecDeque<ClassifiedWhaleTrade>,
    exits: VecDeque<ExitRecord>,
    activity: HashMap<String, MarketActivity>,
    cooldowns: SignalCooldowns,
    cache: Option<EdgeScanResponse>,
}

impl EdgeDetector {
    pub fn new(config: EdgeConfig, prices: Arc<dyn PriceProvider>) -> Self {
        Self {
            config,
            prices,
            truth_events: HashMap::new(),
            whale_trades: VecDeque::new(),
            exits: VecDeque::new(),
            activity: HashMap::new(),
            cooldowns: SignalCooldowns::default(),
            cache: None,
        }
    }

    /// Venue trade prints keep the per-market activity window fresh.
    pub fn record_trade_activity(&mut self, market_id: &str, notional: f64, ts_ms: i64) {
        self.activity
            .entry(market_id.to_string())
            .or_default()
            .record(ts_ms, notional);
    }

    pub fn record_spread(&mut self, market_id: &str, spread: f64) {
        self.activity
            .entry(market_id.to_string())
            .or_default()
            .last_spread = spread;
    }

    /// Cache a linked truth event per affected market. The market price at
    /// event time is pinned on the first observation and reused by later
    /// scans.
    pub fn on_linked_alert(&mut self, alert: &LinkedAlert) {
        for market in &alert.affected_markets {
            let price_at_event = self
                .prices
                .mid(&market.asset_id)
                .unwrap_or(market.current_price);
            let replace = match self.truth_events.get(&market.asset_id) {
                Some(existing) => alert.timestamp_ms > existing.event_ts_ms,
                None => true,
            };
            if replace {
                self.truth_events.insert(
                    market.asset_id.clone(),
                    TruthEdgeContext {
                        source: alert.source.clone(),
                        question: market.question.clone(),
                        expected_direction: market.expected_direction,
                        significance: alert.urgency,
                        event_ts_ms: alert.timestamp_ms,
                        price_at_event,
                    },
                );
            }
        }
    }

    /// Cache classified whale flow for pattern scans. Activity accounting is
    /// NOT updated here: every whale trade is also a venue trade, and the
    /// venue stream already books its notional once.
    pub fn on_whale_trade(&mut self, classified: ClassifiedWhaleTrade) {
        let ts = classified.trade.timestamp_ms;

        if classified.behavior == Behavior::Exit
            || (classified.reduction_from_peak >= self.config.exit_min_reduction
                && classified.prior_position_usd >= self.config.exit_min_position_usd)
        {
            self.exits.push_back(ExitRecord {
                whale: classified.trade.whale.clone(),
                market_id: classified.trade.market_id.clone(),
                outcome: classified.trade.outcome,
                tier: classified.tier,
                copy_suitability: classified.copy_suitability,
                reduction: classified.reduction_from_peak,
                prior_position_usd: classified.prior_position_usd,
                timestamp_ms: ts,
            });
        }

        self.whale_trades.push_back(classified);
        let retain_ms = self
            .config
            .consensus_window_ms
            .max(self.config.accumulation_window_ms);
        while self
            .whale_trades
            .front()
            .is_some_and(|t| t.trade.timestamp_ms < ts - retain_ms)
        {
            self.whale_trades.pop_front();
        }
        while self
            .exits
            .front()
            .is_some_and(|e| e.timestamp_ms < ts - self.config.exit_window_ms)
        {
            self.exits.pop_front();
        }
    }

    /// Scan for opportunities. Results are cached for the TTL; within it the
    /// call is idempotent.
    pub fn scan_at(&mut self, now_ms: i64) -> EdgeScanResponse {
        if let Some(cached) = &self.cache {
            if now_ms - cached.generated_at_ms < self.config.cache_ms {
                return cached.clone();
            }
        }

        let mut opportunities = Vec::new();
        opportunities.extend(self.scan_truth_edges(now_ms));

        // Whale patterns are isolated from one another: a failure in one
        // leaves the others' results standing.
        for (name, result) in [
            ("accumulation", self.scan_accumulation(now_ms)),
            ("consensus", self.scan_consensus(now_ms)),
            ("exit", self.scan_exits(now_ms)),
        ] {
            match result {
                Ok(mut found) => opportunities.append(&mut found),
                Err(e) => warn!(pattern = name, error = %e, "⚠️ edge pattern failed; continuing"),
            }
        }

        opportunities.sort_by(|a, b| {
            b.urgency_score
                .partial_cmp(&a.urgency_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let response = EdgeScanResponse {
            generated_at_ms: now_ms,
            opportunities,
        };
        self.cache = Some(response.clone());
        response
    }

    fn horizon_for(&self, source: &str) -> i64 {
        match source {
            "congress" => self.config.congress_horizon_ms,
            "sports" => self.config.sports_horizon_ms,
            "fed" => self.config.fed_horizon_ms,
            _ => self.config.weather_horizon_ms,
        }
    }

    fn scan_truth_edges(&mut self, now_ms: i64) -> Vec<EdgeOpportunity> {
        let mut found = Vec::new();
        let mut expired: Vec<String> = Vec::new();

        for (market_id, ctx) in &self.truth_events {
            let age_ms = now_ms - ctx.event_ts_ms;
            if age_ms > self.horizon_for(&ctx.source) {
                expired.push(market_id.clone());
                continue;
            }
            let Some(current) = self.prices.mid(market_id) else {
                debug!(market = %market_id, "no observed price for truth edge");
                continue;
            };

            let magnitude = expected_move_magnitude(&ctx.source, ctx.significance);
            let expected = match ctx.expected_direction {
                Direction::Up => magnitude,
                Direction::Down => -magnitude,
            };
            let actual = current - ctx.price_at_event;
            let remaining = expected - actual;
            if actual.abs() >= 0.5 * expected.abs()
                || remaining.abs() < self.config.min_remaining_gap
            {
                continue;
            }

            let hours = age_ms as f64 / HOUR_MS as f64;
            let confidence = if hours < 2.0 {
                Confidence::High
            } else if hours < 8.0 {
                Confidence::Medium
            } else {
                Confidence::Low
            };
            let action = if confidence == Confidence::Low {
                EdgeAction::Monitor
            } else {
                match ctx.expected_direction {
                    Direction::Up => EdgeAction::BuyYes,
                    Direction::Down => EdgeAction::BuyNo,
                }
            };
            let urgency = if hours < 1.0 {
                EdgeUrgency::Immediate
            } else if hours < 6.0 {
                EdgeUrgency::Hours
            } else {
                EdgeUrgency::Day
            };

            found.push(self.build_opportunity(
                market_id,
                Some(ctx.question.clone()),
                EdgeSignalType::TruthEvent,
                ctx.expected_direction,
                None,
                remaining.abs(),
                confidence,
                action,
                urgency,
                0.0,
                Vec::new(),
                now_ms,
            ));
        }

        for market_id in expired {
            self.truth_events.remove(&market_id);
        }
        found
    }

    fn scan_accumulation(&mut self, now_ms: i64) -> anyhow::Result<Vec<EdgeOpportunity>> {
        let from = now_ms - self.config.accumulation_window_ms;
        // (whale, market, outcome) → (count, notional, first_ts, first_price, tier, copy)
        let mut groups: HashMap<(String, String, Outcome), (usize, f64, i64, f64, WhaleTier, f64)> =
            HashMap::new();
        for t in self
            .whale_trades
            .iter()
            .filter(|t| t.trade.timestamp_ms >= from && t.trade.side == Side::Buy)
        {
            let key = (
                t.trade.whale.clone(),
                t.trade.market_id.clone(),
                t.trade.outcome,
            );
            let entry = groups.entry(key).or_insert((
                0,
                0.0,
                t.trade.timestamp_ms,
                t.trade.price,
                t.tier,
                t.copy_suitability,
            ));
            entry.0 += 1;
            entry.1 += t.trade.size_usdc;
            if t.trade.timestamp_ms < entry.2 {
                entry.2 = t.trade.timestamp_ms;
                entry.3 = t.trade.price;
            }
        }

        let mut found = Vec::new();
        for ((whale, market_id, outcome), (count, notional, first_ts, first_price, tier, copy)) in
            groups
        {
            if count < self.config.accumulation_min_buys
                || notional < self.config.accumulation_min_usd
            {
                continue;
            }
            let Some(current) = self.prices.mid(&market_id) else {
                continue;
            };
            // The flow is only an edge while the market has not repriced.
            if (current - first_price).abs() >= self.config.accumulation_max_drift {
                continue;
            }
            if !self.passes_quality_and_cooldown(&market_id, now_ms) {
                continue;
            }

            let magnitude = match tier {
                WhaleTier::Top10 => 0.15,
                WhaleTier::Top50 => 0.10,
                WhaleTier::Tracked => 0.08,
            };
            let confidence = match tier {
                WhaleTier::Top10 if notional >= 100_000.0 => Confidence::VeryHigh,
                WhaleTier::Top10 => Confidence::High,
                WhaleTier::Top50 => Confidence::Medium,
                WhaleTier::Tracked => Confidence::Low,
            };
            let urgency = urgency_from_age(now_ms - first_ts);
            let direction = match outcome {
                Outcome::Yes => Direction::Up,
                Outcome::No => Direction::Down,
            };
            let participants = vec![(whale, copy)];

            found.push(self.build_opportunity(
                &market_id,
                None,
                EdgeSignalType::Accumulation,
                direction,
                Some(outcome),
                magnitude,
                confidence,
                EdgeAction::Copy,
                urgency,
                notional,
                participants,
                now_ms,
            ));
        }
        Ok(found)
    }

    fn scan_consensus(&mut self, now_ms: i64) -> anyhow::Result<Vec<EdgeOpportunity>> {
        let from = now_ms - self.config.consensus_window_ms;
        // (market, outcome) → whale → (tier, copy, notional, last_ts)
        let mut groups: HashMap<(String, Outcome), HashMap<String, (WhaleTier, f64, f64, i64)>> =
            HashMap::new();
        for t in self
            .whale_trades
            .iter()
            .filter(|t| t.trade.timestamp_ms >= from && t.trade.side == Side::Buy)
        {
            let entry = groups
                .entry((t.trade.market_id.clone(), t.trade.outcome))
                .or_default()
                .entry(t.trade.whale.clone())
                .or_insert((t.tier, t.copy_suitability, 0.0, t.trade.timestamp_ms));
            entry.2 += t.trade.size_usdc;
            entry.3 = entry.3.max(t.trade.timestamp_ms);
        }

        let mut found = Vec::new();
        for ((market_id, outcome), whales) in groups {
            if whales.len() < self.config.consensus_min_whales {
                continue;
            }
            if !self.passes_quality_and_cooldown(&market_id, now_ms) {
                continue;
            }

            let top10_count = whales
                .values()
                .filter(|(tier, ..)| *tier == WhaleTier::Top10)
                .count();
            let magnitude = if top10_count >= 3 {
                0.20
            } else {
                (0.10 + 0.02 * whales.len() as f64).min(0.18)
            };
            let confidence = if top10_count >= 3 {
                Confidence::VeryHigh
            } else if whales.len() >= 4 {
                Confidence::High
            } else {
                Confidence::Medium
            };
            let notional: f64 = whales.values().map(|(_, _, n, _)| n).sum();
            let last_ts = whales.values().map(|(.., t)| *t).max().unwrap_or(now_ms);
            let direction = match outcome {
                Outcome::Yes => Direction::Up,
                Outcome::No => Direction::Down,
            };
            let participants: Vec<(String, f64)> = whales
                .into_iter()
                .map(|(addr, (_, copy, _, _))| (addr, copy))
                .collect();

            found.push(self.build_opportunity(
                &market_id,
                None,
                EdgeSignalType::Consensus,
                direction,
                Some(outcome),
                magnitude,
                confidence,
                EdgeAction::Copy,
                urgency_from_age(now_ms - last_ts),
                notional,
                participants,
                now_ms,
            ));
        }
        Ok(found)
    }

    fn scan_exits(&mut self, now_ms: i64) -> anyhow::Result<Vec<EdgeOpportunity>> {
        let from = now_ms - self.config.exit_window_ms;
        let exits: Vec<ExitRecord> = self
            .exits
            .iter()
            .filter(|e| {
                e.timestamp_ms >= from
                    && e.reduction >= self.config.exit_min_reduction
                    && e.prior_position_usd >= self.config.exit_min_position_usd
            })
            .cloned()
            .collect();

        let mut found = Vec::new();
        for exit in exits {
            if !self.passes_quality_and_cooldown(&exit.market_id, now_ms) {
                continue;
            }
            // An informed exit argues for the opposite outcome.
            let faded = exit.outcome.opposite();
            let direction = match faded {
                Outcome::Yes => Direction::Up,
                Outcome::No => Direction::Down,
            };
            let magnitude = match exit.tier {
                WhaleTier::Top10 => 0.12,
                _ => 0.08,
            };
            let confidence = match exit.tier {
                WhaleTier::Top10 => Confidence::High,
                _ => Confidence::Medium,
            };

            found.push(self.build_opportunity(
                &exit.market_id.clone(),
                None,
                EdgeSignalType::Exit,
                direction,
                Some(faded),
                magnitude,
                confidence,
                EdgeAction::Fade,
                urgency_from_age(now_ms - exit.timestamp_ms),
                exit.prior_position_usd,
                vec![(exit.whale.clone(), exit.copy_suitability)],
                now_ms,
            ));
        }
        Ok(found)
    }

    fn passes_quality_and_cooldown(&mut self, market_id: &str, now_ms: i64) -> bool {
        let quality = match self.activity.get(market_id) {
            Some(a) => self
                .config
                .quality
                .assess(a.volume_24h(), a.last_spread, a.trade_count_24h()),
            None => MarketQuality::Garbage,
        };
        if quality == MarketQuality::Garbage {
            debug!(market = %market_id, "garbage-quality market; suppressing whale edge");
            return false;
        }
        self.cooldowns
            .allow(market_id, now_ms, self.config.market_cooldown_ms)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_opportunity(
        &self,
        market_id: &str,
        question: Option<String>,
        signal_type: EdgeSignalType,
        direction: Direction,
        outcome: Option<Outcome>,
        magnitude: f64,
        confidence: Confidence,
        action: EdgeAction,
        urgency: EdgeUrgency,
        size_usd: f64,
        participants: Vec<(String, f64)>,
        now_ms: i64,
    ) -> EdgeOpportunity {
        let copy_suitable = participants.iter().filter(|(_, c)| *c >= 70.0).count();
        let urgency_score = urgency_score(
            urgency,
            signal_type,
            size_usd,
            confidence,
            copy_suitable,
        );
        EdgeOpportunity {
            id: Uuid::new_v4().to_string(),
            market_id: market_id.to_string(),
            question,
            signal_type,
            direction,
            outcome,
            magnitude,
            confidence,
            action,
            urgency,
            urgency_score,
            size_usd,
            participants: participants.into_iter().map(|(a, _)| a).collect(),
            detected_at_ms: now_ms,
        }
    }
}

fn urgency_from_age(age_ms: i64) -> EdgeUrgency {
    if age_ms <= 15 * 60_000 {
        EdgeUrgency::Immediate
    } else if age_ms <= 2 * HOUR_MS {
        EdgeUrgency::Hours
    } else {
        EdgeUrgency::Day
    }
}

/// Event → expected-impact table for truth edges.
fn expected_move_magnitude(source: &str, significance: Significance) -> f64 {
    match (source, significance) {
        ("congress", Significance::Critical) => 0.25,
        ("congress", Significance::High) => 0.15,
        ("congress", _) => 0.10,
        ("sports", Significance::Critical) => 0.15,
        ("sports", Significance::High) => 0.10,
        ("sports", _) => 0.06,
        ("fed", Significance::Critical) => 0.20,
        ("fed", Significance::High) => 0.12,
        ("fed", _) => 0.08,
        (_, Significance::Critical) => 0.15,
        (_, Significance::High) => 0.10,
        (_, _) => 0.06,
    }
}

/// Ranking score: urgency band + signal-type weight + capped size +
/// confidence weight + a bonus per copy-suitable participant.
fn urgency_score(
    urgency: EdgeUrgency,
    signal_type: EdgeSignalType,
    size_usd: f64,
    confidence: Confidence,
    copy_suitable_participants: usize,
) -> f64 {
    let base = match urgency {
        EdgeUrgency::Immediate => 100.0,
        EdgeUrgency::Hours => 50.0,
        EdgeUrgency::Day => 25.0,
    };
    let type_weight = match signal_type {
        EdgeSignalType::TruthEvent => 30.0,
        EdgeSignalType::Consensus => 25.0,
        EdgeSignalType::Accumulation => 20.0,
        EdgeSignalType::Exit => 15.0,
    };
    let size_component = (size_usd / 1_000.0).min(50.0);
    let confidence_weight = match confidence {
        Confidence::Low => 0.0,
        Confidence::Medium => 10.0,
        Confidence::High => 20.0,
        Confidence::VeryHigh => 30.0,
    };
    base + type_weight + size_component + confidence_weight
        + 5.0 * copy_suitable_participants as f64
}
