//! Micro-structure signal detection over the venue event stream.
//!
//! Five detectors per market: price spike, volume spike, spread compression,
//! aggressive sweep and depth pull. Per-asset state is lazily created on the
//! first event; every event updates `MarketState` and then evaluates the
//! detectors it can affect. Emission is gated by a 30 s warm-up per market
//! and a 60 s per-(asset, signal kind) cooldown.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{env_parse, Direction, Side, SignalStrength, VenueEvent};
use crate::signals::market_state::MarketState;
use crate::signals::MidPriceBoard;

#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub price_spike_threshold_pct: f64,
    pub price_spike_window_ms: i64,
    pub volume_spike_multiplier: f64,
    pub volume_baseline_window_ms: i64,
    pub volume_recent_window_ms: i64,
    pub spread_compression_threshold_pct: f64,
    pub spread_compression_min_spread: f64,
    pub sweep_window_ms: i64,
    pub sweep_min_trade_count: usize,
    pub sweep_min_total_size: f64,
    pub sweep_min_price_impact: f64,
    pub depth_pull_threshold_pct: f64,
    pub depth_pull_min_depth: f64,
    pub warmup_ms: i64,
    pub cooldown_ms: i64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            price_spike_threshold_pct: 3.0,
            price_spike_window_ms: 300_000,
            volume_spike_multiplier: 3.0,
            volume_baseline_window_ms: 1_800_000,
            volume_recent_window_ms: 60_000,
            spread_compression_threshold_pct: 40.0,
            spread_compression_min_spread: 0.02,
            sweep_window_ms: 30_000,
            sweep_min_trade_count: 3,
            sweep_min_total_size: 50.0,
            sweep_min_price_impact: 0.01,
            depth_pull_threshold_pct: 50.0,
            depth_pull_min_depth: 100.0,
            warmup_ms: 30_000,
            cooldown_ms: 60_000,
        }
    }
}

impl SignalConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            price_spike_threshold_pct: env_parse(
                "PRICE_SPIKE_THRESHOLD_PCT",
                d.price_spike_threshold_pct,
            ),
            price_spike_window_ms: env_parse("PRICE_SPIKE_WINDOW_MS", d.price_spike_window_ms),
            volume_spike_multiplier: env_parse(
                "VOLUME_SPIKE_MULTIPLIER",
                d.volume_spike_multiplier,
            ),
            volume_baseline_window_ms: env_parse(
                "VOLUME_SPIKE_BASELINE_WINDOW_MS",
                d.volume_baseline_window_ms,
            ),
            spread_compression_threshold_pct: env_parse(
                "SPREAD_COMPRESSION_THRESHOLD_PCT",
                d.spread_compression_threshold_pct,
            ),
            spread_compression_min_spread: env_parse(
                "SPREAD_COMPRESSION_MIN_SPREAD",
                d.spread_compression_min_spread,
            ),
            sweep_window_ms: env_parse("AGGRESSIVE_SWEEP_WINDOW_MS", d.sweep_window_ms),
            sweep_min_total_size: env_parse(
                "AGGRESSIVE_SWEEP_MIN_TOTAL_SIZE",
                d.sweep_min_total_size,
            ),
            depth_pull_threshold_pct: env_parse(
                "DEPTH_PULL_THRESHOLD_PCT",
                d.depth_pull_threshold_pct,
            ),
            depth_pull_min_depth: env_parse("DEPTH_PULL_MIN_DEPTH", d.depth_pull_min_depth),
            ..d
        }
    }

    /// Histories are kept to twice the longest detection window.
    pub fn retention_ms(&self) -> i64 {
        2 * self
            .price_spike_window_ms
            .max(self.volume_baseline_window_ms)
            .max(self.sweep_window_ms)
    }
}

/// Discriminant used for cooldown bookkeeping and alert routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalFamily {
    PriceSpike,
    VolumeSpike,
    SpreadCompression,
    AggressiveSweep,
    DepthPull,
}

impl SignalFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalFamily::PriceSpike => "price_spike",
            SignalFamily::VolumeSpike => "volume_spike",
            SignalFamily::SpreadCompression => "spread_compression",
            SignalFamily::AggressiveSweep => "aggressive_sweep",
            SignalFamily::DepthPull => "depth_pull",
        }
    }
}

/// Which side of the book a depth pull hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalKind {
    PriceSpike {
        change_pct: f64,
        from_price: f64,
        to_price: f64,
        direction: Direction,
    },
    VolumeSpike {
        multiplier: f64,
        recent_volume: f64,
        baseline_per_min: f64,
    },
    SpreadCompression {
        compression_pct: f64,
        old_spread: f64,
        new_spread: f64,
    },
    AggressiveSweep {
        side: Side,
        trade_count: usize,
        total_size: f64,
        price_impact: f64,
    },
    DepthPull {
        book_side: BookSide,
        pull_pct: f64,
        old_depth: f64,
        new_depth: f64,
    },
}

impl SignalKind {
    pub fn family(&self) -> SignalFamily {
        match self {
            SignalKind::PriceSpike { .. } => SignalFamily::PriceSpike,
            SignalKind::VolumeSpike { .. } => SignalFamily::VolumeSpike,
            SignalKind::SpreadCompression { .. } => SignalFamily::SpreadCompression,
            SignalKind::AggressiveSweep { .. } => SignalFamily::AggressiveSweep,
            SignalKind::DepthPull { .. } => SignalFamily::DepthPull,
        }
    }
}

/// A detected micro-structure signal, ready for the alert engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSignal {
    pub asset_id: String,
    pub question: Option<String>,
    pub kind: SignalKind,
    pub strength: SignalStrength,
    pub current_price: f64,
    pub timestamp_ms: i64,
}

#[inline]
fn strength_from_ratio(ratio: f64) -> SignalStrength {
    if ratio >= 3.0 {
        SignalStrength::VeryHigh
    } else if ratio >= 2.0 {
        SignalStrength::High
    } else if ratio >= 1.5 {
        SignalStrength::Medium
    } else {
        SignalStrength::Low
    }
}

#[inline]
fn sweep_strength(total_size: f64) -> SignalStrength {
    if total_size >= 500.0 {
        SignalStrength::VeryHigh
    } else if total_size >= 250.0 {
        SignalStrength::High
    } else if total_size >= 100.0 {
        SignalStrength::Medium
    } else {
        SignalStrength::Low
    }
}

/// Stateful per-asset signal detector. Single-writer: owned by the venue
/// ingest task; readers get prices through the shared [`MidPriceBoard`].
pub struct SignalDetector {
    config: SignalConfig,
    states: HashMap<String, MarketState>,
    last_fired: HashMap<(String, SignalFamily), i64>,
    dropped_events: u64,
    mid_board: MidPriceBoard,
}

impl SignalDetector {
    pub fn new(config: SignalConfig, mid_board: MidPriceBoard) -> Self {
        Self {
            config,
            states: HashMap::with_capacity(256),
            last_fired: HashMap::new(),
            dropped_events: 0,
            mid_board,
        }
    }

    pub fn market_state(&self, asset_id: &str) -> Option<&MarketState> {
        self.states.get(asset_id)
    }

    pub fn set_market_question(&mut self, asset_id: &str, question: &str) {
        let now = self
            .states
            .get(asset_id)
            .map(|s| s.last_update_ms)
            .unwrap_or_else(crate::models::now_ms);
        self.states
            .entry(asset_id.to_string())
            .or_insert_with(|| MarketState::new(asset_id, now))
            .question = Some(question.to_string());
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Apply a venue event and return any signals that fire.
    pub fn on_event(&mut self, event: &VenueEvent) -> Vec<MarketSignal> {
        if let Err(reason) = event.validate() {
            self.dropped_events += 1;
            warn!(
                asset = event.asset_id(),
                reason, "🛑 dropping malformed venue event"
            );
            return Vec::new();
        }

        let asset_id = event.asset_id().to_string();
        let ts = event.timestamp_ms();
        let retention = self.config.retention_ms();

        let state = self
            .states
            .entry(asset_id.clone())
            .or_insert_with(|| MarketState::new(&asset_id, ts));

        let prev_spread = state.spread;
        let prev_populated = state.populated;
        let prev_bid_depth = state.bid_depth;
        let prev_ask_depth = state.ask_depth;

        let mut candidates: Vec<(SignalKind, SignalStrength)> = Vec::new();

        match event {
            VenueEvent::Book {
                bids,
                asks,
                best_bid,
                best_ask,
                ..
            } => {
                state.apply_book(bids, asks, *best_bid, *best_ask, ts, retention);
                Self::check_price_spike(&self.config, state, ts, &mut candidates);
                Self::check_spread_compression(
                    &self.config,
                    state,
                    prev_spread,
                    prev_populated,
                    &mut candidates,
                );
                Self::check_depth_pull(
                    &self.config,
                    state,
                    prev_bid_depth,
                    prev_ask_depth,
                    &mut candidates,
                );
            }
            VenueEvent::Price {
                best_bid, best_ask, ..
            } => {
                state.apply_price(*best_bid, *best_ask, ts, retention);
                Self::check_price_spike(&self.config, state, ts, &mut candidates);
            }
            VenueEvent::Trade {
                price, size, side, ..
            } => {
                state.apply_trade(*price, *size, *side, ts, retention);
                Self::check_volume_spike(&self.config, state, ts, &mut candidates);
                Self::check_aggressive_sweep(&self.config, state, ts, &mut candidates);
            }
        }

        if state.populated {
            self.mid_board.set(&asset_id, state.mid());
        }

        // Warm-up: nothing fires in the first 30 s of a market's life.
        if ts - state.first_seen_ms < self.config.warmup_ms {
            if !candidates.is_empty() {
                debug!(asset = %asset_id, "suppressing {} signal(s) during warm-up", candidates.len());
            }
            return Vec::new();
        }

        let question = state.question.clone();
        let current_price = state.current_price;

        let mut fired = Vec::new();
        for (kind, strength) in candidates {
            let key = (asset_id.clone(), kind.family());
            let allowed = match self.last_fired.get(&key) {
                Some(last) => ts - last >= self.config.cooldown_ms,
                None => true,
            };
            if !allowed {
                continue;
            }
            self.last_fired.insert(key, ts);
            fired.push(MarketSignal {
                asset_id: asset_id.clone(),
                question: question.clone(),
                kind,
                strength,
                current_price,
                timestamp_ms: ts,
            });
        }
        fired
    }

    fn check_price_spike(
        config: &SignalConfig,
        state: &MarketState,
        ts: i64,
        out: &mut Vec<(SignalKind, SignalStrength)>,
    ) {
        let Some(baseline) = state.baseline_price(ts - config.price_spike_window_ms, ts) else {
            return;
        };
        if baseline <= 0.0 {
            return;
        }
        let change_pct = (state.current_price - baseline) / baseline * 100.0;
        if change_pct.abs() < config.price_spike_threshold_pct {
            return;
        }
        let direction = if change_pct > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        };
        out.push((
            SignalKind::PriceSpike {
                change_pct,
                from_price: baseline,
                to_price: state.current_price,
                direction,
            },
            strength_from_ratio(change_pct.abs() / config.price_spike_threshold_pct),
        ));
    }

    fn check_volume_spike(
        config: &SignalConfig,
        state: &MarketState,
        ts: i64,
        out: &mut Vec<(SignalKind, SignalStrength)>,
    ) {
        let recent = state.volume_between(ts - config.volume_recent_window_ms, ts + 1);
        let baseline_total = state.volume_between(
            ts - config.volume_baseline_window_ms,
            ts - config.volume_recent_window_ms,
        );
        let baseline_minutes = (config.volume_baseline_window_ms - config.volume_recent_window_ms)
            as f64
            / 60_000.0;
        if baseline_minutes <= 0.0 {
            return;
        }
        let baseline_per_min = baseline_total / baseline_minutes;
        // No spurious spikes against an empty baseline.
        if baseline_per_min <= 0.0 {
            return;
        }
        let multiplier = recent / baseline_per_min;
        if multiplier < config.volume_spike_multiplier {
            return;
        }
        out.push((
            SignalKind::VolumeSpike {
                multiplier,
                recent_volume: recent,
                baseline_per_min,
            },
            strength_from_ratio(multiplier / config.volume_spike_multiplier),
        ));
    }

    fn check_spread_compression(
        config: &SignalConfig,
        state: &MarketState,
        prev_spread: f64,
        prev_populated: bool,
        out: &mut Vec<(SignalKind, SignalStrength)>,
    ) {
        if !prev_populated || prev_spread < config.spread_compression_min_spread {
            return;
        }
        let compression_pct = (prev_spread - state.spread) / prev_spread * 100.0;
        if compression_pct < config.spread_compression_threshold_pct {
            return;
        }
        out.push((
            SignalKind::SpreadCompression {
                compression_pct,
                old_spread: prev_spread,
                new_spread: state.spread,
            },
            strength_from_ratio(compression_pct / config.spread_compression_threshold_pct),
        ));
    }

    fn check_aggressive_sweep(
        config: &SignalConfig,
        state: &MarketState,
        ts: i64,
        out: &mut Vec<(SignalKind, SignalStrength)>,
    ) {
        let mut buys: Vec<(f64, f64)> = Vec::new();
        let mut sells: Vec<(f64, f64)> = Vec::new();
        for t in state.trades_since(ts - config.sweep_window_ms) {
            match t.side {
                Side::Buy => buys.push((t.price, t.size)),
                Side::Sell => sells.push((t.price, t.size)),
            }
        }
        let (side, trades) = if buys.len() >= sells.len() {
            (Side::Buy, buys)
        } else {
            (Side::Sell, sells)
        };
        if trades.len() < config.sweep_min_trade_count {
            return;
        }
        let total_size: f64 = trades.iter().map(|(_, s)| s).sum();
        if total_size < config.sweep_min_total_size {
            return;
        }
        let min_price = trades.iter().map(|(p, _)| *p).fold(f64::INFINITY, f64::min);
        let max_price = trades
            .iter()
            .map(|(p, _)| *p)
            .fold(f64::NEG_INFINITY, f64::max);
        let price_impact = max_price - min_price;
        if price_impact < config.sweep_min_price_impact {
            return;
        }
        out.push((
            SignalKind::AggressiveSweep {
                side,
                trade_count: trades.len(),
                total_size,
                price_impact,
            },
            sweep_strength(total_size),
        ));
    }

    fn check_depth_pull(
        config: &SignalConfig,
        state: &MarketState,
        prev_bid_depth: f64,
        prev_ask_depth: f64,
        out: &mut Vec<(SignalKind, SignalStrength)>,
    ) {
        for (book_side, prev, curr) in [
            (BookSide::Bid, prev_bid_depth, state.bid_depth),
            (BookSide::Ask, prev_ask_depth, state.ask_depth),
        ] {
            if prev < config.depth_pull_min_depth {
                continue;
            }
            let pull_pct = (prev - curr) / prev * 100.0;
            if pull_pct < config.depth_pull_threshold_pct {
                continue;
            }
            out.push((
                SignalKind::DepthPull {
                    book_side,
                    pull_pct,
                    old_depth: prev,
                    new_depth: curr,
                },
                strength_from_ratio(pull_pct / config.depth_pull_threshold_pct),
            ));
        }
    }
}
