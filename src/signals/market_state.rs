//! Per-asset market state maintained by the signal detector.
//!
//! One `MarketState` per asset_id, lazily created on the first venue event.
//! Histories are time-ordered and pruned to twice the longest detection
//! window on every mutation, so memory stays bounded per asset.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::models::{BookLevel, Side};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolumePoint {
    pub volume: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradePoint {
    pub price: f64,
    pub size: f64,
    pub side: Side,
    pub timestamp_ms: i64,
}

/// Live micro-structure state for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub asset_id: String,
    pub question: Option<String>,
    pub current_price: f64,
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread: f64,
    pub bid_depth: f64,
    pub ask_depth: f64,
    pub price_history: VecDeque<PricePoint>,
    pub volume_history: VecDeque<VolumePoint>,
    pub recent_trades: VecDeque<TradePoint>,
    pub first_seen_ms: i64,
    pub last_update_ms: i64,
    /// Set after the first book or price event has populated the quote fields.
    pub populated: bool,
}

impl MarketState {
    pub fn new(asset_id: &str, now_ms: i64) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            question: None,
            current_price: 0.0,
            best_bid: 0.0,
            best_ask: 0.0,
            spread: 0.0,
            bid_depth: 0.0,
            ask_depth: 0.0,
            price_history: VecDeque::with_capacity(128),
            volume_history: VecDeque::with_capacity(128),
            recent_trades: VecDeque::with_capacity(64),
            first_seen_ms: now_ms,
            last_update_ms: now_ms,
            populated: false,
        }
    }

    pub fn mid(&self) -> f64 {
        self.current_price
    }

    pub fn apply_book(
        &mut self,
        bids: &[BookLevel],
        asks: &[BookLevel],
        best_bid: f64,
        best_ask: f64,
        ts_ms: i64,
        retention_ms: i64,
    ) {
        self.best_bid = best_bid;
        self.best_ask = best_ask;
        self.spread = best_ask - best_bid;
        self.current_price = (best_bid + best_ask) / 2.0;
        self.bid_depth = bids.iter().map(|l| l.size).sum();
        self.ask_depth = asks.iter().map(|l| l.size).sum();
        self.populated = true;
        self.push_price(self.current_price, ts_ms);
        self.last_update_ms = ts_ms;
        self.prune(ts_ms, retention_ms);
    }

    pub fn apply_price(&mut self, best_bid: f64, best_ask: f64, ts_ms: i64, retention_ms: i64) {
        self.best_bid = best_bid;
        self.best_ask = best_ask;
        self.spread = best_ask - best_bid;
        self.current_price = (best_bid + best_ask) / 2.0;
        self.populated = true;
        self.push_price(self.current_price, ts_ms);
        self.last_update_ms = ts_ms;
        self.prune(ts_ms, retention_ms);
    }

    pub fn apply_trade(&mut self, price: f64, size: f64, side: Side, ts_ms: i64, retention_ms: i64) {
        self.recent_trades.push_back(TradePoint {
            price,
            size,
            side,
            timestamp_ms: ts_ms,
        });
        self.volume_history.push_back(VolumePoint {
            volume: size,
            timestamp_ms: ts_ms,
        });
        self.last_update_ms = ts_ms;
        self.prune(ts_ms, retention_ms);
    }

    fn push_price(&mut self, price: f64, ts_ms: i64) {
        self.price_history.push_back(PricePoint {
            price,
            timestamp_ms: ts_ms,
        });
    }

    fn prune(&mut self, now_ms: i64, retention_ms: i64) {
        let cutoff = now_ms - retention_ms;
        while self
            .price_history
            .front()
            .is_some_and(|p| p.timestamp_ms < cutoff)
        {
            self.price_history.pop_front();
        }
        while self
            .volume_history
            .front()
            .is_some_and(|v| v.timestamp_ms < cutoff)
        {
            self.volume_history.pop_front();
        }
        while self
            .recent_trades
            .front()
            .is_some_and(|t| t.timestamp_ms < cutoff)
        {
            self.recent_trades.pop_front();
        }
    }

    /// Most recent price sample at or before `ts_ms`, excluding samples newer
    /// than it. Falls back to the oldest retained sample when history does not
    /// reach back that far, provided that sample is strictly older than
    /// `newer_than_ms` (so a lone sample never acts as its own baseline).
    pub fn baseline_price(&self, ts_ms: i64, newer_than_ms: i64) -> Option<f64> {
        let mut candidate: Option<&PricePoint> = None;
        for p in &self.price_history {
            if p.timestamp_ms <= ts_ms {
                candidate = Some(p);
            } else {
                break;
            }
        }
        match candidate {
            Some(p) => Some(p.price),
            None => self
                .price_history
                .front()
                .filter(|p| p.timestamp_ms < newer_than_ms)
                .map(|p| p.price),
        }
    }

    /// Sum of traded volume in `[from_ms, to_ms)`.
    pub fn volume_between(&self, from_ms: i64, to_ms: i64) -> f64 {
        self.volume_history
            .iter()
            .filter(|v| v.timestamp_ms >= from_ms && v.timestamp_ms < to_ms)
            .map(|v| v.volume)
            .sum()
    }

    pub fn trades_since(&self, from_ms: i64) -> impl Iterator<Item = &TradePoint> {
        self.recent_trades
            .iter()
            .filter(move |t| t.timestamp_ms >= from_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histories_prune_to_retention() {
        let mut state = MarketState::new("A", 0);
        for i in 0..100 {
            state.apply_price(0.49, 0.51, i * 1_000, 30_000);
        }
        assert!(state
            .price_history
            .front()
            .is_some_and(|p| p.timestamp_ms >= 99_000 - 30_000));
    }

    #[test]
    fn quote_invariant_after_population() {
        let mut state = MarketState::new("A", 0);
        state.apply_price(0.40, 0.44, 1_000, 60_000);
        assert!(state.populated);
        assert!(state.best_bid <= state.current_price);
        assert!(state.current_price <= state.best_ask);
        assert!((state.spread - 0.04).abs() < 1e-9);
    }

    #[test]
    fn baseline_requires_an_older_sample() {
        let mut state = MarketState::new("A", 0);
        state.apply_price(0.50, 0.50, 40_000, 600_000);
        // Only one sample: it must not act as its own baseline.
        assert!(state.baseline_price(40_000 - 300_000, 40_000).is_none());

        let mut state = MarketState::new("A", 0);
        state.apply_price(0.50, 0.50, 0, 600_000);
        state.apply_price(0.55, 0.55, 40_000, 600_000);
        // Window start precedes history: oldest in-window sample is the baseline.
        let baseline = state.baseline_price(40_000 - 300_000, 40_000);
        assert_eq!(baseline, Some(0.50));
    }

    #[test]
    fn volume_window_sums() {
        let mut state = MarketState::new("A", 0);
        state.apply_trade(0.5, 10.0, Side::Buy, 1_000, 3_600_000);
        state.apply_trade(0.5, 20.0, Side::Sell, 61_000, 3_600_000);
        assert!((state.volume_between(0, 60_000) - 10.0).abs() < 1e-9);
        assert!((state.volume_between(60_000, 120_000) - 20.0).abs() < 1e-9);
    }
}
