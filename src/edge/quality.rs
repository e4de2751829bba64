//! Market quality assessment and the per-market signal cooldown.
//!
//! Whale-flow signals only make sense in markets a follower could actually
//! trade. Quality tiers come from 24 h volume, current spread and 24 h trade
//! count; `Garbage` markets emit nothing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketQuality {
    Garbage,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct QualityThresholds {
    pub high_volume: f64,
    pub high_spread: f64,
    pub high_trades: u64,
    pub medium_volume: f64,
    pub medium_spread: f64,
    pub medium_trades: u64,
    pub low_volume: f64,
    pub low_spread: f64,
    pub low_trades: u64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            high_volume: 100_000.0,
            high_spread: 0.02,
            high_trades: 100,
            medium_volume: 25_000.0,
            medium_spread: 0.05,
            medium_trades: 25,
            low_volume: 5_000.0,
            low_spread: 0.10,
            low_trades: 10,
        }
    }
}

impl QualityThresholds {
    pub fn assess(&self, volume_24h: f64, spread: f64, trade_count_24h: u64) -> MarketQuality {
        if volume_24h >= self.high_volume
            && spread <= self.high_spread
            && trade_count_24h >= self.high_trades
        {
            MarketQuality::High
        } else if volume_24h >= self.medium_volume
            && spread <= self.medium_spread
            && trade_count_24h >= self.medium_trades
        {
            MarketQuality::Medium
        } else if volume_24h >= self.low_volume
            && spread <= self.low_spread
            && trade_count_24h >= self.low_trades
        {
            MarketQuality::Low
        } else {
            MarketQuality::Garbage
        }
    }
}

/// One signal per market per cooldown window, regardless of pattern.
#[derive(Debug, Default)]
pub struct SignalCooldowns {
    last_emitted: HashMap<String, i64>,
}

impl SignalCooldowns {
    pub fn allow(&mut self, market_id: &str, now_ms: i64, cooldown_ms: i64) -> bool {
        match self.last_emitted.get(market_id) {
            Some(last) if now_ms - last < cooldown_ms => false,
            _ => {
                self.last_emitted.insert(market_id.to_string(), now_ms);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_tiers_follow_thresholds() {
        let q = QualityThresholds::default();
        assert_eq!(q.assess(150_000.0, 0.01, 200), MarketQuality::High);
        assert_eq!(q.assess(30_000.0, 0.04, 30), MarketQuality::Medium);
        assert_eq!(q.assess(6_000.0, 0.08, 12), MarketQuality::Low);
        assert_eq!(q.assess(1_000.0, 0.20, 2), MarketQuality::Garbage);
        // High volume with a wide spread is not High.
        assert_eq!(q.assess(150_000.0, 0.09, 200), MarketQuality::Low);
    }

    #[test]
    fn cooldown_one_per_window() {
        let mut cd = SignalCooldowns::default();
        assert!(cd.allow("M", 0, 300_000));
        assert!(!cd.allow("M", 100_000, 300_000));
        assert!(cd.allow("M", 300_000, 300_000));
        assert!(cd.allow("K", 100_000, 300_000));
    }
}
