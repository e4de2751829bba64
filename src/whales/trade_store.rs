//! Append-only store of observed venue trades with windowed wallet stats.
//!
//! The store is the single source for the universe builder's rankings. It
//! keeps every observed trade in arrival order and answers time-bounded
//! queries by wallet and by market.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::Outcome;

/// A venue trade as observed on the stream, with both counterparties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueTrade {
    pub market_id: String,
    pub outcome: Outcome,
    pub price: f64,
    pub shares: f64,
    pub buyer: String,
    pub seller: String,
    pub buyer_is_maker: bool,
    pub timestamp_ms: i64,
}

impl VenueTrade {
    pub fn notional_usdc(&self) -> f64 {
        self.price * self.shares
    }
}

/// Windowed per-wallet aggregates.
///
/// Documented contracts for the derived fields:
/// - `pnl` is realized PnL from replaying the wallet's window trades through
///   a scratch position book (VWAP entries, shorts included).
/// - `pnl_volatility` is the population standard deviation of the per-closing
///   realized PnL deltas inside the window.
/// - `early_entry_score` ∈ [0, 100]: for each BUY with subsequent prints in
///   the same market, the entry price's position inside the subsequently
///   observed price range (100 = bought the low before the move, 0 = bought
///   the high). The wallet score is the mean over such buys, 50.0 when no
///   buy has lookahead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletStats {
    pub volume: f64,
    pub pnl: f64,
    pub trade_count: u64,
    pub avg_hold_hours: f64,
    pub avg_market_volume: f64,
    pub pnl_volatility: f64,
    pub maker_ratio: f64,
    pub win_rate: f64,
    pub early_entry_score: f64,
}

#[derive(Default)]
pub struct TradeStore {
    trades: Vec<VenueTrade>,
}

impl TradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trade: VenueTrade) {
        self.trades.push(trade);
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Drop trades older than `cutoff_ms`. The log is append-only for
    /// consumers; this exists purely to bound memory over long uptimes.
    pub fn prune_before(&mut self, cutoff_ms: i64) {
        self.trades.retain(|t| t.timestamp_ms >= cutoff_ms);
    }

    pub fn trades_for_wallet(&self, wallet: &str, from_ms: i64, to_ms: i64) -> Vec<&VenueTrade> {
        self.trades
            .iter()
            .filter(|t| {
                t.timestamp_ms >= from_ms
                    && t.timestamp_ms < to_ms
                    && (t.buyer == wallet || t.seller == wallet)
            })
            .collect()
    }

    pub fn trades_for_market(&self, market_id: &str, from_ms: i64, to_ms: i64) -> Vec<&VenueTrade> {
        self.trades
            .iter()
            .filter(|t| {
                t.timestamp_ms >= from_ms && t.timestamp_ms < to_ms && t.market_id == market_id
            })
            .collect()
    }

    /// Every wallet that traded inside the window.
    pub fn wallets_active_since(&self, from_ms: i64) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        for t in self.trades.iter().filter(|t| t.timestamp_ms >= from_ms) {
            seen.insert(t.buyer.clone());
            seen.insert(t.seller.clone());
        }
        seen.into_iter().collect()
    }

    /// Aggregate a wallet's activity over `[now - window_ms, now]`.
    pub fn wallet_stats(&self, wallet: &str, window_ms: i64, now_ms: i64) -> WalletStats {
        let from = now_ms - window_ms;
        let trades = self.trades_for_wallet(wallet, from, now_ms + 1);
        if trades.is_empty() {
            return WalletStats {
                early_entry_score: 50.0,
                ..WalletStats::default()
            };
        }

        let mut volume = 0.0;
        let mut maker_count = 0u64;
        let mut markets: Vec<&str> = Vec::new();

        // Scratch book keyed by (market, outcome): (net_shares, vwap, last_entry_ts).
        let mut book: HashMap<(&str, Outcome), (f64, f64, i64)> = HashMap::new();
        let mut closings: Vec<f64> = Vec::new();
        let mut holds_hours: Vec<f64> = Vec::new();
        let mut entry_scores: Vec<f64> = Vec::new();

        for t in &trades {
            volume += t.notional_usdc();
            let is_buy = t.buyer == wallet;
            let is_maker = if is_buy {
                t.buyer_is_maker
            } else {
                !t.buyer_is_maker
            };
            if is_maker {
                maker_count += 1;
            }
            if !markets.contains(&t.market_id.as_str()) {
                markets.push(&t.market_id);
            }

            let entry = book
                .entry((t.market_id.as_str(), t.outcome))
                .or_insert((0.0, 0.0, t.timestamp_ms));
            let (net, vwap, entry_ts) = *entry;

            if is_buy {
                if net >= 0.0 {
                    let new_net = net + t.shares;
                    let new_vwap = if new_net > 0.0 {
                        (vwap * net + t.price * t.shares) / new_net
                    } else {
                        t.price
                    };
                    *entry = (new_net, new_vwap, t.timestamp_ms);
                } else {
                    let covered = t.shares.min(-net);
                    closings.push((vwap - t.price) * covered);
                    holds_hours.push((t.timestamp_ms - entry_ts) as f64 / 3_600_000.0);
                    let remaining = t.shares - covered;
                    if remaining > 0.0 {
                        *entry = (remaining, t.price, t.timestamp_ms);
                    } else {
                        *entry = (net + t.shares, vwap, entry_ts);
                    }
                }
                // Lookahead: where did this entry sit in the subsequently
                // observed price range for the market?
                let mut lo = f64::INFINITY;
                let mut hi = f64::NEG_INFINITY;
                for later in self
                    .trades_for_market(&t.market_id, t.timestamp_ms + 1, now_ms + 1)
                {
                    lo = lo.min(later.price);
                    hi = hi.max(later.price);
                }
                if hi > f64::NEG_INFINITY {
                    let score = if (hi - lo).abs() < 1e-12 {
                        50.0
                    } else {
                        ((hi - t.price) / (hi - lo)).clamp(0.0, 1.0) * 100.0
                    };
                    entry_scores.push(score);
                }
            } else {
                // Sell.
                if net <= 0.0 {
                    let new_net = net - t.shares;
                    let new_vwap = if new_net < 0.0 {
                        (vwap * -net + t.price * t.shares) / -new_net
                    } else {
                        t.price
                    };
                    *entry = (new_net, new_vwap, t.timestamp_ms);
                } else {
                    let closed = t.shares.min(net);
                    closings.push((t.price - vwap) * closed);
                    holds_hours.push((t.timestamp_ms - entry_ts) as f64 / 3_600_000.0);
                    let remaining = t.shares - closed;
                    if remaining > 0.0 {
                        *entry = (-remaining, t.price, t.timestamp_ms);
                    } else {
                        *entry = (net - t.shares, vwap, entry_ts);
                    }
                }
            }
        }

        let pnl: f64 = closings.iter().sum();
        let wins = closings.iter().filter(|c| **c > 0.0).count();
        let win_rate = if closings.is_empty() {
            0.0
        } else {
            wins as f64 / closings.len() as f64
        };
        let pnl_volatility = if closings.len() < 2 {
            0.0
        } else {
            let mean = pnl / closings.len() as f64;
            (closings.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / closings.len() as f64)
                .sqrt()
        };
        let avg_hold_hours = if holds_hours.is_empty() {
            0.0
        } else {
            holds_hours.iter().sum::<f64>() / holds_hours.len() as f64
        };
        let avg_market_volume = if markets.is_empty() {
            0.0
        } else {
            markets
                .iter()
                .map(|m| {
                    self.trades_for_market(m, from, now_ms + 1)
                        .iter()
                        .map(|t| t.notional_usdc())
                        .sum::<f64>()
                })
                .sum::<f64>()
                / markets.len() as f64
        };
        let early_entry_score = if entry_scores.is_empty() {
            50.0
        } else {
            entry_scores.iter().sum::<f64>() / entry_scores.len() as f64
        };

        WalletStats {
            volume,
            pnl,
            trade_count: trades.len() as u64,
            avg_hold_hours,
            avg_market_volume,
            pnl_volatility,
            maker_ratio: maker_count as f64 / trades.len() as f64,
            win_rate,
            early_entry_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    fn trade(
        market: &str,
        buyer: &str,
        seller: &str,
        price: f64,
        shares: f64,
        ts: i64,
    ) -> VenueTrade {
        VenueTrade {
            market_id: market.to_string(),
            outcome: Outcome::Yes,
            price,
            shares,
            buyer: buyer.to_string(),
            seller: seller.to_string(),
            buyer_is_maker: false,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn windowed_queries_respect_bounds() {
        let mut store = TradeStore::new();
        store.record(trade("M", "w1", "x", 0.5, 10.0, 1_000));
        store.record(trade("M", "x", "w1", 0.6, 10.0, 5_000));
        store.record(trade("M", "w2", "x", 0.5, 10.0, 9_000));

        assert_eq!(store.trades_for_wallet("w1", 0, 10_000).len(), 2);
        assert_eq!(store.trades_for_wallet("w1", 2_000, 10_000).len(), 1);
        assert_eq!(store.trades_for_market("M", 0, 9_000).len(), 2);
    }

    #[test]
    fn realized_pnl_and_win_rate() {
        let mut store = TradeStore::new();
        // Buy 100 @ 0.40, sell 100 @ 0.55 two hours later: +15.
        store.record(trade("M", "w1", "x", 0.40, 100.0, 0));
        store.record(trade("M", "x", "w1", 0.55, 100.0, 2 * HOUR));
        // Buy 50 @ 0.60, sell 50 @ 0.50: -5.
        store.record(trade("K", "w1", "x", 0.60, 50.0, 3 * HOUR));
        store.record(trade("K", "x", "w1", 0.50, 50.0, 4 * HOUR));

        let stats = store.wallet_stats("w1", 30 * 24 * HOUR, 5 * HOUR);
        assert!((stats.pnl - 10.0).abs() < 1e-9);
        assert!((stats.win_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.trade_count, 4);
        assert!(stats.avg_hold_hours > 0.0);
        assert!(stats.pnl_volatility > 0.0);
    }

    #[test]
    fn early_entry_rewards_buying_before_the_move() {
        let mut store = TradeStore::new();
        store.record(trade("M", "early", "x", 0.30, 10.0, 0));
        // Market subsequently rallies to 0.70.
        store.record(trade("M", "a", "b", 0.50, 10.0, HOUR));
        store.record(trade("M", "late", "x", 0.69, 10.0, 2 * HOUR));
        store.record(trade("M", "a", "b", 0.70, 10.0, 3 * HOUR));

        let early = store.wallet_stats("early", 24 * HOUR, 4 * HOUR);
        let late = store.wallet_stats("late", 24 * HOUR, 4 * HOUR);
        assert!(early.early_entry_score > late.early_entry_score);
        assert!(early.early_entry_score > 90.0);
    }

    #[test]
    fn empty_wallet_gets_neutral_defaults() {
        let store = TradeStore::new();
        let stats = store.wallet_stats("nobody", HOUR, HOUR);
        assert_eq!(stats.trade_count, 0);
        assert!((stats.early_entry_score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn batch_equals_sequential_replay() {
        // Associativity: stats over the full window equal stats recomputed
        // after the trades arrive one by one (the store has no order-dependent
        // hidden state).
        let trades = vec![
            trade("M", "w", "x", 0.40, 100.0, 0),
            trade("M", "x", "w", 0.50, 40.0, HOUR),
            trade("M", "x", "w", 0.60, 60.0, 2 * HOUR),
        ];
        let mut all_at_once = TradeStore::new();
        for t in trades.clone() {
            all_at_once.record(t);
        }
        let mut incremental = TradeStore::new();
        let mut last = WalletStats::default();
        for t in trades {
            incremental.record(t);
            last = incremental.wallet_stats("w", 24 * HOUR, 3 * HOUR);
        }
        let full = all_at_once.wallet_stats("w", 24 * HOUR, 3 * HOUR);
        assert!((full.pnl - last.pnl).abs() < 1e-9);
        assert_eq!(full.trade_count, last.trade_count);
    }
}
