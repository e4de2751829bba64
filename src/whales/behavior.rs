//! Whale trade behavior classification.
//!
//! Every whale trade receives exactly one label, taken from an ordered
//! priority list: the first pattern that matches wins and `Standard` is the
//! fallback, so classification is total. The classifier keeps a 24 h
//! per-(wallet, market) trade history and a 30 min per-market price history,
//! pruned as trades arrive.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::models::{Outcome, Side};
use crate::whales::ledger::Position;
use crate::whales::WhaleTrade;

const TRADE_HISTORY_MS: i64 = 24 * 3_600_000;
const PRICE_HISTORY_MS: i64 = 30 * 60_000;

const SCOOP_MAX_PRICE: f64 = 0.01;
const LOCK_MIN_PRICE: f64 = 0.97;
const TAIL_BUY_MAX: f64 = 0.03;
const TAIL_SELL_MIN: f64 = 0.97;
const EXIT_FRACTION: f64 = 0.80;
const FLIP_WINDOW_MS: i64 = 30 * 60_000;
const ARB_WINDOW_MS: i64 = 5 * 60_000;
const SCALP_WINDOW_MS: i64 = 3_600_000;
const DCA_WINDOW_MS: i64 = 4 * 3_600_000;
const DCA_MIN_SPAN_MS: i64 = 2 * 3_600_000;
const DCA_MIN_BUYS: usize = 3;
const DCA_PRICE_BAND: f64 = 0.05;
const STACK_WINDOW_MS: i64 = 24 * 3_600_000;
const STACK_MIN_BUYS: usize = 3;
const STACK_MIN_NOTIONAL: f64 = 1_000.0;
const HEDGE_OPPOSITE_FRACTION: f64 = 0.10;
const HEDGE_SELL_FRACTION: f64 = 0.25;
const MOMENTUM_MOVE: f64 = 0.05;

/// Closed set of behavior labels, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Behavior {
    /// Buy at a near-zero price.
    Scoop,
    /// Buy near certainty.
    Lock,
    /// Longshot buy or near-certain sell.
    Tail,
    /// Sell of most of the held position.
    Exit,
    /// Buy of the opposite outcome shortly after a sell.
    Flip,
    /// Both outcomes bought within minutes.
    Arb,
    /// Sell within an hour of the buy.
    Scalp,
    /// Spaced same-outcome buys at a stable price.
    Dca,
    /// Repeated buys stacking up meaningful notional.
    Stack,
    /// Offsetting buy or partial de-risking sell.
    Hedge,
    /// Buy against a recent move.
    Fade,
    /// Buy with a recent move.
    Chase,
    Standard,
}

impl Behavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::Scoop => "SCOOP",
            Behavior::Lock => "LOCK",
            Behavior::Tail => "TAIL",
            Behavior::Exit => "EXIT",
            Behavior::Flip => "FLIP",
            Behavior::Arb => "ARB",
            Behavior::Scalp => "SCALP",
            Behavior::Dca => "DCA",
            Behavior::Stack => "STACK",
            Behavior::Hedge => "HEDGE",
            Behavior::Fade => "FADE",
            Behavior::Chase => "CHASE",
            Behavior::Standard => "STANDARD",
        }
    }
}

#[derive(Debug, Clone)]
struct PastTrade {
    outcome: Outcome,
    side: Side,
    price: f64,
    notional: f64,
    timestamp_ms: i64,
}

pub struct BehaviorClassifier {
    recent: HashMap<(String, String), VecDeque<PastTrade>>,
    prices: HashMap<String, VecDeque<(f64, i64)>>,
}

impl Default for BehaviorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl BehaviorClassifier {
    pub fn new() -> Self {
        Self {
            recent: HashMap::new(),
            prices: HashMap::new(),
        }
    }

    /// Feed the market's observed YES-side price.
    pub fn observe_price(&mut self, market_id: &str, price: f64, ts_ms: i64) {
        let history = self.prices.entry(market_id.to_string()).or_default();
        history.push_back((price, ts_ms));
        while history
            .front()
            .is_some_and(|(_, t)| *t < ts_ms - PRICE_HISTORY_MS)
        {
            history.pop_front();
        }
    }

    /// Drop stale history across all keys.
    pub fn prune(&mut self, now_ms: i64) {
        self.recent.retain(|_, q| {
            while q
                .front()
                .is_some_and(|t| t.timestamp_ms < now_ms - TRADE_HISTORY_MS)
            {
                q.pop_front();
            }
            !q.is_empty()
        });
        self.prices.retain(|_, q| {
            while q
                .front()
                .is_some_and(|(_, t)| *t < now_ms - PRICE_HISTORY_MS)
            {
                q.pop_front();
            }
            !q.is_empty()
        });
    }

    /// Label one whale trade. `position_before` is the wallet's position on
    /// the traded outcome before this fill; `opposite_position` the one on
    /// the other outcome.
    pub fn classify(
        &mut self,
        trade: &WhaleTrade,
        position_before: Option<&Position>,
        opposite_position: Option<&Position>,
    ) -> Behavior {
        let behavior = self.classify_inner(trade, position_before, opposite_position);
        self.remember(trade);
        behavior
    }

    fn classify_inner(
        &self,
        trade: &WhaleTrade,
        position_before: Option<&Position>,
        opposite_position: Option<&Position>,
    ) -> Behavior {
        let is_buy = trade.side == Side::Buy;
        let ts = trade.timestamp_ms;
        let history = self
            .recent
            .get(&(trade.whale.clone(), trade.market_id.clone()));
        let net_before = position_before.map(|p| p.net_shares).unwrap_or(0.0);

        if is_buy && trade.price <= SCOOP_MAX_PRICE {
            return Behavior::Scoop;
        }
        if is_buy && trade.price >= LOCK_MIN_PRICE {
            return Behavior::Lock;
        }
        if (is_buy && trade.price <= TAIL_BUY_MAX)
            || (!is_buy && trade.price >= TAIL_SELL_MIN)
        {
            return Behavior::Tail;
        }
        if !is_buy && net_before > 0.0 && trade.shares >= EXIT_FRACTION * net_before {
            return Behavior::Exit;
        }
        if is_buy
            && self.any_recent(history, ts, FLIP_WINDOW_MS, |p| {
                p.side == Side::Sell && p.outcome != trade.outcome
            })
        {
            return Behavior::Flip;
        }
        if is_buy
            && self.any_recent(history, ts, ARB_WINDOW_MS, |p| {
                p.side == Side::Buy && p.outcome != trade.outcome
            })
        {
            return Behavior::Arb;
        }
        if !is_buy
            && self.any_recent(history, ts, SCALP_WINDOW_MS, |p| {
                p.side == Side::Buy && p.outcome == trade.outcome
            })
        {
            return Behavior::Scalp;
        }
        if is_buy && self.is_dca(history, trade) {
            return Behavior::Dca;
        }
        if is_buy && self.is_stack(history, trade) {
            return Behavior::Stack;
        }
        let opposite_net = opposite_position.map(|p| p.net_shares).unwrap_or(0.0);
        if (is_buy
            && opposite_net > 0.0
            && trade.shares >= HEDGE_OPPOSITE_FRACTION * opposite_net)
            || (!is_buy && net_before > 0.0 && trade.shares >= HEDGE_SELL_FRACTION * net_before)
        {
            return Behavior::Hedge;
        }
        if is_buy {
            if let Some(move_30m) = self.recent_move(&trade.market_id, ts) {
                if move_30m.abs() >= MOMENTUM_MOVE {
                    // Buying YES is bullish, buying NO bearish; fading means
                    // leaning against the observed move.
                    let bullish = trade.outcome == Outcome::Yes;
                    let with_move = (move_30m > 0.0) == bullish;
                    return if with_move {
                        Behavior::Chase
                    } else {
                        Behavior::Fade
                    };
                }
            }
        }
        Behavior::Standard
    }

    fn any_recent(
        &self,
        history: Option<&VecDeque<PastTrade>>,
        ts: i64,
        window_ms: i64,
        pred: impl Fn(&PastTrade) -> bool,
    ) -> bool {
        history.is_some_and(|q| {
            q.iter()
                .filter(|p| ts - p.timestamp_ms <= window_ms)
                .any(pred)
        })
    }

    fn is_dca(&self, history: Option<&VecDeque<PastTrade>>, trade: &WhaleTrade) -> bool {
        let Some(history) = history else {
            return false;
        };
        let mut prices = vec![trade.price];
        let mut first_ts = trade.timestamp_ms;
        let mut count = 1usize;
        for p in history.iter().filter(|p| {
            p.side == Side::Buy
                && p.outcome == trade.outcome
                && trade.timestamp_ms - p.timestamp_ms <= DCA_WINDOW_MS
        }) {
            prices.push(p.price);
            first_ts = first_ts.min(p.timestamp_ms);
            count += 1;
        }
        if count < DCA_MIN_BUYS || trade.timestamp_ms - first_ts < DCA_MIN_SPAN_MS {
            return false;
        }
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        prices.iter().all(|p| (p - mean).abs() <= DCA_PRICE_BAND * mean)
    }

    fn is_stack(&self, history: Option<&VecDeque<PastTrade>>, trade: &WhaleTrade) -> bool {
        let Some(history) = history else {
            return false;
        };
        let mut notional = trade.size_usdc;
        let mut count = 1usize;
        for p in history.iter().filter(|p| {
            p.side == Side::Buy && trade.timestamp_ms - p.timestamp_ms <= STACK_WINDOW_MS
        }) {
            notional += p.notional;
            count += 1;
        }
        count >= STACK_MIN_BUYS && notional >= STACK_MIN_NOTIONAL
    }

    /// Price move over the retained 30-minute window, oldest vs latest
    /// observation at or before `ts`.
    fn recent_move(&self, market_id: &str, ts: i64) -> Option<f64> {
        let history = self.prices.get(market_id)?;
        let mut oldest = None;
        let mut latest = None;
        for (price, t) in history {
            if *t > ts {
                break;
            }
            if oldest.is_none() {
                oldest = Some(*price);
            }
            latest = Some(*price);
        }
        match (oldest, latest) {
            (Some(o), Some(l)) if o != l => Some(l - o),
            _ => None,
        }
    }

    fn remember(&mut self, trade: &WhaleTrade) {
        let queue = self
            .recent
            .entry((trade.whale.clone(), trade.market_id.clone()))
            .or_default();
        queue.push_back(PastTrade {
            outcome: trade.outcome,
            side: trade.side,
            price: trade.price,
            notional: trade.size_usdc,
            timestamp_ms: trade.timestamp_ms,
        });
        while queue
            .front()
            .is_some_and(|t| t.timestamp_ms < trade.timestamp_ms - TRADE_HISTORY_MS)
        {
            queue.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    fn whale_trade(side: Side, outcome: Outcome, price: f64, shares: f64, ts: i64) -> WhaleTrade {
        WhaleTrade {
            whale: "0xw".to_string(),
            market_id: "M".to_string(),
            outcome,
            side,
            price,
            shares,
            size_usdc: price * shares,
            is_maker: false,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn classification_is_total() {
        let mut c = BehaviorClassifier::new();
        let b = c.classify(
            &whale_trade(Side::Buy, Outcome::Yes, 0.50, 10.0, 0),
            None,
            None,
        );
        assert_eq!(b, Behavior::Standard);
    }

    #[test]
    fn price_extremes_take_priority() {
        let mut c = BehaviorClassifier::new();
        assert_eq!(
            c.classify(
                &whale_trade(Side::Buy, Outcome::Yes, 0.009, 1_000.0, 0),
                None,
                None
            ),
            Behavior::Scoop
        );
        assert_eq!(
            c.classify(
                &whale_trade(Side::Buy, Outcome::Yes, 0.98, 1_000.0, 1),
                None,
                None
            ),
            Behavior::Lock
        );
        assert_eq!(
            c.classify(
                &whale_trade(Side::Buy, Outcome::Yes, 0.02, 100.0, 2),
                None,
                None
            ),
            Behavior::Tail
        );
    }

    #[test]
    fn exit_on_selling_most_of_position() {
        let mut c = BehaviorClassifier::new();
        let position = Position {
            net_shares: 700.0,
            vwap_entry: 0.40,
            realized_pnl: 0.0,
            peak_shares: 1_000.0,
        };
        let b = c.classify(
            &whale_trade(Side::Sell, Outcome::Yes, 0.50, 600.0, 0),
            Some(&position),
            None,
        );
        assert_eq!(b, Behavior::Exit);
    }

    #[test]
    fn smaller_sell_is_hedge_not_exit() {
        let mut c = BehaviorClassifier::new();
        let position = Position {
            net_shares: 1_000.0,
            vwap_entry: 0.40,
            realized_pnl: 0.0,
            peak_shares: 1_000.0,
        };
        let b = c.classify(
            &whale_trade(Side::Sell, Outcome::Yes, 0.50, 300.0, 0),
            Some(&position),
            None,
        );
        assert_eq!(b, Behavior::Hedge);
    }

    #[test]
    fn flip_and_arb_windows() {
        let mut c = BehaviorClassifier::new();
        c.classify(
            &whale_trade(Side::Sell, Outcome::Yes, 0.60, 100.0, 0),
            None,
            None,
        );
        // Buy of the opposite outcome 10 minutes after the sell.
        let b = c.classify(
            &whale_trade(Side::Buy, Outcome::No, 0.45, 100.0, 10 * 60_000),
            None,
            None,
        );
        assert_eq!(b, Behavior::Flip);

        let mut c = BehaviorClassifier::new();
        c.classify(
            &whale_trade(Side::Buy, Outcome::Yes, 0.55, 100.0, 0),
            None,
            None,
        );
        let b = c.classify(
            &whale_trade(Side::Buy, Outcome::No, 0.47, 100.0, 2 * 60_000),
            None,
            None,
        );
        assert_eq!(b, Behavior::Arb);
    }

    #[test]
    fn scalp_within_an_hour() {
        let mut c = BehaviorClassifier::new();
        c.classify(
            &whale_trade(Side::Buy, Outcome::Yes, 0.50, 100.0, 0),
            None,
            None,
        );
        let b = c.classify(
            &whale_trade(Side::Sell, Outcome::Yes, 0.53, 50.0, 30 * 60_000),
            None,
            None,
        );
        assert_eq!(b, Behavior::Scalp);
    }

    #[test]
    fn dca_needs_spread_and_stable_price() {
        let mut c = BehaviorClassifier::new();
        c.classify(
            &whale_trade(Side::Buy, Outcome::Yes, 0.41, 100.0, 0),
            None,
            None,
        );
        c.classify(
            &whale_trade(Side::Buy, Outcome::Yes, 0.42, 100.0, HOUR + HOUR / 2),
            None,
            None,
        );
        let b = c.classify(
            &whale_trade(Side::Buy, Outcome::Yes, 0.42, 100.0, 3 * HOUR),
            None,
            None,
        );
        assert_eq!(b, Behavior::Dca);
    }

    #[test]
    fn stack_counts_notional() {
        let mut c = BehaviorClassifier::new();
        // Rapid buys: too tight for DCA's 2 h span, big enough for STACK.
        c.classify(
            &whale_trade(Side::Buy, Outcome::Yes, 0.50, 1_000.0, 0),
            None,
            None,
        );
        c.classify(
            &whale_trade(Side::Buy, Outcome::Yes, 0.52, 1_000.0, 10 * 60_000),
            None,
            None,
        );
        let b = c.classify(
            &whale_trade(Side::Buy, Outcome::Yes, 0.54, 1_000.0, 20 * 60_000),
            None,
            None,
        );
        assert_eq!(b, Behavior::Stack);
    }

    #[test]
    fn fade_and_chase_follow_the_tape() {
        let mut c = BehaviorClassifier::new();
        c.observe_price("M", 0.50, 0);
        c.observe_price("M", 0.58, 10 * 60_000);
        // Buying NO after an 8-point rally = fading the move.
        let b = c.classify(
            &whale_trade(Side::Buy, Outcome::No, 0.42, 100.0, 11 * 60_000),
            None,
            None,
        );
        assert_eq!(b, Behavior::Fade);

        // Buying YES with the move = chasing (fresh wallet history).
        let mut c = BehaviorClassifier::new();
        c.observe_price("M", 0.50, 0);
        c.observe_price("M", 0.58, 10 * 60_000);
        let b = c.classify(
            &whale_trade(Side::Buy, Outcome::Yes, 0.58, 100.0, 12 * 60_000),
            None,
            None,
        );
        assert_eq!(b, Behavior::Chase);
    }
}
