//! Position ledger for tracked wallets.
//!
//! One position per `(wallet, market, outcome)`. VWAP entry updates on adds,
//! realized PnL books on reductions, and the entry resets to the crossing
//! trade's price whenever net shares pass through zero. `peak_shares` is
//! refreshed after every mutation and never falls below `|net_shares|`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::models::{Outcome, Side};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    /// Signed: positive long, negative short.
    pub net_shares: f64,
    pub vwap_entry: f64,
    pub realized_pnl: f64,
    /// Largest absolute exposure ever held.
    pub peak_shares: f64,
}

/// What one trade did to a position.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionDelta {
    pub realized_pnl: f64,
    pub crossed_zero: bool,
    pub net_before: f64,
    pub net_after: f64,
    pub peak_shares: f64,
}

#[derive(Default)]
pub struct PositionLedger {
    positions: HashMap<(String, String, Outcome), Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, wallet: &str, market_id: &str, outcome: Outcome) -> Option<&Position> {
        self.positions
            .get(&(wallet.to_string(), market_id.to_string(), outcome))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Apply one fill for one wallet side.
    pub fn apply(
        &mut self,
        wallet: &str,
        market_id: &str,
        outcome: Outcome,
        side: Side,
        price: f64,
        shares: f64,
        _timestamp_ms: i64,
    ) -> PositionDelta {
        let key = (wallet.to_string(), market_id.to_string(), outcome);
        let position = self.positions.entry(key).or_default();

        // Invariant check before mutating: a corrupted position is reset to
        // observed reality and processing continues.
        if !position.net_shares.is_finite()
            || !position.vwap_entry.is_finite()
            || position.vwap_entry < 0.0
            || position.peak_shares + 1e-9 < position.net_shares.abs()
        {
            error!(
                wallet,
                market = market_id,
                net = position.net_shares,
                vwap = position.vwap_entry,
                "🛑 position invariant violated; resetting to observed trade"
            );
            *position = Position::default();
        }

        let net_before = position.net_shares;
        let mut realized = 0.0;
        let mut crossed = false;
        let signed = match side {
            Side::Buy => shares,
            Side::Sell => -shares,
        };

        if net_before == 0.0 || net_before.signum() == signed.signum() {
            // Adding in the direction of the existing exposure.
            let old_abs = net_before.abs();
            let new_abs = old_abs + shares;
            position.vwap_entry = if new_abs > 0.0 {
                (position.vwap_entry * old_abs + price * shares) / new_abs
            } else {
                price
            };
            position.net_shares = net_before + signed;
        } else {
            // Reducing (and possibly crossing) the existing exposure.
            let reducible = net_before.abs().min(shares);
            realized += match side {
                // Selling down a long.
                Side::Sell => (price - position.vwap_entry) * reducible,
                // Buying back a short.
                Side::Buy => (position.vwap_entry - price) * reducible,
            };
            let remainder = shares - reducible;
            if remainder > 0.0 {
                crossed = true;
                position.net_shares = if side == Side::Buy {
                    remainder
                } else {
                    -remainder
                };
                position.vwap_entry = price;
            } else {
                position.net_shares = net_before + signed;
                if position.net_shares == 0.0 {
                    position.vwap_entry = price;
                    crossed = true;
                }
            }
        }

        position.realized_pnl += realized;
        position.peak_shares = position.peak_shares.max(position.net_shares.abs());

        PositionDelta {
            realized_pnl: realized,
            crossed_zero: crossed,
            net_before,
            net_after: position.net_shares,
            peak_shares: position.peak_shares,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(
        ledger: &mut PositionLedger,
        side: Side,
        price: f64,
        shares: f64,
    ) -> PositionDelta {
        ledger.apply("w", "M", Outcome::Yes, side, price, shares, 0)
    }

    #[test]
    fn vwap_updates_on_adds() {
        let mut ledger = PositionLedger::new();
        apply(&mut ledger, Side::Buy, 0.40, 100.0);
        apply(&mut ledger, Side::Buy, 0.60, 100.0);
        let p = ledger.position("w", "M", Outcome::Yes).unwrap();
        assert!((p.vwap_entry - 0.50).abs() < 1e-9);
        assert!((p.net_shares - 200.0).abs() < 1e-9);
    }

    #[test]
    fn sell_realizes_against_vwap() {
        let mut ledger = PositionLedger::new();
        apply(&mut ledger, Side::Buy, 0.40, 100.0);
        let delta = apply(&mut ledger, Side::Sell, 0.55, 60.0);
        assert!((delta.realized_pnl - 9.0).abs() < 1e-9);
        let p = ledger.position("w", "M", Outcome::Yes).unwrap();
        assert!((p.net_shares - 40.0).abs() < 1e-9);
        // Entry VWAP unchanged on a partial close.
        assert!((p.vwap_entry - 0.40).abs() < 1e-9);
    }

    #[test]
    fn crossing_zero_resets_vwap_to_crossing_price() {
        let mut ledger = PositionLedger::new();
        apply(&mut ledger, Side::Buy, 0.40, 100.0);
        let delta = apply(&mut ledger, Side::Sell, 0.50, 150.0);
        assert!(delta.crossed_zero);
        // 100 closed at +0.10 each.
        assert!((delta.realized_pnl - 10.0).abs() < 1e-9);
        let p = ledger.position("w", "M", Outcome::Yes).unwrap();
        assert!((p.net_shares + 50.0).abs() < 1e-9);
        assert!((p.vwap_entry - 0.50).abs() < 1e-9);
    }

    #[test]
    fn short_cover_realizes_inverse() {
        let mut ledger = PositionLedger::new();
        apply(&mut ledger, Side::Sell, 0.70, 100.0);
        let delta = apply(&mut ledger, Side::Buy, 0.55, 100.0);
        assert!((delta.realized_pnl - 15.0).abs() < 1e-9);
        let p = ledger.position("w", "M", Outcome::Yes).unwrap();
        assert!(p.net_shares.abs() < 1e-9);
    }

    #[test]
    fn peak_tracks_max_absolute_exposure() {
        let mut ledger = PositionLedger::new();
        apply(&mut ledger, Side::Buy, 0.40, 1_000.0);
        apply(&mut ledger, Side::Sell, 0.45, 600.0);
        let p = ledger.position("w", "M", Outcome::Yes).unwrap();
        assert!((p.peak_shares - 1_000.0).abs() < 1e-9);
        assert!(p.peak_shares >= p.net_shares.abs());

        // Short side counts toward peak too.
        apply(&mut ledger, Side::Sell, 0.45, 1_900.0);
        let p = ledger.position("w", "M", Outcome::Yes).unwrap();
        assert!((p.net_shares + 1_500.0).abs() < 1e-9);
        assert!((p.peak_shares - 1_500.0).abs() < 1e-9);
    }

    #[test]
    fn batch_equals_per_trade_application() {
        // Applying a batch one-by-one yields the same net as summing the
        // signed quantities (associativity of ledger application).
        let fills = [
            (Side::Buy, 0.40, 100.0),
            (Side::Buy, 0.42, 50.0),
            (Side::Sell, 0.45, 30.0),
            (Side::Sell, 0.50, 200.0),
            (Side::Buy, 0.48, 20.0),
        ];
        let mut ledger = PositionLedger::new();
        for (side, price, shares) in fills {
            apply(&mut ledger, side, price, shares);
        }
        let expected_net: f64 = fills
            .iter()
            .map(|(side, _, s)| match side {
                Side::Buy => *s,
                Side::Sell => -*s,
            })
            .sum();
        let p = ledger.position("w", "M", Outcome::Yes).unwrap();
        assert!((p.net_shares - expected_net).abs() < 1e-9);
    }
}
