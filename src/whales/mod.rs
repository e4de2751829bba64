//! Whale tracking: trade store, universe, position ledger and behavior
//! classification behind one facade.
//!
//! The tracker is single-writer: the whale-stream task owns it. Readers get
//! snapshots (`universe().all()`, cloned positions) through the facade.

pub mod behavior;
pub mod ledger;
pub mod trade_store;
pub mod universe;

pub use behavior::{Behavior, BehaviorClassifier};
pub use ledger::{Position, PositionDelta, PositionLedger};
pub use trade_store::{TradeStore, VenueTrade, WalletStats};
pub use universe::{UniverseConfig, Whale, WhaleTier, WhaleUniverse};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Outcome, Side};

const DAY_MS: i64 = 24 * 3_600_000;

/// A venue trade with a tracked whale on one side, as delivered by the
/// (pre-filtered) whale trade source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleTrade {
    pub whale: String,
    pub market_id: String,
    pub outcome: Outcome,
    pub side: Side,
    pub price: f64,
    pub shares: f64,
    pub size_usdc: f64,
    pub is_maker: bool,
    pub timestamp_ms: i64,
}

/// A whale trade after classification and ledger application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedWhaleTrade {
    pub trade: WhaleTrade,
    pub behavior: Behavior,
    pub tier: WhaleTier,
    pub copy_suitability: f64,
    pub net_after: f64,
    pub peak_shares: f64,
    /// Fraction of peak exposure shed, in [0, 1].
    pub reduction_from_peak: f64,
    /// Notional of the position at its peak, using the entry VWAP.
    pub prior_position_usd: f64,
    pub realized_pnl: f64,
}

pub struct WhaleTracker {
    store: TradeStore,
    universe: WhaleUniverse,
    ledger: PositionLedger,
    classifier: BehaviorClassifier,
}

impl WhaleTracker {
    pub fn new(config: UniverseConfig) -> Self {
        Self {
            store: TradeStore::new(),
            universe: WhaleUniverse::new(config),
            ledger: PositionLedger::new(),
            classifier: BehaviorClassifier::new(),
        }
    }

    pub fn universe(&self) -> &WhaleUniverse {
        &self.universe
    }

    pub fn universe_mut(&mut self) -> &mut WhaleUniverse {
        &mut self.universe
    }

    pub fn store(&self) -> &TradeStore {
        &self.store
    }

    pub fn position(&self, wallet: &str, market_id: &str, outcome: Outcome) -> Option<Position> {
        self.ledger.position(wallet, market_id, outcome).cloned()
    }

    /// Record a raw venue trade for stats and price context.
    pub fn on_venue_trade(&mut self, trade: VenueTrade) {
        self.classifier
            .observe_price(&trade.market_id, trade.price, trade.timestamp_ms);
        self.store.record(trade);
    }

    /// Classify a whale trade and apply it to the position ledger.
    pub fn on_whale_trade(&mut self, trade: WhaleTrade) -> ClassifiedWhaleTrade {
        let before = self
            .ledger
            .position(&trade.whale, &trade.market_id, trade.outcome)
            .cloned();
        let opposite = self
            .ledger
            .position(&trade.whale, &trade.market_id, trade.outcome.opposite())
            .cloned();

        let prior_position_usd = before
            .as_ref()
            .map(|p| p.peak_shares * p.vwap_entry)
            .unwrap_or(0.0);

        let behavior = self
            .classifier
            .classify(&trade, before.as_ref(), opposite.as_ref());

        let delta = self.ledger.apply(
            &trade.whale,
            &trade.market_id,
            trade.outcome,
            trade.side,
            trade.price,
            trade.shares,
            trade.timestamp_ms,
        );

        let reduction_from_peak = if delta.peak_shares > 0.0 {
            ((delta.peak_shares - delta.net_after.abs()) / delta.peak_shares).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let (tier, copy_suitability) = self
            .universe
            .get(&trade.whale)
            .map(|w| (w.tier, w.copy_suitability))
            .unwrap_or((WhaleTier::Tracked, 50.0));

        debug!(
            whale = %trade.whale,
            market = %trade.market_id,
            behavior = behavior.as_str(),
            net_after = delta.net_after,
            "🐋 whale trade classified"
        );

        ClassifiedWhaleTrade {
            trade,
            behavior,
            tier,
            copy_suitability,
            net_after: delta.net_after,
            peak_shares: delta.peak_shares,
            reduction_from_peak,
            prior_position_usd,
            realized_pnl: delta.realized_pnl,
        }
    }

    /// Hourly universe recompute from the trade store.
    pub fn rebuild_universe(&mut self, now_ms: i64) {
        let wallets = self.store.wallets_active_since(now_ms - 30 * DAY_MS);
        let stats = wallets
            .into_iter()
            .map(|w| {
                let s7 = self.store.wallet_stats(&w, 7 * DAY_MS, now_ms);
                let s30 = self.store.wallet_stats(&w, 30 * DAY_MS, now_ms);
                (w, (s7, s30))
            })
            .collect();
        self.universe.rebuild(&stats, now_ms);
        self.classifier.prune(now_ms);
    }
}
