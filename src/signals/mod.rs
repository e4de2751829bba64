//! Micro-structure signal detection.

pub mod detector;
pub mod market_state;

pub use detector::{MarketSignal, SignalConfig, SignalDetector, SignalFamily, SignalKind};
pub use market_state::MarketState;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Read-only access to the latest observed mid price per asset.
/// The signal detector publishes; the edge and arbitrage detectors consume.
pub trait PriceProvider: Send + Sync {
    fn mid(&self, asset_id: &str) -> Option<f64>;
}

/// Shared mid-price snapshot board. Writes happen only on the venue ingest
/// task; readers get point-in-time values.
#[derive(Clone, Default)]
pub struct MidPriceBoard {
    inner: Arc<RwLock<HashMap<String, f64>>>,
}

impl MidPriceBoard {
    pub fn set(&self, asset_id: &str, mid: f64) {
        self.inner.write().insert(asset_id.to_string(), mid);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl PriceProvider for MidPriceBoard {
    fn mid(&self, asset_id: &str) -> Option<f64> {
        self.inner.read().get(asset_id).copied()
    }
}
