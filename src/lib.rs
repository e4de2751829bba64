//! Trading-intelligence engine library.
//!
//! Exposes the signal-and-edge pipeline for the binary and for tests:
//! venue micro-structure signals, truth-source → market linking, whale
//! tracking, edge and arbitrage detection, and the alert engine fan-out.

pub mod alerts;
pub mod arbitrage;
pub mod archive;
pub mod caches;
pub mod edge;
pub mod linker;
pub mod models;
pub mod signals;
pub mod sources;
pub mod truth;
pub mod whales;

// Re-export the types that cross component boundaries most often.
pub use alerts::{AlertEngine, AlertEngineConfig};
pub use edge::{EdgeDetector, EdgeOpportunity, EdgeScanResponse};
pub use linker::{LinkedAlert, TruthMarketLinker};
pub use models::{Alert, AlertSource, Config, Market, Priority, VenueEvent};
pub use signals::{MarketSignal, MidPriceBoard, PriceProvider, SignalDetector};
pub use whales::{WhaleTracker, WhaleTrade};
