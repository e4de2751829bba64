//! Edge detection over truth events and whale flow.

pub mod detector;
pub mod quality;

pub use detector::{
    EdgeAction, EdgeConfig, EdgeDetector, EdgeOpportunity, EdgeScanResponse, EdgeSignalType,
    EdgeUrgency,
};
pub use quality::{MarketQuality, QualityThresholds, SignalCooldowns};
