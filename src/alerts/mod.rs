//! Alert normalization, de-duplication, rate limiting and fan-out.

pub mod channels;
pub mod engine;

pub use channels::{AlertChannel, ConsoleChannel, FileChannel, WebhookChannel};
pub use engine::{
    dedupe_key, format_arbitrage, format_edge, format_linked, format_signal, format_truth_event,
    AlertEngine, AlertEngineConfig,
};
