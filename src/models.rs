//! Shared data model for the trading-intelligence engine.
//!
//! Everything that crosses a component boundary lives here: venue events,
//! market identity, the common alert shape, and the env-driven configuration.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time in Unix milliseconds.
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Trade aggressor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// The two sides of a binary market. YES price + NO price = 1 at equilibrium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn opposite(&self) -> Outcome {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "YES",
            Outcome::No => "NO",
        }
    }
}

/// Expected price direction implied by an event or flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn flip(&self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// Alert priority. Ordering is binding: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

/// Strength of a detected micro-structure signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Significance attached to truth-source events by their upstream pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    Low,
    Medium,
    High,
    Critical,
}

/// Confidence bands used by the linker and edge detector.
/// Ordering `Low < Medium < High < VeryHigh` is binding for watchlist gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// A single price level on one side of the book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Events delivered by the venue stream. The wire client is upstream of this
/// crate; the engine consumes the already-decoded contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VenueEvent {
    Book {
        asset_id: String,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        best_bid: f64,
        best_ask: f64,
        timestamp_ms: i64,
    },
    Price {
        asset_id: String,
        best_bid: f64,
        best_ask: f64,
        timestamp_ms: i64,
    },
    Trade {
        asset_id: String,
        price: f64,
        size: f64,
        side: Side,
        timestamp_ms: i64,
    },
}

impl VenueEvent {
    pub fn asset_id(&self) -> &str {
        match self {
            VenueEvent::Book { asset_id, .. }
            | VenueEvent::Price { asset_id, .. }
            | VenueEvent::Trade { asset_id, .. } => asset_id,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        match self {
            VenueEvent::Book { timestamp_ms, .. }
            | VenueEvent::Price { timestamp_ms, .. }
            | VenueEvent::Trade { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    /// Reject out-of-range prices, non-positive sizes and crossed quotes.
    pub fn validate(&self) -> Result<(), &'static str> {
        let in_range = |p: f64| p > 0.0 && p < 1.0;
        match self {
            VenueEvent::Book {
                best_bid, best_ask, ..
            }
            | VenueEvent::Price {
                best_bid, best_ask, ..
            } => {
                if !in_range(*best_bid) || !in_range(*best_ask) {
                    return Err("quote out of range");
                }
                if best_bid > best_ask {
                    return Err("crossed quotes");
                }
            }
            VenueEvent::Trade { price, size, .. } => {
                if !in_range(*price) {
                    return Err("trade price out of range");
                }
                if *size <= 0.0 {
                    return Err("non-positive trade size");
                }
            }
        }
        Ok(())
    }
}

/// An asset tradable on the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Single outcome token.
    pub asset_id: String,
    /// Parent binary market.
    pub condition_id: String,
    pub question: String,
    pub slug: String,
    /// Initial outcome prices, each in [0, 1].
    pub outcome_prices: Vec<f64>,
}

/// The normalized output shape every producer converges on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp_ms: i64,
    pub priority: Priority,
    pub title: String,
    pub body: String,
    pub source: AlertSource,
    pub metadata: serde_json::Value,
}

/// Which producer emitted an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    Signal,
    Congress,
    Weather,
    Fed,
    Sports,
    Linked,
    WhaleEdge,
    Arbitrage,
}

impl AlertSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSource::Signal => "signal",
            AlertSource::Congress => "congress",
            AlertSource::Weather => "weather",
            AlertSource::Fed => "fed",
            AlertSource::Sports => "sports",
            AlertSource::Linked => "linked",
            AlertSource::WhaleEdge => "whale_edge",
            AlertSource::Arbitrage => "arbitrage",
        }
    }
}

/// Parse an env var, falling back to a default on absence or parse failure.
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Application configuration (deployment-level knobs).
/// Component thresholds live in each component's config struct.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// SQLite trade archive path; archive disabled when unset.
    pub archive_path: Option<String>,
    /// TOML keyword tables for market categorisation; compiled-in defaults when unset.
    pub keywords_path: Option<String>,
    pub webhook_url: Option<String>,
    pub alert_file_path: Option<String>,
    pub linker_refresh_ms: i64,
    pub edge_cache_ms: i64,
    pub arb_check_ms: i64,
    pub whale_rebuild_ms: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            port: env_parse("PORT", 8080),
            archive_path: std::env::var("ARCHIVE_PATH").ok(),
            keywords_path: std::env::var("KEYWORDS_PATH").ok(),
            webhook_url: std::env::var("WEBHOOK_URL").ok(),
            alert_file_path: std::env::var("ALERT_FILE_PATH").ok(),
            linker_refresh_ms: env_parse("LINKER_REFRESH_MS", 600_000),
            edge_cache_ms: env_parse("EDGE_CACHE_MS", 60_000),
            arb_check_ms: env_parse("ARB_CHECK_MS", 30_000),
            whale_rebuild_ms: env_parse("WHALE_REBUILD_MS", 3_600_000),
        })
    }
}
