//! Cross-market arbitrage detection.

pub mod engine;

pub use engine::{
    ArbAction, ArbConfig, ArbLeg, ArbOpportunity, ArbitrageDetector, MarketRelationship,
    RelationKind,
};
