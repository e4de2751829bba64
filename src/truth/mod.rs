//! Truth-source events.
//!
//! The upstream pollers (Congress, NWS, Fed, sports wires) are out-of-core;
//! they deliver these already-normalized variants into the linker's channel.
//! Any subset of sources may be absent at runtime.

use serde::{Deserialize, Serialize};

use crate::models::Significance;

/// What a congressional action did to a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongressAction {
    Introduced,
    CommitteeAction,
    PassedHouse,
    PassedSenate,
    ToPresident,
    BecameLaw,
    Vetoed,
    Failed,
}

impl CongressAction {
    /// Did this action advance the bill toward enactment?
    pub fn is_passage(&self) -> bool {
        matches!(
            self,
            CongressAction::PassedHouse
                | CongressAction::PassedSenate
                | CongressAction::ToPresident
                | CongressAction::BecameLaw
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CongressAction::Vetoed | CongressAction::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CongressEvent {
    pub bill_id: String,
    pub title: String,
    pub action_type: CongressAction,
    pub action_text: String,
    pub significance: Significance,
    pub is_new: bool,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherEvent {
    /// e.g. "Hurricane Warning", "Tropical Storm Watch"
    pub event_name: String,
    pub headline: String,
    pub areas: Vec<String>,
    pub states: Vec<String>,
    pub severity: String,
    pub urgency: String,
    pub significance: Significance,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FedEventType {
    FomcStatement,
    FomcMinutes,
    RateDecision,
    Speech,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateMove {
    Cut,
    Hike,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FedSentiment {
    Hawkish,
    Dovish,
    Neutral,
    NotApplicable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FedEvent {
    pub event_type: FedEventType,
    pub rate_decision: Option<RateMove>,
    pub rate_change_bp: Option<i32>,
    pub sentiment: FedSentiment,
    pub significance: Significance,
    pub headline: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Active,
    Probable,
    Questionable,
    Doubtful,
    Out,
    InjuredReserve,
}

impl PlayerStatus {
    /// Ordering proxy for upgrade/downgrade comparisons: higher = healthier.
    pub fn availability_rank(&self) -> u8 {
        match self {
            PlayerStatus::Active => 5,
            PlayerStatus::Probable => 4,
            PlayerStatus::Questionable => 3,
            PlayerStatus::Doubtful => 2,
            PlayerStatus::Out => 1,
            PlayerStatus::InjuredReserve => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SportsEvent {
    pub league: String,
    pub player: String,
    pub team: String,
    pub team_abbr: String,
    pub status: PlayerStatus,
    pub previous_status: Option<PlayerStatus>,
    pub is_update: bool,
    pub significance: Significance,
    pub timestamp_ms: i64,
}

/// The tagged union delivered to the linker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TruthSourceEvent {
    Congress(CongressEvent),
    Weather(WeatherEvent),
    Fed(FedEvent),
    Sports(SportsEvent),
}

impl TruthSourceEvent {
    pub fn significance(&self) -> Significance {
        match self {
            TruthSourceEvent::Congress(e) => e.significance,
            TruthSourceEvent::Weather(e) => e.significance,
            TruthSourceEvent::Fed(e) => e.significance,
            TruthSourceEvent::Sports(e) => e.significance,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        match self {
            TruthSourceEvent::Congress(e) => e.timestamp_ms,
            TruthSourceEvent::Weather(e) => e.timestamp_ms,
            TruthSourceEvent::Fed(e) => e.timestamp_ms,
            TruthSourceEvent::Sports(e) => e.timestamp_ms,
        }
    }

    pub fn source_name(&self) -> &'static str {
        match self {
            TruthSourceEvent::Congress(_) => "congress",
            TruthSourceEvent::Weather(_) => "weather",
            TruthSourceEvent::Fed(_) => "fed",
            TruthSourceEvent::Sports(_) => "sports",
        }
    }
}
