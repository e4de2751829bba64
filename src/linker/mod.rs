//! Truth-source → market linker.
//!
//! Maps each truth-source event to the set of currently tracked markets it
//! could move, with a per-market relevance score and an expected direction.
//! Markets enter the tracked set through the 10-minute universe refresh; an
//! event whose affected-market set comes out empty is silently dropped.

pub mod categorize;
pub mod watchlist;

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Confidence, Direction, Market, Significance};
use crate::truth::{
    CongressEvent, FedEvent, FedEventType, FedSentiment, PlayerStatus, RateMove, SportsEvent,
    TruthSourceEvent, WeatherEvent,
};
use categorize::{categorize, keyword_hits, CategoryRule, MarketCategory, TruthMap};
use watchlist::{WatchlistManager, WATCHLIST_BOOST};

/// A market the linker has categorised and keeps fresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedMarket {
    pub market: Market,
    pub truth_map: TruthMap,
    pub last_price: f64,
    pub last_refresh_ms: i64,
}

/// One market an event is expected to move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedMarket {
    pub asset_id: String,
    pub question: String,
    pub relevance: f64,
    pub expected_direction: Direction,
    pub current_price: f64,
}

/// The linker's output: an event tied to the markets it should move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedAlert {
    pub id: String,
    pub source: String,
    pub title: String,
    pub summary: String,
    pub affected_markets: Vec<AffectedMarket>,
    pub confidence: Confidence,
    pub urgency: Significance,
    pub timestamp_ms: i64,
}

pub struct TruthMarketLinker {
    rules: Vec<CategoryRule>,
    tracked: HashMap<String, TrackedMarket>,
    /// Bill patterns compiled once at categorisation time, keyed by asset.
    /// `TruthMap` stays serializable; events match against these.
    bill_regexes: HashMap<String, Vec<Regex>>,
    watchlist: Option<WatchlistManager>,
}

impl TruthMarketLinker {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self {
            rules,
            tracked: HashMap::with_capacity(256),
            bill_regexes: HashMap::new(),
            watchlist: None,
        }
    }

    /// Point-in-time copy for readers; the linker stays the single writer.
    pub fn tracked_markets(&self) -> HashMap<String, TrackedMarket> {
        self.tracked.clone()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn set_watchlist(&mut self, manager: WatchlistManager) {
        self.watchlist = Some(manager);
    }

    pub fn track_market(&mut self, market: Market, truth_map: TruthMap, now_ms: i64) {
        let last_price = market.outcome_prices.first().copied().unwrap_or(0.5);
        self.bill_regexes.insert(
            market.asset_id.clone(),
            truth_map
                .bill_patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        );
        self.tracked.insert(
            market.asset_id.clone(),
            TrackedMarket {
                market,
                truth_map,
                last_price,
                last_refresh_ms: now_ms,
            },
        );
    }

    /// Categorise new markets and refresh prices on already-tracked ones.
    /// Tracked markets are never dropped here; a missing market just keeps
    /// its last-known price.
    pub fn refresh_universe(&mut self, markets: &[Market], now_ms: i64) {
        let mut newly_tracked = 0usize;
        for market in markets {
            if let Some(entry) = self.tracked.get_mut(&market.asset_id) {
                if let Some(price) = market.outcome_prices.first() {
                    entry.last_price = *price;
                }
                entry.last_refresh_ms = now_ms;
                continue;
            }
            let text = format!("{} {}", market.question, market.slug);
            if let Some(truth_map) = categorize(&self.rules, &text) {
                debug!(
                    asset = %market.asset_id,
                    category = ?truth_map.category,
                    "📌 tracking market"
                );
                self.track_market(market.clone(), truth_map, now_ms);
                newly_tracked += 1;
            }
        }
        if newly_tracked > 0 {
            info!(
                "🗺️ universe refresh: {} newly tracked, {} total",
                newly_tracked,
                self.tracked.len()
            );
        }
    }

    /// Dispatch one truth event. `None` means no tracked market was affected.
    pub fn handle_event(&self, event: &TruthSourceEvent) -> Option<LinkedAlert> {
        match event {
            TruthSourceEvent::Congress(e) => self.handle_congress(e),
            TruthSourceEvent::Weather(e) => self.handle_weather(e),
            TruthSourceEvent::Fed(e) => self.handle_fed(e),
            TruthSourceEvent::Sports(e) => self.handle_sports(e),
        }
    }

    fn handle_congress(&self, event: &CongressEvent) -> Option<LinkedAlert> {
        let title_lower = format!("{} {}", event.title, event.action_text).to_lowercase();
        let mut affected = Vec::new();

        for entry in self.tracked.values() {
            let category = entry.truth_map.category;
            if !matches!(
                category,
                MarketCategory::GovernmentShutdown | MarketCategory::Legislation
            ) {
                continue;
            }

            let bill_match = self
                .bill_regexes
                .get(&entry.market.asset_id)
                .is_some_and(|regexes| regexes.iter().any(|r| r.is_match(&event.title)));

            let relevance = if bill_match {
                0.8
            } else {
                let hits = keyword_hits(&title_lower, &entry.truth_map.keywords);
                if hits == 0 {
                    continue;
                }
                (0.5 + 0.1 * hits as f64).min(0.9)
            };

            // Shutdown markets price the lapse; passage of funding pushes them
            // down. Plain legislation markets price the bill itself.
            let expected_direction = match category {
                MarketCategory::GovernmentShutdown => {
                    if event.action_type.is_failure() {
                        Direction::Up
                    } else {
                        Direction::Down
                    }
                }
                _ => {
                    if event.action_type.is_failure() {
                        Direction::Down
                    } else {
                        Direction::Up
                    }
                }
            };

            affected.push(AffectedMarket {
                asset_id: entry.market.asset_id.clone(),
                question: entry.market.question.clone(),
                relevance,
                expected_direction,
                current_price: entry.last_price,
            });
        }

        self.finalize(
            "congress",
            format!("Congress: {:?}: {}", event.action_type, event.title),
            format!("{}: {}", event.bill_id, event.action_text),
            affected,
            event.significance,
            event.timestamp_ms,
        )
    }

    fn handle_weather(&self, event: &WeatherEvent) -> Option<LinkedAlert> {
        let headline_lower = event.headline.to_lowercase();
        let is_tropical = ["tropical", "hurricane", "cyclone"]
            .iter()
            .any(|w| headline_lower.contains(w));
        let mut affected = Vec::new();

        for entry in self.tracked.values() {
            let category = entry.truth_map.category;
            if !matches!(category, MarketCategory::Hurricane | MarketCategory::Weather) {
                continue;
            }

            let relevance = if category == MarketCategory::Hurricane && is_tropical {
                0.9
            } else if keyword_hits(&headline_lower, &entry.truth_map.keywords) > 0 {
                0.7
            } else {
                continue;
            };

            // Warnings and watches push "will the event happen" markets up.
            affected.push(AffectedMarket {
                asset_id: entry.market.asset_id.clone(),
                question: entry.market.question.clone(),
                relevance,
                expected_direction: Direction::Up,
                current_price: entry.last_price,
            });
        }

        self.finalize(
            "weather",
            format!("Weather: {}", event.event_name),
            event.headline.clone(),
            affected,
            event.significance,
            event.timestamp_ms,
        )
    }

    fn handle_fed(&self, event: &FedEvent) -> Option<LinkedAlert> {
        let relevance_base = match event.event_type {
            FedEventType::FomcStatement | FedEventType::RateDecision => 0.95,
            FedEventType::FomcMinutes => 0.7,
            FedEventType::Speech => 0.6,
        };
        let mut affected = Vec::new();

        for entry in self.tracked.values() {
            if entry.truth_map.category != MarketCategory::FedRate {
                continue;
            }
            let question_lower = entry.market.question.to_lowercase();
            // Guard against false positives: the question itself must talk
            // about the Fed or rates.
            if keyword_hits(&question_lower, &entry.truth_map.keywords) == 0 {
                continue;
            }

            let is_cut_market =
                question_lower.contains("cut") || question_lower.contains("lower");
            let is_hike_market = question_lower.contains("hike")
                || question_lower.contains("raise")
                || question_lower.contains("increase");

            let dovish = event.rate_decision == Some(RateMove::Cut)
                || event.sentiment == FedSentiment::Dovish;
            let hawkish = event.rate_decision == Some(RateMove::Hike)
                || event.sentiment == FedSentiment::Hawkish;

            let expected_direction = if is_cut_market {
                if dovish {
                    Direction::Up
                } else if hawkish {
                    Direction::Down
                } else {
                    continue;
                }
            } else if is_hike_market {
                if hawkish {
                    Direction::Up
                } else if dovish {
                    Direction::Down
                } else {
                    continue;
                }
            } else {
                continue;
            };

            affected.push(AffectedMarket {
                asset_id: entry.market.asset_id.clone(),
                question: entry.market.question.clone(),
                relevance: relevance_base,
                expected_direction,
                current_price: entry.last_price,
            });
        }

        self.finalize(
            "fed",
            format!("Fed: {}", event.headline),
            event.headline.clone(),
            affected,
            event.significance,
            event.timestamp_ms,
        )
    }

    fn handle_sports(&self, event: &SportsEvent) -> Option<LinkedAlert> {
        let player_lower = event.player.to_lowercase();
        let team_lower = event.team.to_lowercase();
        let mut affected = Vec::new();

        for entry in self.tracked.values() {
            let category = entry.truth_map.category;
            if !matches!(
                category,
                MarketCategory::SportsPlayer | MarketCategory::SportsOutcome
            ) {
                continue;
            }
            let question_lower = entry.market.question.to_lowercase();

            let player_mentioned =
                !player_lower.is_empty() && question_lower.contains(&player_lower);
            let team_mentioned = !team_lower.is_empty() && question_lower.contains(&team_lower);

            let relevance = if player_mentioned {
                0.95
            } else if team_mentioned && event.significance == Significance::Critical {
                0.7
            } else {
                continue;
            };

            let ruled_out = matches!(
                event.status,
                PlayerStatus::Out | PlayerStatus::InjuredReserve
            );
            let upgraded = event.previous_status.is_some_and(|prev| {
                prev.availability_rank() <= PlayerStatus::Doubtful.availability_rank()
                    && event.status.availability_rank()
                        >= PlayerStatus::Questionable.availability_rank()
            });

            let expected_direction = match category {
                MarketCategory::SportsPlayer => {
                    if ruled_out {
                        Direction::Down
                    } else if upgraded {
                        Direction::Up
                    } else {
                        continue;
                    }
                }
                _ => {
                    // Team-outcome market: a star ruled out drags bets on that
                    // team down.
                    if ruled_out && event.significance == Significance::Critical {
                        Direction::Down
                    } else {
                        continue;
                    }
                }
            };

            affected.push(AffectedMarket {
                asset_id: entry.market.asset_id.clone(),
                question: entry.market.question.clone(),
                relevance,
                expected_direction,
                current_price: entry.last_price,
            });
        }

        self.finalize(
            "sports",
            format!(
                "{} ({}) now {:?}",
                event.player, event.team_abbr, event.status
            ),
            format!(
                "{} {} listed {:?} (was {:?})",
                event.team,
                event.player,
                event.status,
                event.previous_status
            ),
            affected,
            event.significance,
            event.timestamp_ms,
        )
    }

    /// Watchlist filter/boost, confidence mapping, relevance ordering.
    fn finalize(
        &self,
        source: &'static str,
        title: String,
        summary: String,
        mut affected: Vec<AffectedMarket>,
        significance: Significance,
        timestamp_ms: i64,
    ) -> Option<LinkedAlert> {
        if let Some(wl) = &self.watchlist {
            if wl.is_exclusive() {
                affected.retain(|m| wl.contains(&m.asset_id));
            } else {
                for m in &mut affected {
                    if wl.contains(&m.asset_id) {
                        m.relevance = (m.relevance + WATCHLIST_BOOST).min(1.0);
                    }
                }
            }
        }

        if affected.is_empty() {
            return None;
        }

        let avg_relevance =
            affected.iter().map(|m| m.relevance).sum::<f64>() / affected.len() as f64;
        let confidence = confidence_from(avg_relevance, significance);

        if let Some(wl) = &self.watchlist {
            affected.retain(|m| match wl.min_confidence(&m.asset_id) {
                Some(min) => confidence >= min,
                None => true,
            });
            if affected.is_empty() {
                return None;
            }
        }

        affected.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(Ordering::Equal)
        });

        Some(LinkedAlert {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            title,
            summary,
            affected_markets: affected,
            confidence,
            urgency: significance,
            timestamp_ms,
        })
    }
}

/// Average relevance + event significance → confidence band.
fn confidence_from(avg_relevance: f64, significance: Significance) -> Confidence {
    let base = if avg_relevance >= 0.85 {
        Confidence::High
    } else if avg_relevance >= 0.6 {
        Confidence::Medium
    } else {
        Confidence::Low
    };
    if significance >= Significance::High {
        match base {
            Confidence::Low => Confidence::Medium,
            Confidence::Medium => Confidence::High,
            _ => Confidence::VeryHigh,
        }
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Market;
    use crate::truth::CongressAction;

    fn market(asset_id: &str, question: &str, price: f64) -> Market {
        Market {
            asset_id: asset_id.to_string(),
            condition_id: format!("cond-{asset_id}"),
            question: question.to_string(),
            slug: question.to_lowercase().replace(' ', "-"),
            outcome_prices: vec![price, 1.0 - price],
        }
    }

    fn linker_with_shutdown_market() -> TruthMarketLinker {
        let mut linker = TruthMarketLinker::new(categorize::default_rules());
        linker.refresh_universe(
            &[market("SHUT", "Government shutdown before 2025-12-01?", 0.42)],
            0,
        );
        linker
    }

    fn became_law_event() -> TruthSourceEvent {
        TruthSourceEvent::Congress(CongressEvent {
            bill_id: "hr-5371-119".to_string(),
            title: "Continuing Appropriations Act 2025".to_string(),
            action_type: CongressAction::BecameLaw,
            action_text: "Signed by President. The bill became Public Law.".to_string(),
            significance: Significance::Critical,
            is_new: true,
            timestamp_ms: 1_000,
        })
    }

    #[test]
    fn shutdown_bill_links_down_with_high_confidence() {
        let linker = linker_with_shutdown_market();
        let alert = linker.handle_event(&became_law_event()).expect("alert");

        assert_eq!(alert.affected_markets.len(), 1);
        let hit = &alert.affected_markets[0];
        assert_eq!(hit.asset_id, "SHUT");
        assert_eq!(hit.expected_direction, Direction::Down);
        assert!((hit.relevance - 0.8).abs() < 1e-9);
        assert!(alert.confidence >= Confidence::High);
        assert!(alert.title.contains("Continuing Appropriations Act"));
    }

    #[test]
    fn event_with_no_affected_markets_is_dropped() {
        let linker = TruthMarketLinker::new(categorize::default_rules());
        assert!(linker.handle_event(&became_law_event()).is_none());
    }

    #[test]
    fn affected_markets_sorted_by_relevance() {
        let mut linker = TruthMarketLinker::new(categorize::default_rules());
        linker.refresh_universe(
            &[
                market("SHUT", "Government shutdown before 2025-12-01?", 0.42),
                market("BILL", "Will the Senate pass the funding bill?", 0.60),
            ],
            0,
        );
        let alert = linker.handle_event(&became_law_event()).expect("alert");
        assert!(alert.affected_markets.len() >= 2);
        for pair in alert.affected_markets.windows(2) {
            assert!(pair[0].relevance >= pair[1].relevance);
        }
    }

    #[test]
    fn exclusive_watchlist_filters_unwatched() {
        let mut linker = linker_with_shutdown_market();
        let mut wl = WatchlistManager::new(true);
        wl.watch("OTHER", None);
        linker.set_watchlist(wl);
        assert!(linker.handle_event(&became_law_event()).is_none());
    }

    #[test]
    fn watchlist_boost_raises_relevance() {
        let mut linker = linker_with_shutdown_market();
        let mut wl = WatchlistManager::new(false);
        wl.watch("SHUT", None);
        linker.set_watchlist(wl);
        let alert = linker.handle_event(&became_law_event()).expect("alert");
        assert!((alert.affected_markets[0].relevance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn min_confidence_gate_suppresses() {
        let mut linker = linker_with_shutdown_market();
        let mut wl = WatchlistManager::new(false);
        wl.watch("SHUT", Some(Confidence::VeryHigh));
        linker.set_watchlist(wl);
        // Confidence comes out High (< VeryHigh): the watched market is gated.
        assert!(linker.handle_event(&became_law_event()).is_none());
    }

    #[test]
    fn fed_cut_market_moves_up_on_dovish_decision() {
        let mut linker = TruthMarketLinker::new(categorize::default_rules());
        linker.refresh_universe(
            &[market("FEDCUT", "Will the Fed cut rates in March?", 0.55)],
            0,
        );
        let event = TruthSourceEvent::Fed(FedEvent {
            event_type: FedEventType::RateDecision,
            rate_decision: Some(RateMove::Cut),
            rate_change_bp: Some(-25),
            sentiment: FedSentiment::Dovish,
            significance: Significance::Critical,
            headline: "FOMC cuts target range by 25bp".to_string(),
            timestamp_ms: 2_000,
        });
        let alert = linker.handle_event(&event).expect("alert");
        assert_eq!(
            alert.affected_markets[0].expected_direction,
            Direction::Up
        );
        assert!((alert.affected_markets[0].relevance - 0.95).abs() < 1e-9);
    }

    #[test]
    fn sports_player_ruled_out_moves_prop_down() {
        let mut linker = TruthMarketLinker::new(categorize::default_rules());
        linker.refresh_universe(
            &[market(
                "PROP",
                "Will Patrick Mahomes record 300 passing yards?",
                0.48,
            )],
            0,
        );
        let event = TruthSourceEvent::Sports(SportsEvent {
            league: "NFL".to_string(),
            player: "Patrick Mahomes".to_string(),
            team: "Chiefs".to_string(),
            team_abbr: "KC".to_string(),
            status: PlayerStatus::Out,
            previous_status: Some(PlayerStatus::Questionable),
            is_update: true,
            significance: Significance::Critical,
            timestamp_ms: 3_000,
        });
        let alert = linker.handle_event(&event).expect("alert");
        assert_eq!(
            alert.affected_markets[0].expected_direction,
            Direction::Down
        );
        assert!((alert.affected_markets[0].relevance - 0.95).abs() < 1e-9);
    }

    #[test]
    fn refresh_updates_prices_without_dropping() {
        let mut linker = linker_with_shutdown_market();
        assert_eq!(linker.tracked_count(), 1);
        // Refresh with an empty universe: the market stays tracked.
        linker.refresh_universe(&[], 600_000);
        assert_eq!(linker.tracked_count(), 1);
        // Refresh with a new price.
        linker.refresh_universe(
            &[market("SHUT", "Government shutdown before 2025-12-01?", 0.30)],
            1_200_000,
        );
        let tracked = linker.tracked_markets();
        assert!((tracked["SHUT"].last_price - 0.30).abs() < 1e-9);
    }
}
