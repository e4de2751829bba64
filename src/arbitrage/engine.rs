//! Cross-market arbitrage detection.
//!
//! Runs on a fixed tick over the currently known markets. Pair relationships
//! are auto-detected from question text when a market is first seen next to
//! another; each relationship type carries a price constraint, and a
//! violation beyond tolerance becomes an opportunity. Opportunities are
//! de-duplicated per (pair, type) for five minutes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::edge::EdgeUrgency;
use crate::models::env_parse;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "will", "to", "of", "in", "on", "by", "be", "do", "does", "is", "it",
    "before", "after", "at", "vs",
];

const WIN_MARKERS: &[&str] = &["win", "wins", "beat", "beats", "defeat", "champion"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    MutuallyExclusive,
    Inverse,
    Correlated,
    Subset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbAction {
    BuyYes,
    BuyNo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbLeg {
    pub market_id: String,
    pub question: String,
    pub action: ArbAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbOpportunity {
    pub id: String,
    pub kind: RelationKind,
    pub legs: Vec<ArbLeg>,
    pub expected_edge: f64,
    pub urgency: EdgeUrgency,
    pub detected_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct MarketRelationship {
    pub a: String,
    pub b: String,
    pub kind: RelationKind,
    /// Constraint target: max sum for mutually-exclusive, sum target for
    /// inverse, price ratio for correlated.
    pub target: f64,
    pub tolerance: f64,
}

#[derive(Debug, Clone)]
pub struct ArbConfig {
    pub min_edge: f64,
    pub tolerance: f64,
    pub dedupe_ms: i64,
}

impl Default for ArbConfig {
    fn default() -> Self {
        Self {
            min_edge: 0.02,
            tolerance: 0.02,
            dedupe_ms: 300_000,
        }
    }
}

impl ArbConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_edge: env_parse("ARB_MIN_EDGE", d.min_edge),
            ..d
        }
    }
}

#[derive(Debug, Clone)]
struct KnownMarket {
    question: String,
    price: f64,
    words: Vec<String>,
}

pub struct ArbitrageDetector {
    config: ArbConfig,
    markets: HashMap<String, KnownMarket>,
    relationships: Vec<MarketRelationship>,
    recent: HashMap<(String, String, RelationKind), i64>,
}

impl ArbitrageDetector {
    pub fn new(config: ArbConfig) -> Self {
        Self {
            config,
            markets: HashMap::new(),
            relationships: Vec::new(),
            recent: HashMap::new(),
        }
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Manually register a relationship (correlated pairs come from the
    /// operator's playbook, not from text heuristics).
    pub fn add_relationship(&mut self, rel: MarketRelationship) {
        if !self.has_relationship(&rel.a, &rel.b, rel.kind) {
            self.relationships.push(rel);
        }
    }

    /// Insert or refresh a market, auto-detecting pair relationships against
    /// everything already known.
    pub fn update_market(&mut self, market_id: &str, question: &str, price: f64) {
        let is_new = !self.markets.contains_key(market_id);
        let words = significant_words(question);
        self.markets.insert(
            market_id.to_string(),
            KnownMarket {
                question: question.to_string(),
                price,
                words,
            },
        );

        if !is_new {
            return;
        }

        let candidates: Vec<(String, String)> = self
            .markets
            .iter()
            .filter(|(id, _)| id.as_str() != market_id)
            .map(|(id, m)| (id.clone(), m.question.clone()))
            .collect();
        for (other_id, other_question) in candidates {
            if let Some(kind) = detect_relation(question, &other_question) {
                if self.has_relationship(market_id, &other_id, kind) {
                    continue;
                }
                debug!(
                    a = market_id,
                    b = %other_id,
                    kind = ?kind,
                    "🔗 market relationship detected"
                );
                // Subset heuristic orders (a ⊆ b) itself.
                let (a, b) = if kind == RelationKind::Subset
                    && !subset_ordered(question, &other_question)
                {
                    (other_id, market_id.to_string())
                } else {
                    (market_id.to_string(), other_id)
                };
                self.relationships.push(MarketRelationship {
                    a,
                    b,
                    kind,
                    target: 1.0,
                    tolerance: self.config.tolerance,
                });
            }
        }
    }

    fn has_relationship(&self, a: &str, b: &str, kind: RelationKind) -> bool {
        self.relationships.iter().any(|r| {
            r.kind == kind && ((r.a == a && r.b == b) || (r.a == b && r.b == a))
        })
    }

    /// Evaluate all relationships against current prices.
    pub fn check_all(&mut self, now_ms: i64) -> Vec<ArbOpportunity> {
        let mut found = Vec::new();

        for rel in &self.relationships {
            let (Some(ma), Some(mb)) = (self.markets.get(&rel.a), self.markets.get(&rel.b))
            else {
                continue;
            };
            let (pa, pb) = (ma.price, mb.price);

            let violation: Option<(f64, ArbAction, ArbAction)> = match rel.kind {
                RelationKind::MutuallyExclusive => {
                    let sum = pa + pb;
                    (sum > rel.target + rel.tolerance)
                        .then_some((sum - rel.target, ArbAction::BuyNo, ArbAction::BuyNo))
                }
                RelationKind::Inverse => {
                    let sum = pa + pb;
                    let deviation = (sum - rel.target).abs();
                    (deviation > rel.tolerance).then(|| {
                        if sum > rel.target {
                            (deviation, ArbAction::BuyNo, ArbAction::BuyNo)
                        } else {
                            (deviation, ArbAction::BuyYes, ArbAction::BuyYes)
                        }
                    })
                }
                RelationKind::Correlated => {
                    let deviation = (pb - rel.target * pa).abs();
                    (deviation > rel.tolerance).then(|| {
                        if pb > rel.target * pa {
                            (deviation, ArbAction::BuyYes, ArbAction::BuyNo)
                        } else {
                            (deviation, ArbAction::BuyNo, ArbAction::BuyYes)
                        }
                    })
                }
                RelationKind::Subset => {
                    // A implies B, so P(A) must not exceed P(B).
                    (pa > pb + rel.tolerance)
                        .then_some((pa - pb, ArbAction::BuyNo, ArbAction::BuyYes))
                }
            };

            let Some((edge, action_a, action_b)) = violation else {
                continue;
            };
            if edge < self.config.min_edge {
                continue;
            }

            let dedupe = (rel.a.clone(), rel.b.clone(), rel.kind);
            if self
                .recent
                .get(&dedupe)
                .is_some_and(|t| now_ms - t < self.config.dedupe_ms)
            {
                continue;
            }
            self.recent.insert(dedupe, now_ms);

            let urgency = if edge >= 0.10 {
                EdgeUrgency::Immediate
            } else if edge >= 0.04 {
                EdgeUrgency::Hours
            } else {
                EdgeUrgency::Day
            };

            info!(
                a = %rel.a,
                b = %rel.b,
                kind = ?rel.kind,
                edge,
                "🎯 arbitrage opportunity"
            );

            found.push(ArbOpportunity {
                id: Uuid::new_v4().to_string(),
                kind: rel.kind,
                legs: vec![
                    ArbLeg {
                        market_id: rel.a.clone(),
                        question: ma.question.clone(),
                        action: action_a,
                    },
                    ArbLeg {
                        market_id: rel.b.clone(),
                        question: mb.question.clone(),
                        action: action_b,
                    },
                ],
                expected_edge: edge,
                urgency,
                detected_at_ms: now_ms,
            });
        }

        found
    }
}

fn significant_words(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

fn normalized(question: &str) -> String {
    significant_words(question).join(" ")
}

fn has_win_marker(words: &[String]) -> bool {
    words.iter().any(|w| WIN_MARKERS.contains(&w.as_str()))
}

/// Text heuristics for pair relationships.
fn detect_relation(qa: &str, qb: &str) -> Option<RelationKind> {
    let na = normalized(qa);
    let nb = normalized(qb);
    if na == nb {
        return None; // Same market text; nothing to relate.
    }

    // Yes/No variants: identical once an explicit yes/no token is stripped.
    let strip = |s: &str| {
        s.split_whitespace()
            .filter(|w| *w != "yes" && *w != "no" && *w != "not")
            .collect::<Vec<_>>()
            .join(" ")
    };
    if strip(&na) == strip(&nb) {
        return Some(RelationKind::Inverse);
    }

    // "by N" / "before DATE" variants of the same stem. Checked ahead of the
    // winner heuristic: threshold variants usually share win markers too.
    for marker in ["by", "before"] {
        if let (Some((stem_a, tail_a)), Some((stem_b, tail_b))) =
            (split_on_marker(qa, marker), split_on_marker(qb, marker))
        {
            if normalized(&stem_a) == normalized(&stem_b) && tail_a != tail_b {
                return Some(RelationKind::Subset);
            }
        }
    }

    // "A wins" vs "B wins" with shared context words.
    let wa = significant_words(qa);
    let wb = significant_words(qb);
    if has_win_marker(&wa) && has_win_marker(&wb) {
        let shared = wa
            .iter()
            .filter(|w| !WIN_MARKERS.contains(&w.as_str()) && wb.contains(w))
            .count();
        if shared >= 1 {
            return Some(RelationKind::MutuallyExclusive);
        }
    }

    None
}

fn split_on_marker(question: &str, marker: &str) -> Option<(String, String)> {
    let lower = question.to_lowercase();
    let needle = format!(" {marker} ");
    lower
        .find(&needle)
        .map(|idx| (lower[..idx].to_string(), lower[idx + needle.len()..].to_string()))
}

/// Is `qa` the subset leg (the stricter claim) of the pair?
/// Larger "by N" thresholds and earlier "before" dates are stricter.
fn subset_ordered(qa: &str, qb: &str) -> bool {
    let number = |q: &str, marker: &str| {
        split_on_marker(q, marker).and_then(|(_, tail)| {
            tail.split(|c: char| !c.is_numeric())
                .find(|s| !s.is_empty())
                .and_then(|s| s.parse::<i64>().ok())
        })
    };
    if let (Some(a), Some(b)) = (number(qa, "by"), number(qb, "by")) {
        return a >= b;
    }
    if let (Some(a), Some(b)) = (number(qa, "before"), number(qb, "before")) {
        return a <= b;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutually_exclusive_winners_detected_and_priced() {
        let mut det = ArbitrageDetector::new(ArbConfig::default());
        det.update_market("M1", "Team A wins the final", 0.60);
        det.update_market("M2", "Team B wins the final", 0.55);
        assert_eq!(det.relationship_count(), 1);

        let opportunities = det.check_all(0);
        assert_eq!(opportunities.len(), 1);
        let opp = &opportunities[0];
        assert_eq!(opp.kind, RelationKind::MutuallyExclusive);
        assert!((opp.expected_edge - 0.15).abs() < 1e-9);
        assert!(opp.legs.iter().all(|l| l.action == ArbAction::BuyNo));
        assert_eq!(opp.urgency, EdgeUrgency::Immediate);
    }

    #[test]
    fn within_tolerance_is_not_an_opportunity() {
        let mut det = ArbitrageDetector::new(ArbConfig::default());
        det.update_market("M1", "Team A wins the final", 0.55);
        det.update_market("M2", "Team B wins the final", 0.46);
        // Sum 1.01 ≤ 1 + 0.02 tolerance.
        assert!(det.check_all(0).is_empty());
    }

    #[test]
    fn inverse_pair_sums_to_one() {
        let mut det = ArbitrageDetector::new(ArbConfig::default());
        det.update_market("Y", "Will the bill pass? Yes", 0.58);
        det.update_market("N", "Will the bill pass? No", 0.49);
        assert_eq!(det.relationship_count(), 1);

        let opportunities = det.check_all(0);
        assert_eq!(opportunities.len(), 1);
        let opp = &opportunities[0];
        assert_eq!(opp.kind, RelationKind::Inverse);
        assert!((opp.expected_edge - 0.07).abs() < 1e-9);
        assert!(opp.legs.iter().all(|l| l.action == ArbAction::BuyNo));
    }

    #[test]
    fn subset_requires_monotone_prices() {
        let mut det = ArbitrageDetector::new(ArbConfig::default());
        det.update_market("BY20", "Team A wins by 20 points", 0.30);
        det.update_market("BY50", "Team A wins by 50 points", 0.40);
        // Some pairs may also read as mutually exclusive; subset must exist.
        let subset_rel = det
            .relationships
            .iter()
            .find(|r| r.kind == RelationKind::Subset)
            .expect("subset relationship");
        // "by 50" is the stricter leg.
        assert_eq!(subset_rel.a, "BY50");

        let opportunities = det.check_all(0);
        let opp = opportunities
            .iter()
            .find(|o| o.kind == RelationKind::Subset)
            .expect("subset violation");
        assert!((opp.expected_edge - 0.10).abs() < 1e-9);
    }

    #[test]
    fn correlated_relationship_from_playbook() {
        let mut det = ArbitrageDetector::new(ArbConfig::default());
        det.update_market("A", "Oil above 90 in June", 0.40);
        det.update_market("B", "Airline stocks drop in June", 0.20);
        det.add_relationship(MarketRelationship {
            a: "A".to_string(),
            b: "B".to_string(),
            kind: RelationKind::Correlated,
            target: 0.8,
            tolerance: 0.02,
        });

        let opportunities = det.check_all(0);
        assert_eq!(opportunities.len(), 1);
        // |0.20 − 0.8·0.40| = 0.12.
        assert!((opportunities[0].expected_edge - 0.12).abs() < 1e-9);
    }

    #[test]
    fn pair_dedupe_suppresses_for_five_minutes() {
        let mut det = ArbitrageDetector::new(ArbConfig::default());
        det.update_market("M1", "Team A wins the final", 0.60);
        det.update_market("M2", "Team B wins the final", 0.55);

        assert_eq!(det.check_all(0).len(), 1);
        assert!(det.check_all(60_000).is_empty());
        assert_eq!(det.check_all(301_000).len(), 1);
    }
}
