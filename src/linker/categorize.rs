//! Market categorisation rules.
//!
//! A fixed ordered rule list maps a market's question/description to a
//! `TruthMap`. First matching rule wins; unmatched markets stay untracked.
//! The keyword tables are externalized configuration: they load from a TOML
//! file when `KEYWORDS_PATH` is set, otherwise the compiled-in defaults
//! below apply.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Topic bucket a tracked market belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCategory {
    GovernmentShutdown,
    Legislation,
    FedRate,
    Hurricane,
    Weather,
    SportsPlayer,
    SportsOutcome,
    Other,
}

impl MarketCategory {
    pub fn from_str(s: &str) -> MarketCategory {
        match s {
            "government_shutdown" => MarketCategory::GovernmentShutdown,
            "legislation" => MarketCategory::Legislation,
            "fed_rate" => MarketCategory::FedRate,
            "hurricane" => MarketCategory::Hurricane,
            "weather" => MarketCategory::Weather,
            "sports_player" => MarketCategory::SportsPlayer,
            "sports_outcome" => MarketCategory::SportsOutcome,
            _ => MarketCategory::Other,
        }
    }
}

/// The tag assigned to a tracked market at categorisation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthMap {
    pub category: MarketCategory,
    pub truth_sources: Vec<String>,
    pub keywords: Vec<String>,
    pub bill_patterns: Vec<String>,
}

/// One ordered categorisation rule with pre-compiled bill regexes.
pub struct CategoryRule {
    pub category: MarketCategory,
    pub truth_sources: Vec<String>,
    pub keywords: Vec<String>,
    pub bill_regexes: Vec<Regex>,
    bill_patterns: Vec<String>,
}

impl CategoryRule {
    fn new(
        category: MarketCategory,
        truth_sources: &[&str],
        keywords: &[&str],
        bill_patterns: &[&str],
    ) -> Self {
        Self {
            category,
            truth_sources: truth_sources.iter().map(|s| s.to_string()).collect(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            bill_regexes: bill_patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            bill_patterns: bill_patterns.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords.iter().any(|k| keyword_matches(&lower, k))
            || self.bill_regexes.iter().any(|r| r.is_match(text))
    }

    pub fn truth_map(&self) -> TruthMap {
        TruthMap {
            category: self.category,
            truth_sources: self.truth_sources.clone(),
            keywords: self.keywords.clone(),
            bill_patterns: self.bill_patterns.clone(),
        }
    }
}

/// Case-insensitive keyword matching: whole-word for single-word keywords,
/// substring for multi-word phrases. `text` must already be lowercased.
pub fn keyword_matches(text: &str, keyword: &str) -> bool {
    let keyword = keyword.to_lowercase();
    if keyword.contains(' ') {
        return text.contains(&keyword);
    }
    let mut start = 0;
    while let Some(pos) = text[start..].find(&keyword) {
        let abs = start + pos;
        let end = abs + keyword.len();
        let before_ok = abs == 0
            || !text[..abs]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after_ok = end >= text.len()
            || !text[end..].chars().next().is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = end;
    }
    false
}

/// Count how many of `keywords` appear in `text` (already lowercased).
pub fn keyword_hits(text: &str, keywords: &[String]) -> usize {
    keywords.iter().filter(|k| keyword_matches(text, k)).count()
}

/// The compiled-in default rule table, in match priority order.
pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            MarketCategory::GovernmentShutdown,
            &["congress"],
            &["government shutdown", "shutdown", "appropriations lapse", "government funding"],
            &[r"(?i)continuing appropriations", r"(?i)appropriations act"],
        ),
        CategoryRule::new(
            MarketCategory::Legislation,
            &["congress"],
            &["bill", "legislation", "congress", "senate", "signed into law", "veto"],
            &[r"(?i)h\.?\s?r\.?\s?\d+", r"(?i)\bs\.\s?\d+"],
        ),
        CategoryRule::new(
            MarketCategory::FedRate,
            &["fed"],
            &["fed", "fomc", "federal reserve", "interest rate", "rate cut", "rate hike", "basis points"],
            &[],
        ),
        CategoryRule::new(
            MarketCategory::Hurricane,
            &["weather"],
            &["hurricane", "tropical storm", "cyclone", "landfall"],
            &[],
        ),
        CategoryRule::new(
            MarketCategory::Weather,
            &["weather"],
            &["temperature", "snowfall", "rainfall", "tornado", "heat wave", "blizzard"],
            &[],
        ),
        CategoryRule::new(
            MarketCategory::SportsPlayer,
            &["sports"],
            &["points", "rebounds", "assists", "touchdowns", "passing yards", "rushing yards", "home run"],
            &[],
        ),
        CategoryRule::new(
            MarketCategory::SportsOutcome,
            &["sports"],
            &["win", "wins", "beat", "defeat", "championship", "playoffs", "super bowl", "finals", "world series"],
            &[],
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    category: String,
    #[serde(default)]
    truth_sources: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    bill_patterns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rule: Vec<RuleSpec>,
}

/// Load the rule table from a TOML file (`[[rule]]` entries, priority order).
pub fn load_rules(path: &str) -> Result<Vec<CategoryRule>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read keyword tables from {path}"))?;
    let file: RuleFile = toml::from_str(&raw).context("parse keyword tables")?;

    Ok(file
        .rule
        .into_iter()
        .map(|spec| {
            let bill_regexes = spec
                .bill_patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect();
            CategoryRule {
                category: MarketCategory::from_str(&spec.category),
                truth_sources: spec.truth_sources,
                keywords: spec.keywords,
                bill_regexes,
                bill_patterns: spec.bill_patterns,
            }
        })
        .collect())
}

/// Categorise a market question/description against the rule table.
pub fn categorize(rules: &[CategoryRule], text: &str) -> Option<TruthMap> {
    rules
        .iter()
        .find(|rule| rule.matches(text))
        .map(|rule| rule.truth_map())
}
