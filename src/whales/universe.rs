//! Whale universe: who qualifies as tracked, and at what tier.
//!
//! Rebuilt hourly from `WalletStats`. Qualification is purely trade-derived;
//! display names and leaderboard ranks are enrichment only and never affect
//! membership. Bootstrap addresses supplied externally stay at the `Tracked`
//! tier until their own trade data qualifies them.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::env_parse;
use crate::whales::trade_store::WalletStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhaleTier {
    Top10,
    Top50,
    Tracked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Whale {
    pub address: String,
    pub display_name: Option<String>,
    pub pnl_7d: f64,
    pub pnl_30d: f64,
    pub volume_7d: f64,
    pub volume_30d: f64,
    pub trade_count_7d: u64,
    pub trade_count_30d: u64,
    pub early_entry_score: f64,
    pub copy_suitability: f64,
    pub tier: WhaleTier,
    pub last_seen_ms: i64,
}

#[derive(Debug, Clone)]
pub struct UniverseConfig {
    pub min_volume_usd: f64,
    pub min_trade_count: u64,
    pub top_n: usize,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            min_volume_usd: 10_000.0,
            min_trade_count: 10,
            top_n: 50,
        }
    }
}

impl UniverseConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_volume_usd: env_parse("WHALE_MIN_VOLUME", d.min_volume_usd),
            min_trade_count: env_parse("WHALE_MIN_TRADES", d.min_trade_count),
            top_n: d.top_n,
        }
    }
}

/// Copy-suitability in [0, 100]: how mechanically copyable this wallet's
/// flow is for a follower. Fixed linear combination over the 30-day stats;
/// each term is symmetric (bonus above the bar, penalty below).
pub fn copy_suitability(stats: &WalletStats) -> f64 {
    let mut score: f64 = 50.0;

    // Long holds survive copy latency; scalps don't.
    score += if stats.avg_hold_hours >= 24.0 { 12.0 } else { -12.0 };
    // Liquid markets mean a follower can actually get filled.
    score += if stats.avg_market_volume >= 50_000.0 {
        10.0
    } else {
        -10.0
    };
    // Consistency: volatility small relative to realized edge.
    let consistent = stats.pnl > 0.0 && stats.pnl_volatility <= stats.pnl.abs() / 2.0;
    score += if consistent { 10.0 } else { -10.0 };
    // Taker flow is replayable at market; resting maker fills are not.
    score += if stats.maker_ratio <= 0.5 { 8.0 } else { -8.0 };
    score += if stats.win_rate >= 0.55 { 12.0 } else { -12.0 };
    score += if stats.early_entry_score >= 60.0 {
        8.0
    } else {
        -8.0
    };

    score.clamp(0.0, 100.0)
}

pub struct WhaleUniverse {
    config: UniverseConfig,
    whales: HashMap<String, Whale>,
    bootstrap: HashMap<String, Option<String>>,
}

impl WhaleUniverse {
    pub fn new(config: UniverseConfig) -> Self {
        Self {
            config,
            whales: HashMap::new(),
            bootstrap: HashMap::new(),
        }
    }

    /// Externally supplied address (leaderboard scrape, operator list).
    /// Enters at `Tracked` tier until trade data qualifies it.
    pub fn add_bootstrap(&mut self, address: &str, display_name: Option<String>) {
        self.bootstrap.insert(address.to_lowercase(), display_name);
    }

    pub fn is_tracked(&self, address: &str) -> bool {
        self.whales.contains_key(&address.to_lowercase())
    }

    pub fn get(&self, address: &str) -> Option<&Whale> {
        self.whales.get(&address.to_lowercase())
    }

    pub fn all(&self) -> Vec<Whale> {
        self.whales.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.whales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.whales.is_empty()
    }

    /// Recompute membership and tiers from per-wallet stats.
    /// `stats` maps wallet → (7-day stats, 30-day stats).
    pub fn rebuild(&mut self, stats: &HashMap<String, (WalletStats, WalletStats)>, now_ms: i64) {
        // Qualification minima first, then the two rankings.
        let mut qualified: Vec<(&String, &(WalletStats, WalletStats))> = stats
            .iter()
            .filter(|(_, (s7, s30))| {
                let volume_score = s7.volume.max(s30.volume / 4.0);
                let trades = s7.trade_count.max(s30.trade_count);
                volume_score >= self.config.min_volume_usd
                    && trades >= self.config.min_trade_count
            })
            .collect();

        let volume_key = |s7: &WalletStats, s30: &WalletStats| s7.volume.max(s30.volume / 4.0);
        let pnl_key = |s7: &WalletStats, s30: &WalletStats| s7.pnl.max(s30.pnl / 4.0);

        qualified.sort_by(|a, b| {
            volume_key(&b.1 .0, &b.1 .1)
                .partial_cmp(&volume_key(&a.1 .0, &a.1 .1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let volume_rank: HashMap<&str, usize> = qualified
            .iter()
            .take(self.config.top_n)
            .enumerate()
            .map(|(i, (addr, _))| (addr.as_str(), i))
            .collect();

        qualified.sort_by(|a, b| {
            pnl_key(&b.1 .0, &b.1 .1)
                .partial_cmp(&pnl_key(&a.1 .0, &a.1 .1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let pnl_rank: HashMap<&str, usize> = qualified
            .iter()
            .take(self.config.top_n)
            .enumerate()
            .map(|(i, (addr, _))| (addr.as_str(), i))
            .collect();

        let members: HashSet<&str> = volume_rank
            .keys()
            .chain(pnl_rank.keys())
            .copied()
            .collect();

        let mut next: HashMap<String, Whale> = HashMap::with_capacity(members.len());
        for addr in members {
            let (s7, s30) = &stats[addr];
            let v_rank = volume_rank.get(addr).copied();
            let p_rank = pnl_rank.get(addr).copied();
            let top10 = matches!((v_rank, p_rank), (Some(v), Some(p)) if v < 10 && p < 10)
                || v_rank.is_some_and(|r| r < 5)
                || p_rank.is_some_and(|r| r < 5);
            let tier = if top10 {
                WhaleTier::Top10
            } else {
                WhaleTier::Top50
            };

            // Addresses are case-normalized so lookups never miss on
            // checksummed input.
            let key = addr.to_lowercase();
            let display_name = self
                .bootstrap
                .get(&key)
                .cloned()
                .flatten()
                .or_else(|| self.whales.get(&key).and_then(|w| w.display_name.clone()));

            next.insert(
                key.clone(),
                Whale {
                    address: key,
                    display_name,
                    pnl_7d: s7.pnl,
                    pnl_30d: s30.pnl,
                    volume_7d: s7.volume,
                    volume_30d: s30.volume,
                    trade_count_7d: s7.trade_count,
                    trade_count_30d: s30.trade_count,
                    early_entry_score: s30.early_entry_score,
                    copy_suitability: copy_suitability(s30),
                    tier,
                    last_seen_ms: now_ms,
                },
            );
        }

        // Bootstrap addresses that did not qualify stay visible as Tracked.
        for (addr, name) in &self.bootstrap {
            next.entry(addr.clone()).or_insert_with(|| Whale {
                address: addr.clone(),
                display_name: name.clone(),
                pnl_7d: 0.0,
                pnl_30d: 0.0,
                volume_7d: 0.0,
                volume_30d: 0.0,
                trade_count_7d: 0,
                trade_count_30d: 0,
                early_entry_score: 50.0,
                copy_suitability: 50.0,
                tier: WhaleTier::Tracked,
                last_seen_ms: now_ms,
            });
        }

        info!(
            "🐋 universe rebuilt: {} tracked ({} from bootstrap)",
            next.len(),
            self.bootstrap.len()
        );
        self.whales = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(volume: f64, pnl: f64, trades: u64) -> WalletStats {
        WalletStats {
            volume,
            pnl,
            trade_count: trades,
            ..WalletStats::default()
        }
    }

    fn build(entries: &[(&str, f64, f64, u64)]) -> WhaleUniverse {
        let mut universe = WhaleUniverse::new(UniverseConfig::default());
        let map: HashMap<String, (WalletStats, WalletStats)> = entries
            .iter()
            .map(|(addr, vol, pnl, n)| {
                (
                    addr.to_string(),
                    (stats(*vol, *pnl, *n), stats(*vol * 2.0, *pnl * 2.0, *n * 2)),
                )
            })
            .collect();
        universe.rebuild(&map, 0);
        universe
    }

    #[test]
    fn minima_gate_membership() {
        let universe = build(&[
            ("0xbig", 500_000.0, 40_000.0, 200),
            ("0xsmall", 2_000.0, 50_000.0, 200), // volume below $10k
            ("0xquiet", 500_000.0, 40_000.0, 4), // too few trades
        ]);
        assert!(universe.is_tracked("0xBIG"));
        assert!(!universe.is_tracked("0xsmall"));
        assert!(!universe.is_tracked("0xquiet"));
    }

    #[test]
    fn top5_of_either_ranking_is_top10() {
        // 0xpnl leads PnL but has modest volume; still Top10 via top-5 rule.
        let mut entries: Vec<(String, f64, f64, u64)> = (0..20)
            .map(|i| {
                (
                    format!("0xvol{i}"),
                    1_000_000.0 - i as f64 * 10_000.0,
                    1_000.0 + i as f64,
                    100,
                )
            })
            .collect();
        entries.push(("0xpnl".to_string(), 20_000.0, 900_000.0, 100));

        let mut universe = WhaleUniverse::new(UniverseConfig::default());
        let map: HashMap<String, (WalletStats, WalletStats)> = entries
            .iter()
            .map(|(addr, vol, pnl, n)| {
                (
                    addr.clone(),
                    (stats(*vol, *pnl, *n), stats(*vol, *pnl, *n)),
                )
            })
            .collect();
        universe.rebuild(&map, 0);

        assert_eq!(universe.get("0xpnl").unwrap().tier, WhaleTier::Top10);
        // Mid-pack volume wallet is in the universe but not Top10.
        assert_eq!(universe.get("0xvol15").unwrap().tier, WhaleTier::Top50);
    }

    #[test]
    fn bootstrap_stays_tracked_until_qualified() {
        let mut universe = WhaleUniverse::new(UniverseConfig::default());
        universe.add_bootstrap("0xSeed", Some("seed whale".to_string()));
        universe.rebuild(&HashMap::new(), 0);

        let whale = universe.get("0xseed").expect("bootstrap present");
        assert_eq!(whale.tier, WhaleTier::Tracked);
        assert_eq!(whale.display_name.as_deref(), Some("seed whale"));
    }

    #[test]
    fn copy_suitability_is_clamped_and_monotone() {
        let good = WalletStats {
            volume: 100_000.0,
            pnl: 50_000.0,
            trade_count: 100,
            avg_hold_hours: 48.0,
            avg_market_volume: 200_000.0,
            pnl_volatility: 1_000.0,
            maker_ratio: 0.2,
            win_rate: 0.7,
            early_entry_score: 80.0,
        };
        let bad = WalletStats {
            volume: 100_000.0,
            pnl: -5_000.0,
            trade_count: 100,
            avg_hold_hours: 0.2,
            avg_market_volume: 2_000.0,
            pnl_volatility: 50_000.0,
            maker_ratio: 0.9,
            win_rate: 0.3,
            early_entry_score: 20.0,
        };
        let hi = copy_suitability(&good);
        let lo = copy_suitability(&bad);
        assert!(hi > lo);
        assert!((0.0..=100.0).contains(&hi));
        assert!((0.0..=100.0).contains(&lo));
        assert_eq!(lo, 0.0);
    }
}
