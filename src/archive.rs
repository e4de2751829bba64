//! Optional SQLite trade archive.
//!
//! Append-only sink: archived trades with deterministic ids, per-minute
//! market snapshots, and a deferred impact-computation job queue with a
//! three-try retry budget. Not required for core correctness; archive
//! errors are logged by callers and never propagate into the pipeline.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::whales::VenueTrade;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

impl JobStatus {
    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImpactJob {
    pub id: i64,
    pub trade_id: String,
    pub tries: u32,
    pub run_at_ts: i64,
}

pub const JOB_RETRY_BUDGET: u32 = 3;

pub struct TradeArchive {
    conn: Mutex<Connection>,
}

impl TradeArchive {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open trade archive at {path}"))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS archived_trades (
                trade_id TEXT PRIMARY KEY,
                venue TEXT NOT NULL,
                market_id TEXT NOT NULL,
                trader_id TEXT NOT NULL,
                side TEXT NOT NULL,
                outcome TEXT NOT NULL,
                price_cents INTEGER NOT NULL,
                size REAL NOT NULL,
                notional_cents INTEGER NOT NULL,
                mid_at_trade_cents INTEGER,
                impact_cents INTEGER,
                ts INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_market_ts
                ON archived_trades(market_id, ts);
            CREATE TABLE IF NOT EXISTS market_snapshots (
                market_id TEXT NOT NULL,
                minute_ts INTEGER NOT NULL,
                mid_cents INTEGER NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (market_id, minute_ts)
            );
            CREATE TABLE IF NOT EXISTS impact_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trade_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                tries INTEGER NOT NULL DEFAULT 0,
                run_at_ts INTEGER NOT NULL
            );",
        )
        .context("create archive schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Deterministic trade id: marketId-addrPrefix-ts-seq.
    pub fn trade_id(market_id: &str, trader: &str, ts_ms: i64, seq: u32) -> String {
        let prefix: String = trader.chars().take(10).collect();
        format!("{market_id}-{prefix}-{ts_ms}-{seq}")
    }

    /// Append one trade (buyer side perspective) and enqueue its impact job.
    pub fn archive_trade(
        &self,
        trade: &VenueTrade,
        mid_at_trade: Option<f64>,
        seq: u32,
    ) -> Result<String> {
        let trade_id = Self::trade_id(&trade.market_id, &trade.buyer, trade.timestamp_ms, seq);
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO archived_trades
             (trade_id, venue, market_id, trader_id, side, outcome, price_cents,
              size, notional_cents, mid_at_trade_cents, ts)
             VALUES (?1, 'polymarket', ?2, ?3, 'BUY', ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                trade_id,
                trade.market_id,
                trade.buyer,
                trade.outcome.as_str(),
                (trade.price * 100.0).round() as i64,
                trade.shares,
                (trade.notional_usdc() * 100.0).round() as i64,
                mid_at_trade.map(|m| (m * 100.0).round() as i64),
                trade.timestamp_ms,
            ],
        )
        .context("insert archived trade")?;
        conn.execute(
            "INSERT INTO impact_jobs (trade_id, status, tries, run_at_ts)
             VALUES (?1, 'pending', 0, ?2)",
            params![trade_id, trade.timestamp_ms + 60_000],
        )
        .context("enqueue impact job")?;
        Ok(trade_id)
    }

    pub fn record_snapshot(
        &self,
        market_id: &str,
        minute_ts: i64,
        mid: f64,
        volume: f64,
    ) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO market_snapshots
                 (market_id, minute_ts, mid_cents, volume) VALUES (?1, ?2, ?3, ?4)",
                params![market_id, minute_ts, (mid * 100.0).round() as i64, volume],
            )
            .context("record market snapshot")?;
        Ok(())
    }

    /// Next pending job whose run time has passed.
    pub fn next_due_job(&self, now_ms: i64) -> Result<Option<ImpactJob>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, trade_id, tries, run_at_ts FROM impact_jobs
                 WHERE status = 'pending' AND run_at_ts <= ?1
                 ORDER BY run_at_ts LIMIT 1",
            )
            .context("prepare job query")?;
        let job = stmt
            .query_row(params![now_ms], |row| {
                Ok(ImpactJob {
                    id: row.get(0)?,
                    trade_id: row.get(1)?,
                    tries: row.get(2)?,
                    run_at_ts: row.get(3)?,
                })
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("query due job")?;
        Ok(job)
    }

    /// Market and entry-price context for an impact job's trade.
    pub fn job_trade(&self, trade_id: &str) -> Result<Option<(String, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT market_id, price_cents FROM archived_trades WHERE trade_id = ?1")
            .context("prepare trade lookup")?;
        stmt.query_row(params![trade_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("lookup archived trade")
    }

    /// Store the computed price impact (mid move since the fill) for a trade.
    pub fn record_impact(&self, trade_id: &str, impact_cents: i64) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "UPDATE archived_trades SET impact_cents = ?1 WHERE trade_id = ?2",
                params![impact_cents, trade_id],
            )
            .context("record trade impact")?;
        Ok(())
    }

    pub fn impact_for(&self, trade_id: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT impact_cents FROM archived_trades WHERE trade_id = ?1",
            params![trade_id],
            |row| row.get(0),
        )
        .context("read trade impact")
    }

    pub fn complete_job(&self, job_id: i64) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "UPDATE impact_jobs SET status = 'done' WHERE id = ?1",
                params![job_id],
            )
            .context("complete job")?;
        Ok(())
    }

    /// Bump tries and reschedule; past the retry budget the job is failed.
    pub fn retry_job(&self, job: &ImpactJob, now_ms: i64) -> Result<JobStatus> {
        let tries = job.tries + 1;
        let status = if tries >= JOB_RETRY_BUDGET {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };
        self.conn
            .lock()
            .execute(
                "UPDATE impact_jobs SET status = ?1, tries = ?2, run_at_ts = ?3 WHERE id = ?4",
                params![status.as_str(), tries, now_ms + 60_000, job.id],
            )
            .context("retry job")?;
        Ok(status)
    }

    pub fn archived_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM archived_trades", [], |row| row.get(0))
            .context("count archived trades")
    }
}
