//! Trading journal
//!
//! Append-only record of every position's lifecycle. Entries are created at
//! order placement, completed at exit, and annotatable afterwards; nothing is
//! deleted except by an explicit clear. Statistics are derived on demand.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::types::{Direction, PositionStatus};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Option<i64>,
    pub ticket: u64,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub pnl: Option<f64>,
    pub reasoning: String,
    pub tags: String,
    pub status: PositionStatus,
    pub opened_at: String,
    pub closed_at: Option<String>,
}

impl JournalEntry {
    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(JournalEntry {
            id: Some(row.get(0)?),
            ticket: row.get::<_, i64>(1)? as u64,
            symbol: row.get(2)?,
            direction: Direction::from_str(&row.get::<_, String>(3)?),
            volume: row.get(4)?,
            entry_price: row.get(5)?,
            exit_price: row.get(6)?,
            stop_loss: row.get(7)?,
            take_profit: row.get(8)?,
            pnl: row.get(9)?,
            reasoning: row.get(10)?,
            tags: row.get(11)?,
            status: PositionStatus::from_str(&row.get::<_, String>(12)?),
            opened_at: row.get(13)?,
            closed_at: row.get(14)?,
        })
    }
}

const SELECT_COLUMNS: &str = "id, ticket, symbol, direction, volume, entry_price, exit_price,
        stop_loss, take_profit, pnl, reasoning, tags, status, opened_at, closed_at";

/// Aggregate performance derived from closed entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalStats {
    pub total_trades: i64,
    pub wins: i64,
    pub losses: i64,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub expectancy: f64,
    pub profit_factor: f64,
    pub best_win_streak: u32,
    pub worst_loss_streak: u32,
}

pub struct TradingJournal {
    conn: Arc<Mutex<Connection>>,
}

impl TradingJournal {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Record a freshly opened position
    #[allow(clippy::too_many_arguments)]
    pub fn record_entry(
        &self,
        ticket: u64,
        symbol: &str,
        direction: Direction,
        volume: f64,
        entry_price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        reasoning: &str,
    ) -> SqlResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO journal_entries (
                ticket, symbol, direction, volume, entry_price,
                stop_loss, take_profit, reasoning, status, opened_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'OPEN', ?9)",
            params![
                ticket as i64,
                symbol,
                direction.as_str(),
                volume,
                entry_price,
                stop_loss,
                take_profit,
                reasoning,
                fmt_ts(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Complete the open entry for a ticket at exit
    pub fn record_exit(&self, ticket: u64, exit_price: f64, pnl: f64) -> SqlResult<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE journal_entries
             SET exit_price = ?1, pnl = ?2, status = 'CLOSED', closed_at = ?3
             WHERE ticket = ?4 AND status = 'OPEN'",
            params![exit_price, pnl, fmt_ts(Utc::now()), ticket as i64],
        )
    }

    /// Attach analysis tags to an entry after the fact
    pub fn annotate(&self, ticket: u64, tags: &str) -> SqlResult<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE journal_entries SET tags = ?1 WHERE ticket = ?2",
            params![tags, ticket as i64],
        )
    }

    pub fn entry_for_ticket(&self, ticket: u64) -> SqlResult<Option<JournalEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM journal_entries WHERE ticket = ?1 ORDER BY id DESC LIMIT 1",
            SELECT_COLUMNS
        ))?;
        let mut rows = stmt.query(params![ticket as i64])?;
        match rows.next()? {
            Some(row) => Ok(Some(JournalEntry::from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn recent_entries(&self, limit: usize) -> SqlResult<Vec<JournalEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM journal_entries ORDER BY id DESC LIMIT ?1",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], JournalEntry::from_row)?;
        rows.collect()
    }

    /// Realized PnL over entries closed at or after `since`. Used by the
    /// order manager for the daily-loss cap; always read fresh, never cached.
    pub fn realized_pnl_since(&self, since: DateTime<Utc>) -> SqlResult<f64> {
        let conn = self.conn.lock().unwrap();
        let total: Option<f64> = conn.query_row(
            "SELECT SUM(pnl) FROM journal_entries
             WHERE status = 'CLOSED' AND closed_at >= ?1",
            params![fmt_ts(since)],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }

    /// Win rate, expectancy, profit factor and streaks over closed entries
    pub fn statistics(&self) -> SqlResult<JournalStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT pnl FROM journal_entries
             WHERE status = 'CLOSED' AND pnl IS NOT NULL
             ORDER BY closed_at ASC, id ASC",
        )?;
        let pnls: Vec<f64> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqlResult<Vec<f64>>>()?;

        let total_trades = pnls.len() as i64;
        let wins = pnls.iter().filter(|p| **p > 0.0).count() as i64;
        let losses = pnls.iter().filter(|p| **p < 0.0).count() as i64;

        let total_pnl: f64 = pnls.iter().sum();
        let win_sum: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
        let loss_sum: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();

        let win_rate = if total_trades > 0 {
            wins as f64 / total_trades as f64
        } else {
            0.0
        };
        let average_win = if wins > 0 { win_sum / wins as f64 } else { 0.0 };
        let average_loss = if losses > 0 { loss_sum / losses as f64 } else { 0.0 };
        let expectancy = win_rate * average_win - (1.0 - win_rate) * average_loss;
        let profit_factor = if loss_sum > 0.0 { win_sum / loss_sum } else { win_sum };

        let (mut best_streak, mut worst_streak) = (0u32, 0u32);
        let (mut current_wins, mut current_losses) = (0u32, 0u32);
        for pnl in &pnls {
            if *pnl > 0.0 {
                current_wins += 1;
                current_losses = 0;
            } else if *pnl < 0.0 {
                current_losses += 1;
                current_wins = 0;
            }
            best_streak = best_streak.max(current_wins);
            worst_streak = worst_streak.max(current_losses);
        }

        Ok(JournalStats {
            total_trades,
            wins,
            losses,
            win_rate,
            total_pnl,
            average_win,
            average_loss,
            expectancy,
            profit_factor,
            best_win_streak: best_streak,
            worst_loss_streak: worst_streak,
        })
    }

    /// Explicit journal clear, the only deletion path
    pub fn clear(&self) -> SqlResult<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM journal_entries", [])
    }
}
