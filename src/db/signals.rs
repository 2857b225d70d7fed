//! Signal store
//!
//! Persists candidate signals so they survive restarts and so external
//! sources can inject candidates for the processor to pick up. Status
//! transitions are one-way: EXECUTED and FAILED are terminal and a stored
//! signal is never moved out of them.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::types::{Direction, Signal, SignalStatus, Timeframe};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_COLUMNS: &str = "id, symbol, direction, confidence, entry_price, stop_loss,
        take_profit, timeframe, reasoning, source, status, created_at";

fn signal_from_row(row: &Row) -> SqlResult<Signal> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(11)?;
    Ok(Signal {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        symbol: row.get(1)?,
        direction: Direction::from_str(&row.get::<_, String>(2)?),
        confidence: row.get(3)?,
        entry_price: row.get(4)?,
        stop_loss: row.get(5)?,
        take_profit: row.get(6)?,
        timeframe: Timeframe::from_str(&row.get::<_, String>(7)?).unwrap_or(Timeframe::H1),
        reasoning: row.get(8)?,
        source: row.get(9)?,
        status: SignalStatus::from_str(&row.get::<_, String>(10)?),
        created_at: parse_ts(&created_at),
    })
}

pub struct SignalStore {
    conn: Arc<Mutex<Connection>>,
}

impl SignalStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn insert(&self, signal: &Signal) -> SqlResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO signals (
                id, symbol, direction, confidence, entry_price, stop_loss,
                take_profit, timeframe, reasoning, source, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                signal.id.to_string(),
                signal.symbol,
                signal.direction.as_str(),
                signal.confidence,
                signal.entry_price,
                signal.stop_loss,
                signal.take_profit,
                signal.timeframe.as_str(),
                signal.reasoning,
                signal.source,
                signal.status.as_str(),
                signal.created_at.format(TS_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> SqlResult<Option<Signal>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM signals WHERE id = ?1",
            SELECT_COLUMNS
        ))?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(signal_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Move a signal to a new status. Terminal signals stay put; returns
    /// whether anything changed.
    pub fn update_status(&self, id: Uuid, status: SignalStatus) -> SqlResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE signals SET status = ?1
             WHERE id = ?2 AND status NOT IN ('EXECUTED', 'FAILED')",
            params![status.as_str(), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Active signals at or above the confidence floor, strongest first
    pub fn active_candidates(&self, min_confidence: f64, limit: usize) -> SqlResult<Vec<Signal>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM signals
             WHERE status = 'ACTIVE' AND confidence >= ?1
             ORDER BY confidence DESC, created_at ASC
             LIMIT ?2",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![min_confidence, limit as i64], signal_from_row)?;
        rows.collect()
    }

    /// Expire active signals created before the cutoff; returns how many
    pub fn expire_older_than(&self, cutoff: DateTime<Utc>) -> SqlResult<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE signals SET status = 'EXPIRED'
             WHERE status = 'ACTIVE' AND created_at < ?1",
            params![cutoff.format(TS_FORMAT).to_string()],
        )
    }
}
