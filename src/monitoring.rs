// Runtime monitoring
//
// Read-only observability over the account and open positions. The monitor
// never places, modifies or closes anything; it surfaces margin health and
// records anomalies into a bounded in-memory ring plus the anomalies table.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{error, info, warn};

use crate::db::{Database, TradingJournal};
use crate::gateway::BrokerGateway;
use crate::types::AccountInfo;

const DEFAULT_ANOMALY_HISTORY: usize = 200;
const MONITOR_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyLevel {
    Info,
    Warning,
    Critical,
}

impl AnomalyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyLevel::Info => "INFO",
            AnomalyLevel::Warning => "WARNING",
            AnomalyLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    pub level: AnomalyLevel,
    pub message: String,
    pub context: String,
}

/// Margin health tiers from the margin level (equity / margin x 100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginHealth {
    Healthy,
    Strained,
    Critical,
    NoExposure,
}

pub fn margin_health(account: &AccountInfo) -> MarginHealth {
    if account.margin <= 0.0 {
        return MarginHealth::NoExposure;
    }
    let level = account.equity / account.margin * 100.0;
    if level >= 200.0 {
        MarginHealth::Healthy
    } else if level >= 120.0 {
        MarginHealth::Strained
    } else {
        MarginHealth::Critical
    }
}

/// Snapshot handed to status surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub timestamp: DateTime<Utc>,
    pub account: Option<AccountInfo>,
    pub margin_health: Option<MarginHealth>,
    pub open_positions: usize,
    pub floating_pnl: f64,
    pub realized_pnl_today: f64,
    pub recent_anomalies: Vec<Anomaly>,
}

pub struct TradingMonitor {
    gateway: Arc<dyn BrokerGateway>,
    journal: Arc<TradingJournal>,
    db: Arc<Database>,
    anomalies: Mutex<VecDeque<Anomaly>>,
    max_history: usize,
}

impl TradingMonitor {
    pub fn new(gateway: Arc<dyn BrokerGateway>, journal: Arc<TradingJournal>, db: Arc<Database>) -> Self {
        Self {
            gateway,
            journal,
            db,
            anomalies: Mutex::new(VecDeque::new()),
            max_history: DEFAULT_ANOMALY_HISTORY,
        }
    }

    /// Observe forever at a fixed cadence
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(MONITOR_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            self.tick(Utc::now()).await;
        }
    }

    /// One observation pass
    pub async fn tick(&self, now: DateTime<Utc>) {
        let account = self.gateway.account_info().await;

        match &account {
            Some(account) => match margin_health(account) {
                MarginHealth::Critical => {
                    self.record(
                        AnomalyLevel::Critical,
                        "margin level critically low".to_string(),
                        format!("equity {:.2}, margin {:.2}", account.equity, account.margin),
                        now,
                    );
                }
                MarginHealth::Strained => {
                    self.record(
                        AnomalyLevel::Warning,
                        "margin level strained".to_string(),
                        format!("equity {:.2}, margin {:.2}", account.equity, account.margin),
                        now,
                    );
                }
                _ => {}
            },
            None => {
                self.record(
                    AnomalyLevel::Warning,
                    "account snapshot unavailable".to_string(),
                    "gateway returned no account info".to_string(),
                    now,
                );
            }
        }
    }

    /// Record an anomaly into the ring and the anomalies table
    pub fn record(&self, level: AnomalyLevel, message: String, context: String, now: DateTime<Utc>) {
        match level {
            AnomalyLevel::Critical => error!(%message, %context, "anomaly"),
            AnomalyLevel::Warning => warn!(%message, %context, "anomaly"),
            AnomalyLevel::Info => info!(%message, %context, "anomaly"),
        }

        let anomaly = Anomaly {
            timestamp: now,
            level,
            message,
            context,
        };

        {
            let mut ring = self.anomalies.lock().unwrap();
            if ring.len() >= self.max_history {
                ring.pop_front();
            }
            ring.push_back(anomaly.clone());
        }

        let conn = self.db.get_connection();
        let conn = conn.lock().unwrap();
        if let Err(e) = conn.execute(
            "INSERT INTO anomalies (level, message, context, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                anomaly.level.as_str(),
                anomaly.message,
                anomaly.context,
                anomaly.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        ) {
            warn!(error = %e, "failed to persist anomaly");
        }
    }

    pub fn recent_anomalies(&self, limit: usize) -> Vec<Anomaly> {
        let ring = self.anomalies.lock().unwrap();
        ring.iter().rev().take(limit).cloned().collect()
    }

    /// Build a status snapshot for display surfaces
    pub async fn report(&self, now: DateTime<Utc>) -> MonitoringReport {
        let account = self.gateway.account_info().await;
        let positions = self.gateway.positions().await;
        let floating_pnl: f64 = positions.iter().map(|p| p.profit).sum();

        let day_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .unwrap();
        let realized_pnl_today = self.journal.realized_pnl_since(day_start).unwrap_or(0.0);

        MonitoringReport {
            timestamp: now,
            margin_health: account.as_ref().map(margin_health),
            account,
            open_positions: positions.len(),
            floating_pnl,
            realized_pnl_today,
            recent_anomalies: self.recent_anomalies(10),
        }
    }
}
