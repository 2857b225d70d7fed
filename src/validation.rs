//! Pre-flight validation
//!
//! Runs a readiness suite before trading starts and aggregates findings into
//! operator-facing recommendations ("bridge not running", "outside optimal
//! session") instead of raw errors.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::{Database, TradingJournal};
use crate::gateway::BrokerGateway;

/// Validation result with detailed findings
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub passed: bool,
    pub checks: Vec<ValidationCheck>,
}

#[derive(Debug, Clone)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub level: ValidationLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Critical, // Must pass for trading to proceed
    Warning,  // Should pass, but trading can continue
    Info,     // Informational only
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult {
            passed: true,
            checks: Vec::new(),
        }
    }

    pub fn add_check(&mut self, check: ValidationCheck) {
        if !check.passed && check.level == ValidationLevel::Critical {
            self.passed = false;
        }
        self.checks.push(check);
    }

    pub fn critical_failures(&self) -> Vec<&ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.level == ValidationLevel::Critical)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.level == ValidationLevel::Warning)
            .collect()
    }

    /// Operator-facing summary of what to fix, one line per finding
    pub fn recommendations(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.message.clone())
            .collect()
    }

    pub fn display(&self) {
        info!("🔍 Pre-flight Validation");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        for check in &self.checks {
            let icon = if check.passed {
                "✅"
            } else {
                match check.level {
                    ValidationLevel::Critical => "❌",
                    ValidationLevel::Warning => "⚠️",
                    ValidationLevel::Info => "ℹ️",
                }
            };

            info!("{} {} - {}", icon, check.name, check.message);
        }

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if !self.passed {
            let failures = self.critical_failures();
            error!("❌ Validation failed: {} critical issue(s)", failures.len());
            for failure in failures {
                error!("   • {}: {}", failure.name, failure.message);
            }
        } else {
            let warnings = self.warnings();
            if !warnings.is_empty() {
                warn!("⚠️  {} warning(s) detected", warnings.len());
                for warning in warnings {
                    warn!("   • {}: {}", warning.name, warning.message);
                }
            }
            info!("✅ All critical checks passed");
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-flight validator for the trading session
pub struct PreFlightValidator {
    config: Config,
    gateway: Arc<dyn BrokerGateway>,
    db: Arc<Database>,
    journal: Arc<TradingJournal>,
}

impl PreFlightValidator {
    pub fn new(
        config: Config,
        gateway: Arc<dyn BrokerGateway>,
        db: Arc<Database>,
        journal: Arc<TradingJournal>,
    ) -> Self {
        PreFlightValidator {
            config,
            gateway,
            db,
            journal,
        }
    }

    /// Run the full readiness suite
    pub async fn validate_all(&self, now: DateTime<Utc>) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.add_check(self.check_config());
        result.add_check(self.check_database());
        result.add_check(self.check_bridge().await);
        result.add_check(self.check_session(now));
        result.add_check(self.check_daily_loss(now).await);

        result
    }

    fn check_config(&self) -> ValidationCheck {
        match self.config.validate() {
            Ok(()) => ValidationCheck {
                name: "Configuration".to_string(),
                passed: true,
                message: "configuration is valid".to_string(),
                level: ValidationLevel::Critical,
            },
            Err(e) => ValidationCheck {
                name: "Configuration".to_string(),
                passed: false,
                message: format!("configuration invalid: {e}"),
                level: ValidationLevel::Critical,
            },
        }
    }

    fn check_database(&self) -> ValidationCheck {
        match self.db.health_check() {
            Ok(true) => ValidationCheck {
                name: "Database".to_string(),
                passed: true,
                message: "database is reachable".to_string(),
                level: ValidationLevel::Critical,
            },
            _ => ValidationCheck {
                name: "Database".to_string(),
                passed: false,
                message: "database health check failed".to_string(),
                level: ValidationLevel::Critical,
            },
        }
    }

    async fn check_bridge(&self) -> ValidationCheck {
        if !self.gateway.is_connected().await {
            return ValidationCheck {
                name: "Bridge".to_string(),
                passed: false,
                message: "bridge not running".to_string(),
                level: ValidationLevel::Critical,
            };
        }
        match self.gateway.account_info().await {
            Some(account) => ValidationCheck {
                name: "Bridge".to_string(),
                passed: true,
                message: format!(
                    "connected, balance {:.2} {}",
                    account.balance, account.currency
                ),
                level: ValidationLevel::Critical,
            },
            None => ValidationCheck {
                name: "Bridge".to_string(),
                passed: false,
                message: "bridge connected but account info unavailable".to_string(),
                level: ValidationLevel::Critical,
            },
        }
    }

    fn check_session(&self, now: DateTime<Utc>) -> ValidationCheck {
        let optimal = self.config.signals.optimal_hours_utc.contains(&now.hour());
        ValidationCheck {
            name: "Session".to_string(),
            passed: optimal,
            message: if optimal {
                format!("{:02}:00 UTC is inside the optimal session", now.hour())
            } else {
                "outside optimal session".to_string()
            },
            level: ValidationLevel::Warning,
        }
    }

    async fn check_daily_loss(&self, now: DateTime<Utc>) -> ValidationCheck {
        let day_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .unwrap();
        let realized = match self.journal.realized_pnl_since(day_start) {
            Ok(pnl) => pnl,
            Err(e) => {
                return ValidationCheck {
                    name: "Daily loss".to_string(),
                    passed: false,
                    message: format!("could not read journal: {e}"),
                    level: ValidationLevel::Warning,
                };
            }
        };

        let balance = self
            .gateway
            .account_info()
            .await
            .map(|a| a.balance)
            .unwrap_or(0.0);
        let limit = balance * self.config.risk.max_daily_loss_pct / 100.0;

        if realized < 0.0 && limit > 0.0 && realized.abs() > limit {
            ValidationCheck {
                name: "Daily loss".to_string(),
                passed: false,
                message: "daily loss limit exceeded".to_string(),
                level: ValidationLevel::Critical,
            }
        } else {
            ValidationCheck {
                name: "Daily loss".to_string(),
                passed: true,
                message: format!("realized today {:.2}, limit {:.2}", realized, limit),
                level: ValidationLevel::Info,
            }
        }
    }
}
