// Configuration management for the forex trading assistant

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub base_url: String,
    pub login: String,
    pub password: String,
    pub server: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_risk_per_trade_pct: f64,  // % of balance risked per trade
    pub max_daily_loss_pct: f64,      // % of balance allowed as realized daily loss
    pub max_drawdown_pct: f64,        // % drawdown from peak before halting
    pub max_position_notional: f64,   // cap on one position's notional value
    pub max_portfolio_risk_pct: f64,  // (margin + required) / equity ceiling
    pub require_stop_loss: bool,
    pub require_take_profit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub killzones_enabled: bool,
    pub news_blackout_enabled: bool,
    pub news_feed_url: String,
    pub high_impact_blackout_minutes: i64,
    pub medium_impact_blackout_minutes: i64,
    pub news_cache_ttl_secs: u64,
    pub sentiment_enabled: bool,
    pub sentiment_floor: f64,
    pub max_spread_pips: f64,
    pub max_atr_pips: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub auto_execute: bool,
    pub min_confidence: f64,
    pub enabled_pairs: Vec<String>,
    pub enabled_timeframes: Vec<String>,
    pub poll_interval_secs: u64,
    pub min_tick_spacing_secs: u64,
    pub daily_quota: u32,
    pub batch_size: usize,
    pub optimal_hours_utc: Vec<u32>,       // hours where the threshold may relax
    pub optimal_confidence_discount: f64,  // subtracted from min_confidence, never added
    pub base_lot: f64,
    pub min_lot: f64,
    pub max_lot: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderRung {
    pub r_target: f64,
    pub close_pct: f64, // percentage of original volume
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialProfitConfig {
    pub monitor_interval_secs: u64,
    pub ladder: Vec<LadderRung>,
    pub trailing_enabled: bool,
    pub trailing_distance_r: f64, // trail the stop this many R behind price
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeConfig {
    pub enabled: bool,
    pub evaluate_interval_secs: u64,
    pub min_net_profit: f64,      // close both legs above this net profit
    pub strong_confidence: f64,   // directional confidence treated as "strong"
    pub weak_leg_ratio: f64,      // close weaker leg when stronger >= ratio x weaker
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub enable_signal_logging: bool,
    pub enable_filter_logging: bool,
    pub enable_lifecycle_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub risk: RiskConfig,
    pub filters: FilterConfig,
    pub signals: SignalConfig,
    pub partial_profit: PartialProfitConfig,
    pub hedge: HedgeConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig {
                base_url: "http://127.0.0.1:5001".to_string(),
                login: "".to_string(),
                password: "".to_string(),
                server: "".to_string(),
                request_timeout_secs: 5,
            },
            risk: RiskConfig {
                max_risk_per_trade_pct: 2.0,
                max_daily_loss_pct: 5.0,
                max_drawdown_pct: 15.0,
                max_position_notional: 100_000.0,
                max_portfolio_risk_pct: 30.0,
                require_stop_loss: true,
                require_take_profit: false,
            },
            filters: FilterConfig {
                killzones_enabled: true,
                news_blackout_enabled: true,
                news_feed_url: "https://nfs.faireconomy.media/ff_calendar_thisweek.json".to_string(),
                high_impact_blackout_minutes: 30,
                medium_impact_blackout_minutes: 15,
                news_cache_ttl_secs: 60,
                sentiment_enabled: true,
                sentiment_floor: 40.0,
                max_spread_pips: 3.0,
                max_atr_pips: 30.0,
            },
            signals: SignalConfig {
                auto_execute: false,
                min_confidence: 70.0,
                enabled_pairs: vec![
                    "EURUSD".to_string(),
                    "GBPUSD".to_string(),
                    "USDJPY".to_string(),
                    "AUDUSD".to_string(),
                ],
                enabled_timeframes: vec!["M15".to_string(), "H1".to_string(), "H4".to_string()],
                poll_interval_secs: 30,
                min_tick_spacing_secs: 15,
                daily_quota: 50,
                batch_size: 5,
                optimal_hours_utc: vec![7, 8, 9, 13, 14, 15],
                optimal_confidence_discount: 5.0,
                base_lot: 0.10,
                min_lot: 0.01,
                max_lot: 1.00,
            },
            partial_profit: PartialProfitConfig {
                monitor_interval_secs: 10,
                ladder: vec![
                    LadderRung { r_target: 1.0, close_pct: 50.0 },
                    LadderRung { r_target: 2.0, close_pct: 25.0 },
                    LadderRung { r_target: 3.0, close_pct: 25.0 },
                ],
                trailing_enabled: true,
                trailing_distance_r: 1.0,
            },
            hedge: HedgeConfig {
                enabled: true,
                evaluate_interval_secs: 60,
                min_net_profit: 10.0,
                strong_confidence: 75.0,
                weak_leg_ratio: 2.0,
            },
            logging: LoggingConfig {
                enable_signal_logging: true,
                enable_filter_logging: true,
                enable_lifecycle_logging: true,
            },
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Config::default().risk
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            tracing::info!("Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.risk.max_risk_per_trade_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "max_risk_per_trade_pct must be positive".to_string(),
            ));
        }

        if self.risk.max_daily_loss_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "max_daily_loss_pct must be positive".to_string(),
            ));
        }

        // Per-trade risk may never exceed the daily loss budget
        if self.risk.max_risk_per_trade_pct > self.risk.max_daily_loss_pct {
            return Err(ConfigError::Validation(
                "max_risk_per_trade_pct must not exceed max_daily_loss_pct".to_string(),
            ));
        }

        if self.risk.max_drawdown_pct <= 0.0 || self.risk.max_portfolio_risk_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "drawdown and portfolio risk percentages must be positive".to_string(),
            ));
        }

        if self.risk.max_position_notional <= 0.0 {
            return Err(ConfigError::Validation(
                "max_position_notional must be positive".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.signals.min_confidence) {
            return Err(ConfigError::Validation(
                "min_confidence must be within 0..=100".to_string(),
            ));
        }

        if self.signals.min_lot <= 0.0 || self.signals.max_lot < self.signals.min_lot {
            return Err(ConfigError::Validation(
                "lot bounds must satisfy 0 < min_lot <= max_lot".to_string(),
            ));
        }

        if self.signals.enabled_pairs.is_empty() {
            return Err(ConfigError::Validation(
                "enabled_pairs must not be empty".to_string(),
            ));
        }

        for tf in &self.signals.enabled_timeframes {
            if crate::types::Timeframe::from_str(tf).is_none() {
                return Err(ConfigError::Validation(format!(
                    "unknown timeframe '{}' in enabled_timeframes",
                    tf
                )));
            }
        }

        if self.partial_profit.ladder.is_empty() {
            return Err(ConfigError::Validation(
                "partial profit ladder must have at least one rung".to_string(),
            ));
        }

        let total_pct: f64 = self.partial_profit.ladder.iter().map(|r| r.close_pct).sum();
        if total_pct > 100.0 + f64::EPSILON {
            return Err(ConfigError::Validation(format!(
                "partial profit ladder closes {:.1}% of the position, cannot exceed 100%",
                total_pct
            )));
        }

        let mut last_r = 0.0;
        for rung in &self.partial_profit.ladder {
            if rung.r_target <= last_r {
                return Err(ConfigError::Validation(
                    "ladder R targets must be strictly increasing and positive".to_string(),
                ));
            }
            if rung.close_pct <= 0.0 {
                return Err(ConfigError::Validation(
                    "ladder close percentages must be positive".to_string(),
                ));
            }
            last_r = rung.r_target;
        }

        if self.hedge.weak_leg_ratio < 1.0 {
            return Err(ConfigError::Validation(
                "weak_leg_ratio must be >= 1.0".to_string(),
            ));
        }

        if self.filters.high_impact_blackout_minutes < 0
            || self.filters.medium_impact_blackout_minutes < 0
        {
            return Err(ConfigError::Validation(
                "blackout minutes must be non-negative".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
