// Session killzones
//
// Named UTC time windows with elevated liquidity and a preferred pair list.
// Windows may span midnight; containment is evaluated modulo 1440 minutes.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Killzone {
    pub name: String,
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
    pub best_pairs: Vec<String>,
    pub volatility: String,
    pub enabled: bool,
}

impl Killzone {
    fn start_minutes(&self) -> u32 {
        self.start_hour * 60 + self.start_minute
    }

    fn end_minutes(&self) -> u32 {
        self.end_hour * 60 + self.end_minute
    }

    /// Whether `time` falls inside [start, end), wrapping across midnight
    /// when end <= start. A window with start == end wraps the full 1440
    /// minutes and so matches every time of day; disable the zone instead
    /// of zeroing it out.
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        let minute_of_day = time.hour() * 60 + time.minute();
        let start = self.start_minutes();
        let end = self.end_minutes();

        if start < end {
            minute_of_day >= start && minute_of_day < end
        } else {
            // Overnight window, e.g. 21:00-02:00
            minute_of_day >= start || minute_of_day < end
        }
    }
}

/// Standard killzone table. Static configuration; only the enabled flags are
/// meant to change at runtime.
pub fn default_killzones() -> Vec<Killzone> {
    vec![
        Killzone {
            name: "Asian".to_string(),
            start_hour: 0,
            start_minute: 0,
            end_hour: 4,
            end_minute: 0,
            best_pairs: vec!["USDJPY".to_string(), "AUDUSD".to_string(), "NZDUSD".to_string()],
            volatility: "low".to_string(),
            enabled: true,
        },
        Killzone {
            name: "London Open".to_string(),
            start_hour: 7,
            start_minute: 0,
            end_hour: 10,
            end_minute: 0,
            best_pairs: vec!["EURUSD".to_string(), "GBPUSD".to_string(), "EURGBP".to_string()],
            volatility: "high".to_string(),
            enabled: true,
        },
        Killzone {
            name: "New York Open".to_string(),
            start_hour: 12,
            start_minute: 0,
            end_hour: 15,
            end_minute: 0,
            best_pairs: vec!["EURUSD".to_string(), "GBPUSD".to_string(), "USDCAD".to_string()],
            volatility: "high".to_string(),
            enabled: true,
        },
        Killzone {
            name: "London Close".to_string(),
            start_hour: 15,
            start_minute: 0,
            end_hour: 17,
            end_minute: 0,
            best_pairs: vec!["EURUSD".to_string(), "GBPUSD".to_string()],
            volatility: "medium".to_string(),
            enabled: true,
        },
    ]
}
