// Economic news blackout
//
// Caches upcoming calendar events with a short TTL and blocks trading on a
// symbol when a matching event is imminent. The blackout applies pre-event
// only: once the release has passed, trading resumes immediately. This is a
// policy choice, not an oversight. Cache refresh fails open: a calendar
// outage must never halt trading on its own.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::TradingResult;
use crate::types::{symbol_currencies, NewsImpact, UpcomingNews};

/// Source of upcoming calendar events
#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn fetch_upcoming(&self) -> TradingResult<Vec<UpcomingNews>>;
}

/// A matched blackout: which event blocks and how far away it is
#[derive(Debug, Clone)]
pub struct NewsBlackout {
    pub event: UpcomingNews,
    pub minutes_until: i64,
}

#[derive(Debug, Default)]
struct NewsCache {
    items: Vec<UpcomingNews>,
    fetched_at: Option<DateTime<Utc>>,
}

pub struct NewsCalendar {
    feed: Arc<dyn NewsFeed>,
    cache: RwLock<NewsCache>,
    ttl: Duration,
    high_impact_minutes: i64,
    lower_impact_minutes: i64,
}

impl NewsCalendar {
    pub fn new(
        feed: Arc<dyn NewsFeed>,
        ttl_secs: u64,
        high_impact_minutes: i64,
        lower_impact_minutes: i64,
    ) -> Self {
        Self {
            feed,
            cache: RwLock::new(NewsCache::default()),
            ttl: Duration::seconds(ttl_secs as i64),
            high_impact_minutes,
            lower_impact_minutes,
        }
    }

    /// Refresh the cache when it is older than the TTL. Fetch failures keep
    /// whatever was cached and log a warning (fail open).
    pub async fn refresh_if_stale(&self, now: DateTime<Utc>) {
        {
            let cache = self.cache.read().await;
            if let Some(fetched_at) = cache.fetched_at {
                if now - fetched_at < self.ttl {
                    return;
                }
            }
        }

        match self.feed.fetch_upcoming().await {
            Ok(items) => {
                let mut cache = self.cache.write().await;
                debug!(count = items.len(), "news cache refreshed");
                cache.items = items;
                cache.fetched_at = Some(now);
            }
            Err(e) => {
                warn!(error = %e, "news fetch failed, keeping stale cache (fail open)");
            }
        }
    }

    /// Age of the cached events, None when nothing was ever fetched
    pub async fn cache_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.cache.read().await.fetched_at.map(|t| now - t)
    }

    /// Find a blocking event for the symbol, pre-event only
    pub async fn blackout_for(&self, symbol: &str, now: DateTime<Utc>) -> Option<NewsBlackout> {
        let cache = self.cache.read().await;
        check_blackout(
            &cache.items,
            symbol,
            now,
            self.high_impact_minutes,
            self.lower_impact_minutes,
        )
    }

    pub async fn upcoming(&self) -> Vec<UpcomingNews> {
        self.cache.read().await.items.clone()
    }
}

/// ForexFactory-style weekly calendar over HTTP. Items carry a currency
/// code, an impact label and an RFC3339 event time.
pub struct HttpNewsFeed {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, serde::Deserialize)]
struct CalendarItem {
    title: String,
    country: String,
    impact: String,
    date: String,
}

impl HttpNewsFeed {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> TradingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(crate::error::TradingError::from)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NewsFeed for HttpNewsFeed {
    async fn fetch_upcoming(&self) -> TradingResult<Vec<UpcomingNews>> {
        let items: Vec<CalendarItem> = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let events = items
            .into_iter()
            .filter_map(|item| {
                let event_time = DateTime::parse_from_rfc3339(&item.date)
                    .ok()?
                    .with_timezone(&Utc);
                let impact = match item.impact.to_ascii_lowercase().as_str() {
                    "high" => NewsImpact::High,
                    "medium" => NewsImpact::Medium,
                    _ => NewsImpact::Low,
                };
                Some(UpcomingNews {
                    id: format!("{}-{}", item.country, item.date),
                    title: item.title,
                    currency: item.country,
                    impact,
                    event_time,
                    affected_pairs: vec![],
                })
            })
            .collect();
        Ok(events)
    }
}

/// Core blackout rule, kept free of the cache for direct testing. An event
/// blocks when its currency matches either leg of the symbol (or the symbol
/// is listed in affected_pairs) and it lies within the impact-specific window
/// ahead of `now`. Events already in the past never block.
pub fn check_blackout(
    events: &[UpcomingNews],
    symbol: &str,
    now: DateTime<Utc>,
    high_impact_minutes: i64,
    lower_impact_minutes: i64,
) -> Option<NewsBlackout> {
    let (base, quote) = symbol_currencies(symbol);

    events
        .iter()
        .filter(|event| {
            event.currency == base
                || event.currency == quote
                || event.affected_pairs.iter().any(|p| p == symbol)
        })
        .filter_map(|event| {
            let until = event.event_time - now;
            if until < Duration::zero() {
                return None; // already released
            }
            let window = match event.impact {
                NewsImpact::High => high_impact_minutes,
                NewsImpact::Medium | NewsImpact::Low => lower_impact_minutes,
            };
            if until <= Duration::minutes(window) {
                Some(NewsBlackout {
                    event: event.clone(),
                    minutes_until: until.num_minutes(),
                })
            } else {
                None
            }
        })
        .min_by_key(|b| b.minutes_until)
}
