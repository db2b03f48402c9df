use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::config::RateLimitConfig;
use crate::constants::rate_limit::WINDOW_MINUTES;
use crate::db::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tier {
    #[default]
    Free,
    Premium,
    Pro,
}

impl Tier {
    /// Unknown tier names fall back to free rather than erroring; the tier
    /// source is an external collaborator and may drift.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "premium" => Self::Premium,
            "pro" => Self::Pro,
            _ => Self::Free,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Pro => "pro",
        }
    }
}

/// Capability for looking up a caller's subscription tier. Kept behind a
/// trait so the limiter never reaches into subscription storage directly
/// and tests can pin tiers.
#[async_trait]
pub trait TierResolver: Send + Sync {
    async fn tier_for(&self, user_id: &str) -> Tier;
}

/// Config-backed resolver: a fixed user → tier table, everyone else free.
pub struct StaticTierResolver {
    tiers: HashMap<String, Tier>,
}

impl StaticTierResolver {
    #[must_use]
    pub fn new(tiers: HashMap<String, Tier>) -> Self {
        Self { tiers }
    }

    #[must_use]
    pub fn from_config(raw: &HashMap<String, String>) -> Self {
        Self {
            tiers: raw
                .iter()
                .map(|(user_id, tier)| (user_id.clone(), Tier::parse(tier)))
                .collect(),
        }
    }
}

#[async_trait]
impl TierResolver for StaticTierResolver {
    async fn tier_for(&self, user_id: &str) -> Tier {
        self.tiers.get(user_id).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub admitted: bool,
    pub used: u64,
    pub limit: u32,
    pub window_end: DateTime<Utc>,
}

/// Per-user quota enforcement over the request ledger and window store.
/// Windows are fixed-length and anchored at first use after each reset,
/// not sliding.
#[derive(Clone)]
pub struct RateLimiter {
    store: Store,
    limits: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub const fn new(store: Store, limits: RateLimitConfig) -> Self {
        Self { store, limits }
    }

    /// Decide whether a search may proceed. The window is reset *before*
    /// counting, so a request landing just after expiry is evaluated
    /// against the fresh window, never the stale one.
    pub async fn check(
        &self,
        user_id: &str,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision> {
        let window_start = self.current_window_start(user_id, now).await?;
        let used = self.store.count_requests_since(user_id, window_start).await?;
        let limit = self.limit_for(tier);

        Ok(RateLimitDecision {
            admitted: used < u64::from(limit),
            used,
            limit,
            window_end: window_start + Duration::minutes(WINDOW_MINUTES),
        })
    }

    /// Appending to the ledger is deliberately a second step after `check`;
    /// two concurrent requests near the boundary may both be admitted. The
    /// quota is a soft bound, not a transactional guarantee.
    pub async fn record(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.store.record_search_request(user_id, now).await
    }

    #[must_use]
    pub const fn limit_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Free => self.limits.free_per_hour,
            Tier::Premium => self.limits.premium_per_hour,
            Tier::Pro => self.limits.pro_per_hour,
        }
    }

    async fn current_window_start(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let stored = self
            .store
            .get_user_window(user_id)
            .await?
            .and_then(|window| DateTime::parse_from_rfc3339(&window.window_start).ok())
            .map(|start| start.with_timezone(&Utc));

        match stored {
            Some(start) if now < start + Duration::minutes(WINDOW_MINUTES) => Ok(start),
            _ => {
                self.store.reset_user_window(user_id, now).await?;
                Ok(now)
            }
        }
    }
}
