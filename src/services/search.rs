use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::Store;
use crate::models::image::{PageSelector, RateLimitInfo, SearchResponse};
use crate::services::aggregator::ProviderAggregator;
use crate::services::rate_limit::{RateLimiter, TierResolver};

/// Errors a search can surface to the caller. Provider failures never show
/// up here; they degrade to partial results inside the aggregator.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Rate limit exceeded: {limit} searches per hour, resets at {reset_time}")]
    RateLimited { limit: u32, reset_time: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub page: PageSelector,
    pub per_page: u32,
    pub user_id: Option<String>,
}

/// Orchestrates one search: rate-limit gate, cache consult, provider
/// fan-out on a miss, cache store.
pub struct SearchService {
    store: Store,
    aggregator: Arc<ProviderAggregator>,
    rate_limiter: RateLimiter,
    tiers: Arc<dyn TierResolver>,
}

impl SearchService {
    #[must_use]
    pub fn new(
        store: Store,
        aggregator: Arc<ProviderAggregator>,
        rate_limiter: RateLimiter,
        tiers: Arc<dyn TierResolver>,
    ) -> Self {
        Self {
            store,
            aggregator,
            rate_limiter,
            tiers,
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        self.search_at(request, Utc::now()).await
    }

    /// Entry point with an explicit clock so window and TTL behavior can be
    /// driven deterministically from tests.
    pub async fn search_at(
        &self,
        request: &SearchRequest,
        now: DateTime<Utc>,
    ) -> Result<SearchResponse, SearchError> {
        let rate_limit = self.admit(request.user_id.as_deref(), now).await?;

        let key = cache_key(&request.query, request.page, request.per_page);

        if let Some(entry) = self.store.get_cached_search(&key).await? {
            if now.to_rfc3339() < entry.expires_at {
                self.store.record_cache_hit(&key).await?;

                let mut response: SearchResponse = serde_json::from_str(&entry.results_json)
                    .map_err(anyhow::Error::from)?;
                response.rate_limit = rate_limit;

                debug!(cache_key = %key, hits = entry.hit_count + 1, "serving cached search");
                return Ok(response);
            }
            // Stale entries stay in place for the evictor; treated as a miss.
        }

        let merged = self
            .aggregator
            .search(&request.query, request.page, request.per_page)
            .await;

        info!(
            query = %request.query,
            images = merged.images.len(),
            total = merged.pagination.total_images,
            "aggregated provider search"
        );

        let response = SearchResponse {
            images: merged.images,
            pagination: merged.pagination,
            rate_limit,
        };

        let payload = serde_json::to_string(&response).map_err(anyhow::Error::from)?;
        self.store.cache_search(&key, &payload, 1, now).await?;

        Ok(response)
    }

    /// Rate-limit gate. Anonymous callers carry no identity to count
    /// against, so they bypass the limiter and get no quota snapshot.
    async fn admit(
        &self,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<RateLimitInfo>, SearchError> {
        let Some(user_id) = user_id else {
            return Ok(None);
        };

        let tier = self.tiers.tier_for(user_id).await;
        let decision = self.rate_limiter.check(user_id, tier, now).await?;

        if !decision.admitted {
            return Err(SearchError::RateLimited {
                limit: decision.limit,
                reset_time: decision.window_end.to_rfc3339(),
            });
        }

        self.rate_limiter.record(user_id, now).await?;

        Ok(Some(RateLimitInfo {
            used: decision.used + 1,
            limit: decision.limit,
            reset_time: decision.window_end.to_rfc3339(),
        }))
    }
}

/// Case and surrounding whitespace must not split the cache: "Cat " and
/// "cat" resolve to the same entry.
#[must_use]
pub fn cache_key(query: &str, page: PageSelector, per_page: u32) -> String {
    format!(
        "{}:{}:{}",
        query.trim().to_lowercase(),
        page.cache_token(),
        per_page
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_normalizes_case_and_whitespace() {
        assert_eq!(
            cache_key("Cat ", PageSelector::Number(1), 20),
            cache_key("cat", PageSelector::Number(1), 20)
        );
        assert_eq!(
            cache_key("  MOUNTAIN Lake ", PageSelector::Last, 30),
            cache_key("mountain lake", PageSelector::Last, 30)
        );
    }

    #[test]
    fn cache_key_distinguishes_page_and_size() {
        let base = cache_key("cat", PageSelector::Number(1), 20);
        assert_ne!(base, cache_key("cat", PageSelector::Number(2), 20));
        assert_ne!(base, cache_key("cat", PageSelector::Last, 20));
        assert_ne!(base, cache_key("cat", PageSelector::Number(1), 30));
    }
}
