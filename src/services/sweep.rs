use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;

use crate::constants::retention;
use crate::db::{EvictionStats, Store};

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub requests_deleted: u64,
    pub windows_deleted: u64,
}

/// Retention and eviction as scheduled operations, independent of request
/// traffic. Searches themselves never delete anything.
pub struct SweepService {
    store: Store,
    max_cache_entries: u64,
}

impl SweepService {
    #[must_use]
    pub const fn new(store: Store, max_cache_entries: u64) -> Self {
        Self {
            store,
            max_cache_entries,
        }
    }

    /// Drop ledger rows past the retention horizon and windows idle for a
    /// day. Retention is longer than the quota window, so a live window
    /// count can never come up short.
    pub async fn run_retention_sweep(&self) -> Result<SweepStats> {
        let now = Utc::now();

        let requests_deleted = self
            .store
            .prune_search_requests(now - Duration::hours(retention::REQUEST_HOURS))
            .await?;

        let windows_deleted = self
            .store
            .prune_user_windows(now - Duration::hours(retention::WINDOW_HOURS))
            .await?;

        info!(requests_deleted, windows_deleted, "retention sweep finished");

        Ok(SweepStats {
            requests_deleted,
            windows_deleted,
        })
    }

    pub async fn run_cache_eviction(&self) -> Result<EvictionStats> {
        let stats = self
            .store
            .evict_cache(Utc::now(), Some(self.max_cache_entries))
            .await?;

        if stats.expired > 0 || stats.trimmed > 0 {
            info!(
                expired = stats.expired,
                trimmed = stats.trimmed,
                "cache eviction finished"
            );
        }

        Ok(stats)
    }
}
