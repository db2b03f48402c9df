use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;

use crate::constants::cache::RESULT_TTL_MINUTES;
use crate::entities::{prelude::*, search_cache};

pub struct CacheRepository {
    conn: DatabaseConnection,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EvictionStats {
    pub expired: u64,
    pub trimmed: u64,
}

impl CacheRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Exact-key lookup. No freshness filter here: a stale entry is still
    /// returned so the caller can decide, and so hit accounting stays
    /// visible to the evictor.
    pub async fn get(&self, cache_key: &str) -> Result<Option<search_cache::Model>> {
        let entry = SearchCache::find()
            .filter(search_cache::Column::CacheKey.eq(cache_key))
            .one(&self.conn)
            .await?;
        Ok(entry)
    }

    /// Upsert by key. Every field is overwritten, including the timestamps,
    /// so this is only called when the payload was (re)computed.
    pub async fn set(
        &self,
        cache_key: &str,
        results_json: &str,
        hit_count: i32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let expires_at = (now + Duration::minutes(RESULT_TTL_MINUTES)).to_rfc3339();

        let active_model = search_cache::ActiveModel {
            cache_key: Set(cache_key.to_string()),
            results_json: Set(results_json.to_string()),
            hit_count: Set(hit_count),
            created_at: Set(now.to_rfc3339()),
            expires_at: Set(expires_at),
            ..Default::default()
        };

        SearchCache::insert(active_model)
            .on_conflict(
                OnConflict::column(search_cache::Column::CacheKey)
                    .update_columns([
                        search_cache::Column::ResultsJson,
                        search_cache::Column::HitCount,
                        search_cache::Column::CreatedAt,
                        search_cache::Column::ExpiresAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    /// Bump the hit counter. Timestamps are untouched: serving a cached
    /// payload does not extend its life. The counter is advisory, so the
    /// read-then-write race (last writer wins) is acceptable.
    pub async fn record_hit(&self, cache_key: &str) -> Result<()> {
        let Some(entry) = self.get(cache_key).await? else {
            return Ok(());
        };

        let hits = entry.hit_count + 1;
        let mut active = entry.into_active_model();
        active.hit_count = Set(hits);
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Two passes, in this order: expired entries go unconditionally, then
    /// the survivors are trimmed to the most recent `max_entries` by
    /// insertion order.
    pub async fn evict(
        &self,
        now: DateTime<Utc>,
        max_entries: Option<u64>,
    ) -> Result<EvictionStats> {
        let cutoff = now.to_rfc3339();

        let expired = SearchCache::delete_many()
            .filter(search_cache::Column::ExpiresAt.lt(&cutoff))
            .exec(&self.conn)
            .await?
            .rows_affected;

        let mut trimmed = 0;
        if let Some(cap) = max_entries {
            let surplus: Vec<i32> = SearchCache::find()
                .order_by_desc(search_cache::Column::Id)
                .offset(cap)
                .all(&self.conn)
                .await?
                .into_iter()
                .map(|entry| entry.id)
                .collect();

            if !surplus.is_empty() {
                trimmed = SearchCache::delete_many()
                    .filter(search_cache::Column::Id.is_in(surplus))
                    .exec(&self.conn)
                    .await?
                    .rows_affected;
            }
        }

        Ok(EvictionStats { expired, trimmed })
    }

    pub async fn entry_count(&self) -> Result<u64> {
        Ok(SearchCache::find().count(&self.conn).await?)
    }
}
