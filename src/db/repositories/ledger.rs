use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set};

use crate::entities::{prelude::*, search_requests};

/// Append-only log of admitted searches, one row per request.
pub struct LedgerRepository {
    conn: DatabaseConnection,
}

impl LedgerRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn record(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let active_model = search_requests::ActiveModel {
            user_id: Set(user_id.to_string()),
            created_at: Set(now.to_rfc3339()),
            ..Default::default()
        };

        SearchRequests::insert(active_model).exec(&self.conn).await?;
        Ok(())
    }

    pub async fn count_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64> {
        let count = SearchRequests::find()
            .filter(search_requests::Column::UserId.eq(user_id))
            .filter(search_requests::Column::CreatedAt.gte(since.to_rfc3339()))
            .count(&self.conn)
            .await?;
        Ok(count)
    }

    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = SearchRequests::delete_many()
            .filter(search_requests::Column::CreatedAt.lt(cutoff.to_rfc3339()))
            .exec(&self.conn)
            .await?
            .rows_affected;
        Ok(deleted)
    }
}
