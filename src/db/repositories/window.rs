use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::{prelude::*, user_windows};

pub struct WindowRepository {
    conn: DatabaseConnection,
}

impl WindowRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<user_windows::Model>> {
        let window = UserWindows::find_by_id(user_id).one(&self.conn).await?;
        Ok(window)
    }

    /// Replace the user's window start. The single row per user is enforced
    /// by the primary key, not by application logic.
    pub async fn reset(&self, user_id: &str, window_start: DateTime<Utc>) -> Result<()> {
        let active_model = user_windows::ActiveModel {
            user_id: Set(user_id.to_string()),
            window_start: Set(window_start.to_rfc3339()),
        };

        UserWindows::insert(active_model)
            .on_conflict(
                OnConflict::column(user_windows::Column::UserId)
                    .update_column(user_windows::Column::WindowStart)
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    pub async fn delete_started_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = UserWindows::delete_many()
            .filter(user_windows::Column::WindowStart.lt(cutoff.to_rfc3339()))
            .exec(&self.conn)
            .await?
            .rows_affected;
        Ok(deleted)
    }
}
