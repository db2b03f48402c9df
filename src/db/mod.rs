use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::entities::{search_cache, user_windows};

pub mod migrator;
pub mod repositories;

pub use repositories::cache::EvictionStats;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.starts_with(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn cache_repo(&self) -> repositories::cache::CacheRepository {
        repositories::cache::CacheRepository::new(self.conn.clone())
    }

    fn ledger_repo(&self) -> repositories::ledger::LedgerRepository {
        repositories::ledger::LedgerRepository::new(self.conn.clone())
    }

    fn window_repo(&self) -> repositories::window::WindowRepository {
        repositories::window::WindowRepository::new(self.conn.clone())
    }

    // ========== Result cache ==========

    pub async fn get_cached_search(&self, cache_key: &str) -> Result<Option<search_cache::Model>> {
        self.cache_repo().get(cache_key).await
    }

    pub async fn cache_search(
        &self,
        cache_key: &str,
        results_json: &str,
        hit_count: i32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.cache_repo()
            .set(cache_key, results_json, hit_count, now)
            .await
    }

    pub async fn record_cache_hit(&self, cache_key: &str) -> Result<()> {
        self.cache_repo().record_hit(cache_key).await
    }

    pub async fn evict_cache(
        &self,
        now: DateTime<Utc>,
        max_entries: Option<u64>,
    ) -> Result<EvictionStats> {
        self.cache_repo().evict(now, max_entries).await
    }

    pub async fn cache_entry_count(&self) -> Result<u64> {
        self.cache_repo().entry_count().await
    }

    // ========== Request ledger ==========

    pub async fn record_search_request(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.ledger_repo().record(user_id, now).await
    }

    pub async fn count_requests_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        self.ledger_repo().count_since(user_id, since).await
    }

    pub async fn prune_search_requests(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.ledger_repo().delete_older_than(cutoff).await
    }

    // ========== User windows ==========

    pub async fn get_user_window(&self, user_id: &str) -> Result<Option<user_windows::Model>> {
        self.window_repo().get(user_id).await
    }

    pub async fn reset_user_window(
        &self,
        user_id: &str,
        window_start: DateTime<Utc>,
    ) -> Result<()> {
        self.window_repo().reset(user_id, window_start).await
    }

    pub async fn prune_user_windows(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.window_repo().delete_started_before(cutoff).await
    }
}
