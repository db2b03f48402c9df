use std::sync::Arc;
use std::time::Duration;

use crate::clients::pexels::PexelsClient;
use crate::clients::pixabay::PixabayClient;
use crate::clients::unsplash::UnsplashClient;
use crate::config::Config;
use crate::db::Store;
use crate::services::{
    ImageProvider, ProviderAggregator, RateLimiter, SearchService, StaticTierResolver,
    SweepService, TierResolver,
};

/// Build a shared HTTP client with reasonable defaults for API calls.
/// Reused across all providers to enable connection pooling and avoid
/// socket exhaustion.
fn build_shared_http_client(timeout_seconds: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent("Pixelarr/1.0")
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Config,

    pub store: Store,

    pub aggregator: Arc<ProviderAggregator>,

    pub search_service: Arc<SearchService>,

    pub sweep_service: Arc<SweepService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let http_client =
            build_shared_http_client(config.providers.request_timeout_seconds.into())?;

        // Merge order is this construction order: Unsplash, Pexels, Pixabay.
        let providers: Vec<Arc<dyn ImageProvider>> = vec![
            Arc::new(UnsplashClient::with_shared_client(
                http_client.clone(),
                &config.providers.unsplash_access_key,
            )),
            Arc::new(PexelsClient::with_shared_client(
                http_client.clone(),
                &config.providers.pexels_api_key,
            )),
            Arc::new(PixabayClient::with_shared_client(
                http_client,
                &config.providers.pixabay_api_key,
            )),
        ];

        let aggregator = Arc::new(ProviderAggregator::new(
            providers,
            Duration::from_secs(config.providers.provider_timeout_seconds),
        ));

        Self::with_aggregator(config, aggregator).await
    }

    /// Seam for tests and embedding: the provider set arrives through the
    /// aggregator while the store and services are built from config.
    pub async fn with_aggregator(
        config: Config,
        aggregator: Arc<ProviderAggregator>,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let rate_limiter = RateLimiter::new(store.clone(), config.rate_limit.clone());
        let tiers: Arc<dyn TierResolver> =
            Arc::new(StaticTierResolver::from_config(&config.rate_limit.tiers));

        let search_service = Arc::new(SearchService::new(
            store.clone(),
            aggregator.clone(),
            rate_limiter,
            tiers,
        ));

        let sweep_service = Arc::new(SweepService::new(
            store.clone(),
            config.search.max_cache_entries,
        ));

        Ok(Self {
            config,
            store,
            aggregator,
            search_service,
            sweep_service,
        })
    }
}
