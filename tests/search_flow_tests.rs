//! End-to-end flows for the search core: rate limiting, caching, merge
//! behavior and maintenance sweeps over a real (temporary) SQLite store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as TimeDelta, Utc};

use pixelarr::config::RateLimitConfig;
use pixelarr::db::Store;
use pixelarr::models::image::{ImageRecord, PageSelector, ProviderPage};
use pixelarr::services::search::cache_key;
use pixelarr::services::{
    ImageProvider, ProviderAggregator, RateLimiter, SearchError, SearchRequest, SearchService,
    StaticTierResolver, TierResolver,
};

struct StubProvider {
    name: &'static str,
    images: usize,
    total: u64,
    total_pages: u32,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl StubProvider {
    fn ok(name: &'static str, images: usize, total: u64, total_pages: u32) -> Arc<Self> {
        Arc::new(Self {
            name,
            images,
            total,
            total_pages,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            images: 0,
            total: 0,
            total_pages: 0,
            fail: true,
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProvider for StubProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(&self, _query: &str, page: u32, per_page: u32) -> Result<ProviderPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            anyhow::bail!("stub provider down");
        }

        let count = self.images.min(per_page as usize);
        let images = (0..count)
            .map(|index| ImageRecord {
                provider: self.name.to_string(),
                id: format!("{}-p{}-{}", self.name, page, index),
                url: format!("https://img.example/{}/{}/{}", self.name, page, index),
                thumb: String::new(),
                alt: String::new(),
                link: String::new(),
                credit: String::new(),
                credit_url: String::new(),
            })
            .collect();

        Ok(ProviderPage {
            images,
            total: self.total,
            total_pages: self.total_pages,
        })
    }
}

async fn temp_store() -> Store {
    let db_path = std::env::temp_dir().join(format!("pixelarr-test-{}.db", uuid::Uuid::new_v4()));
    Store::new(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("failed to create test store")
}

fn small_limits() -> RateLimitConfig {
    RateLimitConfig {
        free_per_hour: 3,
        premium_per_hour: 5,
        pro_per_hour: 10,
        tiers: HashMap::new(),
    }
}

fn build_service(
    store: Store,
    providers: Vec<Arc<dyn ImageProvider>>,
    limits: RateLimitConfig,
) -> SearchService {
    let aggregator = Arc::new(ProviderAggregator::new(providers, Duration::from_secs(2)));
    let rate_limiter = RateLimiter::new(store.clone(), limits);
    let tiers: Arc<dyn TierResolver> = Arc::new(StaticTierResolver::new(HashMap::new()));
    SearchService::new(store, aggregator, rate_limiter, tiers)
}

fn default_providers() -> Vec<Arc<dyn ImageProvider>> {
    vec![
        StubProvider::ok("unsplash", 5, 50, 3),
        StubProvider::ok("pexels", 4, 40, 2),
        StubProvider::ok("pixabay", 3, 30, 2),
    ]
}

fn request(query: &str, user_id: Option<&str>) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        page: PageSelector::Number(1),
        per_page: 20,
        user_id: user_id.map(String::from),
    }
}

#[tokio::test]
async fn quota_boundary_admits_up_to_limit_then_rejects() {
    let store = temp_store().await;
    let service = build_service(store, default_providers(), small_limits());
    let now = Utc::now();

    for expected_used in 1..=3 {
        let response = service
            .search_at(&request("cats", Some("alice")), now)
            .await
            .expect("search within quota should succeed");
        let rate_limit = response.rate_limit.expect("identified caller gets a snapshot");
        assert_eq!(rate_limit.used, expected_used);
        assert_eq!(rate_limit.limit, 3);
    }

    let rejected = service.search_at(&request("cats", Some("alice")), now).await;
    match rejected {
        Err(SearchError::RateLimited { limit, .. }) => assert_eq!(limit, 3),
        other => panic!("expected RateLimited, got {other:?}"),
    }

    // A different user is unaffected.
    service
        .search_at(&request("cats", Some("bob")), now)
        .await
        .expect("other users have their own window");
}

#[tokio::test]
async fn window_rolls_over_exactly_at_one_hour() {
    let store = temp_store().await;
    let service = build_service(store, default_providers(), small_limits());
    let start = Utc::now();

    for _ in 0..3 {
        service
            .search_at(&request("dogs", Some("carol")), start)
            .await
            .expect("admitted");
    }

    // One millisecond before expiry: still the same window, still full.
    let just_before = start + TimeDelta::hours(1) - TimeDelta::milliseconds(1);
    assert!(matches!(
        service
            .search_at(&request("dogs", Some("carol")), just_before)
            .await,
        Err(SearchError::RateLimited { .. })
    ));

    // One millisecond past expiry: fresh window, count back to zero.
    let just_after = start + TimeDelta::hours(1) + TimeDelta::milliseconds(1);
    let response = service
        .search_at(&request("dogs", Some("carol")), just_after)
        .await
        .expect("new window admits again");
    assert_eq!(response.rate_limit.expect("snapshot").used, 1);
}

#[tokio::test]
async fn anonymous_requests_bypass_the_limiter() {
    let store = temp_store().await;
    let service = build_service(store, default_providers(), small_limits());
    let now = Utc::now();

    for _ in 0..10 {
        let response = service
            .search_at(&request("birds", None), now)
            .await
            .expect("anonymous searches are not limited");
        assert!(response.rate_limit.is_none());
    }
}

#[tokio::test]
async fn cache_hit_within_ttl_skips_providers_and_counts_hits() {
    let store = temp_store().await;
    let unsplash = StubProvider::ok("unsplash", 5, 50, 3);
    let pexels = StubProvider::ok("pexels", 4, 40, 2);
    let pixabay = StubProvider::ok("pixabay", 3, 30, 2);
    let providers: Vec<Arc<dyn ImageProvider>> =
        vec![unsplash.clone(), pexels.clone(), pixabay.clone()];
    let service = build_service(store.clone(), providers, small_limits());

    let now = Utc::now();
    let key = cache_key("aurora", PageSelector::Number(1), 20);

    // Miss: all three providers are called and the result is stored.
    service
        .search_at(&request("aurora", None), now)
        .await
        .expect("initial search");
    assert_eq!(unsplash.calls() + pexels.calls() + pixabay.calls(), 3);
    let entry = store
        .get_cached_search(&key)
        .await
        .unwrap()
        .expect("entry stored on miss");
    assert_eq!(entry.hit_count, 1);

    // Hit at +4 minutes: served from cache, hit count bumped, no new calls.
    let cached = service
        .search_at(&request("aurora", None), now + TimeDelta::minutes(4))
        .await
        .expect("cached search");
    assert_eq!(cached.images.len(), 12);
    assert_eq!(unsplash.calls() + pexels.calls() + pixabay.calls(), 3);
    let entry = store.get_cached_search(&key).await.unwrap().unwrap();
    assert_eq!(entry.hit_count, 2);

    // At +6 minutes the entry is stale: still physically present, but the
    // search recomputes and resets the hit count.
    let stale = store.get_cached_search(&key).await.unwrap();
    assert!(stale.is_some(), "stale entries linger until swept");

    service
        .search_at(&request("aurora", None), now + TimeDelta::minutes(6))
        .await
        .expect("recomputed search");
    assert_eq!(unsplash.calls() + pexels.calls() + pixabay.calls(), 6);
    let entry = store.get_cached_search(&key).await.unwrap().unwrap();
    assert_eq!(entry.hit_count, 1);
}

#[tokio::test]
async fn query_normalization_collides_to_one_cache_entry() {
    let store = temp_store().await;
    let unsplash = StubProvider::ok("unsplash", 2, 2, 1);
    let pexels = StubProvider::ok("pexels", 2, 2, 1);
    let pixabay = StubProvider::ok("pixabay", 2, 2, 1);
    let providers: Vec<Arc<dyn ImageProvider>> =
        vec![unsplash.clone(), pexels.clone(), pixabay.clone()];
    let service = build_service(store.clone(), providers, small_limits());
    let now = Utc::now();

    service
        .search_at(&request("Cat ", None), now)
        .await
        .expect("first variant");
    service
        .search_at(&request("cat", None), now)
        .await
        .expect("second variant");

    // Second call was a hit, so each provider was only reached once.
    assert_eq!(unsplash.calls(), 1);
    assert_eq!(pexels.calls(), 1);
    assert_eq!(pixabay.calls(), 1);
    assert_eq!(store.cache_entry_count().await.unwrap(), 1);

    let entry = store
        .get_cached_search(&cache_key("cat", PageSelector::Number(1), 20))
        .await
        .unwrap()
        .expect("normalized key resolves");
    assert_eq!(entry.hit_count, 2);
}

#[tokio::test]
async fn one_failing_provider_degrades_to_partial_results() {
    let store = temp_store().await;
    let providers: Vec<Arc<dyn ImageProvider>> = vec![
        StubProvider::ok("unsplash", 5, 50, 3),
        StubProvider::failing("pexels"),
        StubProvider::ok("pixabay", 3, 30, 2),
    ];
    let service = build_service(store, providers, small_limits());

    let response = service
        .search_at(&request("storm", None), Utc::now())
        .await
        .expect("one failure must not fail the request");

    assert_eq!(response.images.len(), 8);
    assert!(response.images[..5].iter().all(|i| i.provider == "unsplash"));
    assert!(response.images[5..].iter().all(|i| i.provider == "pixabay"));

    let stats = &response.pagination.provider_stats;
    assert_eq!(stats["pexels"].count, 0);
    assert_eq!(stats["pexels"].total, 0);
    assert_eq!(stats["unsplash"].count, 5);
    assert_eq!(stats["pixabay"].count, 3);
    assert_eq!(response.pagination.total_images, 80);
    assert!(response.pagination.has_next_page);
}

#[tokio::test]
async fn all_providers_failing_yields_empty_success() {
    let store = temp_store().await;
    let providers: Vec<Arc<dyn ImageProvider>> = vec![
        StubProvider::failing("unsplash"),
        StubProvider::failing("pexels"),
        StubProvider::failing("pixabay"),
    ];
    let service = build_service(store, providers, small_limits());

    let response = service
        .search_at(&request("void", None), Utc::now())
        .await
        .expect("degenerate success, not an error");

    assert!(response.images.is_empty());
    assert_eq!(response.pagination.total_images, 0);
    assert!(!response.pagination.has_next_page);
}

#[tokio::test]
async fn last_page_runs_probe_round_then_full_round() {
    let store = temp_store().await;
    let unsplash = StubProvider::ok("unsplash", 5, 50, 3);
    let pexels = StubProvider::ok("pexels", 4, 40, 2);
    let pixabay = StubProvider::ok("pixabay", 3, 30, 2);
    let providers: Vec<Arc<dyn ImageProvider>> =
        vec![unsplash.clone(), pexels.clone(), pixabay.clone()];
    let service = build_service(store, providers, small_limits());

    let mut last_request = request("glacier", None);
    last_request.page = PageSelector::Last;

    let response = service
        .search_at(&last_request, Utc::now())
        .await
        .expect("last-page search");

    // Probe plus full fetch: two calls per provider.
    assert_eq!(unsplash.calls(), 2);
    assert_eq!(pexels.calls(), 2);
    assert_eq!(pixabay.calls(), 2);

    // The reported page is the deepest provider's last page, and there is
    // nothing beyond it.
    assert_eq!(response.pagination.current_page, 3);
    assert!(!response.pagination.has_next_page);
}

#[tokio::test]
async fn eviction_removes_expired_before_trimming_to_cap() {
    let store = temp_store().await;
    let now = Utc::now();

    // A was written long enough ago to be expired; B and C are fresh.
    store
        .cache_search("a:1:20", "{}", 1, now - TimeDelta::minutes(10))
        .await
        .unwrap();
    store
        .cache_search("b:1:20", "{}", 1, now - TimeDelta::minutes(2))
        .await
        .unwrap();
    store
        .cache_search("c:1:20", "{}", 1, now - TimeDelta::minutes(1))
        .await
        .unwrap();

    let stats = store.evict_cache(now, Some(1)).await.unwrap();
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.trimmed, 1);

    assert!(store.get_cached_search("a:1:20").await.unwrap().is_none());
    assert!(store.get_cached_search("b:1:20").await.unwrap().is_none());
    assert!(store.get_cached_search("c:1:20").await.unwrap().is_some());
}

#[tokio::test]
async fn retention_sweep_prunes_old_requests_and_idle_windows() {
    use pixelarr::services::SweepService;

    let store = temp_store().await;
    let now = Utc::now();

    store
        .record_search_request("dave", now - TimeDelta::hours(3))
        .await
        .unwrap();
    store
        .record_search_request("dave", now - TimeDelta::minutes(10))
        .await
        .unwrap();
    store
        .reset_user_window("idle-user", now - TimeDelta::hours(25))
        .await
        .unwrap();
    store.reset_user_window("dave", now).await.unwrap();

    let sweep = SweepService::new(store.clone(), 500);
    let stats = sweep.run_retention_sweep().await.unwrap();

    assert_eq!(stats.requests_deleted, 1);
    assert_eq!(stats.windows_deleted, 1);

    // The recent request and the live window survive.
    let remaining = store
        .count_requests_since("dave", now - TimeDelta::hours(4))
        .await
        .unwrap();
    assert_eq!(remaining, 1);
    assert!(store.get_user_window("dave").await.unwrap().is_some());
    assert!(store.get_user_window("idle-user").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_requests_near_the_boundary_stay_bounded() {
    let store = temp_store().await;
    let service = Arc::new(build_service(store, default_providers(), small_limits()));
    let now = Utc::now();

    // Fire more requests than the quota at once. The check-then-record gap
    // means a few extra may slip through, but admissions must stay bounded
    // by limit + concurrency, and later requests must all be rejected.
    let mut handles = Vec::new();
    for i in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .search_at(&request(&format!("query-{i}"), Some("eve")), now)
                .await
                .is_ok()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }

    assert!(admitted >= 3, "quota itself must be admitted");
    assert!(admitted <= 8, "sanity");

    // Once the ledger has caught up, the window is closed for good.
    assert!(matches!(
        service.search_at(&request("late", Some("eve")), now).await,
        Err(SearchError::RateLimited { .. })
    ));
}
