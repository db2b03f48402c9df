//! HTTP-surface tests: parameter validation, the response envelope, and the
//! 429 contract.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use pixelarr::Config;
use pixelarr::models::image::{ImageRecord, ProviderPage};
use pixelarr::services::{ImageProvider, ProviderAggregator};
use pixelarr::state::SharedState;

struct FixedProvider {
    name: &'static str,
    images: usize,
}

#[async_trait]
impl ImageProvider for FixedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(&self, _query: &str, page: u32, per_page: u32) -> Result<ProviderPage> {
        let count = self.images.min(per_page as usize);
        let images = (0..count)
            .map(|index| ImageRecord {
                provider: self.name.to_string(),
                id: format!("{}-{}-{}", self.name, page, index),
                url: format!("https://img.example/{}/{}", self.name, index),
                thumb: String::new(),
                alt: String::new(),
                link: String::new(),
                credit: String::new(),
                credit_url: String::new(),
            })
            .collect();

        Ok(ProviderPage {
            images,
            total: self.images as u64,
            total_pages: 1,
        })
    }
}

async fn spawn_app(configure: impl FnOnce(&mut Config)) -> Router {
    let db_path = std::env::temp_dir().join(format!("pixelarr-api-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    configure(&mut config);

    let providers: Vec<Arc<dyn ImageProvider>> = vec![
        Arc::new(FixedProvider {
            name: "unsplash",
            images: 5,
        }),
        Arc::new(FixedProvider {
            name: "pexels",
            images: 4,
        }),
        Arc::new(FixedProvider {
            name: "pixabay",
            images: 3,
        }),
    ];
    let aggregator = Arc::new(ProviderAggregator::new(providers, Duration::from_secs(2)));

    let shared = SharedState::with_aggregator(config, aggregator)
        .await
        .expect("failed to build app state");
    let state = pixelarr::api::create_app_state(Arc::new(shared), None);

    pixelarr::api::router(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn search_returns_merged_images_in_provider_order() {
    let app = spawn_app(|_| {}).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/search?query=mountains")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], serde_json::json!(true));

    let images = json["data"]["images"].as_array().unwrap();
    assert_eq!(images.len(), 12);
    assert_eq!(images[0]["provider"], "unsplash");
    assert_eq!(images[11]["provider"], "pixabay");

    let stats = &json["data"]["pagination"]["provider_stats"];
    assert_eq!(stats["unsplash"]["count"], 5);
    assert_eq!(stats["pexels"]["count"], 4);
    assert_eq!(stats["pixabay"]["count"], 3);

    // Anonymous request: no quota snapshot in the payload.
    assert!(json["data"].get("rate_limit").is_none());
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let app = spawn_app(|_| {}).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/search?query=%20%20")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_page_and_per_page_are_rejected() {
    let app = spawn_app(|_| {}).await;

    let bad_page = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/search?query=cats&page=first")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad_page.status(), StatusCode::BAD_REQUEST);

    let zero_page = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/search?query=cats&page=0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(zero_page.status(), StatusCode::BAD_REQUEST);

    let oversized = app
        .oneshot(
            Request::builder()
                .uri("/api/search?query=cats&per_page=500")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(oversized.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn last_page_token_is_accepted() {
    let app = spawn_app(|_| {}).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/search?query=cats&page=last")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["pagination"]["current_page"], 1);
    assert_eq!(json["data"]["pagination"]["has_next_page"], false);
}

#[tokio::test]
async fn exhausted_quota_returns_429_with_reset_information() {
    let app = spawn_app(|config| {
        config.rate_limit.free_per_hour = 1;
    })
    .await;

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/search?query=cats&user_id=alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let first_json = body_json(first).await;
    assert_eq!(first_json["data"]["rate_limit"]["used"], 1);
    assert_eq!(first_json["data"]["rate_limit"]["limit"], 1);

    let second = app
        .oneshot(
            Request::builder()
                .uri("/api/search?query=cats&user_id=alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let json = body_json(second).await;
    assert_eq!(json["success"], serde_json::json!(false));
    assert_eq!(json["limit"], 1);
    assert!(
        json["reset_time"].as_str().is_some_and(|t| !t.is_empty()),
        "429 must carry a reset time for client countdowns"
    );
}

#[tokio::test]
async fn status_endpoint_reports_cache_size() {
    let app = spawn_app(|_| {}).await;

    // Populate the cache with one search first.
    let search = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/search?query=lighthouse")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(search.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/system/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["cache_entries"], 1);
    assert!(json["data"]["version"].as_str().is_some());
}
