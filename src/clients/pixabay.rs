use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::image::{ImageRecord, ProviderPage};
use crate::services::aggregator::ImageProvider;

const PIXABAY_API: &str = "https://pixabay.com/api/";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    total: u64,
    // Pixabay exposes at most 500 results per query; pagination is bounded
    // by totalHits, not total.
    #[serde(rename = "totalHits")]
    total_hits: u64,
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    id: u64,
    #[serde(rename = "pageURL")]
    page_url: Option<String>,
    tags: Option<String>,
    #[serde(rename = "previewURL")]
    preview_url: Option<String>,
    #[serde(rename = "webformatURL")]
    webformat_url: Option<String>,
    user: Option<String>,
    user_id: Option<u64>,
}

#[derive(Clone)]
pub struct PixabayClient {
    client: Client,
    api_key: String,
}

impl PixabayClient {
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Self::with_shared_client(Client::new(), api_key)
    }

    #[must_use]
    pub fn with_shared_client(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }

    fn map_hit(hit: Hit) -> ImageRecord {
        let credit = hit.user.unwrap_or_default();
        let credit_url = match (credit.is_empty(), hit.user_id) {
            (false, Some(user_id)) => {
                format!("https://pixabay.com/users/{credit}-{user_id}/")
            }
            _ => String::new(),
        };

        ImageRecord {
            provider: "pixabay".to_string(),
            id: hit.id.to_string(),
            url: hit.webformat_url.unwrap_or_default(),
            thumb: hit.preview_url.unwrap_or_default(),
            alt: hit.tags.unwrap_or_default(),
            link: hit.page_url.unwrap_or_default(),
            credit,
            credit_url,
        }
    }
}

#[async_trait]
impl ImageProvider for PixabayClient {
    fn name(&self) -> &'static str {
        "pixabay"
    }

    async fn search(&self, query: &str, page: u32, per_page: u32) -> Result<ProviderPage> {
        // Pixabay authenticates with a `key` query parameter rather than a
        // header.
        let url = format!(
            "{}?key={}&q={}&page={}&per_page={}&image_type=photo",
            PIXABAY_API,
            self.api_key,
            urlencoding::encode(query),
            page,
            per_page
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Pixabay API error: {} - {}", status, body));
        }

        let parsed: SearchResponse = response.json().await?;

        let total_pages = u32::try_from(parsed.total_hits.div_ceil(u64::from(per_page.max(1))))
            .unwrap_or(u32::MAX);

        Ok(ProviderPage {
            total: parsed.total,
            total_pages,
            images: parsed.hits.into_iter().map(Self::map_hit).collect(),
        })
    }
}
