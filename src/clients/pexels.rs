use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::image::{ImageRecord, ProviderPage};
use crate::services::aggregator::ImageProvider;

const PEXELS_API: &str = "https://api.pexels.com/v1";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    total_results: u64,
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: u64,
    // Pexels' `url` is the photo's page on pexels.com, not the image file.
    url: Option<String>,
    alt: Option<String>,
    photographer: Option<String>,
    photographer_url: Option<String>,
    src: PhotoSrc,
}

#[derive(Debug, Deserialize)]
struct PhotoSrc {
    large: Option<String>,
    medium: Option<String>,
}

#[derive(Clone)]
pub struct PexelsClient {
    client: Client,
    api_key: String,
}

impl PexelsClient {
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

    fn map_photo(photo: Photo) -> ImageRecord {
        let link = photo.url.unwrap_or_default();
        ImageRecord {
            provider: "pexels".to_string(),
            id: photo.id.to_string(),
            url: photo.src.large.unwrap_or_default(),
            thumb: photo.src.medium.unwrap_or_default(),
            alt: photo.alt.unwrap_or_default(),
            link,
            credit: photo.photographer.unwrap_or_default(),
            credit_url: photo.photographer_url.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ImageProvider for PexelsClient {
    fn name(&self) -> &'static str {
        "pexels"
    }

    async fn search(&self, query: &str, page: u32, per_page: u32) -> Result<ProviderPage> {
        let url = format!(
            "{}/search?query={}&page={}&per_page={}",
            PEXELS_API,
            urlencoding::encode(query),
            page,
            per_page
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Pexels API error: {} - {}", status, body));
        }

        let parsed: SearchResponse = response.json().await?;

        // Pexels reports a flat total; page count is derived.
        let total_pages =
            u32::try_from(parsed.total_results.div_ceil(u64::from(per_page.max(1))))
                .unwrap_or(u32::MAX);

        Ok(ProviderPage {
            total: parsed.total_results,
            total_pages,
            images: parsed.photos.into_iter().map(Self::map_photo).collect(),
        })
    }
}
