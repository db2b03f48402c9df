use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::image::{ImageRecord, ProviderPage};
use crate::services::aggregator::ImageProvider;

const UNSPLASH_API: &str = "https://api.unsplash.com";

#[derive(Debug, Deserialize)]
struct SearchPhotosResponse {
    total: u64,
    total_pages: u32,
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: String,
    alt_description: Option<String>,
    urls: PhotoUrls,
    links: PhotoLinks,
    user: PhotoUser,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: Option<String>,
    thumb: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoLinks {
    html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoUser {
    name: Option<String>,
    links: Option<PhotoUserLinks>,
}

#[derive(Debug, Deserialize)]
struct PhotoUserLinks {
    html: Option<String>,
}

#[derive(Clone)]
pub struct UnsplashClient {
    client: Client,
    access_key: String,
}

impl UnsplashClient {
    #[must_use]
    pub fn new(access_key: &str) -> Self {
        Self::with_shared_client(Client::new(), access_key)
    }

    #[must_use]
    pub fn with_shared_client(client: Client, access_key: &str) -> Self {
        Self {
            client,
            access_key: access_key.to_string(),
        }
    }

    fn map_photo(photo: Photo) -> ImageRecord {
        ImageRecord {
            provider: "unsplash".to_string(),
            id: photo.id,
            url: photo.urls.regular.unwrap_or_default(),
            thumb: photo.urls.thumb.unwrap_or_default(),
            alt: photo.alt_description.unwrap_or_default(),
            link: photo.links.html.unwrap_or_default(),
            credit: photo.user.name.unwrap_or_default(),
            credit_url: photo
                .user
                .links
                .and_then(|links| links.html)
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ImageProvider for UnsplashClient {
    fn name(&self) -> &'static str {
        "unsplash"
    }

    async fn search(&self, query: &str, page: u32, per_page: u32) -> Result<ProviderPage> {
        let url = format!(
            "{}/search/photos?query={}&page={}&per_page={}",
            UNSPLASH_API,
            urlencoding::encode(query),
            page,
            per_page
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Unsplash API error: {} - {}", status, body));
        }

        let parsed: SearchPhotosResponse = response.json().await?;

        Ok(ProviderPage {
            total: parsed.total,
            total_pages: parsed.total_pages,
            images: parsed.results.into_iter().map(Self::map_photo).collect(),
        })
    }
}
