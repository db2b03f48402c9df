use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The normalized shape every provider response is mapped into. Fields a
/// provider cannot supply default to the empty string, never null, so
/// downstream consumers stay uniform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub provider: String,
    pub id: String,
    pub url: String,
    pub thumb: String,
    pub alt: String,
    pub link: String,
    pub credit: String,
    pub credit_url: String,
}

/// One provider's slice of a result set, before merging.
#[derive(Debug, Clone, Default)]
pub struct ProviderPage {
    pub images: Vec<ImageRecord>,
    pub total: u64,
    pub total_pages: u32,
}

impl ProviderPage {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderStat {
    pub count: usize,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_images: u64,
    pub has_next_page: bool,
    pub provider_stats: BTreeMap<String, ProviderStat>,
}

/// Output of the aggregator, before the rate-limit snapshot is attached.
#[derive(Debug, Clone)]
pub struct MergedResult {
    pub images: Vec<ImageRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub used: u64,
    pub limit: u32,
    pub reset_time: String,
}

/// The full search payload. This is also what gets serialized into the
/// result cache; on a hit the `rate_limit` snapshot is replaced with a
/// fresh one before the payload is returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub images: Vec<ImageRecord>,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
}

/// Either a concrete page number or the "last" sentinel, which the
/// aggregator resolves per provider via a probe round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelector {
    Number(u32),
    Last,
}

impl Default for PageSelector {
    fn default() -> Self {
        Self::Number(1)
    }
}

impl PageSelector {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("last") {
            return Some(Self::Last);
        }
        raw.parse::<u32>()
            .ok()
            .filter(|page| *page >= 1)
            .map(Self::Number)
    }

    /// Token used in cache keys; "last" keys are distinct from numeric ones.
    #[must_use]
    pub fn cache_token(self) -> String {
        match self {
            Self::Number(page) => page.to_string(),
            Self::Last => "last".to_string(),
        }
    }
}
