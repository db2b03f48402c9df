use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::models::image::{MergedResult, PageSelector, Pagination, ProviderPage, ProviderStat};

/// The seam between the aggregator and the concrete provider clients.
/// Implementations map their provider's response shape into a
/// `ProviderPage` of normalized records.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str, page: u32, per_page: u32) -> Result<ProviderPage>;
}

/// Tagged per-provider result, resolved before merging so completion order
/// can never leak into the merged output.
#[derive(Debug)]
pub enum ProviderOutcome {
    Success(ProviderPage),
    Failure(String),
}

impl ProviderOutcome {
    fn into_page(self) -> ProviderPage {
        match self {
            Self::Success(page) => page,
            Self::Failure(_) => ProviderPage::empty(),
        }
    }
}

/// Fans a query out to every provider concurrently and merges the results
/// in provider order. A provider failure (error, bad payload, timeout)
/// degrades to an empty partial result; the merge itself never fails.
pub struct ProviderAggregator {
    providers: Vec<Arc<dyn ImageProvider>>,
    timeout: Duration,
}

impl ProviderAggregator {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn ImageProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub async fn search(&self, query: &str, page: PageSelector, per_page: u32) -> MergedResult {
        let (pages, current_page) = match page {
            PageSelector::Number(number) => (vec![number; self.providers.len()], number),
            PageSelector::Last => self.resolve_last_pages(query).await,
        };

        let outcomes = self.fan_out(query, &pages, per_page).await;
        self.merge(outcomes, current_page)
    }

    /// Probe round for "last page" requests: one-result calls learn each
    /// provider's page count, since providers paginate independently. The
    /// reported page becomes the deepest resolved last page.
    async fn resolve_last_pages(&self, query: &str) -> (Vec<u32>, u32) {
        let probes = self
            .fan_out(query, &vec![1; self.providers.len()], 1)
            .await;

        let pages: Vec<u32> = probes
            .into_iter()
            .map(|outcome| match outcome {
                ProviderOutcome::Success(page) => page.total_pages.max(1),
                ProviderOutcome::Failure(_) => 1,
            })
            .collect();

        let current_page = pages.iter().copied().max().unwrap_or(1);
        debug!(query, ?pages, "resolved last pages from probe round");

        (pages, current_page)
    }

    /// Fan-out/fan-in barrier. `join_all` preserves argument order, so the
    /// outcome vector lines up with `self.providers` no matter which call
    /// finishes first.
    async fn fan_out(&self, query: &str, pages: &[u32], per_page: u32) -> Vec<ProviderOutcome> {
        join_all(
            self.providers
                .iter()
                .zip(pages)
                .map(|(provider, &page)| self.fetch_one(provider.as_ref(), query, page, per_page)),
        )
        .await
    }

    async fn fetch_one(
        &self,
        provider: &dyn ImageProvider,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> ProviderOutcome {
        match tokio::time::timeout(self.timeout, provider.search(query, page, per_page)).await {
            Ok(Ok(result)) => ProviderOutcome::Success(result),
            Ok(Err(e)) => {
                warn!(provider = provider.name(), error = %e, "provider search failed");
                ProviderOutcome::Failure(e.to_string())
            }
            Err(_) => {
                warn!(
                    provider = provider.name(),
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "provider search timed out"
                );
                ProviderOutcome::Failure("timed out".to_string())
            }
        }
    }

    fn merge(&self, outcomes: Vec<ProviderOutcome>, current_page: u32) -> MergedResult {
        let mut images = Vec::new();
        let mut provider_stats = BTreeMap::new();
        let mut total_images = 0;
        let mut max_total_pages = 0;

        for (provider, outcome) in self.providers.iter().zip(outcomes) {
            let page = outcome.into_page();

            provider_stats.insert(
                provider.name().to_string(),
                ProviderStat {
                    count: page.images.len(),
                    total: page.total,
                },
            );

            total_images += page.total;
            max_total_pages = max_total_pages.max(page.total_pages);
            images.extend(page.images);
        }

        MergedResult {
            images,
            pagination: Pagination {
                current_page,
                total_images,
                has_next_page: current_page < max_total_pages,
                provider_stats,
            },
        }
    }
}
