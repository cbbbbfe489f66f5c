use common::FeedConfig;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::fetcher::{fetch_isolated, SourceFetcher};
use crate::model::Article;
use crate::normalize::normalize;

/// Fans out to every source of a key and merges what comes back.
#[derive(Clone)]
pub struct Aggregator {
    fetcher: Arc<dyn SourceFetcher>,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self { fetcher, clock }
    }

    /// Fetch, normalize, dedupe by id (first wins), sort newest first and keep `limit`.
    ///
    /// Ties on `published_at` keep fetch order: source order as configured,
    /// then item order within the source.
    pub async fn aggregate(&self, key: &str, sources: &[FeedConfig], limit: usize) -> Result<Vec<Article>> {
        let fetched = join_all(
            sources
                .iter()
                .map(|source| fetch_isolated(self.fetcher.as_ref(), source)),
        )
        .await;

        let failed = fetched.iter().filter(|r| r.is_none()).count();
        if !sources.is_empty() && failed == sources.len() {
            return Err(Error::AllSourcesFailed {
                key: key.to_string(),
                failed,
            });
        }

        let now = self.clock.now();
        let mut seen = HashSet::new();
        let mut articles: Vec<Article> = fetched
            .into_iter()
            .flatten()
            .flatten()
            .map(|raw| normalize(&raw, now))
            .filter(|article| seen.insert(article.id.clone()))
            .collect();

        if articles.is_empty() {
            return Err(Error::NoData { key: key.to_string() });
        }

        let merged = articles.len();
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        articles.truncate(limit);

        info!(
            key,
            sources = sources.len(),
            failed,
            merged,
            kept = articles.len(),
            "aggregation pass complete"
        );
        Ok(articles)
    }
}
