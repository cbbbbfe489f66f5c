use anyhow::Context;
use async_trait::async_trait;
use common::{FeedConfig, FeedFormat, FetchConfig};
use feed_rs::parser;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SourceFetchError;
use crate::model::{HeadlinesDocument, RawItem};

/// Retrieves the raw items of one upstream source.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &FeedConfig) -> Result<Vec<RawItem>, SourceFetchError>;
}

/// Fetch one source, turning a failure into a logged skip.
/// No retry: the next refresh of the owning cache key is the retry.
pub async fn fetch_isolated(fetcher: &dyn SourceFetcher, source: &FeedConfig) -> Option<Vec<RawItem>> {
    match fetcher.fetch(source).await {
        Ok(items) => {
            debug!(source = %source.url, items = items.len(), "source fetched");
            Some(items)
        }
        Err(e) => {
            warn!(source = %source.url, error_class = e.class(), error = %e, "source failed, skipping");
            None
        }
    }
}

/// reqwest-backed fetcher shared by every aggregation pass.
pub struct HttpFetcher {
    client: Client,
    max_response_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            max_response_bytes: config.max_response_bytes,
        })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &FeedConfig) -> Result<Vec<RawItem>, SourceFetchError> {
        let url = source.url.as_str();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceFetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceFetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let limit = self.max_response_bytes;
        if let Some(announced) = response.content_length().filter(|len| *len > limit) {
            return Err(SourceFetchError::TooLarge {
                url: url.to_string(),
                bytes: announced,
                limit,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceFetchError::from_reqwest(url, e))?;
        if bytes.len() as u64 > limit {
            return Err(SourceFetchError::TooLarge {
                url: url.to_string(),
                bytes: bytes.len() as u64,
                limit,
            });
        }

        match source.format {
            FeedFormat::Rss => parse_syndicated(bytes.as_ref(), url, source.title.as_deref()),
            FeedFormat::Headlines => parse_headlines(bytes.as_ref(), url, source.title.as_deref()),
        }
    }
}

/// Parse an RSS/Atom/JSON Feed document.
///
/// Entries without a guid keep an empty id so the normalizer can apply its own
/// link / title fallback instead of a generated hash.
pub fn parse_syndicated(
    body: &[u8],
    url: &str,
    configured_title: Option<&str>,
) -> Result<Vec<RawItem>, SourceFetchError> {
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(body)
        .map_err(|e| SourceFetchError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let label = configured_title
        .map(str::to_string)
        .or_else(|| {
            feed.title
                .as_ref()
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| host_label(url));

    Ok(feed
        .entries
        .into_iter()
        .map(|entry| RawItem::Syndicated {
            source: label.clone(),
            entry: Box::new(entry),
        })
        .collect())
}

/// Parse a NewsAPI-style `{ "articles": [...] }` document.
pub fn parse_headlines(
    body: &[u8],
    url: &str,
    configured_title: Option<&str>,
) -> Result<Vec<RawItem>, SourceFetchError> {
    let doc: HeadlinesDocument =
        serde_json::from_slice(body).map_err(|e| SourceFetchError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let label = configured_title
        .map(str::to_string)
        .unwrap_or_else(|| host_label(url));

    Ok(doc
        .articles
        .into_iter()
        .map(|item| RawItem::Headline {
            source: label.clone(),
            item,
        })
        .collect())
}

/// Site name derived from a feed URL: `https://www.cbc.ca/...` → `cbc.ca`.
fn host_label(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| url.to_string())
}
