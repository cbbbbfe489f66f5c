//! Aggregation service: the single entry point used by the HTTP layer.
//!
//! Every read goes through a cache tier. Upstream failures degrade to the
//! previous entry, then to a placeholder; only weather, which has no sensible
//! placeholder, can surface an error.

use chrono::{DateTime, Utc};
use common::{Category, Config, SummarizerConfig};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregate::Aggregator;
use crate::cache::{normalize_key, Freshness, Served, TieredCache};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::fetcher::SourceFetcher;
use crate::model::{Article, BriefedArticle, WeatherReport};
use crate::normalize::NO_LINK;
use crate::summarize::summarize;
use crate::weather::WeatherProvider;

const BREAKING_KEY: &str = "breaking";
const PLACEHOLDER_SOURCE: &str = "wirefeed";

/// Where the articles of a [`NewsPage`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Fresh,
    Refreshed,
    Stale,
    Placeholder,
}

impl From<Freshness> for PageStatus {
    fn from(freshness: Freshness) -> Self {
        match freshness {
            Freshness::Fresh => PageStatus::Fresh,
            Freshness::Refreshed => PageStatus::Refreshed,
            Freshness::Stale => PageStatus::Stale,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsPage {
    pub articles: Vec<Article>,
    pub status: PageStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub breaking: usize,
    pub sections: usize,
    pub weather: usize,
}

pub struct NewsService {
    config: Arc<Config>,
    aggregator: Aggregator,
    weather: Arc<dyn WeatherProvider>,
    cache: TieredCache,
    clock: Arc<dyn Clock>,
}

impl NewsService {
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn SourceFetcher>,
        weather: Arc<dyn WeatherProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(fetcher, clock.clone()),
            cache: TieredCache::new(&config.cache, clock.clone()),
            config,
            weather,
            clock,
        }
    }

    /// Requested page size, or the default when absent or zero, capped at the maximum.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        let news = &self.config.news;
        match requested {
            Some(size) if size > 0 => size.min(news.max_page_size),
            _ => news.default_page_size.min(news.max_page_size),
        }
    }

    /// Newest articles of a section. Unknown or missing categories read `general`.
    pub async fn news(&self, category: Option<&str>, page_size: Option<usize>) -> NewsPage {
        let category = Category::parse_or_default(category);
        let size = self.page_size(page_size);

        let served = self
            .cache
            .sections
            .get_or_refresh(category.as_str(), || self.section_job(category))
            .await;

        match served {
            Ok(served) => NewsPage {
                articles: served.entry.value.iter().take(size).cloned().collect(),
                status: served.freshness.into(),
            },
            Err(error) => {
                warn!(%category, error = %error, "no cached section, serving placeholder");
                NewsPage {
                    articles: placeholder_section(category, size, self.clock.now()),
                    status: PageStatus::Placeholder,
                }
            }
        }
    }

    /// Breaking ticker with short and long summaries attached.
    pub async fn breaking(&self) -> Vec<BriefedArticle> {
        let served = self
            .cache
            .breaking
            .get_or_refresh(BREAKING_KEY, || self.breaking_job())
            .await;

        match served {
            Ok(served) => served.entry.value.clone(),
            Err(error) => {
                warn!(error = %error, "no cached breaking news, serving placeholder");
                vec![placeholder_breaking(self.clock.now(), &self.config.summarizer)]
            }
        }
    }

    /// Current weather for `city`, or the configured default city.
    pub async fn weather(&self, city: Option<&str>) -> std::result::Result<Served<WeatherReport>, Arc<Error>> {
        let city = city
            .map(normalize_key)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| normalize_key(&self.config.weather.default_city));

        // the provider sees the cache key, so the report does not depend on who asked first
        let provider = self.weather.clone();
        let key = city.clone();
        self.cache
            .weather
            .get_or_refresh(&key, move || async move { Ok::<_, Error>(provider.current(&city).await?) })
            .await
    }

    pub fn summarize(&self, text: &str) -> String {
        summarize(text, self.config.summarizer.sentences)
    }

    /// Refresh breaking news and every section once, regardless of freshness.
    pub async fn warm(&self) {
        let breaking = async {
            if let Err(error) = self.cache.breaking.refresh(BREAKING_KEY, || self.breaking_job()).await {
                warn!(error = %error, "warm-up of breaking news failed");
            }
        };
        let sections = join_all(Category::ALL.into_iter().map(|category| async move {
            if let Err(error) = self
                .cache
                .sections
                .refresh(category.as_str(), || self.section_job(category))
                .await
            {
                warn!(%category, error = %error, "warm-up of section failed");
            }
        }));

        futures::join!(breaking, sections);
        info!(stats = ?self.cache_stats(), "cache warm-up pass complete");
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            breaking: self.cache.breaking.len(),
            sections: self.cache.sections.len(),
            weather: self.cache.weather.len(),
        }
    }

    fn section_job(&self, category: Category) -> BoxFuture<'static, Result<Vec<Article>>> {
        let aggregator = self.aggregator.clone();
        let sources = self.config.feeds_for(category).to_vec();
        let limit = self.config.news.section_limit;
        async move { aggregator.aggregate(category.as_str(), &sources, limit).await }.boxed()
    }

    fn breaking_job(&self) -> BoxFuture<'static, Result<Vec<BriefedArticle>>> {
        let aggregator = self.aggregator.clone();
        let sources = self.config.breaking_feeds().to_vec();
        let limit = self.config.news.breaking_limit;
        let summarizer = self.config.summarizer.clone();
        async move {
            let articles = aggregator.aggregate(BREAKING_KEY, &sources, limit).await?;
            Ok::<Vec<BriefedArticle>, Error>(articles
                .into_iter()
                .map(|article| brief(article, &summarizer))
                .collect())
        }
        .boxed()
    }
}

/// Attach summaries, built from the content or, when it is empty, the title.
fn brief(article: Article, summarizer: &SummarizerConfig) -> BriefedArticle {
    let text = if article.raw_content.trim().is_empty() {
        article.title.as_str()
    } else {
        article.raw_content.as_str()
    };
    let summary_short = summarize(text, summarizer.short_sentences);
    let summary_long = summarize(text, summarizer.long_sentences);
    BriefedArticle {
        article,
        summary_short,
        summary_long,
    }
}

fn placeholder_section(category: Category, size: usize, now: DateTime<Utc>) -> Vec<Article> {
    (1..=size)
        .map(|i| Article {
            id: format!("placeholder:{}:{}", category, i),
            title: format!("Fallback {} News {}", category, i),
            link: NO_LINK.to_string(),
            published_at: now,
            source: PLACEHOLDER_SOURCE.to_string(),
            raw_content: format!("Fallback description for {} news {}.", category, i),
            image: None,
        })
        .collect()
}

fn placeholder_breaking(now: DateTime<Utc>, summarizer: &SummarizerConfig) -> BriefedArticle {
    brief(
        Article {
            id: "placeholder:breaking".to_string(),
            title: "Breaking news is temporarily unavailable".to_string(),
            link: NO_LINK.to_string(),
            published_at: now,
            source: PLACEHOLDER_SOURCE.to_string(),
            raw_content: "Live sources could not be reached. Check back shortly.".to_string(),
            image: None,
        },
        summarizer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::SourceFetchError;
    use crate::model::{HeadlineItem, RawItem};
    use crate::weather::StaticWeather;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use common::FeedConfig;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Every source answers with the same dated items until switched off.
    struct StubFetcher {
        items: Vec<HeadlineItem>,
        down: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceFetcher for StubFetcher {
        async fn fetch(&self, source: &FeedConfig) -> std::result::Result<Vec<RawItem>, SourceFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(SourceFetchError::Status {
                    url: source.url.clone(),
                    status: 503,
                });
            }
            Ok(self
                .items
                .iter()
                .map(|item| RawItem::Headline {
                    source: source.url.clone(),
                    item: item.clone(),
                })
                .collect())
        }
    }

    fn story(n: u32) -> HeadlineItem {
        HeadlineItem {
            title: Some(format!("Story {}", n)),
            description: Some(format!("Story {} happened. More on story {} later.", n, n)),
            url: Some(format!("https://news.example/{}", n)),
            published_at: Some(format!("2026-02-{:02}T08:00:00Z", 10 + n)),
            ..HeadlineItem::default()
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.categories.clear();
        config
            .categories
            .insert("sports".to_string(), vec![FeedConfig::rss("https://sports.example/rss")]);
        config
            .categories
            .insert("general".to_string(), vec![FeedConfig::rss("https://general.example/rss")]);
        config
    }

    fn service(items: Vec<HeadlineItem>) -> (NewsService, Arc<StubFetcher>, Arc<ManualClock>) {
        let fetcher = Arc::new(StubFetcher {
            items,
            down: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
        let service = NewsService::new(
            Arc::new(config()),
            fetcher.clone(),
            Arc::new(StaticWeather),
            clock.clone(),
        );
        (service, fetcher, clock)
    }

    #[tokio::test]
    async fn sports_page_of_three_is_newest_first() {
        let (service, _, _) = service((1..=5).map(story).collect());
        let page = service.news(Some("sports"), Some(3)).await;

        assert_eq!(page.status, PageStatus::Refreshed);
        let titles: Vec<&str> = page.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Story 5", "Story 4", "Story 3"]);
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let (service, fetcher, _) = service((1..=5).map(story).collect());
        service.news(Some("sports"), None).await;
        let page = service.news(Some("SPORTS"), Some(2)).await;

        assert_eq!(page.status, PageStatus::Fresh);
        assert_eq!(page.articles.len(), 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn page_size_defaults_and_cap() {
        let (service, _, _) = service(vec![]);
        assert_eq!(service.page_size(None), 5);
        assert_eq!(service.page_size(Some(0)), 5);
        assert_eq!(service.page_size(Some(7)), 7);
        assert_eq!(service.page_size(Some(10_000)), 50);
    }

    #[tokio::test]
    async fn failed_sources_without_cache_yield_placeholders() {
        let (service, fetcher, _) = service(vec![story(1)]);
        fetcher.down.store(true, Ordering::SeqCst);

        let page = service.news(Some("sports"), Some(3)).await;
        assert_eq!(page.status, PageStatus::Placeholder);
        let titles: Vec<&str> = page.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Fallback sports News 1", "Fallback sports News 2", "Fallback sports News 3"]
        );
        // placeholders are not cached
        assert_eq!(service.cache_stats().sections, 0);
        assert!(service.cache.sections.get("sports").is_none());
    }

    #[tokio::test]
    async fn expired_section_survives_upstream_outage() {
        let (service, fetcher, clock) = service((1..=3).map(story).collect());
        let first = service.news(None, None).await;

        clock.advance(Duration::minutes(16));
        fetcher.down.store(true, Ordering::SeqCst);
        let page = service.news(None, None).await;

        assert_eq!(page.status, PageStatus::Stale);
        assert_eq!(page.articles, first.articles);
    }

    #[tokio::test]
    async fn unknown_category_reads_general() {
        let (service, _, _) = service(vec![story(1)]);
        service.news(Some("astrology"), None).await;
        assert!(service.cache.sections.get("general").is_some());
    }

    #[tokio::test]
    async fn breaking_articles_carry_summaries() {
        let (service, _, _) = service(vec![story(1)]);
        let breaking = service.breaking().await;

        assert_eq!(breaking.len(), 1);
        assert_eq!(breaking[0].summary_short, "Story 1 happened.");
        assert_eq!(breaking[0].summary_long, "Story 1 happened. More on story 1 later.");
    }

    #[tokio::test]
    async fn breaking_is_capped() {
        let (service, _, _) = service((1..=15).map(story).collect());
        assert_eq!(service.breaking().await.len(), 10);
    }

    #[tokio::test]
    async fn breaking_placeholder_when_nothing_cached() {
        let (service, fetcher, _) = service(vec![]);
        fetcher.down.store(true, Ordering::SeqCst);

        let breaking = service.breaking().await;
        assert_eq!(breaking.len(), 1);
        assert_eq!(breaking[0].article.link, NO_LINK);
        assert!(!breaking[0].summary_short.is_empty());
    }

    #[tokio::test]
    async fn weather_defaults_to_configured_city() {
        let (service, _, _) = service(vec![]);
        let served = service.weather(None).await.expect("weather");
        assert_eq!(served.entry.value.name, "Ottawa");

        let served = service.weather(Some("  ottawa ")).await.expect("weather");
        assert_eq!(served.freshness, Freshness::Fresh);
        assert_eq!(service.cache_stats().weather, 1);
    }

    #[tokio::test]
    async fn weather_name_does_not_follow_first_spelling() {
        let (service, _, _) = service(vec![]);
        let first = service.weather(Some("NEW   YORK")).await.expect("weather");
        assert_eq!(first.entry.value.name, "New York");

        let second = service.weather(Some("new york")).await.expect("weather");
        assert_eq!(second.freshness, Freshness::Fresh);
        assert_eq!(second.entry.value.name, "New York");
    }

    #[tokio::test]
    async fn summarize_uses_configured_sentence_count() {
        let (service, _, _) = service(vec![]);
        assert_eq!(
            service.summarize("AI grows fast. Stocks rise today. Rain expected tomorrow. AI stocks surge."),
            "AI grows fast. AI stocks surge."
        );
    }

    #[tokio::test]
    async fn warm_fills_every_tier_key() {
        let (service, fetcher, _) = service(vec![story(1)]);
        service.warm().await;

        let stats = service.cache_stats();
        assert_eq!(stats.breaking, 1);
        // business, tech and entertainment have no sources configured here
        assert_eq!(stats.sections, 2);
        // general and sports have one source each, breaking reuses general
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }
}
