/*!
common/src/lib.rs

Shared configuration types and helpers for Wirefeed.

This file provides:
- Config data structures (deserialized from TOML, every section optional)
- The closed set of news categories served by the aggregation service
- An async loader that merges a default file with an override file
*/

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// News sections served by `/api/news`. Unknown names fall back to `General`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    General,
    Business,
    Tech,
    Entertainment,
    Sports,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::General,
        Category::Business,
        Category::Tech,
        Category::Entertainment,
        Category::Sports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Business => "business",
            Category::Tech => "tech",
            Category::Entertainment => "entertainment",
            Category::Sports => "sports",
        }
    }

    /// Resolve a request parameter, case-insensitively, falling back to `General`.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(|r| r.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| anyhow::anyhow!("unknown category: {}", s))
    }
}

/// Wire format a feed source is published in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    /// RSS, Atom or JSON Feed; anything feed-rs understands.
    #[default]
    Rss,
    /// NewsAPI-style `{ "articles": [...] }` document.
    Headlines,
}

/// Simple feed descriptor used in category and breaking source lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    pub title: Option<String>,
    #[serde(default)]
    pub format: FeedFormat,
}

impl FeedConfig {
    pub fn rss(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: None,
            format: FeedFormat::Rss,
        }
    }
}

/// HTTP bind settings, merged into Rocket's figment at launch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Upstream fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub max_response_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            user_agent: "Wirefeed/0.1.0".to_string(),
            max_response_bytes: 5 * 1024 * 1024,
        }
    }
}

/// TTL per cache tier, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub breaking_ttl_seconds: u64,
    pub section_ttl_seconds: u64,
    pub weather_ttl_seconds: u64,
    /// Upper bound on distinct cities kept in the weather tier
    pub weather_max_cities: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            breaking_ttl_seconds: 60,
            section_ttl_seconds: 15 * 60,
            weather_ttl_seconds: 5 * 60,
            weather_max_cities: 256,
        }
    }
}

/// Page sizes for section and breaking responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// How many merged articles a section keeps in cache
    pub section_limit: usize,
    pub breaking_limit: usize,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            default_page_size: 5,
            max_page_size: 50,
            section_limit: 50,
            breaking_limit: 10,
        }
    }
}

/// Sentence counts used by the extractive summarizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Used by `/api/summarize`
    pub sentences: usize,
    pub short_sentences: usize,
    pub long_sentences: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            sentences: 2,
            short_sentences: 1,
            long_sentences: 3,
        }
    }
}

/// Sources for the breaking ticker; empty means "use the general section feeds"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakingConfig {
    pub sources: Vec<FeedConfig>,
}

/// Weather provider selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub provider: String, // "static" or "open-meteo"
    pub default_city: String,
    pub geocoding_url: String,
    pub forecast_url: String,
    pub timeout_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider: "static".to_string(),
            default_city: "Ottawa".to_string(),
            geocoding_url: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout_seconds: 10,
        }
    }
}

/// Background cache warmer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 300,
        }
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, Vec<FeedConfig>>,
    #[serde(default)]
    pub breaking: BreakingConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub warmer: WarmerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            news: NewsConfig::default(),
            summarizer: SummarizerConfig::default(),
            categories: default_categories(),
            breaking: BreakingConfig::default(),
            weather: WeatherConfig::default(),
            warmer: WarmerConfig::default(),
        }
    }
}

fn default_categories() -> BTreeMap<String, Vec<FeedConfig>> {
    let feeds = [
        (
            Category::General,
            vec![
                "https://www.cbc.ca/cmlink/rss-canada",
                "https://www.ctvnews.ca/rss/TopStories",
            ],
        ),
        (Category::Business, vec!["https://www.cbc.ca/cmlink/rss-business"]),
        (Category::Tech, vec!["https://www.cbc.ca/cmlink/rss-technology"]),
        (
            Category::Entertainment,
            vec![
                "https://www.cbc.ca/cmlink/rss-arts-entertainment",
                "https://www.ctvnews.ca/rss/entertainment",
            ],
        ),
        (
            Category::Sports,
            vec![
                "https://www.cbc.ca/cmlink/rss-sports",
                "https://www.ctvnews.ca/rss/sports",
            ],
        ),
    ];

    feeds
        .into_iter()
        .map(|(category, urls)| {
            let list = urls.into_iter().map(FeedConfig::rss).collect();
            (category.as_str().to_string(), list)
        })
        .collect()
}

impl Config {
    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence). Missing files are
    /// skipped, so with neither present the built-in defaults are returned.
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, feeds) in &self.categories {
            name.parse::<Category>()
                .with_context(|| format!("[categories.{}] is not a known category", name))?;
            for feed in feeds {
                check_feed_url(&feed.url).with_context(|| format!("in [categories.{}]", name))?;
            }
        }
        for feed in &self.breaking.sources {
            check_feed_url(&feed.url).context("in [breaking]")?;
        }

        if self.cache.breaking_ttl_seconds == 0
            || self.cache.section_ttl_seconds == 0
            || self.cache.weather_ttl_seconds == 0
        {
            bail!("cache TTLs must be greater than zero");
        }
        if self.cache.weather_max_cities == 0 {
            bail!("cache.weather_max_cities must be greater than zero");
        }
        if self.news.default_page_size == 0 || self.news.max_page_size == 0 {
            bail!("news page sizes must be greater than zero");
        }
        if self.news.section_limit < self.news.max_page_size {
            bail!(
                "news.section_limit ({}) must be at least news.max_page_size ({})",
                self.news.section_limit,
                self.news.max_page_size
            );
        }
        if self.fetch.timeout_seconds == 0 {
            bail!("fetch.timeout_seconds must be greater than zero");
        }
        match self.weather.provider.as_str() {
            "static" | "open-meteo" => {}
            other => bail!("unknown weather provider: {}", other),
        }
        Ok(())
    }

    /// Feeds configured for a category; an absent entry yields an empty slice.
    pub fn feeds_for(&self, category: Category) -> &[FeedConfig] {
        self.categories
            .get(category.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Breaking ticker sources, defaulting to the general section.
    pub fn breaking_feeds(&self) -> &[FeedConfig] {
        if self.breaking.sources.is_empty() {
            self.feeds_for(Category::General)
        } else {
            &self.breaking.sources
        }
    }
}

fn check_feed_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw).with_context(|| format!("invalid feed URL: {}", raw))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => bail!("unsupported scheme '{}' in feed URL: {}", other, raw),
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}
