use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical content unit produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub raw_content: String,
    pub image: Option<String>,
}

/// Article plus the short and long extractive summaries served by `/api/breaking`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefedArticle {
    #[serde(flatten)]
    pub article: Article,
    pub summary_short: String,
    pub summary_long: String,
}

/// An item as it came off the wire, tagged by source format.
#[derive(Debug, Clone)]
pub enum RawItem {
    /// RSS, Atom or JSON Feed entry. `source` is the label of the feed it came from.
    Syndicated {
        source: String,
        entry: Box<feed_rs::model::Entry>,
    },
    /// Article object from a NewsAPI-style headlines document.
    Headline { source: String, item: HeadlineItem },
}

/// Body of a headlines document: `{ "status": "ok", "articles": [...] }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeadlinesDocument {
    #[serde(default)]
    pub articles: Vec<HeadlineItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineItem {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    /// Kept as text: one bad date must not reject the whole document.
    pub published_at: Option<String>,
    pub source: Option<HeadlineSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HeadlineSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Current conditions for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub name: String,
    pub temp: f64,
    pub description: String,
    pub humidity: f64,
}
