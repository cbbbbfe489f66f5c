//! Error taxonomy for the aggregation pipeline.
//!
//! Failures are absorbed at the lowest level that has a safe default:
//! a `SourceFetchError` only drops its source, an aggregation `Error` is
//! answered by a stale cache entry or a placeholder in the façade.

use thiserror::Error;

/// One upstream feed could not be used during a pass.
#[derive(Debug, Error)]
pub enum SourceFetchError {
    #[error("{url} timed out")]
    Timeout { url: String },

    #[error("could not connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} sent {bytes} bytes, more than the {limit} byte cap")]
    TooLarge { url: String, bytes: u64, limit: u64 },

    #[error("could not parse {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl SourceFetchError {
    /// Short error class recorded with every failed source.
    pub fn class(&self) -> &'static str {
        match self {
            SourceFetchError::Timeout { .. } => "timeout",
            SourceFetchError::Connect { .. } => "connect",
            SourceFetchError::Request { .. } => "request",
            SourceFetchError::Status { .. } => "status",
            SourceFetchError::TooLarge { .. } => "too_large",
            SourceFetchError::Malformed { .. } => "malformed",
        }
    }

    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            SourceFetchError::Timeout { url }
        } else if err.is_connect() {
            SourceFetchError::Connect { url, source: err }
        } else {
            SourceFetchError::Request { url, source: err }
        }
    }
}

/// Weather lookups, surfaced through the weather tier's producer.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("no location matches '{0}'")]
    UnknownCity(String),

    #[error("weather request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("weather service answered with status {0}")]
    Status(u16),
}

/// Producer failures seen by the tiered cache.
#[derive(Debug, Error)]
pub enum Error {
    #[error("all {failed} sources for '{key}' failed")]
    AllSourcesFailed { key: String, failed: usize },

    #[error("sources for '{key}' returned no items")]
    NoData { key: String },

    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error("refresh task for '{key}' did not finish: {reason}")]
    RefreshAborted { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
