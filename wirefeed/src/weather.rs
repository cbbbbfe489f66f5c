use anyhow::{bail, Context};
use async_trait::async_trait;
use common::WeatherConfig;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::WeatherError;
use crate::model::WeatherReport;

/// Current-conditions lookup for one city.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, city: &str) -> Result<WeatherReport, WeatherError>;
}

/// Build the provider named by `weather.provider`.
pub fn provider_from_config(config: &WeatherConfig) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    match config.provider.as_str() {
        "static" => Ok(Arc::new(StaticWeather)),
        "open-meteo" => Ok(Arc::new(OpenMeteoWeather::new(
            &config.geocoding_url,
            &config.forecast_url,
            config.timeout_seconds,
        )?)),
        other => bail!("unknown weather provider '{}'", other),
    }
}

/// Fixed fair-weather report, no network access.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticWeather;

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn current(&self, city: &str) -> Result<WeatherReport, WeatherError> {
        Ok(WeatherReport {
            name: title_case(city),
            temp: 20.0,
            description: "Clear sky".to_string(),
            humidity: 50.0,
        })
    }
}

fn title_case(city: &str) -> String {
    city.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Open-Meteo geocoding + forecast APIs (no key required).
pub struct OpenMeteoWeather {
    client: reqwest::Client,
    geocoding_url: String,
    forecast_url: String,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    weather_code: u8,
}

impl OpenMeteoWeather {
    pub fn new(geocoding_url: &str, forecast_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build weather client")?;

        Ok(Self {
            client,
            geocoding_url: geocoding_url.to_string(),
            forecast_url: forecast_url.to_string(),
        })
    }

    async fn locate(&self, city: &str) -> Result<Place, WeatherError> {
        let response = self
            .client
            .get(&self.geocoding_url)
            .query(&[("name", city), ("count", "1")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }

        let found: GeocodingResponse = response.json().await?;
        found
            .results
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::UnknownCity(city.to_string()))
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoWeather {
    async fn current(&self, city: &str) -> Result<WeatherReport, WeatherError> {
        let place = self.locate(city).await?;
        debug!(city, place = %place.name, lat = place.latitude, lon = place.longitude, "city geocoded");

        let response = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,weather_code".to_string(),
                ),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }

        let forecast: ForecastResponse = response.json().await?;
        Ok(WeatherReport {
            name: place.name,
            temp: forecast.current.temperature_2m,
            description: describe(forecast.current.weather_code).to_string(),
            humidity: forecast.current.relative_humidity_2m,
        })
    }
}

/// WMO weather interpretation code → text.
pub fn describe(code: u8) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 | 63 | 65 => "Rain",
        66 | 67 => "Freezing rain",
        71 | 73 | 75 => "Snow",
        77 => "Snow grains",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm with hail",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_weather_echoes_city() {
        let report = StaticWeather.current("Halifax").await.unwrap();
        assert_eq!(report.name, "Halifax");
        assert_eq!(report.temp, 20.0);
        assert_eq!(report.description, "Clear sky");
        assert_eq!(report.humidity, 50.0);
    }

    #[tokio::test]
    async fn static_weather_title_cases_city() {
        let report = StaticWeather.current("st. john's").await.unwrap();
        assert_eq!(report.name, "St. John's");
    }

    #[test]
    fn wmo_codes() {
        assert_eq!(describe(0), "Clear sky");
        assert_eq!(describe(63), "Rain");
        assert_eq!(describe(81), "Rain showers");
        assert_eq!(describe(42), "Unknown");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = WeatherConfig {
            provider: "crystal-ball".to_string(),
            ..WeatherConfig::default()
        };
        assert!(provider_from_config(&config).is_err());
    }
}
