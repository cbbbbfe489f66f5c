use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{get, post, routes, Build, FromForm, Rocket, State};
use serde::{Deserialize, Serialize};

use common::ServerConfig;

use crate::model::{BriefedArticle, WeatherReport};
use crate::service::{CacheStats, NewsPage, NewsService};

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub service: Arc<NewsService>,
}

impl AppState {
    pub fn new(service: Arc<NewsService>) -> Self {
        Self {
            started_at: Utc::now(),
            service,
        }
    }
}

/// Response structure for `/api/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    cached: CacheStats,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Query string of `/api/news`. `pageSize` stays text so a bad value means "default".
#[derive(FromForm)]
struct NewsQuery {
    category: Option<String>,
    #[field(name = "pageSize")]
    page_size: Option<String>,
}

#[derive(Deserialize)]
struct SummarizeRequest {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct SummarizeResponse {
    summary: String,
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Uptime and the number of keys held by each cache tier.
#[get("/api/status")]
async fn api_status(state: &State<AppState>) -> Json<StatusResponse> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(StatusResponse {
        status: "ok",
        uptime_seconds: uptime,
        cached: state.service.cache_stats(),
    })
}

#[get("/api/news?<query..>")]
async fn news(state: &State<AppState>, query: NewsQuery) -> Json<NewsPage> {
    let page_size = query
        .page_size
        .as_deref()
        .and_then(|raw| raw.trim().parse::<usize>().ok());
    Json(state.service.news(query.category.as_deref(), page_size).await)
}

#[get("/api/breaking")]
async fn breaking(state: &State<AppState>) -> Json<Vec<BriefedArticle>> {
    Json(state.service.breaking().await)
}

/// 502 only when the city has never been fetched successfully.
#[get("/api/weather?<city>")]
async fn weather(
    state: &State<AppState>,
    city: Option<String>,
) -> Result<Json<WeatherReport>, status::Custom<Json<ErrorBody>>> {
    match state.service.weather(city.as_deref()).await {
        Ok(served) => Ok(Json(served.entry.value.clone())),
        Err(e) => Err(status::Custom(
            Status::BadGateway,
            Json(ErrorBody { error: e.to_string() }),
        )),
    }
}

#[post("/api/summarize", data = "<body>")]
async fn summarize(state: &State<AppState>, body: Json<SummarizeRequest>) -> Json<SummarizeResponse> {
    Json(SummarizeResponse {
        summary: state.service.summarize(&body.text),
    })
}

/// Build the Rocket instance with managed state and every route mounted.
pub fn build_rocket(state: AppState, figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(state)
        .mount("/", routes![health, api_status, news, breaking, weather, summarize])
}

/// Build and launch the Rocket server, applying `server.bind` and `server.port`.
///
/// Blocks until Rocket shuts down (Ctrl-C or SIGTERM).
pub async fn launch_rocket(service: Arc<NewsService>, server: &ServerConfig) -> Result<()> {
    let figment = rocket::Config::figment()
        .merge(("address", server.bind.clone()))
        .merge(("port", server.port));

    tracing::info!(bind = %server.bind, port = server.port, "Starting Rocket HTTP server");
    build_rocket(AppState::new(service), figment)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
