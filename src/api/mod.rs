//! HTTP geocoding proxy
//!
//! `/geocode` always answers with a coordinate. `/amap-geocode` talks to the
//! primary provider only and reports rate limiting and provider failures as
//! errors.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::VERSION;
use crate::cache::CacheStats;
use crate::models::{GeocodeResult, Source};
use crate::queue::Priority;
use crate::resolver::GeocodeResolver;

#[derive(Debug, Default, Deserialize)]
pub struct GeocodeParams {
    pub city: Option<String>,
    pub refresh: Option<String>,
    pub priority: Option<String>,
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("true" | "1"))
}

impl GeocodeParams {
    fn city(&self) -> Result<String, ApiError> {
        self.city
            .as_deref()
            .map(str::trim)
            .filter(|city| !city.is_empty())
            .map(ToString::to_string)
            .ok_or(ApiError::MissingCity)
    }

    fn refresh(&self) -> bool {
        is_truthy(self.refresh.as_deref())
    }

    fn priority(&self) -> Priority {
        match self.priority.as_deref() {
            Some("high") => Priority::High,
            other if is_truthy(other) => Priority::High,
            _ => Priority::Normal,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GeocodeEntry {
    /// `"lng,lat"`
    pub location: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GeocodeResponse {
    pub status: &'static str,
    pub info: String,
    pub source: Source,
    pub geocodes: Vec<GeocodeEntry>,
}

impl GeocodeResponse {
    #[must_use]
    pub fn new(city: &str, result: &GeocodeResult) -> Self {
        let info = match result.source {
            Source::Amap => "OK (AMap)",
            Source::OpenStreetMap => "OK (OpenStreetMap)",
            Source::MapQuest => "OK (MapQuest)",
            Source::LocalDb => "OK (Local DB)",
            Source::Cache => "OK (cached)",
            Source::Default => "Using default coordinates",
        };

        let address = result.address.clone().unwrap_or_default();
        Self {
            status: "1",
            info: info.to_string(),
            source: result.source,
            geocodes: vec![GeocodeEntry {
                location: result.coordinate.to_lng_lat(),
                city: address.city.unwrap_or_else(|| city.to_string()),
                formatted_address: address.formatted_address,
                province: address.province,
                district: address.district,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    info: &'static str,
    error: String,
    #[serde(rename = "queueLength", skip_serializing_if = "Option::is_none")]
    queue_length: Option<usize>,
    /// Milliseconds
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after: Option<u128>,
}

#[derive(Debug)]
pub enum ApiError {
    MissingCity,
    RateLimited { queue_length: usize, retry_after_ms: u128 },
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MissingCity => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    status: "0",
                    info: "Invalid request",
                    error: "City parameter is required".to_string(),
                    queue_length: None,
                    retry_after: None,
                }),
            )
                .into_response(),
            ApiError::RateLimited {
                queue_length,
                retry_after_ms,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_ms.div_ceil(1000).to_string())],
                Json(ErrorBody {
                    status: "0",
                    info: "Rate limit exceeded",
                    error: "Geocoding queue is full. Try again later.".to_string(),
                    queue_length: Some(queue_length),
                    retry_after: Some(retry_after_ms),
                }),
            )
                .into_response(),
            ApiError::Upstream(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    status: "0",
                    info: "Geocoding error",
                    error,
                    queue_length: None,
                    retry_after: None,
                }),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub provider: Source,
    pub pending: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// False when the on-disk store could not be opened
    pub persistent_available: bool,
    pub persistent: CacheStats,
    pub memory_entries: usize,
    pub queues: Vec<QueueStatus>,
}

pub fn router(resolver: Arc<GeocodeResolver>) -> Router {
    Router::new()
        .route("/geocode", get(geocode))
        .route("/amap-geocode", get(amap_geocode))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/sweep", post(cache_sweep))
        .route("/health", get(health))
        .with_state(resolver)
}

async fn geocode(
    State(resolver): State<Arc<GeocodeResolver>>,
    Query(params): Query<GeocodeParams>,
) -> Result<Json<GeocodeResponse>, ApiError> {
    let city = params.city()?;
    let refresh = params.refresh();
    info!(
        "Geocoding city: {}{}",
        city,
        if refresh { " (forced refresh)" } else { "" }
    );

    let result = resolver.resolve(&city, refresh).await;
    Ok(Json(GeocodeResponse::new(&city, &result)))
}

async fn amap_geocode(
    State(resolver): State<Arc<GeocodeResolver>>,
    Query(params): Query<GeocodeParams>,
) -> Result<Json<GeocodeResponse>, ApiError> {
    let city = params.city()?;
    let priority = params.priority();

    match resolver.query_primary(&city, params.refresh(), priority).await {
        Ok(result) => Ok(Json(GeocodeResponse::new(&city, &result))),
        Err(diagnostic) if diagnostic.is_queue_full() => {
            let (queue_length, min_interval) = resolver
                .providers()
                .primary()
                .map(|queue| (queue.queue_length(), queue.settings().min_interval))
                .unwrap_or_default();
            warn!("Rate limited request for {}: {}", city, diagnostic);
            Err(ApiError::RateLimited {
                queue_length,
                retry_after_ms: min_interval.as_millis() * queue_length as u128,
            })
        }
        Err(diagnostic) => {
            warn!("Primary geocoding failed for {}: {}", city, diagnostic);
            Err(ApiError::Upstream(diagnostic.to_string()))
        }
    }
}

async fn cache_stats(State(resolver): State<Arc<GeocodeResolver>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        persistent_available: resolver.cache_available(),
        persistent: resolver.cache_stats(),
        memory_entries: resolver.memory_entries(),
        queues: resolver
            .queue_lengths()
            .into_iter()
            .map(|(provider, pending)| QueueStatus { provider, pending })
            .collect(),
    })
}

async fn cache_sweep(State(resolver): State<Arc<GeocodeResolver>>) -> Json<serde_json::Value> {
    let removed = resolver.sweep_expired();
    Json(serde_json::json!({ "removed": removed }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": VERSION }))
}
