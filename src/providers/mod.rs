//! Geocoding providers
//!
//! Every provider turns a city name into a [`GeocodeResult`] with the
//! coordinate normalized to (lng, lat). Response parsing lives in plain
//! functions next to each client so it can be tested without the network.

pub mod amap;
pub mod chain;
pub mod mapquest;
pub mod nominatim;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};

use crate::TravelMapError;
use crate::config::ProvidersConfig;
use crate::error::ProviderError;
use crate::models::{GeocodeResult, Source};

pub use amap::AmapProvider;
pub use chain::ProviderChain;
pub use mapquest::MapQuestProvider;
pub use nominatim::NominatimProvider;

/// A geocoding backend.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    fn source(&self) -> Source;

    /// Look up `city`; a well-formed empty answer is [`ProviderError::NotFound`].
    async fn geocode(&self, city: &str) -> Result<GeocodeResult, ProviderError>;
}

pub(crate) fn http_client(config: &ProvidersConfig) -> Result<Client, TravelMapError> {
    Client::builder()
        .timeout(config.timeout())
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| TravelMapError::config(format!("Failed to create HTTP client: {e}")))
}

/// Send `request` and return the body of a 2xx response.
pub(crate) async fn fetch_text(
    request: reqwest::RequestBuilder,
) -> Result<String, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }

    response
        .text()
        .await
        .map_err(|e| ProviderError::Network(format!("Failed to read response body: {e}")))
}

/// Accepts a string, or anything else (AMap sends `[]` for missing fields)
/// as absent. Blank strings are absent too.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}
