//! MapQuest geocoding API

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{GeocodeProvider, fetch_text, http_client, lenient_string};
use crate::TravelMapError;
use crate::config::ProvidersConfig;
use crate::error::ProviderError;
use crate::models::{AddressDetail, GeoCoordinate, GeocodeResult, Source};

pub struct MapQuestProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MapQuestResponse {
    #[serde(default)]
    results: Vec<MapQuestResult>,
}

#[derive(Debug, Deserialize)]
struct MapQuestResult {
    #[serde(default)]
    locations: Vec<MapQuestLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapQuestLocation {
    lat_lng: LatLng,
    #[serde(default, deserialize_with = "lenient_string")]
    street: Option<String>,
    #[serde(default, rename = "adminArea3", deserialize_with = "lenient_string")]
    state: Option<String>,
    #[serde(default, rename = "adminArea4", deserialize_with = "lenient_string")]
    county: Option<String>,
    #[serde(default, rename = "adminArea5", deserialize_with = "lenient_string")]
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// Parse a `/geocoding/v1/address` response body.
pub fn parse_response(body: &str) -> Result<GeocodeResult, ProviderError> {
    let response: MapQuestResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let location = response
        .results
        .into_iter()
        .next()
        .and_then(|result| result.locations.into_iter().next())
        .ok_or(ProviderError::NotFound)?;

    let coordinate = GeoCoordinate::new(location.lat_lng.lng, location.lat_lng.lat)
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let address = AddressDetail {
        province: location.state,
        city: location.city,
        district: location.county,
        formatted_address: location.street,
    };
    Ok(GeocodeResult::new(coordinate, Source::MapQuest).with_address(address))
}

impl MapQuestProvider {
    pub fn new(api_key: &str, config: &ProvidersConfig) -> Result<Self, TravelMapError> {
        Ok(Self {
            client: http_client(config)?,
            api_key: api_key.to_string(),
            base_url: config.mapquest_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeocodeProvider for MapQuestProvider {
    fn source(&self) -> Source {
        Source::MapQuest
    }

    async fn geocode(&self, city: &str) -> Result<GeocodeResult, ProviderError> {
        let url = format!(
            "{}/geocoding/v1/address?key={}&location={}",
            self.base_url,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(city)
        );

        let body = fetch_text(self.client.get(&url)).await?;
        let result = parse_response(&body)?;
        info!(
            "Found coordinates for {} using MapQuest: {}",
            city,
            result.coordinate.to_lng_lat()
        );
        Ok(result)
    }
}
