//! OpenStreetMap Nominatim geocoder, usable without a key

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{GeocodeProvider, fetch_text, http_client};
use crate::TravelMapError;
use crate::config::ProvidersConfig;
use crate::error::ProviderError;
use crate::models::{AddressDetail, GeoCoordinate, GeocodeResult, Source};

pub struct NominatimProvider {
    client: Client,
    base_url: String,
    accept_language: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

fn parse_degrees(value: &str, axis: &str) -> Result<f64, ProviderError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ProviderError::Malformed(format!("Invalid {axis}: {value}")))
}

/// Parse a `/search?format=json` response body.
pub fn parse_response(body: &str) -> Result<GeocodeResult, ProviderError> {
    let places: Vec<NominatimPlace> =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let place = places.into_iter().next().ok_or(ProviderError::NotFound)?;

    let lng = parse_degrees(&place.lon, "longitude")?;
    let lat = parse_degrees(&place.lat, "latitude")?;
    let coordinate =
        GeoCoordinate::new(lng, lat).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let mut result = GeocodeResult::new(coordinate, Source::OpenStreetMap);
    if let Some(display_name) = place.display_name.filter(|name| !name.is_empty()) {
        result = result.with_address(AddressDetail {
            formatted_address: Some(display_name),
            ..AddressDetail::default()
        });
    }
    Ok(result)
}

impl NominatimProvider {
    pub fn new(config: &ProvidersConfig) -> Result<Self, TravelMapError> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.nominatim_base_url.trim_end_matches('/').to_string(),
            accept_language: config.accept_language.clone(),
        })
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    fn source(&self) -> Source {
        Source::OpenStreetMap
    }

    async fn geocode(&self, city: &str) -> Result<GeocodeResult, ProviderError> {
        let url = format!(
            "{}/search?q={}&format=json&limit=1",
            self.base_url,
            urlencoding::encode(city)
        );

        let request = self
            .client
            .get(&url)
            .header("Accept-Language", self.accept_language.as_str());
        let body = fetch_text(request).await?;
        let result = parse_response(&body)?;
        info!(
            "Found coordinates for {} using OpenStreetMap: {}",
            city,
            result.coordinate.to_lng_lat()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_place() {
        let body = r#"[{
            "place_id": 88066702,
            "lat": "48.8588897",
            "lon": "2.3200410",
            "display_name": "Paris, Île-de-France, France métropolitaine, France",
            "type": "city"
        }]"#;

        let result = parse_response(body).unwrap();
        assert_eq!(result.source, Source::OpenStreetMap);
        assert_eq!(result.coordinate.lng(), 2.320_041);
        assert_eq!(result.coordinate.lat(), 48.858_889_7);
        assert!(
            result
                .address
                .unwrap()
                .formatted_address
                .unwrap()
                .starts_with("Paris")
        );
    }

    #[test]
    fn test_empty_array_is_not_found() {
        assert_eq!(parse_response("[]"), Err(ProviderError::NotFound));
    }

    #[test]
    fn test_unparseable_coordinates() {
        let body = r#"[{"lat": "north", "lon": "2.32"}]"#;
        assert!(matches!(parse_response(body), Err(ProviderError::Malformed(_))));

        let body = r#"{"error": "Unable to geocode"}"#;
        assert!(matches!(parse_response(body), Err(ProviderError::Malformed(_))));
    }
}
