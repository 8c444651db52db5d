//! AMap (高德) web service geocoder

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{GeocodeProvider, fetch_text, http_client, lenient_string};
use crate::TravelMapError;
use crate::config::ProvidersConfig;
use crate::error::ProviderError;
use crate::models::{AddressDetail, GeoCoordinate, GeocodeResult, Source};

pub struct AmapProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AmapResponse {
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    geocodes: Vec<AmapGeocode>,
}

#[derive(Debug, Deserialize)]
struct AmapGeocode {
    location: String,
    #[serde(default, deserialize_with = "lenient_string")]
    province: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    district: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    formatted_address: Option<String>,
}

impl AmapGeocode {
    fn address(self) -> AddressDetail {
        let formatted_address = self.formatted_address.or_else(|| {
            let joined = [&self.province, &self.city, &self.district]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        });

        AddressDetail {
            province: self.province,
            city: self.city,
            district: self.district,
            formatted_address,
        }
    }
}

/// Parse a `/v3/geocode/geo` response body.
pub fn parse_response(body: &str) -> Result<GeocodeResult, ProviderError> {
    let response: AmapResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    if response.status != "1" {
        return Err(ProviderError::Rejected(response.info));
    }

    let geocode = response
        .geocodes
        .into_iter()
        .next()
        .ok_or(ProviderError::NotFound)?;

    let coordinate = GeoCoordinate::parse_lng_lat(&geocode.location)
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;

    Ok(GeocodeResult::new(coordinate, Source::Amap).with_address(geocode.address()))
}

impl AmapProvider {
    pub fn new(api_key: &str, config: &ProvidersConfig) -> Result<Self, TravelMapError> {
        Ok(Self {
            client: http_client(config)?,
            api_key: api_key.to_string(),
            base_url: config.amap_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeocodeProvider for AmapProvider {
    fn source(&self) -> Source {
        Source::Amap
    }

    async fn geocode(&self, city: &str) -> Result<GeocodeResult, ProviderError> {
        let url = format!(
            "{}/v3/geocode/geo?address={}&output=json&key={}",
            self.base_url,
            urlencoding::encode(city),
            urlencoding::encode(&self.api_key)
        );

        let body = fetch_text(self.client.get(&url)).await?;
        let result = parse_response(&body)?;
        info!(
            "Found coordinates for {} using AMap: {}",
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
    fn test_parse_full_response() {
        let body = r#"{
            "status": "1",
            "info": "OK",
            "count": "1",
            "geocodes": [{
                "formatted_address": "北京市",
                "country": "中国",
                "province": "北京市",
                "citycode": "010",
                "city": "北京市",
                "district": [],
                "township": [],
                "location": "116.407387,39.904179",
                "level": "省"
            }]
        }"#;

        let result = parse_response(body).unwrap();
        assert_eq!(result.source, Source::Amap);
        assert_eq!(result.coordinate.lng(), 116.407_387);
        assert_eq!(result.coordinate.lat(), 39.904_179);

        let address = result.address.unwrap();
        assert_eq!(address.province.as_deref(), Some("北京市"));
        assert_eq!(address.district, None);
        assert_eq!(address.formatted_address.as_deref(), Some("北京市"));
    }

    #[test]
    fn test_formatted_address_falls_back_to_parts() {
        let body = r#"{"status":"1","info":"OK","geocodes":[{
            "location":"120.585316,31.298886",
            "province":"江苏省","city":"苏州市","district":"姑苏区",
            "formatted_address":[]
        }]}"#;

        let address = parse_response(body).unwrap().address.unwrap();
        assert_eq!(address.formatted_address.as_deref(), Some("江苏省 苏州市 姑苏区"));
    }

    #[test]
    fn test_empty_geocodes_is_not_found() {
        let body = r#"{"status":"1","info":"OK","count":"0","geocodes":[]}"#;
        assert_eq!(parse_response(body), Err(ProviderError::NotFound));
    }

    #[test]
    fn test_rejected_status() {
        let body = r#"{"status":"0","info":"INVALID_USER_KEY","infocode":"10001"}"#;
        assert_eq!(
            parse_response(body),
            Err(ProviderError::Rejected("INVALID_USER_KEY".to_string()))
        );
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            parse_response("<html>bad gateway</html>"),
            Err(ProviderError::Malformed(_))
        ));
        let body = r#"{"status":"1","geocodes":[{"location":"not-a-point"}]}"#;
        assert!(matches!(parse_response(body), Err(ProviderError::Malformed(_))));
    }
}
