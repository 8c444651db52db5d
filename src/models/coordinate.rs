//! Geographic coordinate model
//!
//! Providers disagree on axis order (AMap and OpenStreetMap hand out
//! `"lng,lat"`, MapQuest a `{lat, lng}` object). Everything is normalized into
//! [`GeoCoordinate`] as soon as it leaves a provider.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("Longitude out of range: {0}")]
    LongitudeOutOfRange(f64),

    #[error("Latitude out of range: {0}")]
    LatitudeOutOfRange(f64),

    #[error("Invalid coordinate format: {0}")]
    InvalidFormat(String),
}

/// A validated (longitude, latitude) pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct GeoCoordinate {
    lng: f64,
    lat: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    lng: f64,
    lat: f64,
}

impl TryFrom<RawCoordinate> for GeoCoordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        GeoCoordinate::new(raw.lng, raw.lat)
    }
}

impl GeoCoordinate {
    /// Create a coordinate, rejecting NaN and out-of-range values.
    pub fn new(lng: f64, lat: f64) -> Result<Self, CoordinateError> {
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::LongitudeOutOfRange(lng));
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::LatitudeOutOfRange(lat));
        }
        Ok(Self { lng, lat })
    }

    /// For compile-time tables whose values are known to be in range.
    pub(crate) const fn from_trusted(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    #[must_use]
    pub fn lng(&self) -> f64 {
        self.lng
    }

    #[must_use]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Parse the `"lng,lat"` wire format used by AMap and the HTTP surface.
    pub fn parse_lng_lat(value: &str) -> Result<Self, CoordinateError> {
        let parts: Vec<&str> = value.split(',').collect();
        if parts.len() != 2 {
            return Err(CoordinateError::InvalidFormat(value.to_string()));
        }

        let lng = parts[0]
            .trim()
            .parse::<f64>()
            .map_err(|_| CoordinateError::InvalidFormat(format!("Invalid longitude: {}", parts[0])))?;

        let lat = parts[1]
            .trim()
            .parse::<f64>()
            .map_err(|_| CoordinateError::InvalidFormat(format!("Invalid latitude: {}", parts[1])))?;

        Self::new(lng, lat)
    }

    /// Format as `"lng,lat"`.
    #[must_use]
    pub fn to_lng_lat(&self) -> String {
        format!("{},{}", self.lng, self.lat)
    }

    /// Format for humans, latitude first.
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.lat, self.lng)
    }
}
