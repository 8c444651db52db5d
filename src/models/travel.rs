//! Travel trajectory models
//!
//! A trip is an ordered list of [`TravelPoint`]s as exported by the map UI.
//! Only `city` matters for geocoding; the rest is carried through untouched.

use haversine::{Location as HaversineLocation, Units, distance};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::coordinate::GeoCoordinate;
use super::geocode::GeocodeResult;
use crate::TravelMapError;

const REQUIRED_FIELDS: [&str; 3] = ["city", "date", "transport"];

const WORLD_VIEW: GeoCoordinate = GeoCoordinate::from_trusted(0.0, 20.0);

/// One stop of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelPoint {
    pub city: String,
    pub date: String,
    pub transport: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TravelPoint {
    #[must_use]
    pub fn new(city: &str, date: &str, transport: &[&str]) -> Self {
        Self {
            city: city.to_string(),
            date: date.to_string(),
            transport: transport.iter().map(ToString::to_string).collect(),
            custom_transport: None,
            notes: None,
        }
    }
}

/// A travel point paired with its resolved location, once known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub point: TravelPoint,
    pub location: Option<GeocodeResult>,
}

impl From<TravelPoint> for TrajectoryPoint {
    fn from(point: TravelPoint) -> Self {
        Self {
            point,
            location: None,
        }
    }
}

impl TrajectoryPoint {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.location.is_some()
    }
}

/// Distance between two consecutive resolved stops.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub from: String,
    pub to: String,
    pub transport: Vec<String>,
    pub distance_km: f64,
}

/// Map viewport in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

/// Parse an exported trip.
///
/// Only the shape is checked: a JSON array whose records carry `city`,
/// `date` and `transport`.
pub fn import_points(json: &str) -> Result<Vec<TravelPoint>, TravelMapError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| TravelMapError::validation(format!("Trip file is not valid JSON: {e}")))?;

    let Value::Array(records) = value else {
        return Err(TravelMapError::validation("Trip data must be a JSON array"));
    };

    let mut points = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| record.get(field).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(TravelMapError::validation(format!(
                "Record {index} is missing required fields: {}",
                missing.join(", ")
            )));
        }

        let point: TravelPoint = serde_json::from_value(record).map_err(|e| {
            TravelMapError::validation(format!("Record {index} has an invalid field: {e}"))
        })?;
        points.push(point);
    }

    Ok(points)
}

/// Serialize a trip in the same format [`import_points`] accepts.
pub fn export_points(points: &[TravelPoint]) -> Result<String, TravelMapError> {
    serde_json::to_string_pretty(points)
        .map_err(|e| TravelMapError::general(format!("Failed to serialize trip: {e}")))
}

/// Average of all coordinates, or a world view when there are none.
#[must_use]
pub fn center(coordinates: &[GeoCoordinate]) -> GeoCoordinate {
    match coordinates {
        [] => WORLD_VIEW,
        [single] => *single,
        _ => {
            let count = coordinates.len() as f64;
            let (lng_sum, lat_sum) = coordinates
                .iter()
                .fold((0.0, 0.0), |(lng, lat), c| (lng + c.lng(), lat + c.lat()));
            GeoCoordinate::new(lng_sum / count, lat_sum / count).unwrap_or(WORLD_VIEW)
        }
    }
}

/// Bounding box around all coordinates with 5 degrees of padding.
#[must_use]
pub fn bounds(coordinates: &[GeoCoordinate]) -> Bounds {
    if coordinates.is_empty() {
        return Bounds {
            north: 85.0,
            south: -85.0,
            east: 180.0,
            west: -180.0,
        };
    }

    let mut north = -90.0_f64;
    let mut south = 90.0_f64;
    let mut east = -180.0_f64;
    let mut west = 180.0_f64;

    for coordinate in coordinates {
        north = north.max(coordinate.lat());
        south = south.min(coordinate.lat());
        east = east.max(coordinate.lng());
        west = west.min(coordinate.lng());
    }

    Bounds {
        north: (north + 5.0).min(90.0),
        south: (south - 5.0).max(-90.0),
        east: (east + 5.0).min(180.0),
        west: (west - 5.0).max(-180.0),
    }
}

/// Great-circle distance in kilometers.
#[must_use]
pub fn distance_km(from: &GeoCoordinate, to: &GeoCoordinate) -> f64 {
    let from = HaversineLocation {
        latitude: from.lat(),
        longitude: from.lng(),
    };
    let to = HaversineLocation {
        latitude: to.lat(),
        longitude: to.lng(),
    };
    distance(from, to, Units::Kilometers)
}

/// Segments between consecutive resolved stops; unresolved stops are skipped.
#[must_use]
pub fn segments(points: &[TrajectoryPoint]) -> Vec<Segment> {
    let resolved: Vec<(&TravelPoint, &GeocodeResult)> = points
        .iter()
        .filter_map(|p| p.location.as_ref().map(|location| (&p.point, location)))
        .collect();

    resolved
        .windows(2)
        .map(|pair| {
            let (from, from_location) = pair[0];
            let (to, to_location) = pair[1];
            Segment {
                from: from.city.clone(),
                to: to.city.clone(),
                transport: to.transport.clone(),
                distance_km: distance_km(&from_location.coordinate, &to_location.coordinate),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    #[test]
    fn test_import_valid_trip() {
        let json = r#"[
            {"city": "北京", "date": "2025-03-01", "transport": [], "notes": "起点"},
            {"city": "西安", "date": "2025-03-03", "transport": ["flight"], "customTransport": "night bus"}
        ]"#;

        let points = import_points(json).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].city, "北京");
        assert_eq!(points[0].notes.as_deref(), Some("起点"));
        assert_eq!(points[1].transport, vec!["flight"]);
        assert_eq!(points[1].custom_transport.as_deref(), Some("night bus"));
    }

    #[test]
    fn test_import_rejects_non_array() {
        let err = import_points(r#"{"city": "北京"}"#).unwrap_err();
        assert!(matches!(err, TravelMapError::Validation { .. }));
    }

    #[test]
    fn test_import_reports_missing_fields() {
        let err = import_points(r#"[{"city": "Paris"}]"#).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("date"));
        assert!(message.contains("transport"));
    }

    #[test]
    fn test_export_round_trips() {
        let points = vec![TravelPoint::new("Paris", "2025-04-01", &["train"])];
        let json = export_points(&points).unwrap();
        assert_eq!(import_points(&json).unwrap(), points);
    }

    #[test]
    fn test_center_of_empty_set_is_world_view() {
        let c = center(&[]);
        assert_eq!(c.lat(), 20.0);
        assert_eq!(c.lng(), 0.0);
    }

    #[test]
    fn test_center_averages() {
        let a = GeoCoordinate::new(100.0, 30.0).unwrap();
        let b = GeoCoordinate::new(120.0, 40.0).unwrap();
        let c = center(&[a, b]);
        assert_eq!(c.lng(), 110.0);
        assert_eq!(c.lat(), 35.0);
    }

    #[test]
    fn test_bounds_are_padded() {
        let a = GeoCoordinate::new(100.0, 30.0).unwrap();
        let b = GeoCoordinate::new(120.0, 40.0).unwrap();
        let b = bounds(&[a, b]);
        assert_eq!(b.north, 45.0);
        assert_eq!(b.south, 25.0);
        assert_eq!(b.east, 125.0);
        assert_eq!(b.west, 95.0);
    }

    #[test]
    fn test_segments_skip_unresolved_points() {
        let beijing = GeoCoordinate::new(116.4074, 39.9042).unwrap();
        let shanghai = GeoCoordinate::new(121.4737, 31.2304).unwrap();
        let points = vec![
            TrajectoryPoint {
                point: TravelPoint::new("北京", "2025-03-01", &[]),
                location: Some(GeocodeResult::new(beijing, Source::LocalDb)),
            },
            TrajectoryPoint::from(TravelPoint::new("Atlantis", "2025-03-02", &["ship"])),
            TrajectoryPoint {
                point: TravelPoint::new("上海", "2025-03-03", &["train"]),
                location: Some(GeocodeResult::new(shanghai, Source::LocalDb)),
            },
        ];

        let segments = segments(&points);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].from, "北京");
        assert_eq!(segments[0].to, "上海");
        assert_eq!(segments[0].transport, vec!["train"]);
        // Beijing to Shanghai is a little over 1000 km
        assert!((1000.0..1100.0).contains(&segments[0].distance_km));
    }
}
