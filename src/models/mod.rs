//! Data models for the TravelMap geocoder
//!
//! This module contains the core domain models organized by concern:
//! - Coordinate: validated longitude/latitude pairs
//! - Geocode: city queries, provenance tags and resolved results
//! - Travel: trip records and trajectory helpers

pub mod coordinate;
pub mod geocode;
pub mod travel;

// Re-export all public types for convenient access
pub use coordinate::{CoordinateError, GeoCoordinate};
pub use geocode::{AddressDetail, CityQuery, GeocodeResult, Source};
pub use travel::{Bounds, Segment, TrajectoryPoint, TravelPoint};
