//! Geocoding request and result models

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::coordinate::GeoCoordinate;

/// A city lookup as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityQuery {
    /// City name with surrounding whitespace removed
    pub name: String,
    /// Skip both caches and go straight to the providers
    pub force_refresh: bool,
}

impl CityQuery {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            force_refresh: false,
        }
    }

    #[must_use]
    pub fn with_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Key used by both caches.
    ///
    /// Lowercasing only affects cased scripts, so CJK names stay exact while
    /// Latin names match case-insensitively.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.name.to_lowercase()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// Provenance of a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// AMap geocoding API (primary, needs a key)
    Amap,
    /// OpenStreetMap Nominatim (open, no key)
    #[serde(rename = "openstreetmap")]
    OpenStreetMap,
    /// MapQuest geocoding API (needs a key)
    #[serde(rename = "mapquest")]
    MapQuest,
    /// Built-in coordinate table
    LocalDb,
    /// Hardcoded last-resort coordinate
    Default,
    /// Served from the in-memory or persistent cache
    Cache,
}

impl Source {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Amap => "amap",
            Source::OpenStreetMap => "openstreetmap",
            Source::MapQuest => "mapquest",
            Source::LocalDb => "local_db",
            Source::Default => "default",
            Source::Cache => "cache",
        }
    }

    /// Everything except the hardcoded default may be cached as authoritative.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Source::Default)
    }

    #[must_use]
    pub fn is_provider(&self) -> bool {
        matches!(self, Source::Amap | Source::OpenStreetMap | Source::MapQuest)
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amap" => Ok(Source::Amap),
            "openstreetmap" | "osm" | "nominatim" => Ok(Source::OpenStreetMap),
            "mapquest" => Ok(Source::MapQuest),
            "local_db" => Ok(Source::LocalDb),
            "default" => Ok(Source::Default),
            "cache" => Ok(Source::Cache),
            other => Err(format!("Unknown geocoding source '{other}'")),
        }
    }
}

/// Structured address fields, filled in when the provider returns them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
}

/// A resolved coordinate together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub coordinate: GeoCoordinate,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<AddressDetail>,
}

impl GeocodeResult {
    #[must_use]
    pub fn new(coordinate: GeoCoordinate, source: Source) -> Self {
        Self {
            coordinate,
            source,
            address: None,
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: AddressDetail) -> Self {
        self.address = Some(address);
        self
    }

    /// Copy of this result re-tagged as a cache hit.
    #[must_use]
    pub fn as_cache_hit(&self) -> Self {
        Self {
            source: Source::Cache,
            ..self.clone()
        }
    }

    /// Whether callers should treat this coordinate with suspicion.
    #[must_use]
    pub fn is_low_confidence(&self) -> bool {
        self.source == Source::Default
    }
}
