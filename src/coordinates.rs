//! Built-in city coordinate table
//!
//! Last resort before the hardcoded default point. The table is an ordered
//! slice so containment matching is deterministic: the first entry in table
//! order wins.

use crate::models::{GeoCoordinate, GeocodeResult, Source};
use tracing::debug;

/// One row of the coordinate table.
#[derive(Debug, Clone)]
pub struct CityEntry {
    pub name: String,
    pub coordinate: GeoCoordinate,
    folded: String,
}

impl CityEntry {
    #[must_use]
    pub fn new(name: &str, coordinate: GeoCoordinate) -> Self {
        Self {
            name: name.to_string(),
            coordinate,
            folded: name.to_lowercase(),
        }
    }
}

/// `(name, lng, lat)`; Chinese cities first, then international ones.
const BUILTIN_CITIES: &[(&str, f64, f64)] = &[
    ("北京", 116.4074, 39.9042),
    ("上海", 121.4737, 31.2304),
    ("广州", 113.2644, 23.1291),
    ("深圳", 114.0579, 22.5431),
    ("成都", 104.0668, 30.5728),
    ("重庆", 106.9123, 29.4316),
    ("杭州", 120.1551, 30.2741),
    ("南京", 118.7969, 32.0603),
    ("武汉", 114.3055, 30.5928),
    ("西安", 108.9398, 34.3416),
    ("天津", 117.3616, 39.3434),
    ("苏州", 120.5853, 31.2990),
    ("郑州", 113.6253, 34.7466),
    ("长沙", 112.9388, 28.2282),
    ("青岛", 120.3826, 36.0671),
    ("沈阳", 123.4315, 41.8057),
    ("大连", 121.6147, 38.9140),
    ("厦门", 118.0894, 24.4798),
    ("哈尔滨", 126.5340, 45.8038),
    ("济南", 117.1201, 36.6512),
    ("常州", 119.9741, 31.8112),
    ("无锡", 120.2883, 31.5689),
    ("香港", 114.1694, 22.3193),
    ("昆明", 102.7183, 25.0389),
    ("曲靖", 103.7961, 25.4901),
    ("合肥", 117.2272, 31.8206),
    ("泰安", 117.0874, 36.1941),
    ("Beijing", 116.4074, 39.9042),
    ("Shanghai", 121.4737, 31.2304),
    ("Guangzhou", 113.2644, 23.1291),
    ("Shenzhen", 114.0579, 22.5431),
    ("Chengdu", 104.0668, 30.5728),
    ("Chongqing", 106.9123, 29.4316),
    ("Hangzhou", 120.1551, 30.2741),
    ("Nanjing", 118.7969, 32.0603),
    ("Wuhan", 114.3055, 30.5928),
    ("Xi'an", 108.9398, 34.3416),
    ("Tianjin", 117.3616, 39.3434),
    ("Hong Kong", 114.1694, 22.3193),
    ("纽约", -74.0060, 40.7128),
    ("伦敦", -0.1278, 51.5074),
    ("东京", 139.6503, 35.6762),
    ("巴黎", 2.3522, 48.8566),
    ("新加坡", 103.8198, 1.3521),
    ("悉尼", 151.2093, -33.8688),
    ("洛杉矶", -118.2437, 34.0522),
    ("多伦多", -79.3832, 43.6532),
    ("柏林", 13.4050, 52.5200),
    ("莫斯科", 37.6173, 55.7558),
    ("迪拜", 55.2708, 25.2048),
    ("曼谷", 100.5018, 13.7563),
    ("首尔", 126.9780, 37.5665),
    ("台北", 121.5654, 25.0330),
    ("吉隆坡", 101.6869, 3.1390),
    ("阿姆斯特丹", 4.9041, 52.3676),
    ("马德里", -3.7038, 40.4168),
    ("罗马", 12.4964, 41.9028),
    ("开罗", 31.2357, 30.0444),
    ("New York", -74.0060, 40.7128),
    ("London", -0.1278, 51.5074),
    ("Tokyo", 139.6503, 35.6762),
    ("Paris", 2.3522, 48.8566),
    ("Singapore", 103.8198, 1.3521),
    ("Sydney", 151.2093, -33.8688),
    ("Los Angeles", -118.2437, 34.0522),
    ("Toronto", -79.3832, 43.6532),
    ("Berlin", 13.4050, 52.5200),
    ("Moscow", 37.6173, 55.7558),
    ("Dubai", 55.2708, 25.2048),
    ("Bangkok", 100.5018, 13.7563),
    ("Seoul", 126.9780, 37.5665),
    ("Taipei", 121.5654, 25.0330),
    ("Kuala Lumpur", 101.6869, 3.1390),
    ("Amsterdam", 4.9041, 52.3676),
    ("Madrid", -3.7038, 40.4168),
    ("Rome", 12.4964, 41.9028),
    ("Cairo", 31.2357, 30.0444),
];

/// Ordered lookup table of well-known cities.
#[derive(Debug, Clone)]
pub struct CoordinateStore {
    entries: Vec<CityEntry>,
}

impl Default for CoordinateStore {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CoordinateStore {
    /// The built-in table.
    #[must_use]
    pub fn builtin() -> Self {
        let entries = BUILTIN_CITIES
            .iter()
            .map(|&(name, lng, lat)| CityEntry::new(name, GeoCoordinate::from_trusted(lng, lat)))
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn with_entries(entries: Vec<CityEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find a coordinate for `city`.
    ///
    /// Tries an exact match, then a case-insensitive one, then containment in
    /// either direction. An empty name never matches.
    #[must_use]
    pub fn lookup(&self, city: &str) -> Option<GeoCoordinate> {
        let city = city.trim();
        if city.is_empty() {
            return None;
        }

        if let Some(entry) = self.entries.iter().find(|e| e.name == city) {
            return Some(entry.coordinate);
        }

        let folded = city.to_lowercase();
        if let Some(entry) = self.entries.iter().find(|e| e.folded == folded) {
            return Some(entry.coordinate);
        }

        let entry = self
            .entries
            .iter()
            .find(|e| folded.contains(&e.folded) || e.folded.contains(&folded))?;
        debug!("'{}' matched table entry '{}' by containment", city, entry.name);
        Some(entry.coordinate)
    }

    /// Lookup wrapped as a `local_db` result.
    #[must_use]
    pub fn resolve(&self, city: &str) -> Option<GeocodeResult> {
        self.lookup(city)
            .map(|coordinate| GeocodeResult::new(coordinate, Source::LocalDb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_builtin_table_is_in_range() {
        let store = CoordinateStore::builtin();
        assert!(!store.is_empty());
        for &(name, lng, lat) in BUILTIN_CITIES {
            assert!(GeoCoordinate::new(lng, lat).is_ok(), "{name} out of range");
        }
    }

    #[rstest]
    #[case("北京", 116.4074, 39.9042)]
    #[case("Tokyo", 139.6503, 35.6762)]
    #[case("tokyo", 139.6503, 35.6762)]
    #[case("  PARIS ", 2.3522, 48.8566)]
    #[case("北京市", 116.4074, 39.9042)]
    #[case("Greater London", -0.1278, 51.5074)]
    fn test_lookup(#[case] city: &str, #[case] lng: f64, #[case] lat: f64) {
        let coordinate = CoordinateStore::builtin().lookup(city).unwrap();
        assert_eq!(coordinate.lng(), lng);
        assert_eq!(coordinate.lat(), lat);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("Nonexistent City XYZ")]
    fn test_lookup_misses(#[case] city: &str) {
        assert!(CoordinateStore::builtin().lookup(city).is_none());
    }

    #[test]
    fn test_containment_takes_first_entry_in_order() {
        let store = CoordinateStore::with_entries(vec![
            CityEntry::new("Springfield", GeoCoordinate::new(-89.65, 39.78).unwrap()),
            CityEntry::new("Field", GeoCoordinate::new(0.0, 0.0).unwrap()),
        ]);
        // "field" is contained in both keys; table order decides
        let coordinate = store.lookup("field town").unwrap();
        assert_eq!(coordinate.lng(), 0.0);
        let coordinate = store.lookup("fiel").unwrap();
        assert_eq!(coordinate.lng(), -89.65);
    }

    #[test]
    fn test_resolve_tags_local_db() {
        let result = CoordinateStore::builtin().resolve("上海").unwrap();
        assert_eq!(result.source, Source::LocalDb);
    }
}
