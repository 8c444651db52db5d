//! `TravelMap` - Geocoding for travel trajectories
//!
//! Resolves city names to coordinates through a chain of geocoding providers,
//! with per-provider rate limiting, in-memory and persistent caching, and a
//! built-in table of well-known cities as the fallback.

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod logging;
pub mod models;
pub mod providers;
pub mod queue;
pub mod resolver;
pub mod web;

// Re-export core types for public API
pub use config::TravelMapConfig;
pub use coordinates::CoordinateStore;
pub use error::{Diagnostic, ProviderError, TravelMapError};
pub use models::{GeoCoordinate, GeocodeResult, Source, TrajectoryPoint, TravelPoint};
pub use providers::{GeocodeProvider, ProviderChain};
pub use queue::{Priority, QueueError, QueueSettings, RequestQueue};
pub use resolver::{GeocodeResolver, ResolverSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, TravelMapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
