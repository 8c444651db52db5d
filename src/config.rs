//! Configuration management for the `TravelMap` geocoder
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::TravelMapError;
use crate::models::{GeoCoordinate, Source};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure for the `TravelMap` application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelMapConfig {
    /// Geocoding provider configuration
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Request queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Batch geocoding configuration
    #[serde(default)]
    pub batch: BatchConfig,
    /// Last-resort coordinate
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Geocoding provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Provider priority, first entry is tried first
    #[serde(default = "default_provider_order")]
    pub order: Vec<String>,
    /// AMap web service key; absent disables AMap
    pub amap_api_key: Option<String>,
    /// MapQuest key; absent disables MapQuest
    pub mapquest_api_key: Option<String>,
    /// OpenStreetMap Nominatim needs no key but can be switched off
    #[serde(default = "default_true")]
    pub nominatim_enabled: bool,
    #[serde(default = "default_amap_base_url")]
    pub amap_base_url: String,
    #[serde(default = "default_nominatim_base_url")]
    pub nominatim_base_url: String,
    #[serde(default = "default_mapquest_base_url")]
    pub mapquest_base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

/// Request queue settings, applied to every provider's queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Minimum delay between two dispatches to one provider
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Pending requests above this are rejected
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Pause between worker iterations
    #[serde(default = "default_spacing_ms")]
    pub spacing_ms: u64,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persistent cache TTL in hours
    #[serde(default = "default_cache_ttl")]
    pub ttl_hours: u32,
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
    /// Prefix for every persisted key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Random spread applied to TTLs on write (0.1 = plus or minus 10%)
    #[serde(default = "default_ttl_jitter")]
    pub ttl_jitter: f64,
    /// Interval of the background expiry sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_minutes: u32,
}

/// Batch geocoding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Cities resolved concurrently per batch
    #[serde(default = "default_batch_size")]
    pub size: usize,
    /// Pause between batches
    #[serde(default = "default_batch_delay_ms")]
    pub delay_ms: u64,
}

/// Coordinate returned when nothing else matched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_longitude")]
    pub longitude: f64,
    #[serde(default = "default_fallback_latitude")]
    pub latitude: f64,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

// Default value functions
fn default_provider_order() -> Vec<String> {
    vec![
        "amap".to_string(),
        "openstreetmap".to_string(),
        "mapquest".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_amap_base_url() -> String {
    "https://restapi.amap.com".to_string()
}

fn default_nominatim_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_mapquest_base_url() -> String {
    "https://www.mapquestapi.com".to_string()
}

fn default_provider_timeout() -> u32 {
    10
}

fn default_user_agent() -> String {
    "TravelTracker/1.0".to_string()
}

fn default_accept_language() -> String {
    "zh-CN,en-US".to_string()
}

fn default_min_interval_ms() -> u64 {
    500
}

fn default_max_queue_size() -> usize {
    100
}

fn default_spacing_ms() -> u64 {
    10
}

fn default_cache_ttl() -> u32 {
    7 * 24
}

fn default_cache_location() -> String {
    dirs::cache_dir()
        .map(|dir| dir.join("travelmap").to_string_lossy().to_string())
        .unwrap_or_else(|| ".cache/travelmap".to_string())
}

fn default_key_prefix() -> String {
    "geocode_cache_".to_string()
}

fn default_ttl_jitter() -> f64 {
    0.0
}

fn default_sweep_interval() -> u32 {
    60
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    200
}

fn default_fallback_longitude() -> f64 {
    116.397_428
}

fn default_fallback_latitude() -> f64 {
    39.909_23
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: default_provider_order(),
            amap_api_key: None,
            mapquest_api_key: None,
            nominatim_enabled: default_true(),
            amap_base_url: default_amap_base_url(),
            nominatim_base_url: default_nominatim_base_url(),
            mapquest_base_url: default_mapquest_base_url(),
            timeout_seconds: default_provider_timeout(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            max_queue_size: default_max_queue_size(),
            spacing_ms: default_spacing_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_cache_ttl(),
            location: default_cache_location(),
            key_prefix: default_key_prefix(),
            ttl_jitter: default_ttl_jitter(),
            sweep_interval_minutes: default_sweep_interval(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            delay_ms: default_batch_delay_ms(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            longitude: default_fallback_longitude(),
            latitude: default_fallback_latitude(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TravelMapConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            queue: QueueConfig::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            fallback: FallbackConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    #[must_use]
    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl_hours) * 60 * 60)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.sweep_interval_minutes) * 60)
    }
}

impl BatchConfig {
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl FallbackConfig {
    pub fn coordinate(&self) -> Result<GeoCoordinate> {
        GeoCoordinate::new(self.longitude, self.latitude)
            .map_err(|e| TravelMapError::config(format!("Invalid fallback coordinate: {e}")).into())
    }
}

impl ProvidersConfig {
    /// Provider order parsed into sources.
    pub fn sources(&self) -> Result<Vec<Source>> {
        self.order
            .iter()
            .map(|name| {
                let source = name.parse::<Source>().map_err(TravelMapError::config)?;
                if source.is_provider() {
                    Ok(source)
                } else {
                    Err(TravelMapError::config(format!(
                        "'{name}' is not a geocoding provider"
                    ))
                    .into())
                }
            })
            .collect()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }
}

impl TravelMapConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from file if path is provided or use default location
        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Add environment variable overrides with TRAVELMAP_ prefix
        builder = builder.add_source(
            Environment::with_prefix("TRAVELMAP")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: TravelMapConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_env_keys();
        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("travelmap").join("config.toml"))
    }

    /// Pick up provider keys from their conventional variables.
    pub fn apply_env_keys(&mut self) {
        if self.providers.amap_api_key.is_none() {
            self.providers.amap_api_key = std::env::var("AMAP_API_KEY").ok();
        }
        if self.providers.mapquest_api_key.is_none() {
            self.providers.mapquest_api_key = std::env::var("MAPQUEST_API_KEY").ok();
        }
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        // An empty key disables the provider the same way a missing one does
        if self
            .providers
            .amap_api_key
            .as_ref()
            .is_some_and(|key| key.trim().is_empty())
        {
            self.providers.amap_api_key = None;
        }
        if self
            .providers
            .mapquest_api_key
            .as_ref()
            .is_some_and(|key| key.trim().is_empty())
        {
            self.providers.mapquest_api_key = None;
        }
        if self.providers.order.is_empty() {
            self.providers.order = default_provider_order();
        }
        if self.providers.timeout_seconds == 0 {
            self.providers.timeout_seconds = default_provider_timeout();
        }
        if self.cache.ttl_hours == 0 {
            self.cache.ttl_hours = default_cache_ttl();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.cache.key_prefix.is_empty() {
            self.cache.key_prefix = default_key_prefix();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.providers.sources()?;
        self.fallback.coordinate()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.providers.timeout_seconds > 300 {
            return Err(TravelMapError::config("Provider timeout cannot exceed 300 seconds").into());
        }

        if self.queue.max_queue_size == 0 {
            return Err(TravelMapError::config("Queue size must be at least 1").into());
        }

        if self.queue.min_interval_ms > 60_000 {
            return Err(
                TravelMapError::config("Queue interval cannot exceed 60000 ms").into(),
            );
        }

        if self.cache.ttl_hours > 30 * 24 {
            return Err(TravelMapError::config("Cache TTL cannot exceed 720 hours (30 days)").into());
        }

        if !(0.0..0.5).contains(&self.cache.ttl_jitter) {
            return Err(TravelMapError::config("Cache TTL jitter must be in [0, 0.5)").into());
        }

        if self.cache.sweep_interval_minutes == 0 {
            return Err(TravelMapError::config("Sweep interval must be at least 1 minute").into());
        }

        if self.batch.size == 0 {
            return Err(TravelMapError::config("Batch size must be at least 1").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(TravelMapError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(TravelMapError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for url in [
            &self.providers.amap_base_url,
            &self.providers.nominatim_base_url,
            &self.providers.mapquest_base_url,
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(TravelMapError::config(format!(
                    "Provider base URL must be a valid HTTP or HTTPS URL: {url}"
                ))
                .into());
            }
        }

        Ok(())
    }
}
