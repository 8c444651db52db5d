//! Error types and handling for the `TravelMap` geocoder
//!
//! Three layers of failure exist:
//! - [`TravelMapError`] for configuration, import and I/O problems that reach the CLI
//! - [`ProviderError`] for a single failed call to one geocoding provider
//! - [`Diagnostic`] for the resolver's internal outcome when it could not produce
//!   an authoritative coordinate; collapsed into a default result at the public boundary

use thiserror::Error;

use crate::models::Source;

/// Main error type for the `TravelMap` application
#[derive(Error, Debug)]
pub enum TravelMapError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// General application errors
    #[error("Application error: {message}")]
    General { message: String },
}

impl TravelMapError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a new general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            TravelMapError::Config { .. } => {
                "Configuration error. Please check your config file and API keys.".to_string()
            }
            TravelMapError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            TravelMapError::Cache { message } => {
                format!("Cache unavailable: {message}")
            }
            TravelMapError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
            TravelMapError::General { message } => message.clone(),
        }
    }
}

/// Failure of one call to one geocoding provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("No results found")]
    NotFound,

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Request was dropped before completion")]
    Interrupted,
}

/// Why the resolver could not produce an authoritative result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    #[error("{provider} queue is full ({capacity} pending)")]
    QueueFull { provider: Source, capacity: usize },

    #[error("{provider} failed: {error}")]
    Provider { provider: Source, error: ProviderError },

    #[error("All providers exhausted after {} attempts", .attempts.len())]
    AllProvidersExhausted { attempts: Vec<Diagnostic> },

    #[error("No geocoding provider is configured")]
    NoProviders,
}

impl Diagnostic {
    /// Whether any step of this diagnostic was a queue rejection.
    #[must_use]
    pub fn is_queue_full(&self) -> bool {
        match self {
            Diagnostic::QueueFull { .. } => true,
            Diagnostic::AllProvidersExhausted { attempts } => {
                attempts.iter().any(Diagnostic::is_queue_full)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = TravelMapError::config("missing API key");
        assert!(matches!(config_err, TravelMapError::Config { .. }));

        let validation_err = TravelMapError::validation("missing city");
        assert!(matches!(validation_err, TravelMapError::Validation { .. }));

        let cache_err = TravelMapError::cache("store closed");
        assert!(matches!(cache_err, TravelMapError::Cache { .. }));
    }

    #[test]
    fn test_user_messages() {
        let config_err = TravelMapError::config("test");
        assert!(config_err.user_message().contains("Configuration error"));

        let validation_err = TravelMapError::validation("test input");
        assert!(validation_err.user_message().contains("test input"));

        let cache_err = TravelMapError::cache("/var/cache/travelmap is locked");
        assert_eq!(
            cache_err.user_message(),
            "Cache unavailable: /var/cache/travelmap is locked"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let travel_err: TravelMapError = io_err.into();
        assert!(matches!(travel_err, TravelMapError::Io { .. }));
    }

    #[test]
    fn test_exhausted_diagnostic_reports_queue_rejection() {
        let diagnostic = Diagnostic::AllProvidersExhausted {
            attempts: vec![
                Diagnostic::QueueFull {
                    provider: Source::Amap,
                    capacity: 100,
                },
                Diagnostic::Provider {
                    provider: Source::OpenStreetMap,
                    error: ProviderError::NotFound,
                },
            ],
        };
        assert!(diagnostic.is_queue_full());
        assert_eq!(diagnostic.to_string(), "All providers exhausted after 2 attempts");
    }
}
