// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Timeout or socket-level failure; retried, never fatal
    #[error("Transient network error for {url}: {message}")]
    Transient { url: String, message: String },

    /// Upstream answered with a non-2xx status
    #[error("Upstream protocol error for {url}: HTTP {status}")]
    UpstreamProtocol { url: String, status: u16 },

    /// A field could not be extracted from an upstream document
    #[error("Parse error in field '{field}': {message}")]
    Parse { field: String, message: String },

    /// State file could not be written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Remote translation failed
    #[error("Translation error: {0}")]
    Translation(String),

    /// One operation of the publish sequence failed
    #[error("Publish step '{step}' failed: {message}")]
    Publish { step: String, message: String },

    /// Push notification delivery failed
    #[error("Notification error: {0}")]
    Notify(String),

    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a transient network error.
    pub fn transient(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transient {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse error naming the offending field.
    pub fn parse(field: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            field: field.into(),
            message: message.to_string(),
        }
    }

    /// Create a publish error naming the failed step.
    pub fn publish(step: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Publish {
            step: step.into(),
            message: message.to_string(),
        }
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl fmt::Display) -> Self {
        Self::Persistence(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the error must stop the poller.
    ///
    /// A changed upstream contract or an unwritable state file would make
    /// the loop spin against a broken endpoint or re-notify forever.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UpstreamProtocol { .. } | Self::Persistence(_))
    }
}
