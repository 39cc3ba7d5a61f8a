//! Error types for the harvester.
//!
//! Only unexpected failures are errors. Transient source outcomes (a
//! non-success listing response, an offering without detail data) are
//! modelled as values in [`crate::sources`] so the pipeline can degrade
//! instead of aborting.

use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// All retry attempts for a request failed.
    #[error("Request failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// A source answered with a payload that does not have the expected shape.
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// JSON parsing failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization failed.
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted checkpoint blob could not be decoded.
    #[error("Checkpoint '{name}' is unreadable: {reason}")]
    Checkpoint { name: String, reason: String },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A CSS selector failed to compile.
    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

impl HarvesterError {
    /// Build a [`HarvesterError::MalformedResponse`].
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;
