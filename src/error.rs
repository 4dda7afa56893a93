//! Error types for the harvest library.

use thiserror::Error;

/// Result type alias for harvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Errors that can occur while harvesting records.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// A single-use identity was requested from an empty pool.
    #[error("Identity pool exhausted")]
    PoolExhausted,

    /// Session construction or identity/header/cookie injection failed.
    #[error("Session setup failed: {0}")]
    SessionSetup(String),

    /// Document retrieval failed or timed out for one item.
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A single field's locator matched nothing. Never escapes the pipeline.
    #[error("Field '{0}' not found")]
    FieldMissing(String),

    /// A container required by several fields is absent.
    #[error("Required structure '{0}' missing from document")]
    StructureMissing(String),

    /// The final snapshot could not be written.
    #[error("Failed to persist results: {0}")]
    Persistence(String),

    /// Invalid run configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid CSS selector in a schema.
    #[error("Invalid selector '{0}'")]
    Selector(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tabular file error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl HarvestError {
    /// Builds a navigation error for `url`.
    pub fn navigation(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_pool_exhausted() {
        assert_eq!(HarvestError::PoolExhausted.to_string(), "Identity pool exhausted");
    }

    #[test]
    fn test_error_display_navigation() {
        let err = HarvestError::navigation("https://x/1", "timeout");
        assert_eq!(err.to_string(), "Navigation to https://x/1 failed: timeout");
    }

    #[test]
    fn test_error_display_structure_missing() {
        let err = HarvestError::StructureMissing("div.teamsBox".to_string());
        assert_eq!(
            err.to_string(),
            "Required structure 'div.teamsBox' missing from document"
        );
    }

    #[test]
    fn test_error_display_session_setup() {
        let err = HarvestError::SessionSetup("no chrome".to_string());
        assert_eq!(err.to_string(), "Session setup failed: no chrome");
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HarvestError = io.into();
        assert!(matches!(err, HarvestError::Io(_)));
    }

    #[test]
    fn test_error_debug() {
        let debug_str = format!("{:?}", HarvestError::PoolExhausted);
        assert!(debug_str.contains("PoolExhausted"));
    }
}
