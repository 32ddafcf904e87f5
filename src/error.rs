//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Source image not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Invalid scale '{0}': expected a positive percentage of the form 'nn%'")]
    InvalidScale(String),

    #[error("Failed to {operation} for thumbnail {}: {source}", .path.display())]
    CacheWriteFailed {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {}: {source}", .path.display())]
    DecodeFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    pub(crate) fn cache_write(
        path: impl Into<PathBuf>,
        operation: &'static str,
        source: std::io::Error,
    ) -> Self {
        Self::CacheWriteFailed {
            path: path.into(),
            operation,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_path_and_operation() {
        let err = Error::cache_write(
            "/site/thumb/a.png",
            "create directory",
            std::io::Error::other("disk full"),
        );
        let message = err.to_string();
        assert!(message.contains("create directory"));
        assert!(message.contains("/site/thumb/a.png"));
        assert!(message.contains("disk full"));

        let missing = Error::SourceNotFound(PathBuf::from("/site/images/gone.png"));
        assert!(missing.to_string().contains("/site/images/gone.png"));
    }
}
