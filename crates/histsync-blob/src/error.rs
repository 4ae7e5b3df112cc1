// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Blob store error types

use std::io;
use thiserror::Error;

/// Result type alias for blob store operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur while talking to a blob store
#[derive(Error, Debug)]
pub enum BlobError {
    /// Release or asset does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport-level failure (DNS, TLS, connection reset, ...)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Local I/O error while reading or writing a transfer
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Asset name rejected before reaching the backend
    #[error("invalid asset name: {0}")]
    InvalidName(String),

    /// Backend not available or misconfigured
    #[error("blob store error: {0}")]
    Backend(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BlobError {
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        BlobError::NotFound(what.into())
    }

    pub fn invalid_name<S: Into<String>>(msg: S) -> Self {
        BlobError::InvalidName(msg.into())
    }

    pub fn backend<S: Into<String>>(msg: S) -> Self {
        BlobError::Backend(msg.into())
    }

    pub fn http<S: Into<String>>(status: u16, message: S) -> Self {
        BlobError::Http {
            status,
            message: message.into(),
        }
    }

    /// Check if this is a NotFound error (or an HTTP 404)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BlobError::NotFound(_) | BlobError::Http { status: 404, .. }
        )
    }

    /// Authentication or authorisation was refused by the backend
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, BlobError::Http { status: 401 | 403, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found() {
        let err = BlobError::not_found("release lfs-assets");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: release lfs-assets");
    }

    #[test]
    fn test_http_404_counts_as_not_found() {
        assert!(BlobError::http(404, "Not Found").is_not_found());
        assert!(!BlobError::http(500, "boom").is_not_found());
    }

    #[test]
    fn test_auth_failure() {
        assert!(BlobError::http(401, "Bad credentials").is_auth_failure());
        assert!(BlobError::http(403, "Forbidden").is_auth_failure());
        assert!(!BlobError::http(422, "Validation Failed").is_auth_failure());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::other("disk full");
        assert!(matches!(BlobError::from(io_err), BlobError::Io(_)));
    }
}
