// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Error types for the large-file engine

use histsync_blob::BlobError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for large-file operations
pub type LfsResult<T> = Result<T, LfsError>;

/// Error types for pointer, manifest and transfer operations
#[derive(Debug, Error)]
pub enum LfsError {
    /// Error parsing pointer file
    #[error("Failed to parse pointer file: {0}")]
    PointerParse(String),

    /// Invalid pointer file format
    #[error("Invalid pointer file format: {0}")]
    InvalidPointerFormat(String),

    /// Missing required field in pointer file
    #[error("Missing required field in pointer file: {0}")]
    MissingPointerField(String),

    /// Hash string is not `<algorithm>:<hex>`
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// No release with the pointer's tag exists
    #[error("Release not found: {0}")]
    ReleaseNotFound(String),

    /// Neither the named asset nor any recorded version resolved
    #[error("Asset not found: {asset_name} (tried {tried} manifest versions)")]
    AssetNotFound { asset_name: String, tried: usize },

    /// Downloaded content does not match the recorded hash
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    /// Path is not a regular file
    #[error("Not a regular file: {}", .0.display())]
    NotExternalizable(PathBuf),

    /// Path cannot be expressed relative to the history root
    #[error("Path is outside the history root: {}", .0.display())]
    OutsideHistoryRoot(PathBuf),

    /// Blob store failure
    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest (de)serialisation error
    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),

    /// Blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Coarse classification used by callers deciding whether to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Upload or download failed
    Transfer,
    /// Downloaded bytes did not hash to the recorded value
    Integrity,
    /// Release or asset is missing on the remote
    Reference,
    /// Local filesystem problem
    Filesystem,
    /// Pointer file could not be parsed or validated
    Format,
}

impl LfsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LfsError::PointerParse(_)
            | LfsError::InvalidPointerFormat(_)
            | LfsError::MissingPointerField(_)
            | LfsError::InvalidHash(_) => ErrorKind::Format,
            LfsError::ReleaseNotFound(_) | LfsError::AssetNotFound { .. } => ErrorKind::Reference,
            LfsError::IntegrityMismatch { .. } => ErrorKind::Integrity,
            LfsError::Blob(e) if e.is_not_found() => ErrorKind::Reference,
            LfsError::Blob(_) | LfsError::Join(_) => ErrorKind::Transfer,
            LfsError::NotExternalizable(_)
            | LfsError::OutsideHistoryRoot(_)
            | LfsError::Io(_)
            | LfsError::Json(_) => ErrorKind::Filesystem,
        }
    }

    /// Transfer and integrity failures are worth retrying unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transfer | ErrorKind::Integrity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            LfsError::IntegrityMismatch {
                expected: "sha256:aa".into(),
                actual: "sha256:bb".into()
            }
            .kind(),
            ErrorKind::Integrity
        );
        assert_eq!(LfsError::ReleaseNotFound("lfs".into()).kind(), ErrorKind::Reference);
        assert_eq!(
            LfsError::Blob(BlobError::http(500, "boom")).kind(),
            ErrorKind::Transfer
        );
        assert_eq!(
            LfsError::Blob(BlobError::http(404, "gone")).kind(),
            ErrorKind::Reference
        );
        assert_eq!(
            LfsError::MissingPointerField("hash".into()).kind(),
            ErrorKind::Format
        );
    }

    #[test]
    fn test_retryable() {
        assert!(LfsError::Blob(BlobError::backend("down")).is_retryable());
        assert!(!LfsError::NotExternalizable(PathBuf::from("/x")).is_retryable());
    }
}
