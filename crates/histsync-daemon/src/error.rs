// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Error types for the sync daemon

use histsync_git::GitError;
use histsync_lfs::LfsError;
use std::path::PathBuf;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or unusable settings; never retried
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The local branch could not be brought level with the remote
    #[error("Alignment failed: {0}")]
    Alignment(String),

    #[error("Git operation failed: {0}")]
    Git(#[from] GitError),

    /// Copy, move or link failure on one path
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Large-file operation failed: {0}")]
    Lfs(#[from] LfsError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A stop was requested before the operation finished
    #[error("Stopped")]
    Stopped,
}

impl SyncError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying cannot help
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Configuration(_))
    }
}
