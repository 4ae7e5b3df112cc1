// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Error types for git operations

use thiserror::Error;

/// Result type for git operations
pub type GitResult<T> = Result<T, GitError>;

/// Error types for git operations
#[derive(Debug, Error)]
pub enum GitError {
    /// `git` executable missing from PATH
    #[error("Git not installed or not in PATH")]
    GitNotFound,

    /// A git subprocess exited unsuccessfully
    #[error("`git {command}` exited with code {code}: {output}")]
    NonZeroExit {
        command: String,
        code: i32,
        output: String,
    },

    /// Git2 library error
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Reference does not resolve to a commit
    #[error("Invalid reference: {0}")]
    InvalidRef(String),

    /// Blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl GitError {
    /// Exit code of a failed subprocess, if that is what this is
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            GitError::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}
