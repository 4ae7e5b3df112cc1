// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Git operations for histsync
//!
//! The daemon only needs a handful of repository operations. They sit behind
//! the [`GitRepo`] trait so the state machine can be driven by
//! [`recording::RecordingGit`] in tests and by [`GitCli`] in production.

pub mod cli;
pub mod error;
pub mod exclude;
pub mod recording;

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;

pub use cli::{GitCli, Identity};
pub use error::{GitError, GitResult};
pub use exclude::ensure_info_exclude;

/// Name of the remote the daemon manages
pub const REMOTE: &str = "origin";

/// Repository operations consumed by the sync daemon
///
/// Every method takes the working tree directory explicitly; implementations
/// hold no per-repository state.
#[async_trait]
pub trait GitRepo: Send + Sync + Debug {
    /// Open or initialise the repository at `dir` and put HEAD on `branch`
    async fn ensure_repo(&self, dir: &Path, branch: &str) -> GitResult<()>;

    /// Point `origin` at `url`, adding the remote if needed
    async fn set_remote(&self, dir: &Path, url: &str) -> GitResult<()>;

    /// Whether `origin` lacks `branch`, including a remote with no branches
    async fn remote_is_empty(&self, dir: &Path, branch: &str) -> GitResult<bool>;

    /// Fetch `origin` and hard-reset the local branch to `origin/<branch>`
    async fn fetch_and_checkout(&self, dir: &Path, branch: &str) -> GitResult<()>;

    /// Create an empty root commit if HEAD is unborn; returns whether it did
    async fn initial_commit_if_needed(&self, dir: &Path) -> GitResult<bool>;

    /// Stage everything and commit if the index differs from HEAD
    async fn add_all_and_commit_if_changed(&self, dir: &Path, message: &str) -> GitResult<bool>;

    /// Push `branch` to `origin`
    async fn push(&self, dir: &Path, branch: &str) -> GitResult<()>;

    /// Rebase the local branch onto `origin/<branch>`
    async fn pull_rebase(&self, dir: &Path, branch: &str) -> GitResult<()>;

    /// Commit id `reference` resolves to
    async fn rev_parse(&self, dir: &Path, reference: &str) -> GitResult<String>;
}
