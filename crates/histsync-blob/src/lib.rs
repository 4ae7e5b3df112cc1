// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Blob store abstraction for histsync
//!
//! Oversized files are not committed to git. Their content is uploaded as an
//! asset attached to a named release, and the history tree keeps a small
//! pointer file instead. This crate defines the [`BlobStore`] trait the
//! large-file engine talks to, plus two implementations:
//!
//! - [`github::GithubReleaseStore`]: GitHub release assets over the REST API
//! - [`mock::MockBlobStore`]: in-memory store with fault injection for tests
//!
//! # Core Concepts
//!
//! - **Release**: a named container addressed by its tag
//! - **Asset**: a blob attached to a release, addressed by a unique name
//!   within that release
//!
//! # Examples
//!
//! ```no_run
//! use histsync_blob::{BlobStore, mock::MockBlobStore};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MockBlobStore::new();
//!     let release = store.get_or_create_release("lfs-assets").await?;
//!
//!     store
//!         .upload_asset(&release, Path::new("video.mp4"), "0123abcd4567-video.mp4", &|_, _| {})
//!         .await?;
//!
//!     let asset = store.get_asset_by_name(&release, "0123abcd4567-video.mp4").await?;
//!     assert!(asset.is_some());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod github;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;

pub use error::{BlobError, BlobResult};
pub use github::{GithubConfig, GithubReleaseStore};

/// Transfer progress callback: `(bytes_transferred, total_bytes)`.
///
/// Called at implementation-defined granularity; `total_bytes` may be `0`
/// when the remote does not announce a length.
pub type ProgressFn<'a> = dyn Fn(u64, u64) + Send + Sync + 'a;

/// A release that groups uploaded assets under a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Backend identifier of the release
    pub id: u64,

    /// Tag the release is addressed by
    pub tag_name: String,
}

/// A named blob attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Backend identifier of the asset
    pub id: u64,

    /// Asset name, unique within its release
    pub name: String,

    /// Size in bytes as reported by the backend
    pub size: u64,
}

/// Release-asset storage consumed by the large-file engine
///
/// Implementations must be `Send + Sync + Debug` so a single store can be
/// shared behind an `Arc` by concurrent restore workers.
///
/// Lookups that find nothing return `Ok(None)`; `Err` is reserved for
/// transport, permission and I/O failures.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    /// Return the release tagged `tag`, creating it if it does not exist
    async fn get_or_create_release(&self, tag: &str) -> BlobResult<Release>;

    /// Return the release tagged `tag`, or `None` if there is none
    async fn get_release(&self, tag: &str) -> BlobResult<Option<Release>>;

    /// Look up an asset of `release` by its exact name
    async fn get_asset_by_name(&self, release: &Release, name: &str) -> BlobResult<Option<Asset>>;

    /// Upload the file at `local_path` as asset `asset_name`
    ///
    /// `on_progress` receives `(bytes_uploaded, total_bytes)`.
    async fn upload_asset(
        &self,
        release: &Release,
        local_path: &Path,
        asset_name: &str,
        on_progress: &ProgressFn<'_>,
    ) -> BlobResult<Asset>;

    /// Download `asset` into `local_path`, truncating any existing file
    ///
    /// `on_progress` receives `(bytes_downloaded, total_bytes)`.
    async fn download_asset(
        &self,
        asset: &Asset,
        local_path: &Path,
        on_progress: &ProgressFn<'_>,
    ) -> BlobResult<()>;
}

/// Validate an asset name before it is sent to a backend
///
/// Asset names become URL query parameters and file names on the remote, so
/// empty names and path separators are rejected.
pub fn validate_asset_name(name: &str) -> BlobResult<()> {
    if name.is_empty() {
        return Err(BlobError::invalid_name("asset name cannot be empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(BlobError::invalid_name(format!(
            "asset name must not contain path separators: {}",
            name
        )));
    }
    Ok(())
}
