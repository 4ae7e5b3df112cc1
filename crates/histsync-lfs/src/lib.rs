// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Large-file engine for histsync
//!
//! Files above a size threshold are moved out of the git history: their
//! content goes to a release asset on a [`histsync_blob::BlobStore`] and a
//! small [`PointerFile`] takes their place in the tree. A per-root
//! [`Manifest`] remembers every version ever externalized so a pointer whose
//! asset disappeared can still be restored from an older upload.
//!
//! # Examples
//!
//! ```no_run
//! use histsync_blob::mock::MockBlobStore;
//! use histsync_lfs::{no_progress, LfsEngine, LfsOptions, Manifest};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), histsync_lfs::LfsError> {
//! let root = Path::new("/srv/hist");
//! let engine = LfsEngine::new(Arc::new(MockBlobStore::new()), root, LfsOptions::default());
//! let mut manifest = Manifest::load(root).await?;
//!
//! let pointer = engine
//!     .convert(&root.join("media/footage.mov"), &mut manifest, &no_progress)
//!     .await?;
//! println!("uploaded as {}", pointer.asset_name);
//!
//! let results = engine.restore_all(root, &manifest, |done, total| {
//!     println!("{}/{}", done, total);
//! }).await?;
//! # let _ = results;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod pointer;
pub mod scan;

pub use engine::{
    no_progress, should_externalize, ExternalizeReport, LfsEngine, LfsOptions, TransferProgress,
    DEFAULT_MAX_WORKERS, DEFAULT_RELEASE_TAG, DEFAULT_THRESHOLD_BYTES,
};
pub use error::{ErrorKind, LfsError, LfsResult};
pub use hash::{hash_file, HashAlgorithm};
pub use manifest::{relative_key, Manifest, ManifestVersion, LFS_DIR};
pub use pointer::{
    asset_name_for, is_pointer_file, logical_path_for, pointer_path_for, PointerFile,
    MAX_POINTER_SIZE, POINTER_SUFFIX,
};
