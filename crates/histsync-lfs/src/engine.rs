// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Converting files to pointers and restoring them
//!
//! Uploads are sequential: files cross the threshold one at a time. Restores
//! fan out over a fixed number of workers since a fresh checkout may hold
//! many pointers at once.

use crate::error::{LfsError, LfsResult};
use crate::hash::{hash_file, HashAlgorithm};
use crate::manifest::{relative_key, Manifest, ManifestVersion};
use crate::pointer::{asset_name_for, logical_path_for, pointer_path_for, PointerFile};
use crate::scan;
use histsync_blob::{Asset, BlobStore, Release};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Per-file transfer progress: `(path, bytes_done, bytes_total)`
pub type TransferProgress<'a> = dyn Fn(&Path, u64, u64) + Send + Sync + 'a;

/// Progress sink that discards updates
pub fn no_progress(_path: &Path, _done: u64, _total: u64) {}

/// Default externalization threshold (50 MiB)
pub const DEFAULT_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;

/// Default release tag holding assets
pub const DEFAULT_RELEASE_TAG: &str = "lfs-assets";

/// Default restore concurrency
pub const DEFAULT_MAX_WORKERS: usize = 3;

/// Engine tuning
#[derive(Debug, Clone)]
pub struct LfsOptions {
    /// Release that holds the assets
    pub release_tag: String,
    /// Files strictly larger than this are externalized
    pub threshold_bytes: u64,
    /// Restores in flight at once in [`LfsEngine::restore_all`]
    pub max_workers: usize,
    /// Check downloaded content against the pointer's hash
    pub verify_hash: bool,
    /// Digest used for new pointers
    pub hash_algorithm: HashAlgorithm,
}

impl Default for LfsOptions {
    fn default() -> Self {
        Self {
            release_tag: DEFAULT_RELEASE_TAG.to_string(),
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
            max_workers: DEFAULT_MAX_WORKERS,
            verify_hash: true,
            hash_algorithm: HashAlgorithm::Sha256,
        }
    }
}

/// Outcome of [`LfsEngine::externalize_oversized`]
#[derive(Debug, Default)]
pub struct ExternalizeReport {
    /// Files replaced by pointers
    pub converted: Vec<PathBuf>,
    /// Files left in place, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

/// True iff `path` is a regular file strictly larger than `threshold`
///
/// A missing path is not an error.
pub async fn should_externalize(path: &Path, threshold: u64) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > threshold,
        Err(_) => false,
    }
}

fn temp_path_for(pointer_path: &Path) -> PathBuf {
    let mut name: OsString = pointer_path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Large-file engine bound to one history root and blob store
#[derive(Debug, Clone)]
pub struct LfsEngine {
    store: Arc<dyn BlobStore>,
    hist_root: PathBuf,
    options: LfsOptions,
}

impl LfsEngine {
    /// Engine over `store` for the history tree at `hist_root`
    pub fn new(store: Arc<dyn BlobStore>, hist_root: impl Into<PathBuf>, options: LfsOptions) -> Self {
        Self {
            store,
            hist_root: hist_root.into(),
            options,
        }
    }

    pub fn options(&self) -> &LfsOptions {
        &self.options
    }

    pub fn hist_root(&self) -> &Path {
        &self.hist_root
    }

    /// Upload `path`, replace it with a pointer and record the version
    ///
    /// Steps run in order: hash, ensure release, upload unless the asset
    /// already exists, write pointer, append and save the manifest, delete
    /// the original. A failure at any step leaves earlier effects in place;
    /// calling again on the same file completes the job without a second
    /// upload.
    pub async fn convert(
        &self,
        path: &Path,
        manifest: &mut Manifest,
        progress: &TransferProgress<'_>,
    ) -> LfsResult<PointerFile> {
        let meta = fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(LfsError::NotExternalizable(path.to_path_buf()));
        }
        let rel = relative_key(&self.hist_root, path)
            .ok_or_else(|| LfsError::OutsideHistoryRoot(path.to_path_buf()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LfsError::NotExternalizable(path.to_path_buf()))?;

        debug!(path = %path.display(), "Hashing");
        let hash = hash_file(path, self.options.hash_algorithm).await?;
        let size = meta.len();
        let mut asset_name = asset_name_for(&hash, &filename);

        let release = self
            .store
            .get_or_create_release(&self.options.release_tag)
            .await?;
        if self
            .store
            .get_asset_by_name(&release, &asset_name)
            .await?
            .is_some()
        {
            info!(asset = %asset_name, "Asset already uploaded, skipping upload");
        } else {
            info!(path = %path.display(), asset = %asset_name, bytes = size, "Uploading");
            let on_bytes = |done: u64, total: u64| progress(path, done, total);
            let uploaded = self
                .store
                .upload_asset(&release, path, &asset_name, &on_bytes)
                .await?;
            if uploaded.name != asset_name {
                warn!(requested = %asset_name, stored = %uploaded.name, "Asset renamed by the store");
                asset_name = uploaded.name;
            }
        }

        let pointer = PointerFile::new(
            hash.clone(),
            size,
            filename,
            self.options.release_tag.clone(),
            asset_name.clone(),
        );
        pointer.write(&pointer_path_for(path)).await?;

        if manifest.record(&rel, &hash, &asset_name, size) {
            manifest.save().await?;
        }

        fs::remove_file(path).await?;
        info!(path = %rel, asset = %asset_name, "Externalized");
        Ok(pointer)
    }

    /// Replace the pointer at `pointer_path` with the real content
    ///
    /// Returns the restored file path. On failure no temporary file is left
    /// behind and the pointer is untouched.
    pub async fn restore(
        &self,
        pointer_path: &Path,
        manifest: &Manifest,
        verify_hash: bool,
        progress: &TransferProgress<'_>,
    ) -> LfsResult<PathBuf> {
        let temp = temp_path_for(pointer_path);
        let result = self
            .restore_via(pointer_path, &temp, manifest, verify_hash, progress)
            .await;

        if let Err(e) = &result {
            if fs::try_exists(&temp).await.unwrap_or(false) {
                if let Err(rm) = fs::remove_file(&temp).await {
                    warn!(path = %temp.display(), error = %rm, "Failed to remove temporary file");
                }
            }
            warn!(pointer = %pointer_path.display(), error = %e, "Restore failed");
        }
        result
    }

    async fn restore_via(
        &self,
        pointer_path: &Path,
        temp: &Path,
        manifest: &Manifest,
        verify_hash: bool,
        progress: &TransferProgress<'_>,
    ) -> LfsResult<PathBuf> {
        let logical = logical_path_for(pointer_path).ok_or_else(|| {
            LfsError::InvalidPointerFormat(format!(
                "not a pointer file name: {}",
                pointer_path.display()
            ))
        })?;
        let mut pointer = PointerFile::read(pointer_path).await?;

        let release = self
            .store
            .get_release(&pointer.release_tag)
            .await?
            .ok_or_else(|| LfsError::ReleaseNotFound(pointer.release_tag.clone()))?;

        let asset = self
            .resolve_asset(&release, &mut pointer, &logical, manifest)
            .await?;

        let on_bytes = |done: u64, total: u64| progress(pointer_path, done, total);
        self.store.download_asset(&asset, temp, &on_bytes).await?;

        if verify_hash {
            let algorithm = pointer.algorithm()?;
            let actual = hash_file(temp, algorithm).await?;
            if actual != pointer.hash {
                fs::remove_file(temp).await?;
                return Err(LfsError::IntegrityMismatch {
                    expected: pointer.hash,
                    actual,
                });
            }
        }

        fs::rename(temp, &logical).await?;
        fs::remove_file(pointer_path).await?;
        info!(path = %logical.display(), asset = %asset.name, "Restored");
        Ok(logical)
    }

    /// Find the pointer's asset, falling back to recorded versions
    ///
    /// Versions are tried oldest first and the first one present on the
    /// remote wins; its hash, size and name replace the pointer's.
    async fn resolve_asset(
        &self,
        release: &Release,
        pointer: &mut PointerFile,
        logical: &Path,
        manifest: &Manifest,
    ) -> LfsResult<Asset> {
        if let Some(asset) = self
            .store
            .get_asset_by_name(release, &pointer.asset_name)
            .await?
        {
            return Ok(asset);
        }

        let key = relative_key(&self.hist_root, logical);
        let versions: &[ManifestVersion] = match &key {
            Some(key) => manifest.versions(key),
            None => &[],
        };
        for version in versions {
            if let Some(asset) = self
                .store
                .get_asset_by_name(release, &version.asset_name)
                .await?
            {
                info!(
                    missing = %pointer.asset_name,
                    fallback = %version.asset_name,
                    "Using fallback version"
                );
                pointer.hash = version.hash.clone();
                pointer.size = version.size;
                pointer.asset_name = version.asset_name.clone();
                return Ok(asset);
            }
        }

        Err(LfsError::AssetNotFound {
            asset_name: pointer.asset_name.clone(),
            tried: versions.len(),
        })
    }

    /// Pointer files under `dir`
    pub async fn scan_pointers(&self, dir: &Path) -> LfsResult<Vec<PathBuf>> {
        let dir = dir.to_path_buf();
        Ok(tokio::task::spawn_blocking(move || scan::scan_pointers(&dir)).await?)
    }

    /// Files under `dir` above the configured threshold
    pub async fn scan_oversized(&self, dir: &Path, excludes: &[String]) -> LfsResult<Vec<PathBuf>> {
        let dir = dir.to_path_buf();
        let excludes = excludes.to_vec();
        let threshold = self.options.threshold_bytes;
        Ok(
            tokio::task::spawn_blocking(move || scan::scan_oversized(&dir, threshold, &excludes))
                .await?,
        )
    }

    /// Restore every pointer under `dir` with at most `max_workers` in flight
    ///
    /// The result holds one entry per discovered pointer. `on_progress`
    /// receives `(completed, total)` after each restore finishes.
    pub async fn restore_all<F>(
        &self,
        dir: &Path,
        manifest: &Manifest,
        on_progress: F,
    ) -> LfsResult<HashMap<PathBuf, bool>>
    where
        F: Fn(usize, usize),
    {
        let pointers = self.scan_pointers(dir).await?;
        let total = pointers.len();
        if total == 0 {
            info!(dir = %dir.display(), "No pointer files found");
            return Ok(HashMap::new());
        }
        info!(count = total, workers = self.options.max_workers, "Restoring pointer files");

        let mut results: HashMap<PathBuf, bool> =
            pointers.iter().map(|p| (p.clone(), false)).collect();
        let semaphore = Arc::new(Semaphore::new(self.options.max_workers.max(1)));
        let manifest = Arc::new(manifest.clone());
        let mut tasks = JoinSet::new();

        for pointer in pointers {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let manifest = Arc::clone(&manifest);
            tasks.spawn(async move {
                let restored = match semaphore.acquire_owned().await {
                    Ok(_permit) => engine
                        .restore(&pointer, &manifest, engine.options.verify_hash, &no_progress)
                        .await
                        .is_ok(),
                    Err(_) => false,
                };
                (pointer, restored)
            });
        }

        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            match joined {
                Ok((pointer, restored)) => {
                    results.insert(pointer, restored);
                }
                Err(e) => error!(error = %e, "Restore task aborted"),
            }
            on_progress(completed, total);
        }

        let restored = results.values().filter(|ok| **ok).count();
        info!(restored, total, "Restore finished");
        Ok(results)
    }

    /// Convert every oversized file under `dir`, one at a time
    ///
    /// Failures are collected, not raised; the file stays in place and is
    /// picked up again on the next call.
    pub async fn externalize_oversized(
        &self,
        dir: &Path,
        excludes: &[String],
        manifest: &mut Manifest,
        progress: &TransferProgress<'_>,
    ) -> LfsResult<ExternalizeReport> {
        let mut report = ExternalizeReport::default();
        for path in self.scan_oversized(dir, excludes).await? {
            match self.convert(&path, manifest, progress).await {
                Ok(_) => report.converted.push(path),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Externalize failed");
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use histsync_blob::mock::MockBlobStore;

    fn engine(store: &MockBlobStore, root: &Path) -> LfsEngine {
        LfsEngine::new(
            Arc::new(store.clone()),
            root,
            LfsOptions {
                threshold_bytes: 16,
                ..LfsOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn test_should_externalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, vec![0u8; 17]).unwrap();
        assert!(should_externalize(&path, 16).await);
        assert!(!should_externalize(&path, 17).await);
        assert!(!should_externalize(&dir.path().join("missing"), 0).await);
        assert!(!should_externalize(dir.path(), 0).await);
    }

    #[test]
    fn test_temp_path_is_sibling() {
        assert_eq!(
            temp_path_for(Path::new("/h/a.bin.pointer")),
            PathBuf::from("/h/a.bin.pointer.tmp")
        );
    }

    #[tokio::test]
    async fn test_convert_rejects_outside_root() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let path = other.path().join("big.bin");
        std::fs::write(&path, vec![1u8; 64]).unwrap();

        let store = MockBlobStore::new();
        let mut manifest = Manifest::new(root.path());
        let err = engine(&store, root.path())
            .convert(&path, &mut manifest, &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, LfsError::OutsideHistoryRoot(_)));
        assert!(path.exists());
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_restore_missing_release() {
        let root = tempfile::tempdir().unwrap();
        let pointer_path = root.path().join("x.bin.pointer");
        PointerFile::new(
            format!("sha256:{}", "0".repeat(64)),
            1,
            "x.bin",
            "nope",
            "000000000000-x.bin",
        )
        .write(&pointer_path)
        .await
        .unwrap();

        let store = MockBlobStore::new();
        let manifest = Manifest::new(root.path());
        let err = engine(&store, root.path())
            .restore(&pointer_path, &manifest, true, &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, LfsError::ReleaseNotFound(tag) if tag == "nope"));
        assert!(pointer_path.exists());
    }
}
