// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Per-path version history of externalized files
//!
//! The manifest lives at `<history root>/.lfs/manifest.json` and is committed
//! with the tree. Records are only ever appended: an asset name, once
//! recorded, stays available as a restore fallback even after the path moves
//! on to newer content.

use crate::error::LfsResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Engine-internal directory under the history root
pub const LFS_DIR: &str = ".lfs";

/// Manifest file name inside [`LFS_DIR`]
pub const MANIFEST_FILE: &str = "manifest.json";

const MANIFEST_FORMAT: u32 = 1;

/// One recorded version of a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestVersion {
    /// Content hash, `<algorithm>:<hex>`
    pub hash: String,

    /// Asset holding this content
    pub asset_name: String,

    /// Content size in bytes
    pub size: u64,

    /// When the version was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl ManifestVersion {
    fn same_content(&self, hash: &str, asset_name: &str, size: u64) -> bool {
        self.hash == hash && self.asset_name == asset_name && self.size == size
    }
}

/// Version ledger for one history root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_format")]
    format: u32,

    /// Relative path (forward slashes) to versions, oldest first
    #[serde(default)]
    files: BTreeMap<String, Vec<ManifestVersion>>,

    #[serde(skip)]
    path: PathBuf,
}

fn default_format() -> u32 {
    MANIFEST_FORMAT
}

impl Manifest {
    /// Empty manifest that will be saved under `hist_root`
    pub fn new(hist_root: &Path) -> Self {
        Self {
            format: MANIFEST_FORMAT,
            files: BTreeMap::new(),
            path: Self::path_for(hist_root),
        }
    }

    /// `<hist_root>/.lfs/manifest.json`
    pub fn path_for(hist_root: &Path) -> PathBuf {
        hist_root.join(LFS_DIR).join(MANIFEST_FILE)
    }

    /// Load the manifest of `hist_root`; a missing file yields an empty one
    pub async fn load(hist_root: &Path) -> LfsResult<Self> {
        let path = Self::path_for(hist_root);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new(hist_root));
            }
            Err(e) => return Err(e.into()),
        };
        let mut manifest: Self = serde_json::from_str(&json)?;
        manifest.path = path;
        Ok(manifest)
    }

    /// Rewrite the whole file atomically (temp file + rename)
    pub async fn save(&self) -> LfsResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), entries = self.files.len(), "Saved manifest");
        Ok(())
    }

    /// Append a version for `rel_path`
    ///
    /// Returns `false` without appending when the most recent record is
    /// already this content.
    pub fn record(&mut self, rel_path: &str, hash: &str, asset_name: &str, size: u64) -> bool {
        let versions = self.files.entry(rel_path.to_string()).or_default();
        if versions
            .last()
            .is_some_and(|v| v.same_content(hash, asset_name, size))
        {
            return false;
        }
        versions.push(ManifestVersion {
            hash: hash.to_string(),
            asset_name: asset_name.to_string(),
            size,
            recorded_at: Some(Utc::now()),
        });
        true
    }

    /// All versions of `rel_path`, oldest first
    pub fn versions(&self, rel_path: &str) -> &[ManifestVersion] {
        self.files.get(rel_path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn latest(&self, rel_path: &str) -> Option<&ManifestVersion> {
        self.versions(rel_path).last()
    }

    /// Tracked relative paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Location the manifest is saved to
    pub fn file_path(&self) -> &Path {
        &self.path
    }
}

/// Manifest key of `path` relative to `root`, or `None` if outside it
///
/// Keys always use `/` so manifests are portable between platforms.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_and_dedups_last() {
        let mut m = Manifest::new(Path::new("/hist"));
        assert!(m.record("a/video.mp4", "sha256:01", "01-video.mp4", 10));
        assert!(!m.record("a/video.mp4", "sha256:01", "01-video.mp4", 10));
        assert!(m.record("a/video.mp4", "sha256:02", "02-video.mp4", 20));
        // Reverting to old content is a new version, not a no-op.
        assert!(m.record("a/video.mp4", "sha256:01", "01-video.mp4", 10));

        let names: Vec<_> = m
            .versions("a/video.mp4")
            .iter()
            .map(|v| v.asset_name.as_str())
            .collect();
        assert_eq!(names, ["01-video.mp4", "02-video.mp4", "01-video.mp4"]);
        assert_eq!(m.latest("a/video.mp4").unwrap().size, 10);
        assert!(m.versions("missing").is_empty());
    }

    #[test]
    fn test_relative_key() {
        let root = Path::new("/hist");
        assert_eq!(
            relative_key(root, Path::new("/hist/etc/app/big.db")).as_deref(),
            Some("etc/app/big.db")
        );
        assert_eq!(relative_key(root, Path::new("/elsewhere/x")), None);
        assert_eq!(relative_key(root, root), None);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Manifest::load(dir.path()).await.unwrap();
        assert!(missing.is_empty());

        let mut m = Manifest::new(dir.path());
        m.record("big.bin", "sha256:aa", "aa-big.bin", 3);
        m.save().await.unwrap();
        assert!(dir.path().join(".lfs/manifest.json").exists());
        assert!(!dir.path().join(".lfs/manifest.json.tmp").exists());

        let loaded = Manifest::load(dir.path()).await.unwrap();
        assert_eq!(loaded.versions("big.bin"), m.versions("big.bin"));
        assert_eq!(loaded.file_path(), m.file_path());
    }

    #[tokio::test]
    async fn test_load_accepts_records_without_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".lfs")).unwrap();
        std::fs::write(
            dir.path().join(".lfs/manifest.json"),
            r#"{"files":{"x.bin":[{"hash":"sha256:aa","asset_name":"aa-x.bin","size":1}]}}"#,
        )
        .unwrap();
        let m = Manifest::load(dir.path()).await.unwrap();
        assert_eq!(m.versions("x.bin")[0].recorded_at, None);
        assert_eq!(m.paths().collect::<Vec<_>>(), ["x.bin"]);
    }
}
