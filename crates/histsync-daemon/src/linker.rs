// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Moving targets into the history tree and linking them back
//!
//! Every target has a source path under the base root and a canonical path
//! under the history root. After [`Linker::migrate_and_link`] the canonical
//! path owns the content and the source is a symlink to it. When both sides
//! already hold something, the history side wins.
//!
//! All operations here are blocking; the daemon runs them on the blocking
//! pool.

use crate::error::{SyncError, SyncResult};
use histsync_config::{to_abs_under_base, to_under_hist, Settings};
use histsync_lfs::relative_key;
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Zero-byte marker that keeps an empty directory in git
pub const KEEP_MARKER: &str = ".gitkeep";

/// Whether a target names a file rather than a directory
///
/// A base name containing a `.` is taken to be a file.
pub fn looks_like_file(rel: &str) -> bool {
    rel.trim_end_matches('/')
        .rsplit('/')
        .next()
        .is_some_and(|name| name.contains('.'))
}

/// Whether `rel` (relative to the history root) lies under any exclude
pub fn is_excluded(rel: &str, excludes: &[String]) -> bool {
    excludes.iter().any(|exclude| {
        let exclude = exclude.trim_matches('/');
        !exclude.is_empty()
            && (rel == exclude
                || (rel.starts_with(exclude) && rel[exclude.len()..].starts_with('/')))
    })
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

/// Make `src` a symlink to `dst`
///
/// A correct link is left alone, a link elsewhere is replaced, and a file or
/// directory at `src` is removed first. Missing parents of `src` are created.
pub fn ensure_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = src.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::symlink_metadata(src) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if fs::read_link(src)? == dst {
                return Ok(());
            }
            fs::remove_file(src)?;
        }
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(src)?,
        Ok(_) => fs::remove_file(src)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    symlink(dst, src)
}

/// Strategy for merging one directory tree into another
///
/// Implementations must never overwrite an entry that already exists at the
/// destination.
pub trait TreeCopier: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()>;
}

/// Recursive copy with std::fs
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualCopier;

impl TreeCopier for ManualCopier {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()> {
        for entry in WalkDir::new(src).follow_links(false) {
            let entry = entry?;
            let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
            let target = dst.join(rel);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if fs::symlink_metadata(&target).is_ok() {
                continue;
            }
            if entry.file_type().is_symlink() {
                symlink(&fs::read_link(entry.path())?, &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }
}

/// `rsync -a --ignore-existing`, falling back to [`ManualCopier`] when rsync fails
#[derive(Debug, Clone)]
pub struct RsyncCopier {
    program: PathBuf,
}

impl RsyncCopier {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

fn with_trailing_slash(path: &Path) -> OsString {
    let mut s = path.as_os_str().to_os_string();
    s.push("/");
    s
}

impl TreeCopier for RsyncCopier {
    fn name(&self) -> &'static str {
        "rsync"
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> io::Result<()> {
        fs::create_dir_all(dst)?;
        let status = Command::new(&self.program)
            .arg("-a")
            .arg("--ignore-existing")
            .arg(with_trailing_slash(src))
            .arg(with_trailing_slash(dst))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                warn!(code = ?status.code(), src = %src.display(), "rsync failed, copying manually");
                ManualCopier.copy_tree(src, dst)
            }
            Err(e) => {
                warn!(error = %e, "rsync could not be started, copying manually");
                ManualCopier.copy_tree(src, dst)
            }
        }
    }
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// rsync when it is on PATH, the manual copier otherwise
pub fn detect_copier() -> Arc<dyn TreeCopier> {
    match find_in_path("rsync") {
        Some(program) => Arc::new(RsyncCopier::new(program)),
        None => Arc::new(ManualCopier),
    }
}

/// What happened to one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Source was already a symlink; only its destination was reconciled
    Relinked,
    /// Source directory merged into the history tree
    MergedDirectory,
    /// Source file moved into the history tree
    MovedFile,
    /// History already had the file; the source copy was dropped
    KeptExisting,
    /// Nothing at the source; an empty placeholder was created
    Placeholder,
}

/// Per-target results of a migration pass
#[derive(Debug, Default)]
pub struct LinkReport {
    pub outcomes: Vec<(String, LinkOutcome)>,
    pub failed: Vec<(String, String)>,
    /// `.gitkeep` markers written by [`Linker::track_empty_dirs`]
    pub markers_written: usize,
}

impl LinkReport {
    pub fn outcome(&self, target: &str) -> Option<LinkOutcome> {
        self.outcomes
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, outcome)| *outcome)
    }
}

/// Migrates targets between a base root and a history root
#[derive(Debug, Clone)]
pub struct Linker {
    base: PathBuf,
    hist_root: PathBuf,
    copier: Arc<dyn TreeCopier>,
}

impl Linker {
    pub fn new(base: impl Into<PathBuf>, hist_root: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            hist_root: hist_root.into(),
            copier: detect_copier(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.paths.base, &settings.paths.hist_dir)
    }

    pub fn with_copier(mut self, copier: Arc<dyn TreeCopier>) -> Self {
        self.copier = copier;
        self
    }

    pub fn copier_name(&self) -> &'static str {
        self.copier.name()
    }

    pub fn source_of(&self, rel: &str) -> PathBuf {
        to_abs_under_base(&self.base, rel)
    }

    pub fn canonical_of(&self, rel: &str) -> PathBuf {
        to_under_hist(&self.hist_root, rel)
    }

    /// Create the parent of file-like targets and the directory of the rest
    pub fn precreate_dir_like(&self, targets: &[String]) {
        for rel in targets {
            let dst = self.canonical_of(rel);
            let dir = if looks_like_file(rel) {
                dst.parent().map(Path::to_path_buf)
            } else {
                Some(dst)
            };
            if let Some(dir) = dir {
                if let Err(e) = fs::create_dir_all(&dir) {
                    warn!(target = %rel, error = %e, "Could not pre-create directory");
                }
            }
        }
    }

    /// Migrate each target and link its source to the history tree
    ///
    /// A failing target is reported and the rest still run. Running twice
    /// in a row changes nothing the second time.
    pub fn migrate_and_link(&self, targets: &[String]) -> LinkReport {
        let mut report = LinkReport::default();
        for rel in targets {
            match self.link_target(rel) {
                Ok(outcome) => {
                    debug!(target = %rel, ?outcome, "Linked");
                    report.outcomes.push((rel.clone(), outcome));
                }
                Err(e) => {
                    warn!(target = %rel, error = %e, "Migration failed");
                    report.failed.push((rel.clone(), e.to_string()));
                }
            }
        }
        info!(
            linked = report.outcomes.len(),
            failed = report.failed.len(),
            copier = self.copier.name(),
            "Migration finished"
        );
        report
    }

    /// Migrate and link one target
    pub fn link_target(&self, rel: &str) -> SyncResult<LinkOutcome> {
        let src = self.source_of(rel);
        let dst = self.canonical_of(rel);
        if src == dst {
            return Err(SyncError::Configuration(format!(
                "target '{}' resolves to the same path inside and outside history",
                rel
            )));
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::filesystem(parent, e))?;
        }

        let outcome = match fs::symlink_metadata(&src) {
            Ok(meta) if meta.file_type().is_symlink() => LinkOutcome::Relinked,
            Ok(meta) if meta.is_dir() => {
                fs::create_dir_all(&dst).map_err(|e| SyncError::filesystem(&dst, e))?;
                self.copier
                    .copy_tree(&src, &dst)
                    .map_err(|e| SyncError::filesystem(&src, e))?;
                fs::remove_dir_all(&src).map_err(|e| SyncError::filesystem(&src, e))?;
                LinkOutcome::MergedDirectory
            }
            Ok(_) => self.move_file(&src, &dst)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.placeholder(rel, &dst)?;
                LinkOutcome::Placeholder
            }
            Err(e) => return Err(SyncError::filesystem(&src, e)),
        };

        ensure_symlink(&src, &dst).map_err(|e| SyncError::filesystem(&src, e))?;
        Ok(outcome)
    }

    fn move_file(&self, src: &Path, dst: &Path) -> SyncResult<LinkOutcome> {
        // An empty directory here is a pre-created placeholder, not content.
        if dst.is_dir() && is_empty_dir(dst) {
            fs::remove_dir(dst).map_err(|e| SyncError::filesystem(dst, e))?;
        }
        if fs::symlink_metadata(dst).is_ok() {
            fs::remove_file(src).map_err(|e| SyncError::filesystem(src, e))?;
            return Ok(LinkOutcome::KeptExisting);
        }
        if let Err(rename_err) = fs::rename(src, dst) {
            debug!(error = %rename_err, "rename failed, copying across filesystems");
            fs::copy(src, dst).map_err(|e| SyncError::filesystem(dst, e))?;
            fs::remove_file(src).map_err(|e| SyncError::filesystem(src, e))?;
        }
        Ok(LinkOutcome::MovedFile)
    }

    fn placeholder(&self, rel: &str, dst: &Path) -> SyncResult<()> {
        if looks_like_file(rel) {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dst)
                .map_err(|e| SyncError::filesystem(dst, e))?;
        } else {
            fs::create_dir_all(dst).map_err(|e| SyncError::filesystem(dst, e))?;
        }
        Ok(())
    }

    /// Write a `.gitkeep` into every directory under the targets that has no
    /// entries at all
    ///
    /// Only direct emptiness counts: a directory holding nothing but empty
    /// directories is not marked itself (its children are). Excluded subtrees
    /// and `.git` are skipped. Returns the number of markers written.
    pub fn track_empty_dirs(&self, targets: &[String], excludes: &[String]) -> usize {
        let mut written = 0;
        for rel in targets {
            let root = self.canonical_of(rel);
            if !root.is_dir() {
                continue;
            }
            let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
                if !entry.file_type().is_dir() {
                    return true;
                }
                if entry.file_name() == ".git" {
                    return false;
                }
                let key = relative_key(&self.hist_root, entry.path()).unwrap_or_default();
                !is_excluded(&key, excludes)
            });

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };
                if !entry.file_type().is_dir() || !is_empty_dir(entry.path()) {
                    continue;
                }
                let marker = entry.path().join(KEEP_MARKER);
                if marker.exists() {
                    continue;
                }
                match fs::File::create(&marker) {
                    Ok(_) => written += 1,
                    Err(e) => warn!(path = %marker.display(), error = %e, "Could not write marker"),
                }
            }
        }
        if written > 0 {
            info!(written, "Marked empty directories");
        }
        written
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
