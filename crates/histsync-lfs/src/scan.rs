// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Directory walks for pointer files and oversized files

use crate::manifest::LFS_DIR;
use crate::pointer::{is_pointer_file, POINTER_SUFFIX};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

const GIT_DIR: &str = ".git";

fn is_named(entry: &DirEntry, name: &str) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == OsStr::new(name)
}

fn walk(dir: &Path) -> WalkDir {
    WalkDir::new(dir).follow_links(false)
}

/// Pointer files under `dir`, skipping `.git` subtrees
pub fn scan_pointers(dir: &Path) -> Vec<PathBuf> {
    let mut pointers = Vec::new();
    for entry in walk(dir).into_iter().filter_entry(|e| !is_named(e, GIT_DIR)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_pointer_file(entry.path()) {
            pointers.push(entry.into_path());
        }
    }
    pointers
}

/// Regular files under `dir` larger than `threshold` bytes
///
/// Skips `.git` and `.lfs` subtrees, pointer files, and every entry whose
/// path relative to `dir` starts with one of `excludes`.
pub fn scan_oversized(dir: &Path, threshold: u64, excludes: &[String]) -> Vec<PathBuf> {
    let excluded = |entry: &DirEntry| {
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            return false;
        };
        let rel = rel.to_string_lossy();
        !rel.is_empty() && excludes.iter().any(|ex| !ex.is_empty() && rel.starts_with(ex.as_str()))
    };

    let mut found = Vec::new();
    let walker = walk(dir)
        .into_iter()
        .filter_entry(|e| !is_named(e, GIT_DIR) && !is_named(e, LFS_DIR) && !excluded(e));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.ends_with(POINTER_SUFFIX))
        {
            continue;
        }
        match entry.metadata() {
            Ok(meta) if meta.len() > threshold => found.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Cannot stat file"),
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::PointerFile;
    use std::fs;

    fn pointer_text() -> String {
        PointerFile::new(
            format!("sha256:{}", "a".repeat(64)),
            100,
            "big.bin",
            "lfs-assets",
            "aaaaaaaaaaaa-big.bin",
        )
        .to_string()
    }

    #[test]
    fn test_scan_pointers_skips_git() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::write(root.join("a/b/big.bin.pointer"), pointer_text()).unwrap();
        fs::write(root.join(".git/objects/x.pointer"), pointer_text()).unwrap();
        fs::write(root.join("a/plain.pointer"), "not a pointer").unwrap();

        let found = scan_pointers(root);
        assert_eq!(found, vec![root.join("a/b/big.bin.pointer")]);
    }

    #[test]
    fn test_scan_pointers_keeps_git_lookalike_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("my.github")).unwrap();
        fs::write(root.join("my.github/big.bin.pointer"), pointer_text()).unwrap();
        assert_eq!(scan_pointers(root).len(), 1);
    }

    #[test]
    fn test_scan_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for sub in ["data", "cache", ".lfs", ".git", "logs"] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        fs::write(root.join("data/big.bin"), vec![0u8; 200]).unwrap();
        fs::write(root.join("data/small.bin"), vec![0u8; 50]).unwrap();
        fs::write(root.join("data/exact.bin"), vec![0u8; 100]).unwrap();
        fs::write(root.join("data/big.bin.pointer"), vec![b'x'; 300]).unwrap();
        fs::write(root.join("cache/big.bin"), vec![0u8; 200]).unwrap();
        fs::write(root.join(".lfs/manifest.json"), vec![b' '; 200]).unwrap();
        fs::write(root.join(".git/pack"), vec![0u8; 200]).unwrap();
        fs::write(root.join("logs/app.log"), vec![0u8; 200]).unwrap();

        let mut found = scan_oversized(root, 100, &["cache".to_string()]);
        found.sort();
        assert_eq!(found, vec![root.join("data/big.bin"), root.join("logs/app.log")]);
    }
}
