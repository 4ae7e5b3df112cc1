// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Mapping targets between the live filesystem and the history tree

use std::path::{Component, Path, PathBuf};

/// Lexically resolve `.` and `..` without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute path of `rel` under `base`; an absolute `rel` is taken as-is
pub fn to_abs_under_base(base: &Path, rel: &str) -> PathBuf {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return rel_path.to_path_buf();
    }
    normalize(&base.join(rel_path))
}

/// Path of `rel` inside the history tree, mirroring its components
pub fn to_under_hist(hist: &Path, rel: &str) -> PathBuf {
    normalize(&hist.join(rel.trim_start_matches('/')))
}

/// Trim surrounding whitespace and slashes; `None` if nothing is left
pub fn clean_relative(entry: &str) -> Option<String> {
    let trimmed = entry.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
