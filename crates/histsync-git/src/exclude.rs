// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Local ignore rules in `.git/info/exclude`

use crate::error::GitResult;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Anchored directory pattern for an exclude entry
fn pattern_for(exclude: &str) -> Option<String> {
    let trimmed = exclude.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{}/", trimmed))
    }
}

/// Add each exclude as `/<path>/` to `<dir>/.git/info/exclude`
///
/// Patterns already present are left alone. Returns how many lines were
/// added.
pub async fn ensure_info_exclude(dir: &Path, excludes: &[String]) -> GitResult<usize> {
    let info = dir.join(".git").join("info");
    let file = info.join("exclude");
    fs::create_dir_all(&info).await?;

    let mut content = match fs::read_to_string(&file).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let mut added = 0;
    for pattern in excludes.iter().filter_map(|e| pattern_for(e)) {
        if content.lines().any(|line| line.trim() == pattern) {
            continue;
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&pattern);
        content.push('\n');
        added += 1;
    }

    if added > 0 {
        fs::write(&file, content).await?;
        debug!(added, path = %file.display(), "Updated local excludes");
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_for() {
        assert_eq!(pattern_for("cache").as_deref(), Some("/cache/"));
        assert_eq!(pattern_for("/var/log/").as_deref(), Some("/var/log/"));
        assert_eq!(pattern_for(" / "), None);
    }

    #[tokio::test]
    async fn test_ensure_info_exclude_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/info")).unwrap();
        std::fs::write(dir.path().join(".git/info/exclude"), "# local\n*.swp").unwrap();

        let excludes = vec!["cache".to_string(), "/tmp/".to_string()];
        assert_eq!(ensure_info_exclude(dir.path(), &excludes).await.unwrap(), 2);
        assert_eq!(ensure_info_exclude(dir.path(), &excludes).await.unwrap(), 0);

        let text = std::fs::read_to_string(dir.path().join(".git/info/exclude")).unwrap();
        assert_eq!(text, "# local\n*.swp\n/cache/\n/tmp/\n");
    }
}
