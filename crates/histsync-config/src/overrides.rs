// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Target and exclude overrides stored next to the history tree
//!
//! The management UI edits `<hist_dir>/sync-config.json`; on load its lists
//! replace the configured ones when non-empty.

use crate::error::ConfigResult;
use crate::paths::clean_relative;
use crate::schema::{Settings, OVERRIDE_FILE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// Contents of the override file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalOverrides {
    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default)]
    pub excludes: Vec<String>,
}

impl LocalOverrides {
    /// Replace `settings`' lists with the non-empty override lists
    pub fn apply_to(&self, settings: &mut Settings) {
        let targets: Vec<String> = self.targets.iter().filter_map(|t| clean_relative(t)).collect();
        if !targets.is_empty() {
            settings.paths.targets = targets;
        }
        let excludes: Vec<String> = self.excludes.iter().filter_map(|e| clean_relative(e)).collect();
        if !excludes.is_empty() {
            settings.paths.excludes = excludes;
        }
    }
}

/// Read the override file of `hist_dir`
///
/// A missing or unparsable file yields `None`; an unparsable one is logged.
pub async fn load_overrides(hist_dir: &Path) -> ConfigResult<Option<LocalOverrides>> {
    let path = hist_dir.join(OVERRIDE_FILE);
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str::<LocalOverrides>(&content) {
        Ok(overrides) => {
            debug!(path = %path.display(), "Loaded local overrides");
            Ok(Some(overrides))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed override file");
            Ok(None)
        }
    }
}

/// Write `overrides` as pretty JSON to `<hist_dir>/sync-config.json`
pub async fn save_overrides(hist_dir: &Path, overrides: &LocalOverrides) -> ConfigResult<()> {
    fs::create_dir_all(hist_dir).await?;
    let json = serde_json::to_string_pretty(overrides)?;
    fs::write(hist_dir.join(OVERRIDE_FILE), json).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_replaces_only_non_empty_lists() {
        let mut settings = Settings::default();
        settings.paths.targets = vec!["a".into()];
        settings.paths.excludes = vec!["x".into()];

        LocalOverrides {
            targets: vec!["/b/".into(), "  ".into(), "c".into()],
            excludes: vec!["/".into()],
        }
        .apply_to(&mut settings);

        assert_eq!(settings.paths.targets, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(settings.paths.excludes, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let hist = dir.path().join("hist");
        assert_eq!(load_overrides(&hist).await.unwrap(), None);

        let overrides = LocalOverrides {
            targets: vec!["etc/app".into()],
            excludes: vec!["etc/app/cache".into()],
        };
        save_overrides(&hist, &overrides).await.unwrap();
        assert_eq!(load_overrides(&hist).await.unwrap(), Some(overrides));
    }

    #[tokio::test]
    async fn test_malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(OVERRIDE_FILE), "{not json").unwrap();
        assert_eq!(load_overrides(dir.path()).await.unwrap(), None);
    }
}
