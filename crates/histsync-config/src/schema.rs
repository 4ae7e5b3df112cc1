// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

use crate::error::{ConfigError, ConfigResult};
use crate::paths::{to_abs_under_base, to_under_hist};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the local override file inside the history root
pub const OVERRIDE_FILE: &str = "sync-config.json";

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Remote repository and credentials
    pub remote: RemoteConfig,

    /// Filesystem layout
    pub paths: PathsConfig,

    /// Daemon timing
    pub sync: SyncConfig,

    /// Large-file externalization
    pub lfs: LfsConfig,

    /// Log output
    pub logging: LoggingConfig,
}

impl Settings {
    /// Whether a repository identifier and an access token are both set
    pub fn has_credentials(&self) -> bool {
        !self.remote.repository.is_empty() && !self.remote.token.is_empty()
    }

    /// URL of the git remote
    ///
    /// An explicit `remote.url` wins; otherwise an HTTPS URL carrying the
    /// token is built from `remote.host` and `remote.repository`.
    pub fn remote_url(&self) -> ConfigResult<String> {
        if let Some(url) = self.remote.url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        if self.remote.repository.is_empty() {
            return Err(ConfigError::MissingRequired("remote.repository".to_string()));
        }
        if self.remote.token.is_empty() {
            return Err(ConfigError::MissingRequired("remote.token".to_string()));
        }
        Ok(format!(
            "https://x-access-token:{}@{}/{}.git",
            self.remote.token, self.remote.host, self.remote.repository
        ))
    }

    /// Whether large-file externalization is active
    ///
    /// Defaults to on exactly when release assets can be reached.
    pub fn lfs_enabled(&self) -> bool {
        self.lfs.enabled.unwrap_or_else(|| self.has_credentials())
    }

    /// Absolute path of a target on the live filesystem
    pub fn target_source(&self, target: &str) -> PathBuf {
        to_abs_under_base(&self.paths.base, target)
    }

    /// Canonical path of a target inside the history root
    pub fn target_in_hist(&self, target: &str) -> PathBuf {
        to_under_hist(&self.paths.hist_dir, target)
    }

    /// `<hist_dir>/sync-config.json`
    pub fn override_file(&self) -> PathBuf {
        self.paths.hist_dir.join(OVERRIDE_FILE)
    }

    pub fn hist_dir(&self) -> &Path {
        &self.paths.hist_dir
    }
}

/// Remote repository settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    /// `owner/repo`
    pub repository: String,

    /// Access token; read from config or environment, never written back
    #[serde(skip_serializing)]
    pub token: String,

    /// Explicit remote URL (local bare repository, self-hosted server)
    pub url: Option<String>,

    /// Git host used to build the remote URL
    pub host: String,

    /// REST API root for release assets
    pub api_url: String,

    /// Upload root for release assets
    pub upload_url: String,

    /// Committer name
    pub author_name: String,

    /// Committer email
    pub author_email: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            token: String::new(),
            url: None,
            host: "github.com".to_string(),
            api_url: "https://api.github.com".to_string(),
            upload_url: "https://uploads.github.com".to_string(),
            author_name: "histsync".to_string(),
            author_email: "histsync@users.noreply.github.com".to_string(),
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.token.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("RemoteConfig")
            .field("repository", &self.repository)
            .field("token", &token)
            .field("url", &self.url)
            .field("host", &self.host)
            .field("api_url", &self.api_url)
            .field("upload_url", &self.upload_url)
            .field("author_name", &self.author_name)
            .field("author_email", &self.author_email)
            .finish()
    }
}

/// Filesystem layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Root that targets are relative to
    pub base: PathBuf,

    /// History repository working tree
    pub hist_dir: PathBuf,

    /// Branch mirrored to the remote
    pub branch: String,

    /// Paths relative to `base` that are mirrored
    pub targets: Vec<String>,

    /// Path prefixes relative to `hist_dir` kept out of history
    pub excludes: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base: PathBuf::from("/"),
            hist_dir: PathBuf::from("/var/lib/histsync/history"),
            branch: "main".to_string(),
            targets: Vec::new(),
            excludes: Vec::new(),
        }
    }
}

/// Daemon timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic cycles
    pub interval_secs: u64,

    /// Minimum seconds between the last cycle and an event-triggered one
    pub debounce_secs: u64,

    /// Backoff between alignment attempts
    pub align_retry_secs: u64,

    /// Watch the history tree for changes
    pub watch: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 180,
            debounce_secs: 5,
            align_retry_secs: 3,
            watch: true,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn align_retry(&self) -> Duration {
        Duration::from_secs(self.align_retry_secs)
    }
}

/// Large-file externalization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LfsConfig {
    /// Force on or off; unset means on when credentials are present
    pub enabled: Option<bool>,

    /// Files strictly larger than this are externalized
    pub threshold_bytes: u64,

    /// Release holding the assets
    pub release_tag: String,

    /// Concurrent restores
    pub max_workers: usize,

    /// Verify downloads against the recorded hash
    pub verify_hash: bool,

    /// Externalize newly oversized files before each commit
    pub externalize_on_cycle: bool,

    /// `sha256` or `blake3`
    pub hash_algorithm: String,
}

impl Default for LfsConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            threshold_bytes: 50 * 1024 * 1024,
            release_tag: "lfs-assets".to_string(),
            max_workers: 3,
            verify_hash: true,
            externalize_on_cycle: true,
            hash_algorithm: "sha256".to_string(),
        }
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`, or a filter directive
    pub level: String,

    /// `pretty`, `compact` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
