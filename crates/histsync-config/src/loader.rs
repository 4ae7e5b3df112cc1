// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

use crate::error::{ConfigError, ConfigResult};
use crate::overrides::load_overrides;
use crate::paths::clean_relative;
use crate::schema::Settings;
use crate::validation::Validator;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::InvalidPath(path.to_path_buf())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// Resolves [`Settings`] from defaults, an optional file, the environment
/// and the override file in the history root, in that order
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    validate: bool,
    config_file: Option<PathBuf>,
    read_overrides: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        ConfigLoader {
            validate: true,
            config_file: None,
            read_overrides: true,
        }
    }

    /// Create a loader without validation
    pub fn without_validation() -> Self {
        ConfigLoader {
            validate: false,
            ..Self::new()
        }
    }

    /// Read `path` on top of the defaults
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Skip `<hist_dir>/sync-config.json`
    pub fn without_local_overrides(mut self) -> Self {
        self.read_overrides = false;
        self
    }

    /// Load using the process environment
    pub async fn load(&self) -> ConfigResult<Settings> {
        self.load_with_env(|key| std::env::var(key).ok()).await
    }

    /// Load using `lookup` in place of the process environment
    pub async fn load_with_env<F>(&self, lookup: F) -> ConfigResult<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match &self.config_file {
            Some(path) => self.load_file(path).await?,
            None => Settings::default(),
        };

        self.apply_env_overrides(&mut settings, lookup)?;
        settings.paths.hist_dir = absolute(&settings.paths.hist_dir)?;

        if self.read_overrides {
            if let Some(overrides) = load_overrides(&settings.paths.hist_dir).await? {
                overrides.apply_to(&mut settings);
            }
        }

        if self.validate {
            settings.validate()?;
            debug!("Configuration validated successfully");
        }

        Ok(settings)
    }

    /// Parse a configuration file without applying anything on top
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Settings> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).await?;
        info!(
            "Loaded {} configuration file: {}",
            format.name(),
            path.display()
        );

        self.load_from_string(&content, format)
    }

    pub fn load_from_string(&self, content: &str, format: ConfigFormat) -> ConfigResult<Settings> {
        let settings: Settings = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(settings)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides<F>(&self, settings: &mut Settings, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Remote
        if let Some(value) = lookup("GITHUB_REPO") {
            settings.remote.repository = value.trim().to_string();
        }
        if let Some(value) = lookup("GITHUB_PAT") {
            settings.remote.token = value.trim().to_string();
        }
        if let Some(value) = lookup("GIT_REMOTE_URL").filter(|v| !v.trim().is_empty()) {
            settings.remote.url = Some(value.trim().to_string());
        }

        // Paths
        if let Some(value) = lookup("BASE") {
            settings.paths.base = PathBuf::from(value);
        }
        if let Some(value) = lookup("HIST_DIR") {
            settings.paths.hist_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("GIT_BRANCH") {
            settings.paths.branch = value.trim().to_string();
        }
        if let Some(value) = lookup("SYNC_TARGETS") {
            settings.paths.targets = split_list(&value);
        }
        if let Some(value) = lookup("EXCLUDE_PATHS") {
            settings.paths.excludes = split_list(&value);
        }

        // Sync
        if let Some(value) = lookup("SYNC_INTERVAL") {
            settings.sync.interval_secs = value.trim().parse().map_err(|_| {
                ConfigError::env_var_parsing_error(
                    "SYNC_INTERVAL",
                    &value,
                    "expected a number of seconds",
                )
            })?;
        }

        // Large files
        if let Some(value) = lookup("LFS_THRESHOLD") {
            settings.lfs.threshold_bytes = value.trim().parse().map_err(|_| {
                ConfigError::env_var_parsing_error(
                    "LFS_THRESHOLD",
                    &value,
                    "expected a size in bytes",
                )
            })?;
        }
        if let Some(value) = lookup("LFS_RELEASE_TAG") {
            settings.lfs.release_tag = value.trim().to_string();
        }
        if let Some(value) = lookup("LFS_MAX_WORKERS") {
            settings.lfs.max_workers = value.trim().parse().map_err(|_| {
                ConfigError::env_var_parsing_error(
                    "LFS_MAX_WORKERS",
                    &value,
                    "expected a positive integer",
                )
            })?;
        }
        if let Some(value) = lookup("LFS_ENABLED") {
            settings.lfs.enabled = Some(parse_bool("LFS_ENABLED", &value)?);
        }

        // Logging
        if let Some(value) = lookup("HISTSYNC_LOG_LEVEL") {
            settings.logging.level = value;
        }
        if let Some(value) = lookup("HISTSYNC_LOG_FORMAT") {
            settings.logging.format = value.to_lowercase();
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Whitespace-separated path list, each entry trimmed of '/'
fn split_list(value: &str) -> Vec<String> {
    value.split_whitespace().filter_map(clean_relative).collect()
}

fn absolute(path: &Path) -> ConfigResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::path::absolute(path).map_err(|e| {
        ConfigError::invalid_value("paths.hist_dir", format!("cannot make absolute: {}", e))
    })
}

/// Parse boolean from string (accepts: true, false, yes, no, 1, 0, on, off)
pub fn parse_bool(variable: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::env_var_parsing_error(
            variable,
            value,
            "expected 'true', 'false', 'yes', 'no', '1', '0', 'on', or 'off'",
        )),
    }
}
