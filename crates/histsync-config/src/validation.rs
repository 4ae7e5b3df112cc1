// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

use crate::error::{ConfigError, ConfigResult};
use crate::schema::*;

/// Validator for configuration settings
pub trait Validator {
    fn validate(&self) -> ConfigResult<()>;
}

impl Validator for Settings {
    fn validate(&self) -> ConfigResult<()> {
        self.remote.validate()?;
        self.paths.validate()?;
        self.sync.validate()?;
        self.lfs.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl Validator for RemoteConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !self.repository.is_empty() {
            let mut parts = self.repository.split('/');
            let well_formed = matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty()
            );
            if !well_formed {
                return Err(ConfigError::invalid_value(
                    "remote.repository",
                    format!("expected 'owner/repo', got '{}'", self.repository),
                ));
            }
        }

        if self.host.is_empty() {
            return Err(ConfigError::MissingRequired("remote.host".to_string()));
        }

        for (field, url) in [("remote.api_url", &self.api_url), ("remote.upload_url", &self.upload_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid_value(
                    field,
                    format!("must be an http(s) URL, got '{}'", url),
                ));
            }
        }

        Ok(())
    }
}

impl Validator for PathsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.hist_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("paths.hist_dir".to_string()));
        }

        if self.branch.trim().is_empty() || self.branch.contains(char::is_whitespace) {
            return Err(ConfigError::invalid_value(
                "paths.branch",
                format!("not a usable branch name: '{}'", self.branch),
            ));
        }

        if let Some(bad) = self.targets.iter().find(|t| t.trim_matches('/').is_empty()) {
            return Err(ConfigError::invalid_value(
                "paths.targets",
                format!("empty target entry '{}'", bad),
            ));
        }

        Ok(())
    }
}

impl Validator for SyncConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.interval_secs == 0 {
            return Err(ConfigError::invalid_value(
                "sync.interval_secs",
                "must be at least 1",
            ));
        }
        if self.align_retry_secs == 0 {
            return Err(ConfigError::invalid_value(
                "sync.align_retry_secs",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Validator for LfsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.threshold_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "lfs.threshold_bytes",
                "must be greater than 0",
            ));
        }

        if self.max_workers == 0 {
            return Err(ConfigError::invalid_value(
                "lfs.max_workers",
                "must be at least 1",
            ));
        }

        if self.release_tag.trim().is_empty() {
            return Err(ConfigError::MissingRequired("lfs.release_tag".to_string()));
        }

        let valid_algorithms = ["sha256", "blake3"];
        if !valid_algorithms.contains(&self.hash_algorithm.as_str()) {
            return Err(ConfigError::invalid_value(
                "lfs.hash_algorithm",
                format!("must be one of: {}", valid_algorithms.join(", ")),
            ));
        }

        Ok(())
    }
}

impl Validator for LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.level.trim().is_empty() {
            return Err(ConfigError::MissingRequired("logging.level".to_string()));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}
