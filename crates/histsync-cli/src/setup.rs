// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Wiring shared by the commands: settings, git, blob store and engine

use anyhow::{bail, Context, Result};
use histsync_blob::{BlobStore, GithubConfig, GithubReleaseStore};
use histsync_config::{ConfigLoader, Settings};
use histsync_git::{GitCli, GitRepo, Identity};
use histsync_lfs::{HashAlgorithm, LfsEngine, LfsOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolve settings from `config`, the environment and the override file
pub async fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = config {
        loader = loader.with_file(path);
    }
    loader.load().await.context("Failed to load configuration")
}

/// Git backend committing as the configured identity
pub fn build_git(settings: &Settings) -> Arc<dyn GitRepo> {
    Arc::new(GitCli::new(Identity {
        name: settings.remote.author_name.clone(),
        email: settings.remote.author_email.clone(),
    }))
}

pub fn lfs_options(settings: &Settings) -> Result<LfsOptions> {
    let hash_algorithm: HashAlgorithm = settings
        .lfs
        .hash_algorithm
        .parse()
        .context("Invalid lfs.hash_algorithm")?;
    Ok(LfsOptions {
        release_tag: settings.lfs.release_tag.clone(),
        threshold_bytes: settings.lfs.threshold_bytes,
        max_workers: settings.lfs.max_workers,
        verify_hash: settings.lfs.verify_hash,
        hash_algorithm,
    })
}

fn release_store(settings: &Settings) -> Result<Arc<dyn BlobStore>> {
    let config = GithubConfig::new(&settings.remote.repository, &settings.remote.token)
        .with_api_url(&settings.remote.api_url)
        .with_upload_url(&settings.remote.upload_url);
    let store = GithubReleaseStore::new(config).context("Failed to create release asset client")?;
    Ok(Arc::new(store))
}

/// Engine for the daemon, present only when large files are enabled
pub fn build_engine(settings: &Settings) -> Result<Option<LfsEngine>> {
    if !settings.lfs_enabled() {
        return Ok(None);
    }
    if !settings.has_credentials() {
        bail!("lfs.enabled is set but remote.repository and remote.token are missing");
    }
    Ok(Some(require_engine(settings)?))
}

/// Engine for the explicit large-file commands
pub fn require_engine(settings: &Settings) -> Result<LfsEngine> {
    if !settings.has_credentials() {
        bail!("Large-file commands need remote.repository and remote.token (GITHUB_REPO / GITHUB_PAT)");
    }
    Ok(LfsEngine::new(
        release_store(settings)?,
        settings.hist_dir(),
        lfs_options(settings)?,
    ))
}

/// Directory a large-file command works on; relative paths sit under the history root
pub fn resolve_dir(settings: &Settings, dir: Option<&Path>) -> PathBuf {
    match dir {
        None => settings.hist_dir().to_path_buf(),
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => settings.hist_dir().join(dir),
    }
}
