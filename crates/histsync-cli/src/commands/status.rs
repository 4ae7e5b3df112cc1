// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

use crate::{output, setup};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use histsync_config::Settings;
use histsync_git::GitRepo;
use histsync_lfs::{scan, Manifest};
use serde::Serialize;
use std::path::PathBuf;

/// Report alignment and large-file state of the history repository
#[derive(Parser, Debug, Default)]
pub struct StatusCmd {
    /// Human-readable output instead of JSON
    #[arg(long)]
    pub human: bool,
}

/// Snapshot printed by `histsync status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub hist_dir: PathBuf,
    pub branch: String,
    /// HEAD and `origin/<branch>` name the same commit
    pub aligned: bool,
    pub head: Option<String>,
    pub origin_head: Option<String>,
    pub lfs_enabled: bool,
    /// Pointer files currently in the tree
    pub pointers: usize,
    /// Paths with at least one recorded version
    pub manifest_entries: usize,
    pub checked_at: DateTime<Utc>,
}

impl StatusReport {
    pub async fn collect(settings: &Settings, git: &dyn GitRepo) -> Result<Self> {
        let hist = settings.hist_dir().to_path_buf();
        let branch = settings.paths.branch.clone();

        let head = git.rev_parse(&hist, "HEAD").await.ok();
        let origin_head = git
            .rev_parse(&hist, &format!("origin/{}", branch))
            .await
            .ok();
        let aligned = matches!((&head, &origin_head), (Some(h), Some(o)) if !h.is_empty() && h == o);

        let scan_root = hist.clone();
        let pointers = tokio::task::spawn_blocking(move || scan::scan_pointers(&scan_root).len())
            .await
            .context("Pointer scan aborted")?;
        let manifest = Manifest::load(&hist)
            .await
            .context("Failed to read the large-file manifest")?;

        Ok(StatusReport {
            hist_dir: hist,
            branch,
            aligned,
            head,
            origin_head,
            lfs_enabled: settings.lfs_enabled(),
            pointers,
            manifest_entries: manifest.len(),
            checked_at: Utc::now(),
        })
    }
}

impl StatusCmd {
    pub async fn execute(&self, settings: Settings) -> Result<()> {
        let git = setup::build_git(&settings);
        let report = StatusReport::collect(&settings, git.as_ref()).await?;

        if !self.human {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        output::header("History status");
        output::detail("History", &report.hist_dir.display().to_string());
        output::detail("Branch", &report.branch);
        output::detail("HEAD", report.head.as_deref().unwrap_or("(none)"));
        output::detail("origin", report.origin_head.as_deref().unwrap_or("(none)"));
        output::detail("Pointer files", &report.pointers.to_string());
        output::detail("Manifest entries", &report.manifest_entries.to_string());
        if report.aligned {
            output::success("In sync with the remote");
        } else {
            output::warning("Not aligned with the remote");
        }
        Ok(())
    }
}
