// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

use crate::progress::ProgressTracker;
use crate::{output, setup};
use anyhow::{bail, Context, Result};
use clap::Parser;
use histsync_config::Settings;
use histsync_lfs::Manifest;
use std::path::PathBuf;

/// Replace pointer files with their content from release assets
#[derive(Parser, Debug, Default)]
pub struct RestoreCmd {
    /// Directory to restore, relative to the history root
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Concurrent downloads (overrides lfs.max_workers)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
}

impl RestoreCmd {
    pub async fn execute(&self, mut settings: Settings, progress: &ProgressTracker) -> Result<()> {
        if let Some(workers) = self.workers {
            settings.lfs.max_workers = workers.max(1);
        }
        let dir = setup::resolve_dir(&settings, self.dir.as_deref());
        let engine = setup::require_engine(&settings)?;
        let manifest = Manifest::load(settings.hist_dir())
            .await
            .context("Failed to read the large-file manifest")?;

        let bar = progress.file_bar("Restoring", 0);
        let results = engine
            .restore_all(&dir, &manifest, |done, total| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            })
            .await
            .with_context(|| format!("Failed to restore pointers under {}", dir.display()))?;
        bar.finish_and_clear();

        let mut failed: Vec<&PathBuf> = results
            .iter()
            .filter(|(_, restored)| !**restored)
            .map(|(path, _)| path)
            .collect();
        failed.sort();

        let quiet = progress.is_quiet();
        if !quiet {
            if results.is_empty() {
                output::info(&format!("No pointer files under {}", dir.display()));
            }
            for path in &failed {
                output::warning(&format!("Not restored: {}", path.display()));
            }
        }
        if !failed.is_empty() {
            bail!("{} of {} pointer files could not be restored", failed.len(), results.len());
        }
        if !quiet && !results.is_empty() {
            output::success(&format!("Restored {} file(s)", results.len()));
        }
        Ok(())
    }
}
