// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

use crate::progress::ProgressTracker;
use crate::{output, setup};
use anyhow::{bail, Context, Result};
use clap::Parser;
use histsync_config::Settings;
use histsync_lfs::Manifest;
use std::path::PathBuf;
use tracing::warn;

/// Upload oversized files as release assets and leave pointers behind
#[derive(Parser, Debug, Default)]
pub struct ExternalizeCmd {
    /// Directory to scan, relative to the history root
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Only list what would be externalized
    #[arg(long)]
    pub dry_run: bool,
}

impl ExternalizeCmd {
    pub async fn execute(&self, settings: Settings, progress: &ProgressTracker) -> Result<()> {
        let dir = setup::resolve_dir(&settings, self.dir.as_deref());
        let engine = setup::require_engine(&settings)?;

        let spinner = progress.spinner("Scanning for oversized files");
        let files = engine
            .scan_oversized(&dir, &settings.paths.excludes)
            .await
            .with_context(|| format!("Failed to scan {}", dir.display()))?;
        spinner.finish_and_clear();

        if files.is_empty() {
            if !progress.is_quiet() {
                output::info(&format!(
                    "Nothing above {} under {}",
                    ProgressTracker::format_bytes(settings.lfs.threshold_bytes),
                    dir.display()
                ));
            }
            return Ok(());
        }
        if self.dry_run {
            for path in &files {
                println!("{}", path.display());
            }
            return Ok(());
        }

        let mut manifest = Manifest::load(settings.hist_dir())
            .await
            .context("Failed to read the large-file manifest")?;
        let overall = progress.file_bar("Externalizing", files.len() as u64);
        let mut failed = 0usize;
        for path in &files {
            let upload = progress.upload_bar("Uploading");
            let sink = ProgressTracker::transfer_sink(&upload);
            match engine.convert(path, &mut manifest, &*sink).await {
                Ok(pointer) => {
                    upload.finish_and_clear();
                    if !progress.is_quiet() {
                        overall.println(format!("{} -> {}", path.display(), pointer.asset_name));
                    }
                }
                Err(e) => {
                    upload.abandon();
                    warn!(path = %path.display(), error = %e, "Externalize failed");
                    failed += 1;
                }
            }
            overall.inc(1);
        }
        overall.finish_and_clear();

        if failed > 0 {
            bail!("{} of {} file(s) could not be externalized", failed, files.len());
        }
        if !progress.is_quiet() {
            output::success(&format!("Externalized {} file(s)", files.len()));
        }
        Ok(())
    }
}
