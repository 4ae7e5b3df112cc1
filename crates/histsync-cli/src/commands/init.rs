// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

use crate::{output, setup};
use anyhow::{Context, Result};
use clap::Parser;
use histsync_config::Settings;
use histsync_daemon::{LinkOutcome, LinkReport, SyncDaemon};

/// Align with the remote, link every target, commit once and exit
#[derive(Parser, Debug, Default)]
pub struct InitCmd {
    /// Skip large-file externalization even when credentials are present
    #[arg(long)]
    pub no_lfs: bool,
}

fn describe(outcome: LinkOutcome) -> &'static str {
    match outcome {
        LinkOutcome::Relinked => "already linked",
        LinkOutcome::MergedDirectory => "directory merged",
        LinkOutcome::MovedFile => "file moved",
        LinkOutcome::KeptExisting => "history copy kept",
        LinkOutcome::Placeholder => "placeholder created",
    }
}

impl InitCmd {
    pub async fn execute(&self, settings: Settings, quiet: bool) -> Result<()> {
        let hist = settings.hist_dir().display().to_string();
        let git = setup::build_git(&settings);
        let engine = if self.no_lfs {
            None
        } else {
            setup::build_engine(&settings)?
        };
        let mut daemon = SyncDaemon::new(settings, git);
        if let Some(engine) = engine {
            daemon = daemon.with_engine(engine);
        }

        if !quiet {
            output::header("Aligning history with the remote");
            output::detail("History", &hist);
        }
        let report = daemon
            .run_once()
            .await
            .context("Failed to initialise the history repository")?;

        if !quiet {
            print_report(&report);
        }
        if !report.failed.is_empty() {
            anyhow::bail!("{} target(s) could not be linked", report.failed.len());
        }
        Ok(())
    }
}

fn print_report(report: &LinkReport) {
    for (target, outcome) in &report.outcomes {
        output::detail(target, describe(*outcome));
    }
    for (target, reason) in &report.failed {
        output::warning(&format!("{}: {}", target, reason));
    }
    if report.markers_written > 0 {
        output::info(&format!(
            "Tracked {} empty director{}",
            report.markers_written,
            if report.markers_written == 1 { "y" } else { "ies" }
        ));
    }
    output::success(&format!("Linked {} target(s)", report.outcomes.len()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_outcome_has_a_description() {
        for outcome in [
            LinkOutcome::Relinked,
            LinkOutcome::MergedDirectory,
            LinkOutcome::MovedFile,
            LinkOutcome::KeptExisting,
            LinkOutcome::Placeholder,
        ] {
            assert!(!describe(outcome).is_empty());
        }
    }
}
