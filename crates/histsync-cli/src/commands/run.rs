// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

use crate::setup;
use anyhow::{Context, Result};
use clap::Parser;
use histsync_config::Settings;
use histsync_daemon::{SyncDaemon, SyncError};
use tracing::{info, warn};

/// Align, link and keep the history in sync until interrupted
#[derive(Parser, Debug, Default)]
pub struct RunCmd {
    /// Rely on the interval timer only
    #[arg(long)]
    pub no_watch: bool,

    /// Seconds between periodic cycles (overrides sync.interval_secs)
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,
}

impl RunCmd {
    pub async fn execute(&self, mut settings: Settings) -> Result<()> {
        if self.no_watch {
            settings.sync.watch = false;
        }
        if let Some(interval) = self.interval {
            settings.sync.interval_secs = interval.max(1);
        }

        let git = setup::build_git(&settings);
        let engine = setup::build_engine(&settings)?;
        let mut daemon = SyncDaemon::new(settings, git);
        if let Some(engine) = engine {
            daemon = daemon.with_engine(engine);
        }

        let handle = daemon.handle();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping after the current step");
                    handle.stop();
                }
                Err(e) => warn!(error = %e, "Cannot listen for ctrl-c"),
            }
        });

        match daemon.run().await {
            Ok(()) | Err(SyncError::Stopped) => {
                info!("Daemon stopped");
                Ok(())
            }
            Err(e) => Err(e).context("Sync daemon failed"),
        }
    }
}
