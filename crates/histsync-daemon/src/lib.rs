// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Keeps a set of filesystem targets mirrored into a git history tree
//!
//! - [`linker`] moves targets under the history root and leaves symlinks
//!   behind
//! - [`watcher`] turns filesystem events into change signals
//! - [`daemon`] aligns with the remote, links once, then runs
//!   pull/commit/push cycles until stopped
//!
//! ```no_run
//! use histsync_config::ConfigLoader;
//! use histsync_daemon::SyncDaemon;
//! use histsync_git::GitCli;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = ConfigLoader::new().load().await?;
//! let daemon = SyncDaemon::new(settings, Arc::new(GitCli::default()));
//! let handle = daemon.handle();
//! tokio::spawn(async move { tokio::signal::ctrl_c().await.ok(); handle.stop() });
//! daemon.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod daemon;
pub mod error;
pub mod linker;
pub mod watcher;

pub use daemon::{
    decide, DaemonHandle, DaemonStatus, Decision, Phase, SyncDaemon, Trigger, CYCLE_COMMIT_MESSAGE,
    LINK_COMMIT_MESSAGE,
};
pub use error::{SyncError, SyncResult};
pub use linker::{
    detect_copier, ensure_symlink, LinkOutcome, LinkReport, Linker, ManualCopier, RsyncCopier,
    TreeCopier, KEEP_MARKER,
};
pub use watcher::FileWatcher;
