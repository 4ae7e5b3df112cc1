// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Change notifications for the history tree
//!
//! The daemon only needs to know that *something* changed. When the platform
//! watcher cannot be started it runs on the interval timer alone.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Whether `path` is inside a `.git` directory
pub fn is_git_internal(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == ".git")
}

/// Whether an event should wake the daemon
pub fn is_relevant(event: &Event) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.paths.iter().any(|p| !is_git_internal(p))
}

/// Source of change signals for the sync loop
pub enum FileWatcher {
    /// Backed by the platform watcher; stops when dropped
    EventDriven(RecommendedWatcher),
    /// Never signals
    NoOp,
}

impl FileWatcher {
    /// Watch `root` recursively, calling `on_change` for relevant events
    ///
    /// Falls back to [`FileWatcher::NoOp`] if the watcher cannot start.
    pub fn start<F>(root: &Path, on_change: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        match Self::event_driven(root, on_change) {
            Ok(watcher) => {
                info!(root = %root.display(), "Watching history tree for changes");
                FileWatcher::EventDriven(watcher)
            }
            Err(e) => {
                warn!(error = %e, "File watching unavailable, relying on the interval timer");
                FileWatcher::NoOp
            }
        }
    }

    pub fn disabled() -> Self {
        FileWatcher::NoOp
    }

    fn event_driven<F>(root: &Path, on_change: F) -> notify::Result<RecommendedWatcher>
    where
        F: Fn() + Send + 'static,
    {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_relevant(&event) {
                    on_change();
                }
            }
            Err(e) => debug!(error = %e, "Watch error"),
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }

    pub fn is_event_driven(&self) -> bool {
        matches!(self, FileWatcher::EventDriven(_))
    }
}

impl fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileWatcher::EventDriven(_) => f.write_str("FileWatcher::EventDriven"),
            FileWatcher::NoOp => f.write_str("FileWatcher::NoOp"),
        }
    }
}
