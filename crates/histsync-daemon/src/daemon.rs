// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! The sync daemon state machine
//!
//! `INIT -> ALIGNING -> ALIGNED -> LINKED -> RUNNING`
//!
//! INIT checks that a remote can be addressed at all; failing that is the
//! only fatal error. ALIGNING retries forever until the local HEAD equals
//! `origin/<branch>`. LINKED migrates the targets once and commits. RUNNING
//! then loops: a sync cycle (pull, commit, push) fires on the interval, or
//! early on a change signal once the debounce window since the previous
//! cycle has passed.
//!
//! Every operation that touches the working tree or index holds one async
//! mutex, so cycles never overlap.

use crate::error::{SyncError, SyncResult};
use crate::linker::{LinkReport, Linker};
use crate::watcher::FileWatcher;
use chrono::{DateTime, Utc};
use histsync_config::Settings;
use histsync_git::{ensure_info_exclude, GitRepo};
use histsync_lfs::{no_progress, ExternalizeReport, LfsEngine, LfsResult, Manifest};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Commit message after the one-shot migration
pub const LINK_COMMIT_MESSAGE: &str = "chore(sync): initial link & empty dirs";

/// Commit message of every sync cycle
pub const CYCLE_COMMIT_MESSAGE: &str = "chore(sync): periodic commit";

/// Granularity of the interruptible wait in the main loop
const TICK: Duration = Duration::from_secs(1);

/// Lifecycle position of a [`SyncDaemon`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// Checking that a remote is configured
    Init,
    /// Retrying until HEAD matches the remote branch
    Aligning,
    /// HEAD matches the remote branch
    Aligned,
    /// Targets migrated and linked
    Linked,
    /// Sync loop active
    Running,
    /// Loop left after a stop request
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "INIT",
            Phase::Aligning => "ALIGNING",
            Phase::Aligned => "ALIGNED",
            Phase::Linked => "LINKED",
            Phase::Running => "RUNNING",
            Phase::Stopped => "STOPPED",
        })
    }
}

/// Snapshot of the daemon for status readers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaemonStatus {
    /// Current lifecycle phase
    pub phase: Phase,
    /// Local HEAD has matched the remote branch at least once
    pub aligned: bool,
    /// Completion time of the last sync cycle, successful or not
    pub last_sync: Option<DateTime<Utc>>,
    /// Sync cycles run since start
    pub cycles: u64,
    /// A filesystem watcher is feeding change signals
    pub event_driven: bool,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Init,
            aligned: false,
            last_sync: None,
            cycles: 0,
            event_driven: false,
        }
    }
}

/// Why a sync cycle runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Event,
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Sync(Trigger),
    Idle,
}

/// Decide what one loop iteration does
///
/// `changed` is the (already cleared) change flag and `since_last` the time
/// since the last cycle finished, `None` if none has run. A change inside
/// the debounce window is dropped; the interval cycle covers it.
pub fn decide(
    changed: bool,
    since_last: Option<Duration>,
    debounce: Duration,
    interval: Duration,
) -> Decision {
    match since_last {
        None => Decision::Sync(if changed { Trigger::Event } else { Trigger::Interval }),
        Some(elapsed) if changed && elapsed >= debounce => Decision::Sync(Trigger::Event),
        Some(elapsed) if elapsed >= interval => Decision::Sync(Trigger::Interval),
        Some(_) => Decision::Idle,
    }
}

#[derive(Debug, Default)]
struct Progress {
    status: DaemonStatus,
    last_sync_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Shared {
    changed: AtomicBool,
    stop: AtomicBool,
    wake: Notify,
    git_lock: Mutex<()>,
    progress: StdMutex<Progress>,
}

impl Shared {
    fn progress<R>(&self, f: impl FnOnce(&mut Progress) -> R) -> R {
        let mut guard = self.progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    fn signal_change(&self) {
        self.changed.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Cloneable control surface of a running daemon
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    shared: Arc<Shared>,
}

impl DaemonHandle {
    /// Raise the change flag, as a filesystem event would
    pub fn trigger_sync(&self) {
        self.shared.signal_change();
    }

    /// Stop after the current step; in-flight git or transfer calls finish
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopping()
    }

    pub fn status(&self) -> DaemonStatus {
        self.shared.progress(|p| p.status.clone())
    }
}

/// Keeps one history tree level with its remote
#[derive(Debug)]
pub struct SyncDaemon {
    settings: Settings,
    git: Arc<dyn GitRepo>,
    engine: Option<LfsEngine>,
    linker: Linker,
    shared: Arc<Shared>,
}

impl SyncDaemon {
    pub fn new(settings: Settings, git: Arc<dyn GitRepo>) -> Self {
        let linker = Linker::from_settings(&settings);
        Self {
            settings,
            git,
            engine: None,
            linker,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Externalize oversized files with `engine` before each commit
    pub fn with_engine(mut self, engine: LfsEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_linker(mut self, linker: Linker) -> Self {
        self.linker = linker;
        self
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn hist(&self) -> &Path {
        &self.settings.paths.hist_dir
    }

    fn branch(&self) -> &str {
        &self.settings.paths.branch
    }

    fn set_phase(&self, phase: Phase) {
        info!(%phase, "Daemon phase");
        self.shared.progress(|p| p.status.phase = phase);
    }

    /// Run every phase, then loop until stopped
    pub async fn run(&self) -> SyncResult<()> {
        self.run_once().await?;
        let _watcher = self.start_watcher();
        self.run_loop().await;
        Ok(())
    }

    /// INIT, ALIGNING and LINKED, without entering the loop
    pub async fn run_once(&self) -> SyncResult<LinkReport> {
        self.ensure_remote_ready().await?;
        self.link_and_track().await
    }

    /// INIT: the remote URL, or the fatal configuration error
    pub fn remote_url(&self) -> SyncResult<String> {
        self.settings
            .remote_url()
            .map_err(|e| SyncError::Configuration(e.to_string()))
    }

    /// INIT then ALIGNING; returns once HEAD equals `origin/<branch>`
    ///
    /// Retries with a fixed backoff for as long as it takes. The only ways
    /// out besides success are a configuration error, raised before any git
    /// call, and [`SyncError::Stopped`].
    pub async fn ensure_remote_ready(&self) -> SyncResult<()> {
        self.set_phase(Phase::Init);
        let url = self.remote_url()?;

        self.set_phase(Phase::Aligning);
        let mut prepared = false;
        let mut attempt: u64 = 0;
        loop {
            if self.shared.stopping() {
                return Err(SyncError::Stopped);
            }
            attempt += 1;
            match self.try_align(&url, &mut prepared).await {
                Ok(true) => {
                    self.shared.progress(|p| p.status.aligned = true);
                    info!(attempt, branch = %self.branch(), "HEAD is level with origin");
                    self.set_phase(Phase::Aligned);
                    return Ok(());
                }
                Ok(false) => info!(attempt, "HEAD differs from origin, retrying"),
                Err(e) => warn!(attempt, error = %e, "Alignment attempt failed"),
            }
            self.pause(self.settings.sync.align_retry()).await;
        }
    }

    async fn try_align(&self, url: &str, prepared: &mut bool) -> SyncResult<bool> {
        let hist = self.hist();
        if !*prepared {
            self.git.ensure_repo(hist, self.branch()).await?;
            if !self.settings.paths.excludes.is_empty() {
                ensure_info_exclude(hist, &self.settings.paths.excludes).await?;
            }
            self.git.set_remote(hist, url).await?;
            *prepared = true;
        }

        if self.git.remote_is_empty(hist, self.branch()).await? {
            info!("Remote is empty, pushing an initial commit");
            self.git.initial_commit_if_needed(hist).await?;
            self.git.push(hist, self.branch()).await?;
        } else {
            self.git.fetch_and_checkout(hist, self.branch()).await?;
        }
        Ok(self.head_matches_origin().await)
    }

    /// Whether HEAD and `origin/<branch>` name the same commit
    pub async fn head_matches_origin(&self) -> bool {
        let head = self.git.rev_parse(self.hist(), "HEAD").await;
        let origin = self
            .git
            .rev_parse(self.hist(), &format!("origin/{}", self.branch()))
            .await;
        matches!((head, origin), (Ok(h), Ok(o)) if !h.is_empty() && h == o)
    }

    /// LINKED: migrate targets, mark empty directories, commit and push once
    pub async fn link_and_track(&self) -> SyncResult<LinkReport> {
        let linker = self.linker.clone();
        let targets = self.settings.paths.targets.clone();
        let excludes = self.settings.paths.excludes.clone();
        let report = tokio::task::spawn_blocking(move || {
            linker.precreate_dir_like(&targets);
            let mut report = linker.migrate_and_link(&targets);
            report.markers_written = linker.track_empty_dirs(&targets, &excludes);
            report
        })
        .await?;

        {
            let _guard = self.shared.git_lock.lock().await;
            if let Some(engine) = &self.engine {
                self.externalize(engine).await;
            }
            match self
                .git
                .add_all_and_commit_if_changed(self.hist(), LINK_COMMIT_MESSAGE)
                .await
            {
                Ok(true) => {
                    if let Err(e) = self.git.push(self.hist(), self.branch()).await {
                        warn!(error = %e, "Initial push failed, the next cycle retries");
                    }
                }
                Ok(false) => debug!("Nothing to commit after linking"),
                Err(e) => warn!(error = %e, "Commit after linking failed, the next cycle retries"),
            }
        }

        self.set_phase(Phase::Linked);
        Ok(report)
    }

    async fn externalize(&self, engine: &LfsEngine) -> Option<ExternalizeReport> {
        match self.externalize_oversized(engine).await {
            Ok(report) => {
                if !report.converted.is_empty() || !report.failed.is_empty() {
                    info!(
                        converted = report.converted.len(),
                        failed = report.failed.len(),
                        "Externalized oversized files"
                    );
                }
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Externalization skipped");
                None
            }
        }
    }

    async fn externalize_oversized(&self, engine: &LfsEngine) -> LfsResult<ExternalizeReport> {
        let mut manifest = Manifest::load(self.hist()).await?;
        engine
            .externalize_oversized(self.hist(), &self.settings.paths.excludes, &mut manifest, &no_progress)
            .await
    }

    /// One sync cycle: pull (best effort), commit if dirty, push
    ///
    /// Returns whether a commit was made. The completion time is recorded
    /// whatever the outcome.
    pub async fn pull_commit_push(&self) -> SyncResult<bool> {
        let result = {
            let _guard = self.shared.git_lock.lock().await;
            self.cycle().await
        };
        self.shared.progress(|p| {
            p.last_sync_at = Some(Instant::now());
            p.status.last_sync = Some(Utc::now());
            p.status.cycles += 1;
        });
        result
    }

    async fn cycle(&self) -> SyncResult<bool> {
        if let Err(e) = self.git.pull_rebase(self.hist(), self.branch()).await {
            warn!(error = %e, "Pull failed, committing on the local branch");
        }

        if self.settings.lfs.externalize_on_cycle {
            if let Some(engine) = &self.engine {
                self.externalize(engine).await;
            }
        }

        let changed = self
            .git
            .add_all_and_commit_if_changed(self.hist(), CYCLE_COMMIT_MESSAGE)
            .await?;

        match self.git.push(self.hist(), self.branch()).await {
            Ok(()) if changed => info!("Committed and pushed changes"),
            Ok(()) => debug!("Nothing new to push"),
            Err(e) => warn!(error = %e, "Push failed, the next cycle retries"),
        }
        Ok(changed)
    }

    fn start_watcher(&self) -> FileWatcher {
        if !self.settings.sync.watch {
            return FileWatcher::disabled();
        }
        let shared = Arc::clone(&self.shared);
        let watcher = FileWatcher::start(self.hist(), move || shared.signal_change());
        let event_driven = watcher.is_event_driven();
        self.shared.progress(|p| p.status.event_driven = event_driven);
        watcher
    }

    /// RUNNING: cycle on the interval or on debounced change signals until
    /// stopped
    pub async fn run_loop(&self) {
        self.set_phase(Phase::Running);
        let debounce = self.settings.sync.debounce();
        let interval = self.settings.sync.interval();

        while !self.shared.stopping() {
            let changed = self.shared.changed.swap(false, Ordering::SeqCst);
            let since_last = self
                .shared
                .progress(|p| p.last_sync_at.map(|at| at.elapsed()));

            match decide(changed, since_last, debounce, interval) {
                Decision::Sync(trigger) => {
                    debug!(?trigger, "Starting sync cycle");
                    if let Err(e) = self.pull_commit_push().await {
                        error!(error = %e, "Sync cycle failed");
                    }
                }
                Decision::Idle if changed => debug!("Change inside the debounce window"),
                Decision::Idle => {}
            }

            self.pause(TICK).await;
        }

        self.set_phase(Phase::Stopped);
    }

    /// Sleep for `duration` unless a change or stop signal arrives first
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shared.wake.notified() => {}
        }
    }
}
