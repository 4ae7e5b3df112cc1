// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! In-memory [`GitRepo`] that records every call
//!
//! Simulates one local branch and its remote as commit counters, enough to
//! drive the daemon's alignment loop and sync cycles without touching disk.
//! Network-facing operations can be made to fail to exercise retry paths.

use crate::error::{GitError, GitResult};
use crate::GitRepo;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct RepoState {
    calls: Vec<String>,
    next_commit: u64,
    local_head: Option<String>,
    origin_ref: Option<String>,
    remote_head: Option<String>,
    dirty: bool,
    unreachable: bool,
    failures_left: usize,
    commits: usize,
}

impl RepoState {
    fn new_commit(&mut self) -> String {
        self.next_commit += 1;
        self.commits += 1;
        format!("{:040x}", self.next_commit)
    }

    /// Fail a network operation if the remote is down or a failure is queued
    fn network(&mut self, command: &str) -> GitResult<()> {
        if self.unreachable {
            return Err(unreachable_error(command));
        }
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(unreachable_error(command));
        }
        Ok(())
    }
}

fn unreachable_error(command: &str) -> GitError {
    GitError::NonZeroExit {
        command: command.to_string(),
        code: 128,
        output: "fatal: unable to access remote".to_string(),
    }
}

/// Recording test double for [`GitRepo`]
#[derive(Debug, Clone, Default)]
pub struct RecordingGit {
    state: Arc<Mutex<RepoState>>,
}

impl RecordingGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a remote that already has `commits` commits on the branch
    pub fn with_remote_history(commits: u64) -> Self {
        let git = Self::default();
        {
            let mut state = git.lock();
            state.next_commit = commits;
            if commits > 0 {
                state.remote_head = Some(format!("{:040x}", commits));
            }
        }
        git
    }

    fn lock(&self) -> MutexGuard<'_, RepoState> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call so far, as `"<operation> <args>"`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls whose operation name equals `op`
    pub fn count(&self, op: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }

    /// Number of commits created locally
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    /// Make the working tree dirty so the next commit-if-changed commits
    pub fn mark_dirty(&self) {
        self.lock().dirty = true;
    }

    /// Make every network operation fail until cleared
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Fail the next `n` network operations
    pub fn fail_next(&self, n: usize) {
        self.lock().failures_left = n;
    }

    /// Simulate another writer pushing a commit
    pub fn push_from_elsewhere(&self) {
        let mut state = self.lock();
        let id = state.new_commit();
        state.commits -= 1;
        state.remote_head = Some(id);
    }

    pub fn local_head(&self) -> Option<String> {
        self.lock().local_head.clone()
    }

    pub fn remote_head(&self) -> Option<String> {
        self.lock().remote_head.clone()
    }

    fn record(&self, call: String) -> MutexGuard<'_, RepoState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl GitRepo for RecordingGit {
    async fn ensure_repo(&self, _dir: &Path, branch: &str) -> GitResult<()> {
        self.record(format!("ensure_repo {}", branch));
        Ok(())
    }

    async fn set_remote(&self, _dir: &Path, url: &str) -> GitResult<()> {
        self.record(format!("set_remote {}", crate::cli::redact(url)));
        Ok(())
    }

    async fn remote_is_empty(&self, _dir: &Path, branch: &str) -> GitResult<bool> {
        let mut state = self.record(format!("remote_is_empty {}", branch));
        state.network("ls-remote --heads origin")?;
        Ok(state.remote_head.is_none())
    }

    async fn fetch_and_checkout(&self, _dir: &Path, branch: &str) -> GitResult<()> {
        let mut state = self.record(format!("fetch_and_checkout {}", branch));
        state.network("fetch origin")?;
        state.origin_ref = state.remote_head.clone();
        state.local_head = state.remote_head.clone();
        Ok(())
    }

    async fn initial_commit_if_needed(&self, _dir: &Path) -> GitResult<bool> {
        let mut state = self.record("initial_commit_if_needed".to_string());
        if state.local_head.is_some() {
            return Ok(false);
        }
        let id = state.new_commit();
        state.local_head = Some(id);
        Ok(true)
    }

    async fn add_all_and_commit_if_changed(&self, _dir: &Path, message: &str) -> GitResult<bool> {
        let mut state = self.record(format!("commit {}", message));
        if !state.dirty {
            return Ok(false);
        }
        state.dirty = false;
        let id = state.new_commit();
        state.local_head = Some(id);
        Ok(true)
    }

    async fn push(&self, _dir: &Path, branch: &str) -> GitResult<()> {
        let mut state = self.record(format!("push {}", branch));
        state.network("push -u origin")?;
        if state.remote_head != state.origin_ref && state.remote_head.is_some() {
            return Err(GitError::NonZeroExit {
                command: "push -u origin".to_string(),
                code: 1,
                output: "! [rejected] (fetch first)".to_string(),
            });
        }
        state.remote_head = state.local_head.clone();
        state.origin_ref = state.local_head.clone();
        Ok(())
    }

    async fn pull_rebase(&self, _dir: &Path, branch: &str) -> GitResult<()> {
        let mut state = self.record(format!("pull_rebase {}", branch));
        state.network("pull --rebase origin")?;
        if state.remote_head != state.origin_ref {
            let behind_only = state.local_head == state.origin_ref;
            state.origin_ref = state.remote_head.clone();
            state.local_head = if behind_only {
                state.remote_head.clone()
            } else {
                // Local commits are replayed on top of the remote.
                let id = state.new_commit();
                state.commits -= 1;
                Some(id)
            };
        }
        Ok(())
    }

    async fn rev_parse(&self, _dir: &Path, reference: &str) -> GitResult<String> {
        let state = self.record(format!("rev_parse {}", reference));
        let resolved = if reference == "HEAD" {
            state.local_head.clone()
        } else if reference.starts_with("origin/") {
            state.origin_ref.clone()
        } else {
            None
        };
        resolved.ok_or_else(|| GitError::InvalidRef(reference.to_string()))
    }
}
