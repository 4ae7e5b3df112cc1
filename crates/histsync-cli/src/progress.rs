// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Progress bars for transfers and batch operations
//!
//! Everything draws to stderr so `histsync status` output on stdout stays
//! machine-readable.

use histsync_lfs::TransferProgress;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressFinish, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(100);

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

/// Progress tracker shared by the large-file commands
pub struct ProgressTracker {
    multi: Arc<MultiProgress>,
    quiet: bool,
}

impl ProgressTracker {
    /// Create new progress tracker; `quiet` hides every bar
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: Arc::new(if quiet {
                MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
            } else {
                MultiProgress::with_draw_target(ProgressDrawTarget::stderr())
            }),
            quiet,
        }
    }

    /// Byte progress for a single upload
    pub fn upload_bar(&self, msg: &str) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }

        let pb = self.multi.add(ProgressBar::new(0).with_finish(ProgressFinish::AndClear));
        pb.set_style(bar_style(
            "{spinner:.green} {msg} [{bar:40.green/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        ));
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(TICK);
        pb
    }

    /// Count of files processed out of `total`
    pub fn file_bar(&self, msg: &str, total: u64) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }

        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(bar_style(
            "{spinner:.magenta} {msg} [{bar:40.magenta/blue}] {pos}/{len} files ({percent}%)",
        ));
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(TICK);
        pb
    }

    /// Spinner for indeterminate work; clears itself when finished
    pub fn spinner(&self, msg: &str) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }

        let pb = self
            .multi
            .add(ProgressBar::new_spinner().with_finish(ProgressFinish::AndClear));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(TICK);
        pb
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Adapt a byte bar to the engine's transfer callback
    pub fn transfer_sink(bar: &ProgressBar) -> Box<TransferProgress<'static>> {
        let bar = bar.clone();
        Box::new(move |path: &Path, done: u64, total: u64| {
            if bar.length() != Some(total) {
                bar.set_length(total);
                if let Some(name) = path.file_name() {
                    bar.set_message(name.to_string_lossy().into_owned());
                }
            }
            bar.set_position(done);
        })
    }

    /// Human-readable byte count
    pub fn format_bytes(bytes: u64) -> String {
        format!("{}", HumanBytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_bars_are_hidden() {
        let tracker = ProgressTracker::new(true);
        assert!(tracker.is_quiet());
        assert!(tracker.file_bar("files", 3).is_hidden());
        assert!(tracker.upload_bar("upload").is_hidden());
        assert!(tracker.spinner("wait").is_hidden());
    }

    #[test]
    fn test_transfer_sink_tracks_position() {
        let bar = ProgressBar::hidden();
        let sink = ProgressTracker::transfer_sink(&bar);
        sink(Path::new("/hist/a.bin"), 10, 40);
        sink(Path::new("/hist/a.bin"), 40, 40);
        assert_eq!(bar.length(), Some(40));
        assert_eq!(bar.position(), 40);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(ProgressTracker::format_bytes(1024), "1.00 KiB");
    }
}
