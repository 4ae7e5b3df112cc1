// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Runs of the `histsync` binary against scratch directories

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const ISOLATED_VARS: &[&str] = &[
    "GITHUB_REPO",
    "GITHUB_PAT",
    "GIT_REMOTE_URL",
    "BASE",
    "HIST_DIR",
    "GIT_BRANCH",
    "SYNC_TARGETS",
    "EXCLUDE_PATHS",
    "SYNC_INTERVAL",
    "LFS_THRESHOLD",
    "LFS_RELEASE_TAG",
    "LFS_MAX_WORKERS",
    "LFS_ENABLED",
    "HISTSYNC_LOG_LEVEL",
    "HISTSYNC_LOG_FORMAT",
    "RUST_LOG",
];

#[allow(deprecated)]
fn histsync(hist: &Path) -> Command {
    let mut cmd = Command::cargo_bin("histsync").unwrap();
    for var in ISOLATED_VARS {
        cmd.env_remove(var);
    }
    cmd.env("HIST_DIR", hist).arg("--color").arg("never");
    cmd
}

#[test]
fn help_lists_every_command() {
    let tmp = TempDir::new().unwrap();
    histsync(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("restore"))
        .stdout(predicate::str::contains("externalize"));
}

#[test]
fn status_prints_json_for_an_empty_history() {
    let tmp = TempDir::new().unwrap();
    let output = histsync(tmp.path()).arg("status").output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["aligned"], false);
    assert_eq!(report["pointers"], 0);
    assert_eq!(report["manifest_entries"], 0);
    assert_eq!(report["branch"], "main");
    assert!(report["head"].is_null());
}

#[test]
fn large_file_commands_need_credentials() {
    let tmp = TempDir::new().unwrap();
    histsync(tmp.path())
        .arg("restore")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_REPO"));
    histsync(tmp.path())
        .args(["externalize", "--dir", "media"])
        .assert()
        .failure();
}

#[test]
fn invalid_log_format_is_rejected() {
    let tmp = TempDir::new().unwrap();
    histsync(tmp.path())
        .args(["--log-format", "xml", "status"])
        .assert()
        .failure();
}

#[test]
fn config_file_is_read() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("histsync.toml");
    fs::write(&config, "[paths]\nbranch = \"trunk\"\n").unwrap();

    let output = histsync(tmp.path())
        .args(["--config"])
        .arg(&config)
        .arg("status")
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["branch"], "trunk");
}

#[test]
fn init_links_targets_against_a_bare_remote() {
    let tmp = TempDir::new().unwrap();
    let remote = tmp.path().join("remote.git");
    git2::Repository::init_bare(&remote).unwrap();

    let base = tmp.path().join("base");
    let hist = tmp.path().join("hist");
    fs::create_dir_all(base.join("etc")).unwrap();
    fs::write(base.join("etc/hostname"), "box\n").unwrap();

    histsync(&hist)
        .env("BASE", &base)
        .env("GIT_REMOTE_URL", &remote)
        .env("SYNC_TARGETS", "etc/hostname var/lib/app/")
        .args(["-q", "init"])
        .assert()
        .success();

    assert_eq!(fs::read_link(base.join("etc/hostname")).unwrap(), hist.join("etc/hostname"));
    assert_eq!(fs::read_to_string(hist.join("etc/hostname")).unwrap(), "box\n");
    assert!(hist.join("var/lib/app").is_dir());

    let output = histsync(&hist).arg("status").output().unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["aligned"], true);
}
