// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Library half of the `histsync` binary
//!
//! Commands are plain `clap` structs with an async `execute`, so they can be
//! driven from tests without spawning the binary.

pub mod commands;
pub mod output;
pub mod progress;
pub mod setup;
