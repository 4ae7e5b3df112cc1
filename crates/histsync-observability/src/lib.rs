// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Structured logging for histsync
//!
//! Pretty, compact and JSON output through `tracing-subscriber`, filtered by
//! an explicit directive or `RUST_LOG`.
//!
//! ```ignore
//! use histsync_observability::{init_tracing, LogFormat};
//!
//! init_tracing(LogFormat::Pretty, None)?;
//! tracing::info!("started");
//! ```

pub mod config;
pub mod initialization;

pub use config::{verbosity_level, LogConfig, LogError, LogFormat, LogOutput};
pub use initialization::{init_tracing, init_tracing_with_config};
