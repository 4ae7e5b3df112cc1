// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Settings for the histsync daemon and CLI
//!
//! Settings resolve in four layers, each overriding the previous one:
//!
//! 1. built-in defaults
//! 2. an optional TOML or JSON file
//! 3. environment variables (`GITHUB_REPO`, `GITHUB_PAT`, `HIST_DIR`,
//!    `SYNC_TARGETS`, `EXCLUDE_PATHS`, `LFS_THRESHOLD`, ...)
//! 4. `<hist_dir>/sync-config.json`, written by the management UI
//!
//! # Example
//!
//! ```no_run
//! use histsync_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ConfigLoader::new().with_file("histsync.toml").load().await?;
//!     println!("mirroring {} targets into {}", settings.paths.targets.len(), settings.hist_dir().display());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod loader;
pub mod overrides;
pub mod paths;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{parse_bool, ConfigFormat, ConfigLoader};
pub use overrides::{load_overrides, save_overrides, LocalOverrides};
pub use paths::{clean_relative, normalize, to_abs_under_base, to_under_hist};
pub use schema::*;
pub use validation::Validator;
