// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Subcommands of the `histsync` binary
pub mod externalize;
pub mod init;
pub mod restore;
pub mod run;
pub mod status;

pub use externalize::ExternalizeCmd;
pub use init::InitCmd;
pub use restore::RestoreCmd;
pub use run::RunCmd;
pub use status::{StatusCmd, StatusReport};
