// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use histsync_cli::commands::*;
use histsync_cli::progress::ProgressTracker;
use histsync_cli::{output, setup};
use histsync_config::Settings;
use histsync_observability::{init_tracing_with_config, verbosity_level, LogConfig, LogFormat};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "histsync")]
#[command(version, about = "Mirror selected paths into a git history and keep it in sync")]
#[command(
    long_about = "histsync moves selected files and directories into a git working tree, leaves \
symlinks in their place, and commits, pulls and pushes the tree on change and on a timer. \
Files above a size threshold are stored as release assets behind small pointer files."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TOML or JSON configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Errors only, no progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format: pretty, compact or json (overrides logging.format)
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Colored output (always|auto|never)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync daemon (default)
    Run(RunCmd),

    /// Align, link and commit once, then exit
    Init(InitCmd),

    /// Print alignment and large-file state
    Status(StatusCmd),

    /// Restore pointer files from release assets
    Restore(RestoreCmd),

    /// Replace oversized files with pointers
    Externalize(ExternalizeCmd),
}

fn init_logging(cli: &Cli, settings: &Settings) -> Result<()> {
    let format = match cli.log_format {
        Some(format) => format,
        None => settings
            .logging
            .format
            .parse()
            .context("Invalid logging.format")?,
    };
    let level = verbosity_level(cli.verbose, cli.quiet)
        .map(str::to_string)
        .unwrap_or_else(|| settings.logging.level.clone());

    // A subscriber installed earlier in the process is kept.
    init_tracing_with_config(LogConfig::new().with_format(format).with_level(level)).ok();
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<()> {
    let settings = setup::load_settings(cli.config.as_deref()).await?;
    init_logging(&cli, &settings)?;
    let progress = ProgressTracker::new(cli.quiet);

    match cli.command {
        None => RunCmd::default().execute(settings).await,
        Some(Commands::Run(cmd)) => cmd.execute(settings).await,
        Some(Commands::Init(cmd)) => cmd.execute(settings, cli.quiet).await,
        Some(Commands::Status(cmd)) => cmd.execute(settings).await,
        Some(Commands::Restore(cmd)) => cmd.execute(settings, &progress).await,
        Some(Commands::Externalize(cmd)) => cmd.execute(settings, &progress).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.color.as_str() {
        "never" => console::set_colors_enabled(false),
        "always" => console::set_colors_enabled(true),
        "auto" => {}
        other => {
            output::error(&format!("Invalid color option: {}", other));
            std::process::exit(2);
        }
    }

    if let Err(e) = dispatch(cli).await {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
