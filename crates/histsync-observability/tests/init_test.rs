// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Global subscriber installation
//!
//! Only one test here installs a subscriber; a process gets one.

use histsync_observability::{init_tracing_with_config, LogConfig, LogError, LogFormat, LogOutput};

#[test]
fn second_initialization_is_an_error_not_a_panic() {
    let config = LogConfig::new()
        .with_format(LogFormat::Json)
        .with_level("warn")
        .with_timestamps(false)
        .with_output(LogOutput::Stdout);

    init_tracing_with_config(config.clone()).unwrap();
    tracing::warn!(phase = "RUNNING", "visible through the json layer");

    let err = init_tracing_with_config(config).unwrap_err();
    assert!(matches!(err, LogError::AlreadyInitialized(_)));
}

#[test]
fn builder_chaining() {
    let config = LogConfig::new()
        .with_format(LogFormat::Compact)
        .with_color(false)
        .with_targets(false);
    assert_eq!(config.format, LogFormat::Compact);
    assert!(!config.use_color);
    assert!(!config.include_targets);
    assert_eq!(config.output, LogOutput::Stderr);
}
