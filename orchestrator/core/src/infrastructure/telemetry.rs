// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Tracing subscriber setup for embedding applications.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::domain::config::{LogFormat, LoggingConfig};

/// Install a global fmt subscriber. `RUST_LOG` wins over the configured level.
///
/// Safe to call more than once: later calls leave the first subscriber in
/// place and return `Ok(false)`.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };

    Ok(installed)
}
