//! ---
//! rchan_section: "01-core-functionality"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Shared primitives and utilities for the core runtime."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "RCHAN_LOG";

static GUARDS: OnceCell<[WorkerGuard; 2]> = OnceCell::new();

/// Console log formats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Base name of the daily log file for `service_name`. A configured prefix
/// groups several services under one stem, e.g. `fleet.rchand.log`.
pub fn log_file_name(config: &LoggingConfig, service_name: &str) -> String {
    match config.file_prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() && prefix != service_name => {
            format!("{prefix}.{service_name}.log")
        }
        _ => format!("{service_name}.log"),
    }
}

/// `RCHAN_LOG`, then `RUST_LOG`, then `fallback`. An unparsable `RCHAN_LOG`
/// is reported on stderr since no subscriber exists yet.
fn resolve_filter(fallback: &str) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("ignoring invalid {LOG_ENV}={directive:?}: {err}");
            EnvFilter::new(fallback)
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
    }
}

/// Install the daemon subscriber: console output in `config.format` plus a
/// daily rolling JSON file named by [`log_file_name`].
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("failed to create log directory {}", config.directory.display())
    })?;
    let file_name = log_file_name(config, service_name);

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, &file_name));
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set([file_guard, console_guard]);

    let console = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(console_writer);
    let console = match config.format {
        LogFormat::StructuredJson => console.with_target(false).json().boxed(),
        LogFormat::Pretty => console.with_target(true).boxed(),
    };
    let file = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(resolve_filter("debug"))
        .with(console)
        .with(file)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_file = %config.directory.join(&file_name).display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}

/// Console-only subscriber for one-shot commands and tests. Repeated calls
/// are harmless.
pub fn init_console() {
    let _ = tracing_subscriber::registry()
        .with(resolve_filter("info"))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init();
}
