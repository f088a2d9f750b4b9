//! ---
//! rchan_section: "01-core-functionality"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Shared primitives and utilities for the core runtime."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
//! Core shared primitives for the R-CHAN workspace.
//! This crate exposes configuration loading, logging, and time helpers
//! consumed by the failover core, the simulator, and the daemon.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, ChannelConfig, ChannelStatus, DemoConfig, FailoverConfig, LoadedAppConfig,
    LoggingConfig, MetricsConfig,
};
pub use logging::{init_tracing, LogFormat};
