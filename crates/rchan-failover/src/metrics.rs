//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use anyhow::Result;
use prometheus::{IntCounterVec, IntGaugeVec, Opts};
use rchan_metrics::{register, SharedRegistry};

use crate::events::{ChannelEvent, ChannelEventKind};

/// Metrics published by the failover core.
#[derive(Clone)]
pub struct FailoverMetrics {
    channel_events_total: IntCounterVec,
    fetch_total: IntCounterVec,
    channel_active: IntGaugeVec,
}

impl FailoverMetrics {
    /// Register the failover metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let channel_events_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new(
                    "rchan_channel_events_total",
                    "Channel lifecycle events emitted by the data service",
                ),
                &["event"],
            )?,
        )?;
        let fetch_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new(
                    "rchan_fetch_total",
                    "Fetch attempts against the active channel",
                ),
                &["channel", "outcome"],
            )?,
        )?;
        let channel_active = register(
            &registry,
            IntGaugeVec::new(
                Opts::new(
                    "rchan_channel_active",
                    "Set to 1 for the channel currently holding the active slot",
                ),
                &["channel"],
            )?,
        )?;

        Ok(Self {
            channel_events_total,
            fetch_total,
            channel_active,
        })
    }

    /// Count an emitted event and keep the active gauge in step with it.
    pub fn observe_event(&self, event: &ChannelEvent) {
        self.channel_events_total
            .with_label_values(&[event.kind.as_str()])
            .inc();
        let Some(channel) = event.channel.as_deref() else {
            return;
        };
        match event.kind {
            ChannelEventKind::ChannelConnected => {
                self.channel_active.reset();
                self.channel_active.with_label_values(&[channel]).set(1);
            }
            ChannelEventKind::ChannelDisconnected => {
                self.channel_active.with_label_values(&[channel]).set(0);
            }
            _ => {}
        }
    }

    pub fn record_fetch(&self, channel: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.fetch_total
            .with_label_values(&[channel, outcome])
            .inc();
    }

    /// Zero the active gauge, used when the service is disposed.
    pub fn clear_active(&self) {
        self.channel_active.reset();
    }
}

impl std::fmt::Debug for FailoverMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverMetrics").finish_non_exhaustive()
    }
}
