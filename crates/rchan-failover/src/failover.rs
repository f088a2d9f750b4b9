//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::channel::{ChannelStatus, SharedChannel};
use crate::error::FailoverError;
use crate::events::{ChannelEvent, ChannelEventKind};
use crate::selector::{select_next, Selection};
use crate::service::ServiceState;

/// Result of one failover attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// A new channel was probed and connected.
    Switched,
    /// No idle alternative; the current active channel stays in service.
    Retained,
    /// No channel could be activated.
    Exhausted,
    /// The selected candidate failed its connect probe.
    ConnectFailed,
    /// Another failover attempt was already in flight; nothing changed.
    Busy,
}

impl FailoverOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, FailoverOutcome::Switched | FailoverOutcome::Retained)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverOutcome::Switched => "switched",
            FailoverOutcome::Retained => "retained",
            FailoverOutcome::Exhausted => "exhausted",
            FailoverOutcome::ConnectFailed => "connect_failed",
            FailoverOutcome::Busy => "busy",
        }
    }
}

impl fmt::Display for FailoverOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds the single reconnect slot; released on drop.
pub(crate) struct ReconnectGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ReconnectGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn connected_events(id: &str) -> Vec<ChannelEvent> {
    vec![
        ChannelEvent::for_channel(ChannelEventKind::SwitchedToChannel, id),
        ChannelEvent::for_channel(ChannelEventKind::ChannelConnected, id),
    ]
}

enum ProbeTransition {
    Unchanged,
    Recovered { connect: bool },
    LostActive,
    Demoted,
}

impl<P> ServiceState<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Health-check a channel, folding probe errors into `false`.
    pub(crate) async fn probe(&self, channel: &SharedChannel<P>) -> bool {
        match channel.attempt_health_check().await {
            Ok(healthy) => healthy,
            Err(err) => {
                let failure = FailoverError::from(err);
                warn!(channel = channel.id(), error = %failure, "health check errored");
                false
            }
        }
    }

    /// Probe `id` and, if healthy, make it the active channel. A failed probe
    /// marks it unavailable without raising events. Callers hold the reconnect
    /// guard.
    pub(crate) async fn connect(&self, id: &str) -> bool {
        let channel = self.registry.lock().channel(id);
        let Some(channel) = channel else {
            return false;
        };
        let healthy = self.probe(&channel).await;
        if self.is_disposed() {
            return false;
        }

        let connected = {
            let mut registry = self.registry.lock();
            if healthy {
                registry.activate(id)
            } else {
                registry.mark_unavailable(id);
                false
            }
        };
        if connected {
            info!(channel = id, "channel connected");
            self.publish(connected_events(id));
        } else if healthy {
            debug!(channel = id, "channel removed while connecting");
        } else {
            warn!(channel = id, "connect probe failed");
        }
        connected
    }

    /// Run the selector once under the reconnect guard.
    pub(crate) async fn switch_to_next_available(&self) -> FailoverOutcome {
        let Some(_guard) = ReconnectGuard::acquire(&self.reconnecting) else {
            debug!("failover already in flight");
            return FailoverOutcome::Busy;
        };
        if self.is_disposed() {
            return FailoverOutcome::Exhausted;
        }

        let selection = {
            let mut registry = self.registry.lock();
            let selection = select_next(&registry.snapshots(), registry.active_id());
            if let Selection::Candidate(_) = selection {
                registry.disconnect_active();
            }
            selection
        };

        match selection {
            Selection::Candidate(id) => {
                if self.connect(&id).await {
                    FailoverOutcome::Switched
                } else {
                    FailoverOutcome::ConnectFailed
                }
            }
            Selection::KeepActive(id) => {
                debug!(channel = %id, "no idle alternative, keeping active channel");
                FailoverOutcome::Retained
            }
            Selection::Exhausted => {
                let failure = FailoverError::NoChannelAvailable;
                warn!(error = %failure, "all channels unavailable");
                self.publish(vec![
                    ChannelEvent::new(ChannelEventKind::AllChannelsUnavailable).with_error(&failure)
                ]);
                FailoverOutcome::Exhausted
            }
        }
    }

    /// Probe `id` and apply the outcome to its status. Returns the raw probe
    /// result.
    pub(crate) async fn perform_channel_check(&self, id: &str) -> bool {
        let channel = self.registry.lock().channel(id);
        let Some(channel) = channel else {
            return false;
        };
        let healthy = self.probe(&channel).await;
        if self.is_disposed() {
            return healthy;
        }

        let (transition, events) = {
            let mut registry = self.registry.lock();
            let Some(previous) = registry.status(id) else {
                return healthy;
            };
            let is_active = registry.is_active(id);
            let next = match (healthy, is_active) {
                (true, true) => ChannelStatus::Connected,
                (true, false) => ChannelStatus::Idle,
                (false, _) => ChannelStatus::Unavailable,
            };

            if next == previous {
                (ProbeTransition::Unchanged, Vec::new())
            } else if next == ChannelStatus::Unavailable {
                registry.mark_unavailable(id);
                if is_active {
                    let failure = FailoverError::ProbeFailure {
                        channel: id.to_owned(),
                        reason: "health check failed".to_owned(),
                    };
                    let event =
                        ChannelEvent::for_channel(ChannelEventKind::ChannelDisconnected, id)
                            .with_error(&failure);
                    (ProbeTransition::LostActive, vec![event])
                } else {
                    (ProbeTransition::Demoted, Vec::new())
                }
            } else {
                registry.set_idle(id);
                let event = ChannelEvent::for_channel(ChannelEventKind::ChannelRecovered, id);
                let connect = registry.active_id().is_none();
                (ProbeTransition::Recovered { connect }, vec![event])
            }
        };
        self.publish(events);

        match transition {
            ProbeTransition::Unchanged => {}
            ProbeTransition::Demoted => debug!(channel = id, "idle channel failed its probe"),
            ProbeTransition::LostActive => {
                warn!(channel = id, "active channel failed its probe");
                self.switch_to_next_available().await;
            }
            ProbeTransition::Recovered { connect } => {
                info!(channel = id, "channel recovered");
                if connect {
                    match ReconnectGuard::acquire(&self.reconnecting) {
                        Some(_guard) => {
                            self.connect(id).await;
                        }
                        None => debug!(channel = id, "recovery connect skipped, failover in flight"),
                    }
                }
            }
        }
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_admits_one_holder_at_a_time() {
        let flag = AtomicBool::new(false);
        let first = ReconnectGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(ReconnectGuard::acquire(&flag).is_none());
        drop(first);
        assert!(ReconnectGuard::acquire(&flag).is_some());
    }

    #[test]
    fn only_switched_and_retained_count_as_success() {
        assert!(FailoverOutcome::Switched.succeeded());
        assert!(FailoverOutcome::Retained.succeeded());
        assert!(!FailoverOutcome::Exhausted.succeeded());
        assert!(!FailoverOutcome::ConnectFailed.succeeded());
        assert!(!FailoverOutcome::Busy.succeeded());
    }
}
