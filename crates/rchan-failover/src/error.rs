//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---

/// Raised by [`Channel::attempt_fetch`](crate::Channel::attempt_fetch).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The underlying source reported an error.
    #[error("fetch from channel {channel} failed: {reason}")]
    Failed { channel: String, reason: String },
    /// Synthetic failure requested by the caller.
    #[error("forced fetch failure on channel {0}")]
    Forced(String),
}

impl FetchError {
    pub fn failed(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// Raised by [`Channel::attempt_health_check`](crate::Channel::attempt_health_check).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("health check on channel {channel} errored: {reason}")]
pub struct ProbeError {
    pub channel: String,
    pub reason: String,
}

impl ProbeError {
    pub fn new(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// Failure kinds recovered inside the core. None of them reach callers of the
/// data service; they are logged and attached to events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailoverError {
    #[error("probe of channel {channel} failed: {reason}")]
    ProbeFailure { channel: String, reason: String },
    #[error(transparent)]
    FetchFailure(#[from] FetchError),
    #[error("no channel available for activation")]
    NoChannelAvailable,
    #[error("event listener {listener} failed: {reason}")]
    ListenerFailure { listener: u64, reason: String },
}

impl From<ProbeError> for FailoverError {
    fn from(err: ProbeError) -> Self {
        FailoverError::ProbeFailure {
            channel: err.channel,
            reason: err.reason,
        }
    }
}

/// Errors surfaced by registry mutations on the data service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("channel {0} is already registered")]
    DuplicateChannel(String),
    #[error("data service has been disposed")]
    Disposed,
    #[error("data service must be constructed inside a tokio runtime")]
    NoRuntime,
}
