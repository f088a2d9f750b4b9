//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use rchan_common::config::ChannelStatus;

use crate::error::{FetchError, ProbeError};

/// Capability set implemented by every interchangeable data source.
///
/// The failover core never inspects the payload; it only calls the two
/// operations below and tracks the channel's [`ChannelStatus`] itself.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Payload produced by a successful fetch.
    type Payload: Clone + Send + Sync + 'static;

    /// Stable, unique, user-facing identifier.
    fn id(&self) -> &str;

    /// Higher values are preferred during failover.
    fn priority(&self) -> i32 {
        0
    }

    /// Status the channel starts with when registered.
    fn initial_status(&self) -> ChannelStatus {
        ChannelStatus::Idle
    }

    /// Retrieve data from the underlying source.
    async fn attempt_fetch(&self) -> Result<Self::Payload, FetchError>;

    /// Cheap liveness probe, independent of fetching.
    async fn attempt_health_check(&self) -> Result<bool, ProbeError>;
}

/// Shared, type-erased channel handle held by the registry.
pub type SharedChannel<P> = Arc<dyn Channel<Payload = P>>;

/// Point-in-time view of a registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub id: String,
    pub priority: i32,
    pub status: ChannelStatus,
}

impl ChannelSnapshot {
    pub fn new(id: impl Into<String>, priority: i32, status: ChannelStatus) -> Self {
        Self {
            id: id.into(),
            priority,
            status,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.status, ChannelStatus::Idle)
    }
}
