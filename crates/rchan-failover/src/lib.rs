//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
//! Redundant-channel failover for R-CHAN.
//!
//! A [`DataService`] keeps exactly one channel active, fails over to a healthy
//! alternative when the active one degrades, sweeps unavailable channels for
//! recovery, and reports every transition on its event bus.

mod buffer;
mod channel;
mod error;
mod events;
mod failover;
pub mod journal;
mod metrics;
mod monitor;
mod registry;
pub mod selector;
mod service;

pub use buffer::DataBuffer;
pub use channel::{Channel, ChannelSnapshot, ChannelStatus, SharedChannel};
pub use error::{FailoverError, FetchError, ProbeError, ServiceError};
pub use events::{ChannelEvent, ChannelEventKind, EventBus, Listener, Subscription};
pub use failover::FailoverOutcome;
pub use journal::{EventJournal, JournalEntry, JournalError};
pub use metrics::FailoverMetrics;
pub use service::{DataService, ServiceOptions};
