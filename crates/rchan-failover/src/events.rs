//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
//! Fan-out of channel state changes to subscribers.
//!
//! Each listener runs inside its own failure domain: an `Err` return or a
//! panic is logged as a listener failure and delivery continues with the next
//! subscriber. Listeners are invoked without any service lock held, so they may
//! call back into the data service (including unsubscribing themselves).

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::error::FailoverError;

/// Kind of state transition carried by a [`ChannelEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelEventKind {
    ChannelConnected,
    ChannelDisconnected,
    ChannelRecovered,
    AllChannelsUnavailable,
    SwitchedToChannel,
}

impl ChannelEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelEventKind::ChannelConnected => "channel-connected",
            ChannelEventKind::ChannelDisconnected => "channel-disconnected",
            ChannelEventKind::ChannelRecovered => "channel-recovered",
            ChannelEventKind::AllChannelsUnavailable => "all-channels-unavailable",
            ChannelEventKind::SwitchedToChannel => "switched-to-channel",
        }
    }
}

impl fmt::Display for ChannelEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a channel state transition.
///
/// `channel` is the identity of the channel involved, not a copy of its state;
/// look the channel up on the service for its current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub kind: ChannelEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ChannelEvent {
    pub fn new(kind: ChannelEventKind) -> Self {
        Self {
            kind,
            timestamp: rchan_common::time::now_utc(),
            channel: None,
            data: None,
        }
    }

    pub fn for_channel(kind: ChannelEventKind, channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Self::new(kind)
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a failure description under the `error` key.
    pub fn with_error(self, error: &FailoverError) -> Self {
        self.with_data(serde_json::json!({ "error": error.to_string() }))
    }
}

/// Listener signature accepted by [`EventBus::subscribe`].
pub type Listener = Arc<dyn Fn(&ChannelEvent) -> anyhow::Result<()> + Send + Sync>;

type ListenerList = Mutex<Vec<(u64, Listener)>>;

/// Fan-out dispatcher shared by the data service.
#[derive(Default)]
pub struct EventBus {
    listeners: Arc<ListenerList>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and return the handle that removes it again.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChannelEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        trace!(listener = id, "event listener subscribed");
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Deliver an event to every current listener, returning how many failed.
    pub fn publish(&self, event: &ChannelEvent) -> usize {
        let listeners: Vec<(u64, Listener)> = self.listeners.lock().clone();
        let mut failures = 0;
        for (id, listener) in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => FailoverError::ListenerFailure {
                    listener: id,
                    reason: format!("{err:#}"),
                },
                Err(payload) => FailoverError::ListenerFailure {
                    listener: id,
                    reason: panic_message(payload.as_ref()),
                },
            };
            failures += 1;
            error!(event = %event.kind, error = %failure, "event listener failed");
        }
        failures
    }

    pub fn publish_all<I>(&self, events: I)
    where
        I: IntoIterator<Item = ChannelEvent>,
    {
        for event in events {
            self.publish(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it keeps the listener
/// registered; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove exactly the listener this handle was created for.
    pub fn unsubscribe(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut listeners = listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        before != listeners.len()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "listener panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_listener(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn(&ChannelEvent) -> anyhow::Result<()> + Send + Sync + 'static {
        let counter = counter.clone();
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn failing_listeners_do_not_block_delivery() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));
        let _erroring = bus.subscribe(|_| Err(anyhow::anyhow!("listener rejected event")));
        let _panicking = bus.subscribe(|_| panic!("listener exploded"));
        let _healthy = bus.subscribe(counter_listener(&delivered));

        let failures = bus.publish(&ChannelEvent::new(ChannelEventKind::AllChannelsUnavailable));
        assert_eq!(failures, 2);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_only_its_listener() {
        let bus = EventBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let first_sub = bus.subscribe(counter_listener(&first));
        let _second_sub = bus.subscribe(counter_listener(&second));

        assert!(first_sub.unsubscribe());
        bus.publish(&ChannelEvent::for_channel(
            ChannelEventKind::ChannelConnected,
            "primary",
        ));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn listener_may_unsubscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let sub = bus.subscribe(move |_| {
            if let Some(sub) = slot_clone.lock().take() {
                sub.unsubscribe();
            }
            Ok(())
        });
        *slot.lock() = Some(sub);

        bus.publish(&ChannelEvent::new(ChannelEventKind::ChannelRecovered));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn events_serialise_with_kebab_case_kind() {
        let event = ChannelEvent::for_channel(ChannelEventKind::SwitchedToChannel, "backup")
            .with_data(serde_json::json!({ "previous": "primary" }));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "switched-to-channel");
        assert_eq!(value["channel"], "backup");
        assert_eq!(value["data"]["previous"], "primary");

        let bare = serde_json::to_value(ChannelEvent::new(
            ChannelEventKind::AllChannelsUnavailable,
        ))
        .unwrap();
        assert!(bare.get("channel").is_none());
    }
}
