//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
//! Mutable bookkeeping behind the data service lock.
//!
//! Every method keeps one invariant: when `active` is set, the named channel is
//! registered and its status is `Connected`, and no other channel is
//! `Connected`.

use crate::buffer::DataBuffer;
use crate::channel::{ChannelSnapshot, ChannelStatus, SharedChannel};

pub(crate) struct ChannelEntry<P> {
    pub channel: SharedChannel<P>,
    pub status: ChannelStatus,
}

impl<P> ChannelEntry<P>
where
    P: Clone + Send + Sync + 'static,
{
    fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot::new(self.channel.id(), self.channel.priority(), self.status)
    }
}

pub(crate) struct Registry<P> {
    entries: Vec<ChannelEntry<P>>,
    active: Option<String>,
    last_known: Option<P>,
    buffer: DataBuffer<P>,
}

impl<P> Registry<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(buffer_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            active: None,
            last_known: None,
            buffer: DataBuffer::new(buffer_size),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.channel.id() == id)
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut ChannelEntry<P>> {
        self.entries
            .iter_mut()
            .find(|entry| entry.channel.id() == id)
    }

    /// Register a channel with its declared initial status. A channel that
    /// declares itself `Connected` is demoted to `Idle` since it does not own
    /// the active slot yet.
    pub fn insert(&mut self, channel: SharedChannel<P>) -> bool {
        if self.contains(channel.id()) {
            return false;
        }
        let status = match channel.initial_status() {
            ChannelStatus::Connected => ChannelStatus::Idle,
            other => other,
        };
        self.entries.push(ChannelEntry { channel, status });
        true
    }

    /// Remove a channel, releasing the active slot first if it held it.
    /// Returns whether the removed channel was active.
    pub fn remove(&mut self, id: &str) -> Option<bool> {
        let index = self.position(id)?;
        let was_active = self.active.as_deref() == Some(id);
        if was_active {
            self.active = None;
        }
        self.entries.remove(index);
        Some(was_active)
    }

    pub fn channel(&self, id: &str) -> Option<SharedChannel<P>> {
        self.position(id)
            .map(|index| self.entries[index].channel.clone())
    }

    pub fn status(&self, id: &str) -> Option<ChannelStatus> {
        self.position(id).map(|index| self.entries[index].status)
    }

    pub fn snapshot(&self, id: &str) -> Option<ChannelSnapshot> {
        self.position(id)
            .map(|index| self.entries[index].snapshot())
    }

    pub fn snapshots(&self) -> Vec<ChannelSnapshot> {
        self.entries.iter().map(ChannelEntry::snapshot).collect()
    }

    pub fn ids_with_status(&self, status: ChannelStatus) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.channel.id().to_owned())
            .collect()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_channel(&self) -> Option<SharedChannel<P>> {
        self.active.as_deref().and_then(|id| self.channel(id))
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.as_deref() == Some(id)
    }

    /// Return a connected channel to `Idle`. Idempotent.
    pub fn disconnect(&mut self, id: &str) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        if entry.status == ChannelStatus::Connected {
            entry.status = ChannelStatus::Idle;
        }
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        true
    }

    pub fn disconnect_active(&mut self) -> Option<String> {
        let id = self.active.clone()?;
        self.disconnect(&id);
        Some(id)
    }

    /// Hand the active slot to `id`, disconnecting the previous holder.
    pub fn activate(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        if let Some(previous) = self.active.clone() {
            if previous != id {
                self.disconnect(&previous);
            }
        }
        if let Some(entry) = self.entry_mut(id) {
            entry.status = ChannelStatus::Connected;
        }
        self.active = Some(id.to_owned());
        true
    }

    /// Set a non-connected status on a channel that does not hold the active
    /// slot. Connected transitions go through [`Registry::activate`].
    pub fn set_idle(&mut self, id: &str) -> bool {
        if self.is_active(id) {
            return false;
        }
        match self.entry_mut(id) {
            Some(entry) => {
                entry.status = ChannelStatus::Idle;
                true
            }
            None => false,
        }
    }

    /// Mark a channel unavailable, releasing the active slot if it held it.
    /// Returns the previous status and whether the channel was active.
    pub fn mark_unavailable(&mut self, id: &str) -> Option<(ChannelStatus, bool)> {
        let was_active = self.is_active(id);
        let entry = self.entry_mut(id)?;
        let previous = entry.status;
        entry.status = ChannelStatus::Unavailable;
        if was_active {
            self.active = None;
        }
        Some((previous, was_active))
    }

    pub fn record_payload(&mut self, payload: P) {
        self.buffer.push(payload.clone());
        self.last_known = Some(payload);
    }

    pub fn last_known(&self) -> Option<P> {
        self.last_known.clone()
    }

    pub fn buffered(&self) -> Vec<P> {
        self.buffer.to_vec()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.active = None;
        self.last_known = None;
        self.buffer.clear();
    }

    #[cfg(test)]
    fn assert_invariant(&self) {
        let connected = self.ids_with_status(ChannelStatus::Connected);
        match self.active.as_deref() {
            Some(id) => assert_eq!(connected, vec![id.to_owned()]),
            None => assert!(connected.is_empty(), "connected without active: {connected:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::channel::Channel;
    use crate::error::{FetchError, ProbeError};

    struct Stub {
        id: &'static str,
        priority: i32,
        initial: ChannelStatus,
    }

    #[async_trait]
    impl Channel for Stub {
        type Payload = u32;

        fn id(&self) -> &str {
            self.id
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn initial_status(&self) -> ChannelStatus {
            self.initial
        }

        async fn attempt_fetch(&self) -> Result<u32, FetchError> {
            Ok(1)
        }

        async fn attempt_health_check(&self) -> Result<bool, ProbeError> {
            Ok(true)
        }
    }

    fn stub(id: &'static str, priority: i32, initial: ChannelStatus) -> SharedChannel<u32> {
        Arc::new(Stub {
            id,
            priority,
            initial,
        })
    }

    fn registry() -> Registry<u32> {
        let mut registry = Registry::new(3);
        assert!(registry.insert(stub("primary", 2, ChannelStatus::Idle)));
        assert!(registry.insert(stub("backup", 1, ChannelStatus::Idle)));
        assert!(registry.insert(stub("cold", 0, ChannelStatus::Unavailable)));
        registry
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = registry();
        assert!(!registry.insert(stub("primary", 9, ChannelStatus::Idle)));
        assert_eq!(registry.snapshots().len(), 3);
    }

    #[test]
    fn declared_connected_status_is_demoted() {
        let mut registry = registry();
        registry.insert(stub("eager", 0, ChannelStatus::Connected));
        assert_eq!(registry.status("eager"), Some(ChannelStatus::Idle));
        registry.assert_invariant();
    }

    #[test]
    fn activation_moves_the_single_connected_slot() {
        let mut registry = registry();
        assert!(registry.activate("primary"));
        registry.assert_invariant();
        assert!(registry.activate("backup"));
        registry.assert_invariant();
        assert_eq!(registry.status("primary"), Some(ChannelStatus::Idle));
        assert_eq!(registry.active_id(), Some("backup"));
        assert!(!registry.activate("missing"));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut registry = registry();
        registry.activate("primary");
        assert!(registry.disconnect("primary"));
        assert!(registry.disconnect("primary"));
        assert_eq!(registry.status("primary"), Some(ChannelStatus::Idle));
        assert!(registry.active_id().is_none());
        assert!(!registry.disconnect("missing"));
        registry.assert_invariant();
    }

    #[test]
    fn failing_active_channel_releases_slot() {
        let mut registry = registry();
        registry.activate("primary");
        assert_eq!(
            registry.mark_unavailable("primary"),
            Some((ChannelStatus::Connected, true))
        );
        registry.assert_invariant();
        assert!(registry.active_id().is_none());
        assert_eq!(
            registry.mark_unavailable("primary"),
            Some((ChannelStatus::Unavailable, false))
        );
        assert_eq!(registry.mark_unavailable("missing"), None);
    }

    #[test]
    fn removing_active_channel_releases_slot() {
        let mut registry = registry();
        registry.activate("primary");
        assert_eq!(registry.remove("primary"), Some(true));
        assert_eq!(registry.remove("primary"), None);
        assert!(registry.active_id().is_none());
        registry.assert_invariant();
    }

    #[test]
    fn payloads_are_cached_and_buffered() {
        let mut registry = registry();
        for value in 1..=4 {
            registry.record_payload(value);
        }
        assert_eq!(registry.last_known(), Some(4));
        assert_eq!(registry.buffered(), vec![2, 3, 4]);
        registry.clear();
        assert!(registry.snapshots().is_empty());
        assert!(registry.last_known().is_none());
    }
}
