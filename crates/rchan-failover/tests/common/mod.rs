//! ---
//! rchan_section: "15-testing-qa-runbook"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "test"
//! rchan_description: "Scripted channels and event recorders for failover tests."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rchan_failover::{
    Channel, ChannelEvent, ChannelEventKind, ChannelStatus, DataService, FetchError, ProbeError,
    ServiceOptions, SharedChannel,
};
use tokio::sync::Notify;

/// Long enough that the periodic monitors never fire during a test.
pub const QUIET: Duration = Duration::from_secs(3600);

/// Pauses a probe until the test releases it.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Channel whose behaviour is flipped from the test body.
pub struct ScriptedChannel {
    id: String,
    priority: i32,
    initial: ChannelStatus,
    pub healthy: AtomicBool,
    pub fetch_fails: AtomicBool,
    pub probe_errors: AtomicBool,
    pub probes: AtomicUsize,
    pub fetches: AtomicUsize,
    pub gate: Option<Arc<Gate>>,
}

impl ScriptedChannel {
    pub fn new(id: &str, priority: i32) -> Self {
        Self {
            id: id.to_owned(),
            priority,
            initial: ChannelStatus::Idle,
            healthy: AtomicBool::new(true),
            fetch_fails: AtomicBool::new(false),
            probe_errors: AtomicBool::new(false),
            probes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.initial = ChannelStatus::Unavailable;
        self
    }

    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_fetch_fails(&self, fails: bool) {
        self.fetch_fails.store(fails, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    type Payload = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn initial_status(&self) -> ChannelStatus {
        self.initial
    }

    async fn attempt_fetch(&self) -> Result<String, FetchError> {
        let count = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fetch_fails.load(Ordering::SeqCst) {
            return Err(FetchError::failed(&self.id, "scripted fetch failure"));
        }
        Ok(format!("{}#{}", self.id, count))
    }

    async fn attempt_health_check(&self) -> Result<bool, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.probe_errors.load(Ordering::SeqCst) {
            return Err(ProbeError::new(&self.id, "scripted probe error"));
        }
        Ok(self.healthy.load(Ordering::SeqCst))
    }
}

pub fn erase(channel: &Arc<ScriptedChannel>) -> SharedChannel<String> {
    channel.clone()
}

/// Service with monitors parked far in the future.
pub fn quiet_service(channels: &[&Arc<ScriptedChannel>]) -> DataService<String> {
    service_with(channels, QUIET, QUIET, 10)
}

pub fn service_with(
    channels: &[&Arc<ScriptedChannel>],
    check_interval: Duration,
    monitor_interval: Duration,
    buffer_size: usize,
) -> DataService<String> {
    let options = ServiceOptions {
        check_interval,
        monitor_interval,
        buffer_size,
        ..ServiceOptions::default()
    }
    .with_channels(channels.iter().map(|channel| erase(channel)).collect());
    DataService::new(options).expect("service builds inside the test runtime")
}

/// Collects every event the service publishes.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<ChannelEvent>>>,
}

impl EventRecorder {
    pub fn attach(service: &DataService<String>) -> Self {
        let recorder = Self::default();
        let sink = recorder.events.clone();
        let _ = service.subscribe(move |event| {
            sink.lock().push(event.clone());
            Ok(())
        });
        recorder
    }

    pub fn kinds(&self) -> Vec<(ChannelEventKind, Option<String>)> {
        self.events
            .lock()
            .iter()
            .map(|event| (event.kind, event.channel.clone()))
            .collect()
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, kind: ChannelEventKind) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind == kind)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

pub fn on(kind: ChannelEventKind, channel: &str) -> (ChannelEventKind, Option<String>) {
    (kind, Some(channel.to_owned()))
}

/// At most one channel is connected, and it is the active one.
pub fn assert_single_active(service: &DataService<String>) {
    let connected: Vec<String> = service
        .get_channels()
        .into_iter()
        .filter(|channel| channel.status == ChannelStatus::Connected)
        .map(|channel| channel.id)
        .collect();
    match service.get_active_channel() {
        Some(active) => {
            assert_eq!(active.status, ChannelStatus::Connected);
            assert_eq!(connected, vec![active.id]);
        }
        None => assert!(connected.is_empty(), "connected without active: {connected:?}"),
    }
}
