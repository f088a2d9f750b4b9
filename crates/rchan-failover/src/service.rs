//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
//! Public entry point combining fetch-with-failover, manual switching,
//! on-demand probing, and disposal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rchan_common::config::{
    FailoverConfig, DEFAULT_BUFFER_SIZE, DEFAULT_CHECK_INTERVAL, DEFAULT_MONITOR_INTERVAL,
};
use rchan_common::time::non_zero_or;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{ChannelSnapshot, ChannelStatus, SharedChannel};
use crate::error::{FailoverError, FetchError, ServiceError};
use crate::events::{ChannelEvent, ChannelEventKind, EventBus, Subscription};
use crate::failover::{FailoverOutcome, ReconnectGuard};
use crate::metrics::FailoverMetrics;
use crate::monitor;
use crate::registry::Registry;

/// Construction-time options for a [`DataService`].
///
/// Zero intervals and a zero buffer size fall back to the defaults.
pub struct ServiceOptions<P> {
    pub channels: Vec<SharedChannel<P>>,
    /// Period of the unavailable-channel sweep.
    pub check_interval: Duration,
    /// Period of the active-channel monitor.
    pub monitor_interval: Duration,
    pub buffer_size: usize,
    pub metrics: Option<FailoverMetrics>,
}

impl<P> Default for ServiceOptions<P> {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            buffer_size: DEFAULT_BUFFER_SIZE,
            metrics: None,
        }
    }
}

impl<P> ServiceOptions<P> {
    pub fn from_config(config: &FailoverConfig) -> Self {
        Self {
            check_interval: config.check_interval,
            monitor_interval: config.monitor_interval,
            buffer_size: config.buffer_size,
            ..Self::default()
        }
    }

    pub fn with_channels(mut self, channels: Vec<SharedChannel<P>>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_metrics(mut self, metrics: FailoverMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn normalised(mut self) -> Self {
        self.check_interval = non_zero_or(self.check_interval, DEFAULT_CHECK_INTERVAL);
        self.monitor_interval = non_zero_or(self.monitor_interval, DEFAULT_MONITOR_INTERVAL);
        if self.buffer_size == 0 {
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        self
    }
}

/// State shared between the facade handle and the monitor tasks.
pub(crate) struct ServiceState<P> {
    pub(crate) registry: Mutex<Registry<P>>,
    pub(crate) bus: EventBus,
    pub(crate) reconnecting: AtomicBool,
    pub(crate) disposed: AtomicBool,
    pub(crate) metrics: Option<FailoverMetrics>,
    pub(crate) shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<P> ServiceState<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn publish(&self, events: Vec<ChannelEvent>) {
        if !self.is_disposed() {
            self.bus.publish_all(events);
        }
    }

    pub(crate) async fn fetch_data(&self, force_error: bool) -> Option<P> {
        if self.is_disposed() {
            debug!("fetch requested on disposed data service");
            return None;
        }

        let mut active = self.registry.lock().active_channel();
        if active.is_none() {
            let outcome = self.switch_to_next_available().await;
            active = self.registry.lock().active_channel();
            if active.is_none() {
                if outcome != FailoverOutcome::Exhausted {
                    self.publish(vec![ChannelEvent::new(
                        ChannelEventKind::AllChannelsUnavailable,
                    )
                    .with_error(&FailoverError::NoChannelAvailable)]);
                }
                return self.registry.lock().last_known();
            }
        }
        let Some(channel) = active else {
            return None;
        };
        let id = channel.id().to_owned();

        let result = if force_error {
            Err(FetchError::Forced(id.clone()))
        } else {
            channel.attempt_fetch().await
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_fetch(&id, result.is_ok());
        }

        match result {
            Ok(payload) => {
                if !self.is_disposed() {
                    self.registry.lock().record_payload(payload.clone());
                }
                debug!(channel = %id, "fetch succeeded");
                Some(payload)
            }
            Err(err) => {
                let failure = FailoverError::from(err);
                warn!(channel = %id, error = %failure, "fetch failed");
                if self.is_disposed() {
                    return None;
                }
                let lost_active = {
                    let mut registry = self.registry.lock();
                    matches!(
                        registry.mark_unavailable(&id),
                        Some((previous, true)) if previous != ChannelStatus::Unavailable
                    )
                };
                if lost_active {
                    self.publish(vec![ChannelEvent::for_channel(
                        ChannelEventKind::ChannelDisconnected,
                        id,
                    )
                    .with_error(&failure)]);
                    self.switch_to_next_available().await;
                }
                self.registry.lock().last_known()
            }
        }
    }

    pub(crate) async fn switch_to_channel(&self, id: &str, force: bool) -> bool {
        let status = self.registry.lock().status(id);
        let Some(status) = status else {
            debug!(channel = id, "switch requested for unknown channel");
            return false;
        };
        if !force && status != ChannelStatus::Idle {
            debug!(channel = id, status = %status, "switch refused for non-idle channel");
            return false;
        }
        let Some(_guard) = ReconnectGuard::acquire(&self.reconnecting) else {
            debug!(channel = id, "switch skipped, failover already in flight");
            return false;
        };
        self.registry.lock().disconnect_active();
        self.connect(id).await
    }

    pub(crate) async fn add_channel(&self, channel: SharedChannel<P>) -> Result<(), ServiceError> {
        if self.is_disposed() {
            return Err(ServiceError::Disposed);
        }
        let id = channel.id().to_owned();
        let should_connect = {
            let mut registry = self.registry.lock();
            if !registry.insert(channel) {
                return Err(ServiceError::DuplicateChannel(id));
            }
            registry.active_id().is_none() && registry.status(&id) == Some(ChannelStatus::Idle)
        };
        info!(channel = %id, "channel registered");

        if should_connect {
            match ReconnectGuard::acquire(&self.reconnecting) {
                Some(_guard) => {
                    self.connect(&id).await;
                }
                None => debug!(channel = %id, "initial connect skipped, failover in flight"),
            }
        }
        Ok(())
    }

    pub(crate) async fn remove_channel(&self, id: &str) -> bool {
        let removed = self.registry.lock().remove(id);
        match removed {
            None => false,
            Some(was_active) => {
                info!(channel = id, was_active, "channel removed");
                if was_active {
                    if let Some(metrics) = &self.metrics {
                        metrics.clear_active();
                    }
                    self.switch_to_next_available().await;
                }
                true
            }
        }
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown.send(());
        {
            let mut registry = self.registry.lock();
            registry.disconnect_active();
            registry.clear();
        }
        self.bus.clear();
        if let Some(metrics) = &self.metrics {
            metrics.clear_active();
        }
        info!("data service disposed");
    }
}

/// Redundant-channel data service.
///
/// Cloning yields another handle to the same service. The monitor tasks are
/// started on construction and stop on [`DataService::dispose`] or once every
/// handle has been dropped.
pub struct DataService<P> {
    state: Arc<ServiceState<P>>,
}

impl<P> Clone for DataService<P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<P> std::fmt::Debug for DataService<P>
where
    P: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.state.registry.lock();
        f.debug_struct("DataService")
            .field("channels", &registry.snapshots())
            .field("active", &registry.active_id())
            .field("listeners", &self.state.bus.listener_count())
            .finish()
    }
}

impl<P> DataService<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Build the service and start both monitor tasks on the current tokio
    /// runtime.
    pub fn new(options: ServiceOptions<P>) -> Result<Self, ServiceError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ServiceError::NoRuntime)?;
        let options = options.normalised();

        let mut registry = Registry::new(options.buffer_size);
        for channel in options.channels {
            let id = channel.id().to_owned();
            if !registry.insert(channel) {
                return Err(ServiceError::DuplicateChannel(id));
            }
        }

        let bus = EventBus::new();
        if let Some(metrics) = options.metrics.clone() {
            // Stays registered for the life of the service; dispose clears it.
            let _ = bus.subscribe(move |event| {
                metrics.observe_event(event);
                Ok(())
            });
        }

        let (shutdown, _) = broadcast::channel(4);
        let state = Arc::new(ServiceState {
            registry: Mutex::new(registry),
            bus,
            reconnecting: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            metrics: options.metrics,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        });

        let tasks = vec![
            monitor::spawn_active_monitor(&runtime, &state, options.monitor_interval),
            monitor::spawn_unavailable_sweep(&runtime, &state, options.check_interval),
        ];
        *state.tasks.lock() = tasks;

        info!(
            channels = state.registry.lock().snapshots().len(),
            monitor_interval_ms = rchan_common::time::duration_to_millis(options.monitor_interval),
            check_interval_ms = rchan_common::time::duration_to_millis(options.check_interval),
            buffer_size = options.buffer_size,
            "data service started"
        );
        Ok(Self { state })
    }

    /// Fetch from the active channel, failing over on error. Returns the
    /// fetched payload, or the last cached payload when the fetch fails or no
    /// channel can be activated.
    pub async fn fetch_data(&self, force_error: bool) -> Option<P> {
        self.state.fetch_data(force_error).await
    }

    /// Manually activate `id`. Without `force` only an idle channel is
    /// accepted.
    pub async fn switch_to_channel(&self, id: &str, force: bool) -> bool {
        self.state.switch_to_channel(id, force).await
    }

    /// Run the failover selector once.
    pub async fn switch_to_next_available(&self) -> FailoverOutcome {
        self.state.switch_to_next_available().await
    }

    /// Probe a channel on demand and apply the outcome. Returns the raw probe
    /// result; unknown channels report `false`.
    pub async fn check_channel(&self, id: &str) -> bool {
        self.state.perform_channel_check(id).await
    }

    pub async fn add_channel(&self, channel: SharedChannel<P>) -> Result<(), ServiceError> {
        self.state.add_channel(channel).await
    }

    /// Returns `false` when the channel is unknown.
    pub async fn remove_channel(&self, id: &str) -> bool {
        self.state.remove_channel(id).await
    }

    /// Return a connected channel to idle without raising events. Idempotent.
    pub fn disconnect(&self, id: &str) -> bool {
        self.state.registry.lock().disconnect(id)
    }

    pub fn get_channels(&self) -> Vec<ChannelSnapshot> {
        self.state.registry.lock().snapshots()
    }

    pub fn get_active_channel(&self) -> Option<ChannelSnapshot> {
        let registry = self.state.registry.lock();
        registry.active_id().and_then(|id| registry.snapshot(id))
    }

    pub fn channel(&self, id: &str) -> Option<ChannelSnapshot> {
        self.state.registry.lock().snapshot(id)
    }

    /// Recently fetched payloads, oldest first.
    pub fn buffered(&self) -> Vec<P> {
        self.state.registry.lock().buffered()
    }

    pub fn last_known_data(&self) -> Option<P> {
        self.state.registry.lock().last_known()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChannelEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.state.bus.subscribe(listener)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }

    /// Stop the monitors and clear all state. In-flight probes and fetches
    /// complete but their outcomes are discarded.
    pub fn dispose(&self) {
        self.state.dispose();
    }

    /// Dispose and wait for both monitor tasks to exit.
    pub async fn shutdown(self) {
        self.state.dispose();
        let tasks = std::mem::take(&mut *self.state.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "monitor task ended abnormally");
            }
        }
        debug!("data service shutdown complete");
    }
}
