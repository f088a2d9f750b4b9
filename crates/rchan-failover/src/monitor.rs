//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
//! Periodic health tasks. Each task holds a weak handle to the service state
//! and exits on the shutdown broadcast or once the state has been dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::channel::ChannelStatus;
use crate::service::ServiceState;

/// Probe the active channel, or try to acquire one when none is active.
pub(crate) fn spawn_active_monitor<P>(
    runtime: &Handle,
    state: &Arc<ServiceState<P>>,
    period: Duration,
) -> JoinHandle<()>
where
    P: Clone + Send + Sync + 'static,
{
    spawn_periodic(runtime, state, period, "active-monitor", |state| async move {
        let active = state.registry.lock().active_id().map(str::to_owned);
        match active {
            Some(id) => {
                trace!(channel = %id, "probing active channel");
                state.perform_channel_check(&id).await;
            }
            None => {
                debug!("no active channel, running failover");
                state.switch_to_next_available().await;
            }
        }
    })
}

/// Re-probe every unavailable channel concurrently.
pub(crate) fn spawn_unavailable_sweep<P>(
    runtime: &Handle,
    state: &Arc<ServiceState<P>>,
    period: Duration,
) -> JoinHandle<()>
where
    P: Clone + Send + Sync + 'static,
{
    spawn_periodic(runtime, state, period, "unavailable-sweep", |state| async move {
        let targets = state
            .registry
            .lock()
            .ids_with_status(ChannelStatus::Unavailable);
        if targets.is_empty() {
            return;
        }
        trace!(count = targets.len(), "sweeping unavailable channels");
        join_all(
            targets
                .iter()
                .map(|id| state.perform_channel_check(id)),
        )
        .await;
    })
}

fn spawn_periodic<P, F, Fut>(
    runtime: &Handle,
    state: &Arc<ServiceState<P>>,
    period: Duration,
    name: &'static str,
    tick: F,
) -> JoinHandle<()>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(Arc<ServiceState<P>>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let weak: Weak<ServiceState<P>> = Arc::downgrade(state);
    let mut shutdown: broadcast::Receiver<()> = state.shutdown.subscribe();
    runtime.spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(task = name, "monitor shutdown");
                    break;
                }
                _ = interval.tick() => {
                    let Some(state) = weak.upgrade() else {
                        break;
                    };
                    if state.is_disposed() {
                        break;
                    }
                    tick(state).await;
                }
            }
        }
    })
}
