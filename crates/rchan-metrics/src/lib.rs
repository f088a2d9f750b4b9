//! ---
//! rchan_section: "03-persistence-logging"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Metrics collection and export utilities."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
//! Prometheus plumbing shared by the R-CHAN crates: one registry per process,
//! a `/metrics` scrape endpoint, and the daemon's own counters.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::core::Collector;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Register `collector` and hand it back for recording.
pub fn register<C>(registry: &Registry, collector: C) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .context("failed to register metric collector")?;
    Ok(collector)
}

/// Render every family in `registry` in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("failed to encode metric families")?;
    String::from_utf8(buffer).context("metric exposition is not valid utf-8")
}

async fn scrape(State(registry): State<SharedRegistry>) -> Response {
    match render(&registry) {
        Ok(body) => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "metrics scrape failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

/// Running `/metrics` exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Bind `addr` and serve `registry` until [`MetricsServer::shutdown`].
    /// Port 0 picks an ephemeral port; see [`MetricsServer::addr`].
    pub async fn serve(registry: SharedRegistry, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics listener {addr}"))?;
        let addr = listener
            .local_addr()
            .context("failed to read metrics listener address")?;
        let app = Router::new()
            .route("/metrics", get(scrape))
            .with_state(registry);

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await
                .context("metrics exporter failed")
        });
        info!(address = %addr, "metrics exporter listening");
        Ok(Self { addr, stop, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting scrapes and wait for the server task.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.stop.send(());
        self.task.await.context("metrics exporter task panicked")?
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    fetch_cycles_total: IntCounter,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = register(
            &registry,
            IntCounter::with_opts(Opts::new(
                "rchand_starts_total",
                "Times the R-CHAN daemon has initialised",
            ))?,
        )?;
        let config_load_seconds = register(
            &registry,
            Histogram::with_opts(
                HistogramOpts::new(
                    "rchand_config_load_seconds",
                    "Time spent loading and validating configuration",
                )
                .buckets(prometheus::exponential_buckets(0.001, 2.0, 12)?),
            )?,
        )?;
        let fetch_cycles_total = register(
            &registry,
            IntCounter::with_opts(Opts::new(
                "rchand_fetch_cycles_total",
                "Iterations of the daemon's periodic fetch loop",
            ))?,
        )?;
        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            fetch_cycles_total,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn inc_fetch_cycle(&self) {
        self.fetch_cycles_total.inc();
    }
}

impl std::fmt::Debug for DaemonMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonMetrics").finish_non_exhaustive()
    }
}

pub use prometheus;
