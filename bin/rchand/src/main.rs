//! ---
//! rchan_section: "01-core-functionality"
//! rchan_subsection: "binary"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Binary entrypoint for the R-CHAN daemon."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rchan_common::config::AppConfig;
use rchan_common::logging::{init_console, init_tracing};
use rchan_failover::{
    DataService, EventJournal, FailoverMetrics, ServiceOptions,
};
use rchan_metrics::{new_registry, DaemonMetrics, MetricsServer};
use rchan_sim::{channels_from_config, into_shared, WeatherReading};
use tokio::signal;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "configs/rchan.toml";

#[derive(Debug, Parser)]
#[command(author, version, about = "R-CHAN redundant channel daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the fetch loop with automatic failover")]
    Run {
        #[arg(long, value_name = "N", help = "Stop after N fetches")]
        fetches: Option<u64>,
        #[arg(long, value_name = "PATH", help = "Append channel events to a JSON-lines journal")]
        journal: Option<PathBuf>,
    },
    #[command(about = "Probe every configured channel once and print its status")]
    Check,
    #[command(about = "Manually switch to a channel")]
    Switch {
        id: String,
        #[arg(long, help = "Switch even if the channel is not idle")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from(DEFAULT_CONFIG));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();

    match cli.command.unwrap_or(Commands::Run {
        fetches: None,
        journal: None,
    }) {
        Commands::Run { fetches, journal } => {
            let daemon_metrics = daemon_metrics(load_duration)?;
            init_tracing("rchand", &loaded.config.logging)?;
            info!(config = %loaded.source.display(), "configuration loaded");
            run_daemon(loaded.config, daemon_metrics, fetches, journal).await?
        }
        Commands::Check => {
            init_console();
            check_channels(loaded.config).await?
        }
        Commands::Switch { id, force } => {
            init_console();
            switch_channel(loaded.config, &id, force).await?
        }
    }

    Ok(())
}

/// Process metrics for the long-running daemon; one-shot commands skip them.
fn daemon_metrics(config_load: Duration) -> Result<DaemonMetrics> {
    let metrics = DaemonMetrics::new(new_registry())?;
    metrics.observe_config_load(config_load.as_secs_f64());
    metrics.inc_start();
    Ok(metrics)
}

fn build_service(
    config: &AppConfig,
    metrics: Option<FailoverMetrics>,
) -> Result<DataService<WeatherReading>> {
    let channels = channels_from_config(config);
    let mut options =
        ServiceOptions::from_config(&config.failover).with_channels(into_shared(&channels));
    if let Some(metrics) = metrics {
        options = options.with_metrics(metrics);
    }
    Ok(DataService::new(options)?)
}

async fn run_daemon(
    config: AppConfig,
    daemon_metrics: DaemonMetrics,
    fetches: Option<u64>,
    journal: Option<PathBuf>,
) -> Result<()> {
    let metrics_settings = config.metrics.clone();
    let (metrics_server, failover_metrics) = if metrics_settings.enabled {
        info!(address = %metrics_settings.listen, "metrics exporter enabled");
        let registry = daemon_metrics.registry();
        let failover_metrics = FailoverMetrics::new(registry.clone())?;
        (
            Some(MetricsServer::serve(registry, metrics_settings.listen).await?),
            Some(failover_metrics),
        )
    } else {
        info!("metrics exporter disabled by configuration");
        (None, None)
    };

    let service = build_service(&config, failover_metrics)?;
    let _events = service.subscribe(|event| {
        info!(
            event = %event.kind,
            channel = event.channel.as_deref().unwrap_or("-"),
            data = ?event.data,
            "channel event"
        );
        Ok(())
    });
    if let Some(path) = journal {
        let journal = EventJournal::open(&path)?;
        info!(journal = %journal.path().display(), "event journal enabled");
        let _journal = service.subscribe(journal.listener());
    }

    let mut ticker = tokio::time::interval(config.demo.fetch_interval);
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut completed = 0u64;

    info!("daemon running; waiting for termination signal");
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                info!("ctrl-c received; shutting down");
                break;
            }
            _ = ticker.tick() => {
                daemon_metrics.inc_fetch_cycle();
                match service.fetch_data(false).await {
                    Some(reading) => info!(reading = %reading, "weather reading"),
                    None => warn!("no data available"),
                }
                completed += 1;
                if fetches.is_some_and(|limit| completed >= limit) {
                    info!(fetches = completed, "fetch limit reached");
                    break;
                }
            }
        }
    }

    service.shutdown().await;
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

async fn check_channels(config: AppConfig) -> Result<()> {
    let service = build_service(&config, None)?;
    for channel in service.get_channels() {
        service.check_channel(&channel.id).await;
    }
    for channel in service.get_channels() {
        println!("{}\t{}\t{}", channel.id, channel.priority, channel.status);
    }
    service.shutdown().await;
    Ok(())
}

async fn switch_channel(config: AppConfig, id: &str, force: bool) -> Result<()> {
    if config.channel(id).is_none() {
        return Err(anyhow!("unknown channel '{id}'"));
    }
    let service = build_service(&config, None)?;
    let switched = service.switch_to_channel(id, force).await;
    let active = service
        .get_active_channel()
        .map(|channel| channel.id)
        .unwrap_or_else(|| "none".to_owned());
    println!("switched: {switched}\nactive: {active}");
    service.shutdown().await;
    Ok(())
}
