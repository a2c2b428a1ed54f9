use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cups::api::{self, AppState};
use cups::common::HostStateMonitor;
use cups::transport::dev::DEFAULT_DEVICE;
use cups::{Adapter, ConfigRecord, ConfigStore, CupsMetricExporter, DevPeci, Service};

#[derive(Parser, Debug)]
#[command(name = "cups")]
#[command(about = "CPU Utilization Per Second index over PECI")]
struct Args {
    #[arg(long, default_value = DEFAULT_DEVICE, help = "PECI character device")]
    device: PathBuf,

    #[arg(long, help = "JSON configuration file, rewritten on runtime updates")]
    config: Option<PathBuf>,

    #[arg(long, help = "Sampling interval in milliseconds (100-1000)")]
    interval_ms: Option<u64>,

    #[arg(long, help = "Averaging period in milliseconds (1000-10000)")]
    averaging_period_ms: Option<u64>,

    #[arg(
        long,
        help = "Load factors: Dynamic, Static, or core,iio,memory percentages"
    )]
    load_factors: Option<String>,

    #[arg(long, help = "File holding the host state property, polled every second")]
    host_state_file: Option<PathBuf>,

    #[arg(long, default_value_t = 8080, help = "HTTP port")]
    port: u16,

    #[arg(short, long, help = "Enable verbose logging (shows every PECI command)")]
    verbose: bool,
}

fn check_permissions(device: &std::path::Path) -> anyhow::Result<()> {
    if std::fs::metadata(device).is_err() {
        anyhow::bail!(
            "Cannot access {}. The PECI kernel driver may not be loaded.",
            device.display()
        );
    }
    Ok(())
}

/// File values first, then command-line overrides, all validated
fn build_config(args: &Args, store: &ConfigStore) -> anyhow::Result<cups::ServiceConfig> {
    let mut config = store.load().context("Failed to load configuration")?;

    let mut overrides = match &args.load_factors {
        Some(value) => ConfigRecord::from_load_factors_arg(value)?,
        None => ConfigRecord::default(),
    };
    overrides.interval = args.interval_ms;
    overrides.averaging_period = args.averaging_period_ms;

    if overrides != ConfigRecord::default() {
        config = config
            .merged(&overrides)
            .context("Invalid command-line configuration")?;
    }
    Ok(config)
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    tracing::info!("Installing signal handlers...");

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl+C received!"),
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("SIGTERM received!");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::warn!("Shutdown signal received, initiating graceful shutdown...");
    cancel_token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    check_permissions(&args.device)?;

    let store = ConfigStore::new(args.config.clone());
    let config = build_config(&args, &store)?;
    tracing::info!("Using configuration: {:?}", config);

    let peci = DevPeci::open(&args.device)
        .with_context(|| format!("Failed to open {}", args.device.display()))?;
    let adapter = Adapter::new(Arc::new(peci));

    let cancel_token = CancellationToken::new();

    let (host_state, host_handle) = match &args.host_state_file {
        Some(path) => {
            let (monitor, rx) = HostStateMonitor::new(path.clone());
            (rx, Some(monitor.start(cancel_token.clone())))
        }
        None => (HostStateMonitor::unknown(), None),
    };

    let (service, handle) = Service::new(adapter, config, host_state);
    let service_handle = service.start(cancel_token.clone());

    let exporter = CupsMetricExporter::new(handle.clone())?;
    let app = api::router(Arc::new(AppState {
        handle,
        exporter: Some(Arc::new(exporter)),
        store,
    }));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::warn!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    tracing::info!("Server shutdown complete, waiting for the service to finish...");

    service_handle.await?;
    if let Some(handle) = host_handle {
        handle.await?;
    }

    tracing::info!("All tasks completed, exiting");

    Ok(())
}
