//! treefs server binary
//!
//! ## Usage
//!
//! ```bash
//! # Boot the cluster described in treefs.ron and serve until Ctrl-C
//! treefs-server
//!
//! # Boot, print the root directory, and exit
//! treefs-server --config cluster.ron --list / --once
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use treefs_server::constants::{DEFAULT_CONFIG_PATH, SERVICE_NAME};
use treefs_server::{Cluster, ClusterConfig};
use treefs_types::Path;

/// Naming service and storage nodes for a treefs cluster.
#[derive(Parser, Debug)]
#[command(name = "treefs-server")]
#[command(about = "Run a treefs naming service with its storage nodes")]
struct Args {
    /// Cluster configuration (RON)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory to print after all nodes have joined
    #[arg(long)]
    list: Option<String>,

    /// Exit after booting instead of serving until interrupted
    #[arg(long)]
    once: bool,
}

#[cfg(feature = "telemetry")]
type TelemetryGuard = treefs_telemetry::OtelGuard;
#[cfg(not(feature = "telemetry"))]
type TelemetryGuard = ();

fn init_tracing() -> Option<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    #[cfg(feature = "telemetry")]
    {
        if treefs_telemetry::otel_enabled() {
            match treefs_telemetry::otel_layer(SERVICE_NAME) {
                Ok((otel_layer, guard)) => {
                    registry.with(otel_layer).init();
                    return Some(guard);
                }
                Err(e) => eprintln!("OTel export disabled: {e}"),
            }
        }
    }

    registry.init();
    None
}

#[tokio::main]
async fn main() -> ExitCode {
    let _otel_guard = init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = ClusterConfig::load(&args.config)
        .await
        .with_context(|| format!("loading {}", args.config.display()))?;
    tracing::info!(
        "Starting {} with {} storage node(s), placement {:?}",
        SERVICE_NAME,
        config.storage.len(),
        config.naming.placement
    );

    let (cluster, _reports) = Cluster::boot(config).await.context("booting cluster")?;

    if let Some(dir) = &args.list {
        let dir = Path::parse(dir).with_context(|| format!("parsing {:?}", dir))?;
        let entries = cluster
            .list(&dir)
            .await
            .with_context(|| format!("listing {}", dir))?;
        for entry in entries {
            let suffix = if entry.is_directory { "/" } else { "" };
            println!("{}{}", entry.name, suffix);
        }
    }

    if args.once {
        return Ok(());
    }

    tracing::info!("Cluster ready; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutting down");
    Ok(())
}
