//! Gatehouse (v1)
//!
//! A configurable application gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                      GATEHOUSE                       │
//!                     │                                                      │
//!   Client Request    │  ┌──────────┐   ┌────────────┐   ┌───────────────┐   │
//!   ──────────────────┼─▶│   net    │──▶│ middleware │──▶│  route table  │   │
//!                     │  │ listener │   │ deny/allow │   │ longest prefix│   │
//!                     │  └──────────┘   │ rate limit │   └───────┬───────┘   │
//!                     │                 └────────────┘           │           │
//!                     │                        ┌─────────────────┼────────┐  │
//!                     │                        ▼                 ▼        ▼  │
//!                     │                 ┌────────────┐  ┌──────────┐ ┌──────┐│
//!                     │                 │   proxy    │  │  static  │ │bridge││
//!                     │                 └─────┬──────┘  └──────────┘ └──────┘│
//!                     │                       │                              │
//!                     │  ┌────────────────────┼───────────────────────────┐  │
//!                     │  │ config + watcher → reload controller → listener│  │
//!                     │  └────────────────────┼───────────────────────────┘  │
//!                     └───────────────────────┼──────────────────────────────┘
//!                                             ▼
//!                                       Backend Server
//! ```

use clap::Parser;
use std::path::PathBuf;

use gatehouse::config::load_initial_config;
use gatehouse::config::watcher::ConfigWatcher;
use gatehouse::lifecycle::{signals, ReloadController, Shutdown};
use gatehouse::observability::{init_logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "gatehouse", version, about = "Configurable application gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gatehouse.toml")]
    config: PathBuf,

    /// Disable configuration watching.
    #[arg(long)]
    production: bool,

    /// Log level, overriding `observability.log_level`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let logging = init_logging(cli.log_level.as_deref().unwrap_or("info"));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatehouse starting");

    let config = load_initial_config(&cli.config)?;
    if cli.log_level.is_none() {
        logging.set_level(&config.observability.log_level);
    }

    tracing::info!(
        host = %config.host_address,
        port = config.port,
        services = config.services.len(),
        tls = config.https.is_some(),
        "Configuration loaded"
    );

    if let Some(metrics_address) = &config.observability.metrics_address {
        match metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (watcher, updates) = ConfigWatcher::new(&cli.config);

    #[cfg(unix)]
    {
        let tx = watcher.sender();
        let path = cli.config.clone();
        tokio::spawn(signals::reload_on_hangup(move || match gatehouse::config::load_config(&path) {
            Ok(config) => {
                let _ = tx.send(config);
            }
            Err(e) => tracing::error!(error = %e, "Failed to reload config, keeping current configuration"),
        }));
    }

    // Held for the life of the process; dropping it stops notifications.
    let _watcher = if cli.production {
        None
    } else {
        tracing::warn!("Running in development mode, configuration changes are applied live");
        match watcher.run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start config watcher, hot reload disabled");
                None
            }
        }
    };

    let shutdown = Shutdown::new();
    let stop = shutdown.wait();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        shutdown.trigger();
    });

    let mut controller = ReloadController::new(config, logging.buffer.clone());
    if cli.log_level.is_none() {
        controller = controller.with_logging(logging);
    }
    controller.run(updates, stop).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
