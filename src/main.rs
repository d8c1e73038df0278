//! Exchange router binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────┐
//!                         │                 EXCHANGE ROUTER               │
//!                         │                                               │
//!     publish(exchange,   │  ┌────────────┐   ┌──────────┐   ┌─────────┐  │
//!       routing_key) ─────┼─▶│ dispatcher │──▶│ matcher  │──▶│ queue A │──┼──▶ consumers
//!                         │  │            │   │ bindings │   │ queue B │──┼──▶ consumers
//!                         │  └────────────┘   └──────────┘   └─────────┘  │
//!                         │                                    │          │
//!                         │                     delivery loop per queue   │
//!                         │                     ack / nack / redelivery   │
//!                         │                                               │
//!                         │  ┌─────────────────────────────────────────┐  │
//!                         │  │          Cross-Cutting Concerns         │  │
//!                         │  │  config · observability · lifecycle     │  │
//!                         │  │  admin API · resilience (backoff)       │  │
//!                         │  └─────────────────────────────────────────┘  │
//!                         └───────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use exchange_router::admin::{self, AdminState};
use exchange_router::config::{load_config, BrokerConfig};
use exchange_router::lifecycle::{build_broker, demo, Shutdown};
use exchange_router::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "exchange-router")]
#[command(about = "In-process fanout/direct/topic exchange router", long_about = None)]
struct Cli {
    /// Topology and runtime configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Declare the sample topology, attach logging consumers and publish sample events
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BrokerConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!("exchange-router v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let broker = Arc::new(build_broker(&config)?);
    let shutdown = Shutdown::new();

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(broker.clone(), &config.admin.api_key);
        Some(tokio::spawn(admin::serve(listener, state, shutdown.subscribe())))
    } else {
        None
    };

    if cli.demo {
        demo::run(&broker)?;
    }

    tracing::info!("Broker running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, shutting down");

    shutdown.trigger();
    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin task failed"),
            Ok(Ok(())) => {}
        }
    }
    broker.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
