//! # gymgate-relay
//!
//! Gym unlock relay binary — parses the CLI, wires up logging and metrics,
//! and runs the HTTP/WebSocket server.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use gymgate_server::config::ServerConfig;
use gymgate_server::server::RelayServer;

/// Gym unlock relay server.
#[derive(Parser, Debug)]
#[command(name = "gymgate-relay", about = "WebSocket relay for gym door controllers")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Seconds a new connection may take to send its registration frame
    /// (0 disables the bound).
    #[arg(long, default_value = "30")]
    registration_timeout: u64,

    /// Idle bound on the liveness read in seconds (0 keeps it unbounded).
    #[arg(long, default_value = "0")]
    idle_timeout: u64,

    /// Minimum log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    gymgate_server::logging::init_subscriber(&args.log_level);
    let recorder = gymgate_server::metrics::install_recorder();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        registration_timeout_secs: args.registration_timeout,
        idle_timeout_secs: args.idle_timeout,
        ..ServerConfig::default()
    };

    let server = RelayServer::new(config).with_metrics(recorder);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!("gymgate relay listening on http://{addr}");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().shutdown();
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
