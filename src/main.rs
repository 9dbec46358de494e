use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::{load_config, GatewayConfig};
use api_gateway::lifecycle::{build_gateway, signals, GatewayStores, Shutdown, StartupError};
use api_gateway::observability::{logging, metrics};
use api_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "api-gateway")]
#[command(about = "API gateway with request admission pipeline", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        config_file = ?args.config,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let metrics_handle = if config.observability.metrics_enabled {
        metrics::init_metrics()
    } else {
        None
    };

    let gateway = build_gateway(&config, GatewayStores::from_config(&config), metrics_handle)?;
    let writer_task = gateway.writer_task;
    let server = HttpServer::new(gateway.router);
    // The server owns the remaining writer handles through the router.
    drop(gateway.writer);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let signal = signals::wait_for_signal().await;
        tracing::info!(signal, "Shutdown signal received");
        trigger.trigger();
    });

    server.run(listener, server_shutdown).await?;

    // Router dropped with the server; the writer drains what is queued, then exits.
    if let Err(e) = writer_task.await {
        tracing::error!(error = %e, "Store writer task failed");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
