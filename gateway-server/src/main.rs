//! Gateway binary entry point: parses CLI args, resolves settings, starts
//! the HTTP server, and shuts down cleanly on Ctrl+C.

use clap::Parser;
use gateway_server::config::Settings;
use gateway_server::server::create_server;
use std::net::SocketAddr;

/// Command-line overrides layered on top of an optional TOML config file
/// and `BACKEND_*` environment variables (§6).
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level passed to `tracing_subscriber`'s env filter.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let settings = Settings::load(Some(&args.config))?;
    settings.validate()?;

    let host = settings.host.clone();
    let port = settings.port;
    let (app, health_checker) = create_server(settings).await?;

    let addr = SocketAddr::new(host.parse()?, port);
    tracing::info!("starting gateway server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    health_checker.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
