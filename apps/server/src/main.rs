//! DLNA Bridge Server - Standalone headless DLNA media server.
//!
//! Exposes a remote media library to DLNA renderers on the local network.
//! The supervisor waits for an upstream server configuration, runs the DLNA
//! stack, restarts it when health probes fail, and stops it cleanly on
//! Ctrl+C or SIGTERM.

mod config;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dlnabridge_core::{Bootstrap, HttpHealthProbe, SharedConfigSource, Supervisor, UpstreamConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// DLNA Bridge Server - Serve a remote media library to DLNA renderers.
#[derive(Parser, Debug)]
#[command(name = "dlnabridge-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "DLNABRIDGE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// HTTP port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Advertise IP address (overrides config file).
    #[arg(short = 'a', long)]
    advertise_ip: Option<IpAddr>,

    /// Name shown by renderers (overrides config file).
    #[arg(short = 'n', long)]
    friendly_name: Option<String>,

    /// Upstream media server URL (overrides config file).
    #[arg(long, requires = "user_id")]
    server_url: Option<String>,

    /// Upstream user whose library is exposed.
    #[arg(long)]
    user_id: Option<String>,

    /// Upstream access token.
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("DLNA Bridge Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        config::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }
    if let Some(name) = args.friendly_name {
        config.friendly_name = Some(name);
    }
    if let (Some(server_url), Some(user_id)) = (args.server_url, args.user_id) {
        config.upstream = Some(UpstreamConfig {
            server_url,
            user_id,
            access_token: args.token,
        });
    } else if let (Some(token), Some(upstream)) = (args.token, config.upstream.as_mut()) {
        upstream.access_token = Some(token);
    }

    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;

    match config.advertise_ip {
        Some(ip) => log::info!(
            "Configuration: http_port={}, advertise_ip={}",
            config.http_port,
            ip
        ),
        None => log::info!(
            "Configuration: http_port={}, advertise_ip=auto",
            config.http_port
        ),
    }

    let config_source = Arc::new(SharedConfigSource::new(config.upstream.clone()));
    if config.upstream.is_none() {
        log::warn!("No upstream media server configured, waiting for one");
    }

    let probe = Arc::new(
        HttpHealthProbe::new(config.supervisor.health_timeout())
            .context("Failed to build health probe")?,
    );
    let bootstrap = Bootstrap::from_config(config).context(
        "Failed to auto-detect local IP address. \
         Please specify --advertise-ip or set DLNABRIDGE_ADVERTISE_IP to the IP \
         address that renderers can reach.",
    )?;
    let supervisor = Arc::new(Supervisor::new(bootstrap, config_source, probe));

    let cancel = CancellationToken::new();
    let mut run = tokio::spawn({
        let supervisor = supervisor.clone();
        let cancel = cancel.clone();
        async move { supervisor.run(cancel).await }
    });

    let finished = tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
            cancel.cancel();
            None
        }
        result = &mut run => Some(result),
    };
    let result = match finished {
        Some(result) => result,
        None => run.await,
    };
    if let Err(e) = result {
        log::error!("Supervisor task failed: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
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
}
