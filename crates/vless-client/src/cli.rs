//! CLI module for the VLESS client.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vless_config::{LogFormat, LogOutput, LoggingConfig};
use vless_proto::Address;

use crate::config::load_client_config;
use crate::dialer::{Network, Outbound};

/// `connect` arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "vless-client", version, about = "VLESS client")]
pub struct ConnectArgs {
    /// Config file path (toml/json/jsonc).
    #[arg(short, long, default_value = "client.toml")]
    pub config: PathBuf,

    /// Destination, as HOST:PORT.
    pub target: String,

    /// Send stdin lines as datagrams instead of opening a stream.
    #[arg(long)]
    pub udp: bool,

    /// Override the server address.
    #[arg(short, long)]
    pub server: Option<String>,

    /// Skip TLS certificate verification.
    #[arg(long)]
    pub skip_verify: bool,

    /// Log level override.
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Run `connect` with the given CLI arguments.
pub async fn run(args: ConnectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_client_config(&args.config)?;

    // Apply CLI overrides
    if let Some(server) = &args.server {
        config.outbound.server = server.clone();
    }
    if args.skip_verify
        && let Some(tls) = config.outbound.tls.as_mut()
    {
        tls.skip_verify = true;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = Some(level.clone());
    }

    init_tracing(&config.logging);

    let destination: Address = args.target.parse()?;
    let outbound = Outbound::from_config(&config.outbound)?;
    let network = if args.udp { Network::Udp } else { Network::Tcp };
    info!(
        version = vless_core::VERSION,
        server = %config.outbound.server,
        target = %destination,
        "{} connecting",
        vless_core::PROJECT_NAME
    );

    // Graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    crate::run(&outbound, destination, network, shutdown).await?;
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Builds the `EnvFilter` directive string from the logging section.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.as_deref().unwrap_or("info").to_string();
    for (module, level) in &config.filters {
        filter_str.push(',');
        filter_str.push_str(module);
        filter_str.push('=');
        filter_str.push_str(level);
    }
    filter_str
}

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_new(filter_directives(config))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries relayed data unless logging is pointed at it explicitly.
    let writer = match config.log_output() {
        LogOutput::Stdout => BoxMakeWriter::new(io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format() {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(writer)).init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(writer))
            .init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_writer(writer)).init(),
    }
}
