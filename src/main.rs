//! muxrelay - TCP port forwarding over a device transport
//!
//! Accepts TCP connections on configured local ports and relays them to a
//! remote port on a device reached through the device transport.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use muxrelay::config::{ConfigManager, ForwardSpec};
use muxrelay::transport::{discover_devices, TcpDeviceTransport};
use muxrelay::{ListenerSet, Result, ShutdownCoordinator};

/// CLI arguments for muxrelay
#[derive(Parser, Debug)]
#[command(name = "muxrelay")]
#[command(about = "TCP port forwarding relay over a device transport")]
#[command(version)]
pub struct CliArgs {
    /// Forwards to serve, e.g. 22, 22:2222 or 22:2222-SERIAL
    #[arg(value_name = "REMOTE[:LOCAL][-SERIAL]")]
    pub forwards: Vec<ForwardSpec>,

    /// Configuration file path
    #[arg(short, long, default_value = "muxrelay.toml")]
    pub config: PathBuf,

    /// List attached devices and exit
    #[arg(short, long)]
    pub list: bool,

    /// Handle multiple connections at once
    #[arg(short = 't', long)]
    pub concurrent: bool,

    /// Relay buffer size per direction, in KiB
    #[arg(short, long, value_name = "KIB")]
    pub bufsize: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    init_tracing(&args)?;

    // Priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(args.forwards, args.bufsize, args.concurrent);
    config.validate().context("Configuration validation failed")?;

    let transport = Arc::new(TcpDeviceTransport::new(
        config.transport.devices.clone(),
        config.server.connect_timeout,
    ));

    if args.list {
        info!("Listing devices...");
        let devices = discover_devices(transport.as_ref()).await?;
        if devices.is_empty() {
            println!("No devices found");
        }
        for device in devices {
            println!("{}", device);
        }
        return Ok(());
    }

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Buffer size: {} bytes", config.server.buffer_size);
        info!("  Mode: {}", if config.server.concurrent { "concurrent" } else { "sequential" });
        info!("  Forwards: {}", config.forwards.len());
        for forward in &config.forwards {
            info!("    {}", forward);
        }
        return Ok(());
    }

    if config.forwards.is_empty() {
        anyhow::bail!("no forwards given; pass REMOTE[:LOCAL][-SERIAL] arguments or a config file");
    }

    info!("Starting muxrelay v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(config);
    let listener_set = ListenerSet::bind(Arc::clone(&config), transport).await?;

    let coordinator = ShutdownCoordinator::new();
    let shutdown_rx = coordinator.subscribe();
    let signal_task = tokio::spawn(async move {
        if let Err(e) = coordinator.listen_for_signals().await {
            error!("Error setting up signal handlers: {}", e);
        }
    });

    let result = listener_set.run(shutdown_rx).await;
    signal_task.abort();

    info!("Server shutdown complete");
    result
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<()> {
    let log_level = if args.verbose { "debug" } else { &args.log_level };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
