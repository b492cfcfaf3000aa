//! Binary entry point for the TTTP match server.
//!
//! Run with: `cargo run -p tttp-server -- --port 58901`

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tttp_config::{Config, ConfigError, ServerArgs};
use tttp_protocol::FrameConfig;
use tttp_server::{GameServer, ServerConfig};

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tttp_log::init_logging(Some(&config));
    match &args.config {
        Some(dir) => info!("Using config {}", Config::file_path(dir).display()),
        None => info!("No config directory given, using defaults and flags"),
    }

    let bind_addr = match config.server.listen_addr() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    info!(
        "TTTP server starting | max connections: {}",
        config.server.max_connections
    );

    let server = Arc::new(GameServer::new(ServerConfig {
        bind_addr,
        max_connections: config.server.max_connections,
        frame: FrameConfig::default(),
    }));

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_server.shutdown(),
            Err(e) => tracing::warn!("Cannot listen for Ctrl-C: {e}"),
        }
    });

    if let Err(e) = server.run().await {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }

    // Give sessions a moment to flush and close before the runtime drops.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !server.connections.is_empty().await && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    info!("Server stopped");
}

/// Defaults, then `config.ron` when `--config` is given, then CLI flags.
fn load_config(args: &ServerArgs) -> Result<Config, ConfigError> {
    let mut config = match &args.config {
        Some(dir) => Config::load_or_create(dir)?,
        None => Config::default(),
    };
    config.apply_server_overrides(args);
    Ok(config)
}
