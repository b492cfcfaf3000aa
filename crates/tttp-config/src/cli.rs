//! Command-line arguments for the server and client binaries.
//!
//! CLI values override settings loaded from `config.ron`.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// TTTP match server arguments.
#[derive(Parser, Debug, Default)]
#[command(name = "tttp-server", about = "Tic-tac-toe match server")]
pub struct ServerArgs {
    /// Interface to listen on.
    #[arg(long)]
    pub bind: Option<String>,

    /// Listen port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum concurrent connections.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory holding `config.ron`. Without it only defaults and flags apply.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// TTTP console client arguments.
#[derive(Parser, Debug, Default)]
#[command(name = "tttp-client", about = "Tic-tac-toe console client")]
pub struct ClientArgs {
    /// Server host.
    #[arg(long)]
    pub server: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory holding `config.ron`. Without it only defaults and flags apply.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply server CLI overrides to a loaded config.
    pub fn apply_server_overrides(&mut self, args: &ServerArgs) {
        if let Some(ref bind) = args.bind {
            self.server.bind_address = bind.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(max) = args.max_connections {
            self.server.max_connections = max;
        }
        if let Some(ref level) = args.log_level {
            self.log.level = level.clone();
        }
    }

    /// Apply client CLI overrides to a loaded config.
    pub fn apply_client_overrides(&mut self, args: &ClientArgs) {
        if let Some(ref server) = args.server {
            self.client.server_address = server.clone();
        }
        if let Some(port) = args.port {
            self.client.port = port;
        }
        if let Some(ref level) = args.log_level {
            self.log.level = level.clone();
        }
    }
}
