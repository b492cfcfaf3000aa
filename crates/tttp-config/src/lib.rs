//! Configuration for the TTTP server and client.
//!
//! Settings persist to disk as a RON file and accept CLI overrides via clap.
//! Unknown fields are ignored and missing ones fall back to defaults, so
//! older and newer config files both load.

mod cli;
mod config;
mod error;

pub use cli::{ClientArgs, ServerArgs};
pub use config::{ClientSettings, Config, DEFAULT_PORT, LogSettings, ServerSettings};
pub use error::ConfigError;
