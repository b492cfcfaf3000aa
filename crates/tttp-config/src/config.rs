//! Configuration structs with defaults and RON persistence.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Well-known TTTP port.
pub const DEFAULT_PORT: u16 = 58901;

const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration shared by the server and client binaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Match server settings.
    pub server: ServerSettings,
    /// Console client settings.
    pub client: ClientSettings,
    /// Logging settings.
    pub log: LogSettings,
}

/// Match server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to listen on.
    pub bind_address: String,
    /// Listen port.
    pub port: u16,
    /// Maximum concurrent connections; extra connections are closed.
    pub max_connections: usize,
}

/// Console client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
    /// Host of the match server.
    pub server_address: String,
    /// Port of the match server.
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive (e.g. "info", "tttp_server=debug").
    pub level: String,
    /// Also write JSON events to this file.
    pub json_file: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_connections: 200,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_file: None,
        }
    }
}

impl ServerSettings {
    /// Socket address to bind.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let text = format!("{}:{}", self.bind_address, self.port);
        text.parse().map_err(|_| ConfigError::InvalidAddress(text))
    }
}

impl ClientSettings {
    /// `host:port` string to connect to.
    pub fn server_endpoint(&self) -> String {
        format!("{}:{}", self.server_address, self.port)
    }
}

// --- Load / Save ---

impl Config {
    /// Path of the config file inside `config_dir`.
    pub fn file_path(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = Self::file_path(config_dir);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            ron::from_str(&contents).map_err(ConfigError::ParseError)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .separate_tuple_members(true);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(2))
                .unwrap();
        assert!(ron_str.contains("port: 58901"));
        assert!(ron_str.contains("max_connections: 200"));
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(server: (port: 4000))").unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.client, ClientSettings::default());
        assert_eq!(config.log, LogSettings::default());
    }

    #[test]
    fn test_json_file_setting() {
        let config: Config = ron::from_str(r#"(log: (json_file: Some("logs/server.json")))"#).unwrap();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.json_file, Some(PathBuf::from("logs/server.json")));
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(matchmaking: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_listen_addr() {
        let settings = ServerSettings {
            bind_address: "127.0.0.1".to_string(),
            port: 9000,
            max_connections: 2,
        };
        let expected: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(settings.listen_addr().unwrap(), expected);

        let bad = ServerSettings {
            bind_address: "not an address".to_string(),
            ..ServerSettings::default()
        };
        assert!(matches!(bad.listen_addr(), Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn test_server_endpoint() {
        assert_eq!(ClientSettings::default().server_endpoint(), "127.0.0.1:58901");
    }

    #[test]
    fn test_file_path() {
        let path = Config::file_path(Path::new("settings"));
        assert_eq!(path, Path::new("settings").join("config.ron"));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.port = 6000;
        config.log.level = "debug".to_string();

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }
}
