//! Configuration management module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(AppConfig),
    /// Config file missing (first run).
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub machine: MachineConfig,
    pub serial: SerialConfig,
    pub pos: PosConfig,
    pub database: DatabaseConfig,
    pub cloud: CloudConfig,
    pub http: HttpConfig,
}

/// Machine identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Machine id registered with the cloud backend.
    pub id: String,
}

/// Dispenser board serial ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port for the front cabinet boards (slots 1-60).
    pub front_port: String,
    /// Port for the rear cabinet boards (slots 100-160).
    pub rear_port: String,
}

/// Payment terminal connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosConfig {
    pub host: String,
    /// TLS port the terminal listens on (default: 8083).
    #[serde(default = "default_pos_port")]
    pub port: u16,
    /// Path to the terminal's CA certificate (PEM).
    pub ca_certificate: String,
}

fn default_pos_port() -> u16 {
    8083
}

/// Local SQLite database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Cloud backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub api_url: String,
    pub api_key: String,
    pub auto_enabled: bool,
    pub interval_minutes: u64,
}

/// Local HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address, e.g. "127.0.0.1:3000".
    pub bind: String,
}

impl AppConfig {
    /// Get config file path (same directory as executable).
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Attempt to load config with detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<AppConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machine.id.trim().is_empty() {
            return Err(ConfigError::Validation("Machine id cannot be empty".to_string()));
        }
        if self.pos.host.trim().is_empty() {
            return Err(ConfigError::Validation("POS host cannot be empty".to_string()));
        }
        if self.pos.port == 0 {
            return Err(ConfigError::Validation("POS port must be greater than 0".to_string()));
        }
        if self.pos.ca_certificate.trim().is_empty() {
            return Err(ConfigError::Validation(
                "POS CA certificate path cannot be empty".to_string(),
            ));
        }
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::Validation("Database path cannot be empty".to_string()));
        }
        if !self.cloud.api_url.is_empty() && !self.cloud.api_url.starts_with("http") {
            return Err(ConfigError::Validation(
                "Cloud API URL must start with http:// or https://".to_string(),
            ));
        }
        if self.cloud.interval_minutes < 1 {
            return Err(ConfigError::Validation(
                "Sync interval must be at least 1 minute".to_string(),
            ));
        }
        if self.http.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(
                "HTTP bind address must be host:port".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl DatabaseConfig {
    /// Build connection string for SeaORM.
    pub fn connection_string(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path)
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            id: "VM-0001".to_string(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            front_port: "/dev/ttyS1".to_string(),
            rear_port: "/dev/ttyS2".to_string(),
        }
    }
}

impl Default for PosConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: default_pos_port(),
            ca_certificate: "terminal-ca.pem".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "vendagent.db".to_string(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            auto_enabled: true,
            interval_minutes: 15,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_string() {
        let db = DatabaseConfig {
            path: "machine.db".to_string(),
        };
        assert_eq!(db.connection_string(), "sqlite://machine.db?mode=rwc");
    }

    #[test]
    fn test_validation_empty_machine_id() {
        let mut config = AppConfig::default();
        config.machine.id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_pos_port() {
        let mut config = AppConfig::default();
        config.pos.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_cloud_url() {
        let mut config = AppConfig::default();
        config.cloud.api_url = "ftp://invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_bind_address() {
        let mut config = AppConfig::default();
        config.http.bind = "not-an-addr".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.machine.id = "VM-0042".to_string();
        config.serial.front_port = "/dev/ttyUSB0".to_string();
        config.save(&path).unwrap();

        match AppConfig::try_load(&path) {
            ConfigLoadResult::Loaded(loaded) => {
                assert_eq!(loaded.machine.id, "VM-0042");
                assert_eq!(loaded.serial.front_port, "/dev/ttyUSB0");
                assert_eq!(loaded.pos.port, 8083);
            }
            other => panic!("expected loaded config, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        match AppConfig::try_load(&dir.path().join("absent.toml")) {
            ConfigLoadResult::Missing => {}
            other => panic!("expected missing, got {other:?}"),
        }
    }
}
