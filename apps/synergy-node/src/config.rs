//! Node configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/synergy/node.toml`
//! - Windows: `%APPDATA%/synergy/node.toml`
//!
//! Missing keys fall back to their defaults, so a partial file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use synergy_protocol::constants::{DEFAULT_MAX_CHUNK_SIZE, PROGRESS_UPDATE_INTERVAL};
use synergy_protocol::{DEFAULT_TCP_PORT, FILE_CHUNK_SIZE};
use synergy_transfer_server::{ServerConfig, default_receive_dir};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address the transfer listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory received files are written into.
    #[serde(default = "default_receive_dir")]
    pub receive_dir: PathBuf,

    /// Chunk size used when sending.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Largest chunk accepted when receiving.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Abort a transfer after this many silent seconds. Unset waits forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_chunk_size() -> usize {
    FILE_CHUNK_SIZE
}

fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}

fn default_progress_interval_ms() -> u64 {
    PROGRESS_UPDATE_INTERVAL.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            receive_dir: default_receive_dir(),
            chunk_size: default_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            progress_interval_ms: default_progress_interval_ms(),
            idle_timeout_secs: None,
        }
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used and created with defaults on first run.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let path = config_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    let config = Config::default();
                    config.save_to(&path)?;
                    Ok(config)
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        if self.max_chunk_size == 0 {
            anyhow::bail!("max_chunk_size must be greater than zero");
        }
        if self.chunk_size > self.max_chunk_size {
            anyhow::bail!(
                "chunk_size ({}) exceeds max_chunk_size ({})",
                self.chunk_size,
                self.max_chunk_size
            );
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            receive_dir: self.receive_dir.clone(),
            max_chunk_size: self.max_chunk_size,
            progress_interval: self.progress_interval(),
            idle_timeout: self.idle_timeout(),
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("synergy").join("node.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("synergy")
            .join("node.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 8888);
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.max_chunk_size, 16 * 1024 * 1024);
        assert_eq!(config.progress_interval(), Duration::from_secs(1));
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config: Config = toml::from_str("port = 9000\nidle_timeout_secs = 30\n").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.chunk_size, FILE_CHUNK_SIZE);
    }

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("node.toml");
        let config = Config {
            port: 7000,
            receive_dir: tmp.path().join("inbox"),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(Config::load(Some(&tmp.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("node.toml");
        std::fs::write(&path, "chunk_size = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn chunk_size_above_max_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("node.toml");
        std::fs::write(&path, "chunk_size = 4096\nmax_chunk_size = 1024\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_chunk_size"));

        let equal = Config {
            chunk_size: 1024,
            max_chunk_size: 1024,
            ..Config::default()
        };
        assert!(equal.validate().is_ok());
    }

    #[test]
    fn server_config_mirrors_settings() {
        let config = Config {
            max_chunk_size: 2048,
            progress_interval_ms: 250,
            idle_timeout_secs: Some(5),
            ..Config::default()
        };
        let server = config.server_config();
        assert_eq!(server.max_chunk_size, 2048);
        assert_eq!(server.progress_interval, Duration::from_millis(250));
        assert_eq!(server.idle_timeout, Some(Duration::from_secs(5)));
    }
}
