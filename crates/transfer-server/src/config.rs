use std::path::PathBuf;
use std::time::Duration;

use synergy_data_channel::ReceiverConfig;
use synergy_protocol::constants::{DEFAULT_MAX_CHUNK_SIZE, PROGRESS_UPDATE_INTERVAL};

/// `<tmp>/synergy_files/received`.
pub fn default_receive_dir() -> PathBuf {
    std::env::temp_dir().join("synergy_files").join("received")
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory incoming files are written into. Created on start.
    pub receive_dir: PathBuf,
    /// Largest chunk a sender may announce.
    pub max_chunk_size: usize,
    pub progress_interval: Duration,
    /// Per-read idle limit for a connected sender (`None` waits forever).
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            receive_dir: default_receive_dir(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            progress_interval: PROGRESS_UPDATE_INTERVAL,
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    pub(crate) fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            receive_dir: self.receive_dir.clone(),
            max_chunk_size: self.max_chunk_size,
            progress_interval: self.progress_interval,
            idle_timeout: self.idle_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dir_is_under_tmp() {
        let dir = default_receive_dir();
        assert!(dir.starts_with(std::env::temp_dir()));
        assert!(dir.ends_with("synergy_files/received"));
    }

    #[test]
    fn receiver_config_carries_limits() {
        let config = ServerConfig {
            max_chunk_size: 4096,
            idle_timeout: Some(Duration::from_secs(5)),
            ..ServerConfig::default()
        };
        let rc = config.receiver_config();
        assert_eq!(rc.max_chunk_size, 4096);
        assert_eq!(rc.idle_timeout, Some(Duration::from_secs(5)));
        assert_eq!(rc.receive_dir, config.receive_dir);
    }
}
