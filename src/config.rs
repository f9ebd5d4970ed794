use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::handshake::DEFAULT_HANDSHAKE_TIMEOUT;
use crate::router::{BoardMap, BoardSpec};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Serial ports to open, one per board. Which board answers on which
    /// port is discovered at connect time.
    pub ports: Vec<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Boards in display order
    pub boards: Vec<BoardSpec>,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Serial read timeout; how often wait loops re-check their deadline
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    57600
}

fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64
}

fn default_response_timeout_ms() -> u64 {
    1_000
}

fn default_read_timeout_ms() -> u64 {
    50
}

impl Config {
    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ports.is_empty() {
            return Err(ConfigError::Invalid("no serial ports configured".into()));
        }
        if self.boards.is_empty() {
            return Err(ConfigError::Invalid("no boards configured".into()));
        }
        if self.ports.len() != self.boards.len() {
            return Err(ConfigError::Invalid(format!(
                "{} ports configured for {} boards",
                self.ports.len(),
                self.boards.len()
            )));
        }
        let mut names = HashSet::new();
        for board in &self.boards {
            if board.name.is_empty() {
                return Err(ConfigError::Invalid("board with empty name".into()));
            }
            if !names.insert(board.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate board name {}", board.name)));
            }
        }
        if self.handshake_timeout_ms == 0 || self.response_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn board_map(&self) -> BoardMap {
        BoardMap::new(self.boards.clone())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "ports": ["/dev/ttyACM0", "/dev/ttyACM1"],
        "boards": [
            {"name": "TEENSY1", "led_count": 798},
            {"name": "TEENSY2", "led_count": 795}
        ]
    }"#;

    #[test]
    fn test_load_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.response_timeout(), Duration::from_secs(1));
        assert_eq!(config.board_map().total_leds(), 1593);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/teensy-link.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_load_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ports: }").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut config: Config = serde_json::from_str(SAMPLE).unwrap();
        config.boards[1].name = "TEENSY1".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_port_count() {
        let mut config: Config = serde_json::from_str(SAMPLE).unwrap();
        config.ports.pop();
        assert!(config.validate().is_err());
    }
}
