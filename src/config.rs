//! Node configuration loaded from TOML with built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::blockchain::proof::DEFAULT_DIFFICULTY_BITS;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Leading zero bits a proof hash must have
    #[serde(default = "default_difficulty_bits")]
    pub difficulty_bits: u32,
    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_peer_timeout_secs")]
    pub peer_timeout_secs: u64,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty_bits: default_difficulty_bits(),
            mining_reward: default_mining_reward(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peer_timeout_secs: default_peer_timeout_secs(),
            bootstrap_peers: Vec::new(),
        }
    }
}

fn default_node_id() -> String {
    "5000".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_difficulty_bits() -> u32 {
    DEFAULT_DIFFICULTY_BITS
}

fn default_mining_reward() -> f64 {
    10.0
}

fn default_peer_timeout_secs() -> u64 {
    5
}

impl NodeConfig {
    /// Loads `path`, or the defaults when the file does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.exists() {
            Self::from_toml(&fs::read_to_string(path)?)?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.port == 0 {
            return Err(ConfigError::Invalid("node.port must be non-zero".to_string()));
        }

        if self.node.node_id.is_empty() {
            return Err(ConfigError::Invalid("node.node_id must be set".to_string()));
        }

        if self.ledger.difficulty_bits > 256 {
            return Err(ConfigError::Invalid(
                "ledger.difficulty_bits cannot exceed 256".to_string(),
            ));
        }

        if !self.ledger.mining_reward.is_finite() || self.ledger.mining_reward < 0.0 {
            return Err(ConfigError::Invalid(
                "ledger.mining_reward must be a non-negative number".to_string(),
            ));
        }

        Ok(())
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.network.peer_timeout_secs)
    }

    /// Directory of this node's state database
    pub fn state_path(&self) -> PathBuf {
        self.node.data_dir.join(format!("blockchain-{}", self.node.node_id))
    }

    pub fn wallet_path(&self) -> PathBuf {
        self.node.data_dir.join(format!("wallet-{}.txt", self.node.node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();

        assert_eq!(config.node.port, 5000);
        assert_eq!(config.ledger.difficulty_bits, 8);
        assert_eq!(config.ledger.mining_reward, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = NodeConfig::from_toml(
            r#"
            [node]
            node_id = "5001"
            port = 5001

            [network]
            bootstrap_peers = ["localhost:5000"]
            "#,
        )
        .unwrap();

        assert_eq!(config.node.node_id, "5001");
        assert_eq!(config.node.host, "127.0.0.1");
        assert_eq!(config.ledger.mining_reward, 10.0);
        assert_eq!(config.network.bootstrap_peers, vec!["localhost:5000".to_string()]);
        assert!(config.state_path().ends_with("blockchain-5001"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig::load(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.node.node_id, "5000");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = NodeConfig::from_toml("[ledger]\nmining_reward = -1.0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = NodeConfig::from_toml("[ledger]\ndifficulty_bits = 300\n").unwrap();
        assert!(config.validate().is_err());
    }
}
