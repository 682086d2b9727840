use crate::core::difficulty::{MAX_WEIGHT, MIN_WEIGHT};
use crate::core::proof_of_work::{DEFAULT_REFRESH_SECS, MAX_NONCE};
use crate::core::{Network, WeightConstants};
use crate::error::{Result, SendError};
use crate::wallet::KdfParams;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "tokensend.toml";

const DEFAULT_NODE_URL: &str = "http://127.0.0.1:8080/v1a/";
const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080/v1a/ws/";
const DEFAULT_KEYSTORE_FILE: &str = "keystore.dat";

const NODE_URL_KEY: &str = "TOKENSEND_NODE_URL";
const WS_URL_KEY: &str = "TOKENSEND_WS_URL";
const NETWORK_KEY: &str = "TOKENSEND_NETWORK";
const KEYSTORE_KEY: &str = "TOKENSEND_KEYSTORE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Base URL of the node API, ending in `/`
    pub url: String,
    pub ws_url: String,
    pub network: Network,
    pub timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_NODE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            network: Network::Testnet,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub max_nonce: u32,
    pub refresh_secs: u32,
    /// Mining attempts before giving up on an exhausted nonce space
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Mine at this weight instead of the computed one
    pub fixed_weight: Option<f64>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            max_nonce: MAX_NONCE,
            refresh_secs: DEFAULT_REFRESH_SECS,
            max_attempts: 3,
            retry_backoff_ms: 500,
            fixed_weight: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    pub path: PathBuf,
    pub min_pin_length: usize,
    /// Argon2id memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        let kdf = KdfParams::default();
        Self {
            path: PathBuf::from(DEFAULT_KEYSTORE_FILE),
            min_pin_length: 6,
            memory_kib: kdf.memory_kib,
            iterations: kdf.iterations,
        }
    }
}

impl KeystoreConfig {
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            memory_kib: self.memory_kib,
            iterations: self.iterations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub mining: MiningConfig,
    pub weight: WeightConstants,
    pub keystore: KeystoreConfig,
}

impl Config {
    /// Load configuration from `path`, or from `tokensend.toml` in the
    /// working directory when no path is given. A missing default file
    /// yields the defaults; a missing explicit file is an error.
    /// Environment overrides are applied and the result validated.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Config::from_file(default_path)?
                } else {
                    debug!("No {DEFAULT_CONFIG_FILE} found, using defaults");
                    Config::default()
                }
            }
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path).map_err(|e| {
            SendError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let config = Config::from_toml(&contents)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Config> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `TOKENSEND_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(NODE_URL_KEY) {
            self.node.url = url;
        }
        if let Some(ws_url) = lookup(WS_URL_KEY) {
            self.node.ws_url = ws_url;
        }
        if let Some(network) = lookup(NETWORK_KEY) {
            self.node.network = network.parse()?;
        }
        if let Some(path) = lookup(KEYSTORE_KEY) {
            self.keystore.path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.url.trim().is_empty() {
            return Err(SendError::Config("node.url must not be empty".to_string()));
        }
        if self.node.timeout_ms == 0 {
            return Err(SendError::Config(
                "node.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.mining.max_attempts == 0 {
            return Err(SendError::Config(
                "mining.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.mining.max_nonce == 0 {
            return Err(SendError::Config(
                "mining.max_nonce must be greater than 0".to_string(),
            ));
        }
        if let Some(weight) = self.mining.fixed_weight {
            if !weight.is_finite() || !(MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
                return Err(SendError::Config(format!(
                    "mining.fixed_weight must be within [{MIN_WEIGHT}, {MAX_WEIGHT}], got {weight}"
                )));
            }
        }
        self.weight.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mining.max_nonce, u32::MAX);
        assert_eq!(config.mining.refresh_secs, 2);
        assert_eq!(config.weight.min_weight, 14.0);
        assert_eq!(config.node.network, Network::Testnet);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [node]
            url = "https://node.example/v1a/"
            network = "mainnet"

            [mining]
            fixed_weight = 1.0

            [weight]
            coefficient = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.node.url, "https://node.example/v1a/");
        assert_eq!(config.node.network, Network::Mainnet);
        assert_eq!(config.node.timeout_ms, 30_000);
        assert_eq!(config.mining.fixed_weight, Some(1.0));
        assert_eq!(config.mining.max_attempts, 3);
        assert_eq!(config.weight.coefficient, 2.0);
        assert_eq!(config.weight.min_weight_k, 100.0);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            Config::from_toml("[node\nurl = 1"),
            Err(SendError::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (NODE_URL_KEY, "http://override/"),
            (NETWORK_KEY, "mainnet"),
            (KEYSTORE_KEY, "/tmp/keys.dat"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.node.url, "http://override/");
        assert_eq!(config.node.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.node.network, Network::Mainnet);
        assert_eq!(config.keystore.path, PathBuf::from("/tmp/keys.dat"));
    }

    #[test]
    fn test_bad_network_override_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == NETWORK_KEY).then(|| "regtest".to_string())
        });
        assert!(matches!(result, Err(SendError::Config(_))));
    }

    #[test]
    fn test_validation_rules() {
        let mut config = Config::default();
        config.node.url = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.mining.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.mining.max_nonce = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.mining.fixed_weight = Some(300.0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.weight.min_weight = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[mining]\nmax_attempts = 7\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.mining.max_attempts, 7);

        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
