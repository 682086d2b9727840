//! Configuration management
//!
//! Node endpoints, mining limits, weight constants and key store settings,
//! read from a TOML file with environment overrides.

pub mod settings;

pub use settings::{Config, KeystoreConfig, MiningConfig, NodeConfig, DEFAULT_CONFIG_FILE};
