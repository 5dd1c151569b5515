//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::chain::types::{Address, InvalidAddress};
use crate::gateway::GasLimits;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub gas: GasLimits,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node and contract configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint; without one there is no wallet provider
    pub rpc_url: Option<String>,

    /// Deployed factory contract
    pub factory_address: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    #[serde(default = "default_receipt_poll_interval")]
    pub receipt_poll_interval_ms: u64,

    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,

    #[serde(default = "default_account_poll_interval")]
    pub account_poll_interval_ms: u64,
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_confirmations() -> u64 {
    1
}

fn default_receipt_poll_interval() -> u64 {
    1000
}

fn default_receipt_timeout() -> u64 {
    120
}

fn default_account_poll_interval() -> u64 {
    2000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            factory_address: None,
            request_timeout_ms: default_request_timeout(),
            max_retries: default_max_retries(),
            confirmations: default_confirmations(),
            receipt_poll_interval_ms: default_receipt_poll_interval(),
            receipt_timeout_secs: default_receipt_timeout(),
            account_poll_interval_ms: default_account_poll_interval(),
        }
    }
}

impl ChainConfig {
    /// The factory address, parsed
    pub fn factory_address(&self) -> Result<Address, ConfigError> {
        let text = self
            .factory_address
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("chain.factory_address".to_string()))?;

        text.parse().map_err(|e: InvalidAddress| ConfigError::Invalid {
            field: "chain.factory_address".to_string(),
            error: e.to_string(),
        })
    }
}

/// Mirror store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("crowdfund").to_string_lossy().to_string())
        .unwrap_or_else(|| "./crowdfund_data".to_string())
}

impl StoreConfig {
    /// Data directory with a leading `~` expanded
    pub fn data_path(&self) -> PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.data_dir)),
            None => PathBuf::from(&self.data_dir),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Refresh and view-model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Denominator of the progress percentage
    #[serde(default = "default_planned_milestones")]
    pub planned_milestones: u64,

    /// Slots probed when a campaign has no milestone counter
    #[serde(default = "default_probe_slots")]
    pub milestone_probe_slots: u64,

    /// Period of `crowdfund watch`
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

fn default_planned_milestones() -> u64 {
    3
}

fn default_probe_slots() -> u64 {
    3
}

fn default_watch_interval() -> u64 {
    15
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            planned_milestones: default_planned_milestones(),
            milestone_probe_slots: default_probe_slots(),
            watch_interval_secs: default_watch_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// A config and where it came from
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    /// File the config was read from, `None` for defaults plus environment
    pub source: Option<PathBuf>,
    /// Files that exist but could not be loaded
    pub skipped: Vec<ConfigError>,
}

impl LoadedConfig {
    /// Config read from an explicit path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            config: Config::load_with_env(path)?,
            source: Some(path.to_path_buf()),
            skipped: Vec::new(),
        })
    }

    /// Report where the config came from
    pub fn log(&self) {
        for e in &self.skipped {
            tracing::warn!("Failed to load config: {}", e);
        }
        match &self.source {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::debug!("Using default config with environment overrides"),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let loaded = Self::discover();
        loaded.log();
        loaded.config
    }

    /// Search the default locations without logging
    ///
    /// Callers that install the subscriber from the result call
    /// [`LoadedConfig::log`] afterwards.
    pub fn discover() -> LoadedConfig {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("crowdfund").join("config.toml")),
            Some(PathBuf::from("/etc/crowdfund/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::discover_in(&config_paths)
    }

    fn discover_in(paths: &[PathBuf]) -> LoadedConfig {
        let mut skipped = Vec::new();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => {
                    return LoadedConfig {
                        config,
                        source: Some(path.clone()),
                        skipped,
                    }
                }
                Err(e) => skipped.push(e),
            }
        }

        LoadedConfig {
            config: Self::from_env(),
            source: None,
            skipped,
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Chain overrides
        if let Some(url) = lookup("CROWDFUND_RPC_URL") {
            self.chain.rpc_url = Some(url);
        }
        if let Some(address) = lookup("CROWDFUND_FACTORY_ADDRESS") {
            self.chain.factory_address = Some(address);
        }

        // Store overrides
        if let Some(data_dir) = lookup("CROWDFUND_DATA_DIR") {
            self.store.data_dir = data_dir;
        }

        // Logging overrides
        if let Some(level) = lookup("CROWDFUND_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CROWDFUND_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Missing required setting {0}")]
    Missing(String),

    #[error("Invalid value for {field}: {error}")]
    Invalid { field: String, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Crowdfund Configuration
#
# Environment variables override these settings:
# - CROWDFUND_RPC_URL
# - CROWDFUND_FACTORY_ADDRESS
# - CROWDFUND_DATA_DIR
# - CROWDFUND_LOG_LEVEL
# - CROWDFUND_LOG_FORMAT

[chain]
# JSON-RPC endpoint of a node with unlocked accounts.
# Without it no wallet is available and only offline commands work.
# rpc_url = "http://localhost:8545"

# Address of the deployed CrowdSourcingFactory contract
# factory_address = "0x0000000000000000000000000000000000000000"

# Request timeout (ms) and retry attempts for read requests
request_timeout_ms = 10000
max_retries = 3

# Blocks to wait for before a transaction counts as confirmed
confirmations = 1

# Receipt polling interval (ms) and give-up timeout (seconds)
receipt_poll_interval_ms = 1000
receipt_timeout_secs = 120

# How often to poll the node for account changes (ms)
account_poll_interval_ms = 2000

[gas]
# Gas ceiling per call type
create_campaign = 500000
create_milestone = 500000
donate = 300000
vote = 200000
withdraw_milestone = 500000
withdraw_funds = 500000

[store]
# Directory holding the campaign mirror database
data_dir = "~/.local/share/crowdfund"

[refresh]
# Milestones a campaign is expected to complete (progress denominator)
planned_milestones = 3

# Milestone slots to probe when a campaign has no milestone counter
milestone_probe_slots = 3

# Period of `crowdfund watch` (seconds)
watch_interval_secs = 15

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.chain.rpc_url.is_none());
        assert_eq!(config.chain.confirmations, 1);
        assert_eq!(config.gas.donate, 300_000);
        assert_eq!(config.refresh.planned_milestones, 3);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.gas, GasLimits::default());
        assert_eq!(config.chain.receipt_timeout_secs, 120);
        assert_eq!(config.refresh.watch_interval_secs, 15);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [chain]
            rpc_url = "http://node:8545"
            factory_address = "0xFAFAFAFAFAFAFAFAFAFAFAFAFAFAFAFAFAFAFAFA"

            [gas]
            vote = 90000
            "#,
        )
        .unwrap();

        assert_eq!(config.chain.rpc_url.as_deref(), Some("http://node:8545"));
        assert_eq!(config.chain.factory_address().unwrap(), Address([0xfa; 20]));
        assert_eq!(config.gas.vote, 90_000);
        assert_eq!(config.gas.donate, 300_000);
    }

    #[test]
    fn test_factory_address_errors() {
        let mut chain = ChainConfig::default();
        assert!(matches!(chain.factory_address(), Err(ConfigError::Missing(_))));

        chain.factory_address = Some("0x1234".to_string());
        assert!(matches!(
            chain.factory_address(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CROWDFUND_RPC_URL", "http://env:8545"),
            ("CROWDFUND_DATA_DIR", "/tmp/crowdfund"),
            ("CROWDFUND_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.chain.rpc_url.as_deref(), Some("http://env:8545"));
        assert_eq!(config.store.data_dir, "/tmp/crowdfund");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_data_path_expands_home() {
        let store = StoreConfig {
            data_dir: "/var/lib/crowdfund".to_string(),
        };
        assert_eq!(store.data_path(), PathBuf::from("/var/lib/crowdfund"));

        let store = StoreConfig {
            data_dir: "~/crowdfund".to_string(),
        };
        if let Some(home) = dirs::home_dir() {
            assert_eq!(store.data_path(), home.join("crowdfund"));
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/crowdfund.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_discover_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        let good = dir.path().join("good.toml");
        std::fs::write(&broken, "[chain\n").unwrap();
        std::fs::write(&good, "[refresh]\nplanned_milestones = 5\n").unwrap();

        let paths = vec![dir.path().join("absent.toml"), broken, good.clone()];
        let loaded = Config::discover_in(&paths);
        assert_eq!(loaded.source, Some(good));
        assert_eq!(loaded.skipped.len(), 1);
        assert!(matches!(loaded.skipped[0], ConfigError::Parse { .. }));
        assert_eq!(loaded.config.refresh.planned_milestones, 5);

        let none = Config::discover_in(&[dir.path().join("absent.toml")]);
        assert_eq!(none.source, None);
        assert!(none.skipped.is_empty());
    }
}
