use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

// ============================================================
// Chains
// ============================================================

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for NativeCurrency {
    fn default() -> Self {
        Self {
            name: "Ether".to_string(),
            symbol: "ETH".to_string(),
            decimals: 18,
        }
    }
}

/// A supported network. Immutable once the registry is built.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChainConfig {
    pub key: String,
    pub id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub native_currency: NativeCurrency,
    #[serde(default)]
    pub is_testnet: bool,
}

// ============================================================
// Monitor
// ============================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionMode {
    /// Subscribe to logs emitted by the watched address.
    #[default]
    Logs,
    /// Follow new blocks and match transactions by sender/recipient.
    Blocks,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    #[serde(default)]
    pub subscription_mode: SubscriptionMode,
    #[serde(default)]
    pub classify_on_ingest: bool,
    #[serde(default = "default_label")]
    pub default_label: String,
    #[serde(default = "default_true")]
    pub use_builtin_chains: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
            subscription_mode: SubscriptionMode::Logs,
            classify_on_ingest: false,
            default_label: default_label(),
            use_builtin_chains: true,
        }
    }
}

impl MonitorConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_label() -> String {
    "Unknown".to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================
// RPC
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct RpcConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            reconnect_interval_secs: default_reconnect_interval(),
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl RpcConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    15000
}

fn default_reconnect_interval() -> u64 {
    15
}

fn default_poll_interval_ms() -> u64 {
    4000
}

fn default_max_retries() -> u32 {
    3
}

// ============================================================
// API Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

fn default_api_port() -> u16 {
    3000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.chains.is_empty() && !self.monitor.use_builtin_chains {
            return Err(eyre::eyre!(
                "No chains configured and built-in chains are disabled"
            ));
        }
        if self.monitor.reconcile_interval_secs == 0 {
            return Err(eyre::eyre!("monitor.reconcile_interval_secs must be positive"));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if chain.key.trim().is_empty() {
                return Err(eyre::eyre!("Chain '{}' has an empty key", chain.name));
            }
            if !seen.insert(chain.key.as_str()) {
                return Err(eyre::eyre!("Chain key '{}' is configured twice", chain.key));
            }
            if chain.rpc_urls.is_empty() {
                return Err(eyre::eyre!(
                    "Chain '{}' must have at least one RPC endpoint",
                    chain.key
                ));
            }
            for url in &chain.rpc_urls {
                if !is_supported_endpoint(url) {
                    return Err(eyre::eyre!(
                        "Invalid RPC endpoint '{}' for chain '{}'",
                        url,
                        chain.key
                    ));
                }
            }
        }
        Ok(())
    }
}

/// True for `http(s)://` and `ws(s)://` URLs.
pub fn is_supported_endpoint(url: &str) -> bool {
    ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(key: &str, urls: &[&str]) -> ChainConfig {
        ChainConfig {
            key: key.to_string(),
            id: 1,
            name: key.to_string(),
            rpc_urls: urls.iter().map(|u| u.to_string()).collect(),
            native_currency: NativeCurrency::default(),
            is_testnet: false,
        }
    }

    fn base_config(chains: Vec<ChainConfig>) -> Config {
        Config {
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
                max_connections: 5,
            },
            monitor: MonitorConfig::default(),
            rpc: RpcConfig::default(),
            chains,
            api: ApiConfig::default(),
        }
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[database]
url = "postgres://localhost/test"
max_connections = 5

[monitor]
subscription_mode = "blocks"

[[chains]]
key = "sepolia"
id = 11155111
name = "Sepolia"
rpc_urls = ["https://rpc.sepolia.org", "wss://sepolia.example"]
is_testnet = true
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains[0].key, "sepolia");
        assert_eq!(config.chains[0].rpc_urls.len(), 2);
        assert!(config.chains[0].is_testnet);
        assert_eq!(config.chains[0].native_currency.symbol, "ETH"); // default
        assert_eq!(config.monitor.subscription_mode, SubscriptionMode::Blocks);
        assert_eq!(config.monitor.reconcile_interval_secs, 60); // default
        assert_eq!(config.rpc.reconnect_interval_secs, 15); // default
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_endpoints() {
        let config = base_config(vec![chain("test", &[])]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_endpoint() {
        let config = base_config(vec![chain("test", &["localhost:8545"])]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_key() {
        let config = base_config(vec![
            chain("dup", &["http://a"]),
            chain("dup", &["http://b"]),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_no_chains_without_builtins() {
        let mut config = base_config(vec![]);
        assert!(config.validate().is_ok());
        config.monitor.use_builtin_chains = false;
        assert!(config.validate().is_err());
    }
}
