use std::collections::HashMap;

use crate::config::{ChainConfig, Config, NativeCurrency};
use crate::error::MonitorError;

/// Lookup table of supported networks keyed by chain key.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<String, ChainConfig>,
}

struct BuiltinChain {
    key: &'static str,
    id: u64,
    name: &'static str,
    rpc_urls: &'static [&'static str],
    currency: (&'static str, &'static str),
    is_testnet: bool,
}

const BUILTIN_CHAINS: &[BuiltinChain] = &[
    BuiltinChain {
        key: "mainnet",
        id: 1,
        name: "Ethereum",
        rpc_urls: &["https://eth.merkle.io", "https://ethereum-rpc.publicnode.com"],
        currency: ("Ether", "ETH"),
        is_testnet: false,
    },
    BuiltinChain {
        key: "sepolia",
        id: 11155111,
        name: "Sepolia",
        rpc_urls: &["https://sepolia.drpc.org", "https://ethereum-sepolia-rpc.publicnode.com"],
        currency: ("Sepolia Ether", "ETH"),
        is_testnet: true,
    },
    BuiltinChain {
        key: "holesky",
        id: 17000,
        name: "Holesky",
        rpc_urls: &["https://ethereum-holesky-rpc.publicnode.com"],
        currency: ("Holesky Ether", "ETH"),
        is_testnet: true,
    },
    BuiltinChain {
        key: "polygon",
        id: 137,
        name: "Polygon",
        rpc_urls: &["https://polygon-rpc.com", "https://polygon-bor-rpc.publicnode.com"],
        currency: ("POL", "POL"),
        is_testnet: false,
    },
    BuiltinChain {
        key: "polygonAmoy",
        id: 80002,
        name: "Polygon Amoy",
        rpc_urls: &["https://rpc-amoy.polygon.technology"],
        currency: ("POL", "POL"),
        is_testnet: true,
    },
    BuiltinChain {
        key: "base",
        id: 8453,
        name: "Base",
        rpc_urls: &["https://mainnet.base.org", "https://base-rpc.publicnode.com"],
        currency: ("Ether", "ETH"),
        is_testnet: false,
    },
    BuiltinChain {
        key: "baseSepolia",
        id: 84532,
        name: "Base Sepolia",
        rpc_urls: &["https://sepolia.base.org"],
        currency: ("Sepolia Ether", "ETH"),
        is_testnet: true,
    },
    BuiltinChain {
        key: "arbitrum",
        id: 42161,
        name: "Arbitrum One",
        rpc_urls: &["https://arb1.arbitrum.io/rpc", "https://arbitrum-one-rpc.publicnode.com"],
        currency: ("Ether", "ETH"),
        is_testnet: false,
    },
    BuiltinChain {
        key: "optimism",
        id: 10,
        name: "OP Mainnet",
        rpc_urls: &["https://mainnet.optimism.io", "https://optimism-rpc.publicnode.com"],
        currency: ("Ether", "ETH"),
        is_testnet: false,
    },
    BuiltinChain {
        key: "bsc",
        id: 56,
        name: "BNB Smart Chain",
        rpc_urls: &["https://bsc-dataseed1.binance.org", "https://bsc-rpc.publicnode.com"],
        currency: ("BNB", "BNB"),
        is_testnet: false,
    },
];

impl BuiltinChain {
    fn to_config(&self) -> ChainConfig {
        ChainConfig {
            key: self.key.to_string(),
            id: self.id,
            name: self.name.to_string(),
            rpc_urls: self.rpc_urls.iter().map(|u| u.to_string()).collect(),
            native_currency: NativeCurrency {
                name: self.currency.0.to_string(),
                symbol: self.currency.1.to_string(),
                decimals: 18,
            },
            is_testnet: self.is_testnet,
        }
    }
}

impl ChainRegistry {
    /// Build a registry from explicit chain entries only.
    pub fn new(chains: impl IntoIterator<Item = ChainConfig>) -> Self {
        let mut registry = Self::default();
        for chain in chains {
            registry.insert(chain);
        }
        registry
    }

    /// The built-in catalog of well-known networks.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_CHAINS.iter().map(BuiltinChain::to_config))
    }

    /// Built-in catalog (unless disabled) overlaid with configured chains.
    /// A configured chain replaces a built-in entry with the same key.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = if config.monitor.use_builtin_chains {
            Self::builtin()
        } else {
            Self::default()
        };

        for chain in &config.chains {
            if registry.chains.contains_key(&chain.key) {
                tracing::debug!(chain = %chain.key, "Overriding built-in chain from config");
            }
            registry.insert(chain.clone());
        }
        registry
    }

    fn insert(&mut self, chain: ChainConfig) {
        self.chains.insert(chain.key.clone(), chain);
    }

    pub fn get(&self, key: &str) -> Option<&ChainConfig> {
        self.chains.get(key)
    }

    pub fn require(&self, key: &str) -> Result<&ChainConfig, MonitorError> {
        self.get(key)
            .ok_or_else(|| MonitorError::UnsupportedChain(key.to_string()))
    }

    /// Chain keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
