use serde::Serialize;

use crate::rpc::ConnectionState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================
// Health
// ============================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub watchers: usize,
    pub chains: Vec<ChainHealth>,
}

#[derive(Debug, Serialize)]
pub struct ChainHealth {
    pub chain: String,
    pub state: ConnectionState,
}

// ============================================================
// Chains
// ============================================================

#[derive(Debug, Serialize)]
pub struct ChainInfo {
    pub key: String,
    pub id: u64,
    pub name: String,
    pub native_symbol: String,
    pub is_testnet: bool,
    pub endpoints: usize,
    pub state: ConnectionState,
}

#[derive(Debug, Serialize)]
pub struct ChainsResponse {
    pub chains: Vec<ChainInfo>,
}
