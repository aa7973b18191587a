//! Error taxonomy shared by the monitoring core.

use thiserror::Error;

/// Errors surfaced by the RPC layer, the classifier, enrichment and the store.
///
/// Decode mismatches are not represented here: a log that fails to decode
/// under a standard is simply `None` from that standard's decoder.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The chain key is not in the registry. Configuration error, never retried.
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    /// Every endpoint for the chain failed its liveness probe.
    #[error("no reachable endpoint for chain {chain}")]
    EndpointUnavailable { chain: String },

    /// The node answered but had no data for the requested object.
    #[error("{what} not found: {id}")]
    FetchFailure { what: &'static str, id: String },

    /// Transport or JSON-RPC failure from a single endpoint.
    #[error("rpc error from {endpoint}: {message}")]
    Rpc { endpoint: String, message: String },

    #[error("rpc call to {endpoint} timed out after {ms}ms")]
    Timeout { endpoint: String, ms: u64 },

    #[error("store error: {0}")]
    Store(String),

    /// Malformed hash, address or key supplied by a caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl MonitorError {
    pub fn rpc(endpoint: &str, err: impl std::fmt::Display) -> Self {
        Self::Rpc {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }

    pub fn not_found(what: &'static str, id: impl std::fmt::Display) -> Self {
        Self::FetchFailure {
            what,
            id: id.to_string(),
        }
    }

    /// Returns `true` if the failure points at the endpoint itself rather
    /// than at the requested data, so the cached client should be replaced.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Rpc { .. } | Self::Timeout { .. })
    }
}

impl From<sqlx::Error> for MonitorError {
    fn from(e: sqlx::Error) -> Self {
        Self::Store(e.to_string())
    }
}
