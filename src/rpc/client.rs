//! The chain node seam: what the monitor needs from one RPC endpoint.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::Log;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::ChainConfig;
use crate::error::MonitorError;

/// Raw log entries for one watched address, in node delivery order.
pub type LogStream = BoxStream<'static, Log>;

/// Numbers of newly observed blocks, ascending.
pub type BlockStream = BoxStream<'static, u64>;

/// The fields of a transaction the classifier and enrichment read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSnapshot {
    pub hash: B256,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub input: Bytes,
    pub value: U256,
    pub gas_price: Option<u128>,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSnapshot {
    pub tx_hash: B256,
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub logs: Vec<alloy::primitives::Log>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSnapshot {
    pub number: u64,
    pub timestamp: u64,
    pub transactions: Vec<TxSnapshot>,
}

/// A live connection to one endpoint of one chain.
///
/// Dropping a stream returned by a `subscribe_*` call unsubscribes it.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    fn endpoint(&self) -> &str;

    /// Current head height. Doubles as the liveness probe.
    async fn block_number(&self) -> Result<u64, MonitorError>;

    async fn transaction(&self, hash: B256) -> Result<TxSnapshot, MonitorError>;

    async fn receipt(&self, hash: B256) -> Result<ReceiptSnapshot, MonitorError>;

    /// Block with full transaction bodies.
    async fn block(&self, number: u64) -> Result<BlockSnapshot, MonitorError>;

    async fn subscribe_logs(&self, address: Address) -> Result<LogStream, MonitorError>;

    async fn subscribe_blocks(&self) -> Result<BlockStream, MonitorError>;
}

/// Builds a [`ChainClient`] for one endpoint URL.
#[async_trait]
pub trait ClientConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        chain: &ChainConfig,
        url: &str,
    ) -> Result<Arc<dyn ChainClient>, MonitorError>;
}
