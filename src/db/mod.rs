//! Durable store seam consumed by the monitoring core.

pub mod repository;

use alloy::primitives::B256;
use async_trait::async_trait;

use crate::error::MonitorError;
use crate::indexer::types::{PersistedTransaction, WatchedContract};

pub use repository::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The unique `(chain, tx_hash)` constraint rejected the row.
    Duplicate,
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Contracts whose status is currently `active`.
    async fn find_active_contracts(&self) -> Result<Vec<WatchedContract>, MonitorError>;

    async fn find_transaction(
        &self,
        chain: &str,
        tx_hash: B256,
    ) -> Result<Option<PersistedTransaction>, MonitorError>;

    async fn insert_transaction(
        &self,
        record: &PersistedTransaction,
    ) -> Result<InsertOutcome, MonitorError>;
}
