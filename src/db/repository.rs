use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;

use super::{InsertOutcome, TransactionStore};
use crate::error::MonitorError;
use crate::indexer::types::{ContractStatus, PersistedTransaction, WatchedContract};

type TransactionRow = (
    String,
    Vec<u8>,
    Vec<u8>,
    i64,
    DateTime<Utc>,
    bool,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
);

/// PostgreSQL-backed store. Deduplication is enforced by the
/// `UNIQUE (chain, tx_hash)` constraint.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_address(bytes: &[u8]) -> Result<Address, MonitorError> {
    Address::try_from(bytes)
        .map_err(|_| MonitorError::Store(format!("stored address has {} bytes", bytes.len())))
}

fn parse_hash(bytes: &[u8]) -> Result<B256, MonitorError> {
    B256::try_from(bytes)
        .map_err(|_| MonitorError::Store(format!("stored hash has {} bytes", bytes.len())))
}

fn transaction_from_row(row: TransactionRow) -> Result<PersistedTransaction, MonitorError> {
    let (chain, tx_hash, contract, block_number, timestamp, is_testnet, owner, label, base, sub) =
        row;

    Ok(PersistedTransaction {
        tx_hash: parse_hash(&tx_hash)?,
        chain,
        contract_address: parse_address(&contract)?,
        block_number: block_number as u64,
        timestamp,
        is_testnet,
        owner,
        label,
        base_type: base.as_deref().map(str::parse).transpose().map_err(MonitorError::Store)?,
        sub_type: sub.as_deref().map(str::parse).transpose().map_err(MonitorError::Store)?,
    })
}

#[async_trait]
impl TransactionStore for PgStore {
    async fn find_active_contracts(&self) -> Result<Vec<WatchedContract>, MonitorError> {
        let rows: Vec<(String, Vec<u8>, String, String)> = sqlx::query_as(
            "SELECT owner_id, address, chain, status FROM watched_contracts WHERE status = 'active'",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut contracts = Vec::with_capacity(rows.len());
        for (owner, address, chain, status) in rows {
            let address = match parse_address(&address) {
                Ok(address) => address,
                Err(e) => {
                    tracing::warn!(chain = %chain, owner = %owner, error = %e, "Skipping malformed contract row");
                    continue;
                }
            };
            contracts.push(WatchedContract {
                owner,
                address,
                chain,
                status: ContractStatus::from_str(&status).map_err(MonitorError::Store)?,
            });
        }

        Ok(contracts)
    }

    async fn find_transaction(
        &self,
        chain: &str,
        tx_hash: B256,
    ) -> Result<Option<PersistedTransaction>, MonitorError> {
        let row: Option<TransactionRow> = sqlx::query_as(
            "SELECT chain, tx_hash, contract_address, block_number, block_timestamp, is_testnet,
                    owner_id, label, base_type, sub_type
             FROM transactions WHERE chain = $1 AND tx_hash = $2",
        )
        .bind(chain)
        .bind(tx_hash.as_slice())
        .fetch_optional(&self.pool)
        .await?;

        row.map(transaction_from_row).transpose()
    }

    /// Insert with `ON CONFLICT DO NOTHING`; zero affected rows means a
    /// concurrent writer got there first.
    async fn insert_transaction(
        &self,
        record: &PersistedTransaction,
    ) -> Result<InsertOutcome, MonitorError> {
        let result = sqlx::query(
            "INSERT INTO transactions (chain, tx_hash, contract_address, block_number,
                 block_timestamp, is_testnet, owner_id, label, base_type, sub_type)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (chain, tx_hash) DO NOTHING",
        )
        .bind(&record.chain)
        .bind(record.tx_hash.as_slice())
        .bind(record.contract_address.as_slice())
        .bind(record.block_number as i64)
        .bind(record.timestamp)
        .bind(record.is_testnet)
        .bind(&record.owner)
        .bind(&record.label)
        .bind(record.base_type.map(|t| t.as_str()))
        .bind(record.sub_type.map(|t| t.as_str()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }
}
