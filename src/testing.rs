//! In-memory doubles for the chain node and the durable store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, Log, LogData, B256, U256};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;

use crate::config::{ChainConfig, NativeCurrency};
use crate::db::{InsertOutcome, TransactionStore};
use crate::error::MonitorError;
use crate::indexer::types::{ContractStatus, PersistedTransaction, WatchedContract};
use crate::rpc::{
    BlockSnapshot, BlockStream, ChainClient, ClientConnector, LogStream, ReceiptSnapshot,
    TxSnapshot,
};

pub fn chain_config(key: &str, urls: &[&str]) -> ChainConfig {
    ChainConfig {
        key: key.to_string(),
        id: 31337,
        name: format!("{} devnet", key),
        rpc_urls: urls.iter().map(|u| u.to_string()).collect(),
        native_currency: NativeCurrency::default(),
        is_testnet: true,
    }
}

pub fn tx_snapshot(hash: B256, from: Address, to: Option<Address>) -> TxSnapshot {
    TxSnapshot {
        hash,
        from,
        to,
        input: Bytes::new(),
        value: U256::ZERO,
        gas_price: Some(1_000_000_000),
        block_number: Some(100),
    }
}

/// A node log as delivered by a subscription.
pub fn rpc_log(
    address: Address,
    tx_hash: Option<B256>,
    block_number: u64,
) -> alloy::rpc::types::Log {
    alloy::rpc::types::Log {
        inner: Log {
            address,
            data: LogData::default(),
        },
        block_number: Some(block_number),
        transaction_hash: tx_hash,
        ..Default::default()
    }
}

pub fn watched(owner: &str, chain: &str, address: Address) -> WatchedContract {
    WatchedContract {
        owner: owner.to_string(),
        address,
        chain: chain.to_string(),
        status: ContractStatus::Active,
    }
}

// ============================================================
// Chain node
// ============================================================

pub struct MockChainClient {
    url: String,
    healthy: AtomicBool,
    head: AtomicU64,
    transactions: Mutex<HashMap<B256, TxSnapshot>>,
    receipts: Mutex<HashMap<B256, ReceiptSnapshot>>,
    blocks: Mutex<HashMap<u64, BlockSnapshot>>,
    log_subscribers: Mutex<Vec<(Address, UnboundedSender<alloy::rpc::types::Log>)>>,
    block_subscribers: Mutex<Vec<UnboundedSender<u64>>>,
}

impl MockChainClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            healthy: AtomicBool::new(true),
            head: AtomicU64::new(100),
            transactions: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            blocks: Mutex::new(HashMap::new()),
            log_subscribers: Mutex::new(Vec::new()),
            block_subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Register a transaction with a successful receipt carrying `logs`.
    pub fn insert_transaction(&self, tx: TxSnapshot, logs: Vec<Log>) {
        self.insert_receipt(ReceiptSnapshot {
            tx_hash: tx.hash,
            success: true,
            gas_used: 21_000,
            effective_gas_price: 1_000_000_000,
            logs,
        });
        self.transactions.lock().unwrap().insert(tx.hash, tx);
    }

    pub fn insert_receipt(&self, receipt: ReceiptSnapshot) {
        self.receipts.lock().unwrap().insert(receipt.tx_hash, receipt);
    }

    pub fn insert_block(&self, block: BlockSnapshot) {
        self.blocks.lock().unwrap().insert(block.number, block);
    }

    /// Deliver a log to every open subscription on its address. Returns the
    /// number of subscriptions that received it.
    pub fn emit_log(&self, log: alloy::rpc::types::Log) -> usize {
        let mut subscribers = self.log_subscribers.lock().unwrap();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        subscribers
            .iter()
            .filter(|(address, _)| *address == log.inner.address)
            .filter(|(_, tx)| tx.unbounded_send(log.clone()).is_ok())
            .count()
    }

    pub fn emit_block(&self, number: u64) -> usize {
        let mut subscribers = self.block_subscribers.lock().unwrap();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers
            .iter()
            .filter(|tx| tx.unbounded_send(number).is_ok())
            .count()
    }

    /// Subscriptions whose receiving side is still alive.
    pub fn active_subscriptions(&self) -> usize {
        let logs = self
            .log_subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count();
        let blocks = self
            .block_subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count();
        logs + blocks
    }

    /// End every open stream, as a node dropping its subscriptions would.
    pub fn close_subscriptions(&self) {
        self.log_subscribers.lock().unwrap().clear();
        self.block_subscribers.lock().unwrap().clear();
    }

    fn check(&self) -> Result<(), MonitorError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MonitorError::rpc(&self.url, "connection refused"))
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn block_number(&self) -> Result<u64, MonitorError> {
        self.check()?;
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn transaction(&self, hash: B256) -> Result<TxSnapshot, MonitorError> {
        self.check()?;
        self.transactions
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .ok_or_else(|| MonitorError::not_found("transaction", hash))
    }

    async fn receipt(&self, hash: B256) -> Result<ReceiptSnapshot, MonitorError> {
        self.check()?;
        self.receipts
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .ok_or_else(|| MonitorError::not_found("receipt", hash))
    }

    async fn block(&self, number: u64) -> Result<BlockSnapshot, MonitorError> {
        self.check()?;
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| MonitorError::not_found("block", number))
    }

    async fn subscribe_logs(&self, address: Address) -> Result<LogStream, MonitorError> {
        self.check()?;
        let (tx, rx) = unbounded();
        self.log_subscribers.lock().unwrap().push((address, tx));
        Ok(rx.boxed())
    }

    async fn subscribe_blocks(&self) -> Result<BlockStream, MonitorError> {
        self.check()?;
        let (tx, rx) = unbounded();
        self.block_subscribers.lock().unwrap().push(tx);
        Ok(rx.boxed())
    }
}

/// Hands out pre-built clients by URL and counts connection attempts.
pub struct MockConnector {
    clients: Vec<Arc<MockChainClient>>,
    attempts: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl MockConnector {
    pub fn new(clients: Vec<Arc<MockChainClient>>) -> Self {
        Self {
            clients,
            attempts: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
        }
    }

    /// Every `connect` sleeps this long first, like a slow handshake.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn connects(&self, url: &str) -> usize {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_connects(&self) -> usize {
        self.attempts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ClientConnector for MockConnector {
    async fn connect(
        &self,
        _chain: &ChainConfig,
        url: &str,
    ) -> Result<Arc<dyn ChainClient>, MonitorError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let client = self
            .clients
            .iter()
            .find(|c| c.url == url)
            .cloned()
            .ok_or_else(|| MonitorError::rpc(url, "unknown endpoint"))?;
        Ok(client as Arc<dyn ChainClient>)
    }
}

// ============================================================
// Store
// ============================================================

#[derive(Default)]
pub struct MemoryStore {
    contracts: Mutex<Vec<WatchedContract>>,
    transactions: Mutex<HashMap<(String, B256), PersistedTransaction>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_contract(&self, contract: WatchedContract) {
        self.contracts.lock().unwrap().push(contract);
    }

    /// Flip the status of every contract with this address.
    pub fn set_status(&self, address: Address, status: ContractStatus) {
        for contract in self.contracts.lock().unwrap().iter_mut() {
            if contract.address == address {
                contract.status = status;
            }
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.lock().unwrap().len()
    }

    pub fn stored(&self, chain: &str, tx_hash: B256) -> Option<PersistedTransaction> {
        self.transactions
            .lock()
            .unwrap()
            .get(&(chain.to_string(), tx_hash))
            .cloned()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn find_active_contracts(&self) -> Result<Vec<WatchedContract>, MonitorError> {
        Ok(self
            .contracts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.status == ContractStatus::Active)
            .cloned()
            .collect())
    }

    async fn find_transaction(
        &self,
        chain: &str,
        tx_hash: B256,
    ) -> Result<Option<PersistedTransaction>, MonitorError> {
        Ok(self.stored(chain, tx_hash))
    }

    async fn insert_transaction(
        &self,
        record: &PersistedTransaction,
    ) -> Result<InsertOutcome, MonitorError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MonitorError::Store("connection reset".into()));
        }
        let mut transactions = self.transactions.lock().unwrap();
        let key = (record.chain.clone(), record.tx_hash);
        if transactions.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }
        transactions.insert(key, record.clone());
        Ok(InsertOutcome::Inserted)
    }
}
