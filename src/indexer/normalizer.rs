//! Streaming write path: raw logs and blocks in, at most one stored row per
//! `(chain, tx_hash)` out.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::classifier::TransactionClassifier;
use super::types::{NormalizedTransaction, PersistedTransaction, WatchedContract};
use crate::chains::ChainRegistry;
use crate::db::{InsertOutcome, TransactionStore};
use crate::rpc::BlockSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    /// Already stored, by an earlier delivery or a concurrent writer.
    Duplicate,
    /// The chain is not registered.
    Skipped,
    /// The store rejected the read or the write. Already logged.
    Failed,
}

pub struct EventNormalizer {
    store: Arc<dyn TransactionStore>,
    registry: Arc<ChainRegistry>,
    classifier: Option<Arc<TransactionClassifier>>,
    default_label: String,
}

impl EventNormalizer {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        registry: Arc<ChainRegistry>,
        default_label: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            classifier: None,
            default_label: default_label.into(),
        }
    }

    /// Classify every new transaction before it is stored.
    pub fn with_classifier(mut self, classifier: Arc<TransactionClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    fn is_testnet(&self, chain: &str) -> bool {
        self.registry.get(chain).map(|c| c.is_testnet).unwrap_or(false)
    }

    /// Shape a subscription log. Pending logs (no transaction hash or block
    /// yet) and reorg retractions are dropped.
    pub fn normalize_log(
        &self,
        contract: &WatchedContract,
        log: &alloy::rpc::types::Log,
    ) -> Option<NormalizedTransaction> {
        if log.removed {
            return None;
        }
        let tx_hash = log.transaction_hash?;
        let block_number = log.block_number?;

        let timestamp = log
            .block_timestamp
            .and_then(|ts| DateTime::from_timestamp(ts as i64, 0))
            .unwrap_or_else(Utc::now);

        Some(NormalizedTransaction {
            tx_hash,
            chain: contract.chain.clone(),
            contract_address: contract.address,
            block_number,
            timestamp,
            is_testnet: self.is_testnet(&contract.chain),
            owner: Some(contract.owner.clone()),
        })
    }

    /// Transactions in a block sent from or to the watched contract.
    pub fn normalize_block(
        &self,
        contract: &WatchedContract,
        block: &BlockSnapshot,
    ) -> Vec<NormalizedTransaction> {
        let timestamp = DateTime::from_timestamp(block.timestamp as i64, 0).unwrap_or_else(Utc::now);
        let is_testnet = self.is_testnet(&contract.chain);

        block
            .transactions
            .iter()
            .filter(|tx| tx.from == contract.address || tx.to == Some(contract.address))
            .map(|tx| NormalizedTransaction {
                tx_hash: tx.hash,
                chain: contract.chain.clone(),
                contract_address: contract.address,
                block_number: block.number,
                timestamp,
                is_testnet,
                owner: Some(contract.owner.clone()),
            })
            .collect()
    }

    /// Persist a candidate unless its `(chain, tx_hash)` is already stored.
    ///
    /// Never fails: subscription delivery must survive store outages, so
    /// every error is logged and reported as [`SaveOutcome::Failed`].
    pub async fn save(&self, candidate: NormalizedTransaction) -> SaveOutcome {
        let Some(chain) = self.registry.get(&candidate.chain) else {
            tracing::warn!(chain = %candidate.chain, tx_hash = %candidate.tx_hash, "Dropping transaction for unsupported chain");
            return SaveOutcome::Skipped;
        };

        match self
            .store
            .find_transaction(&candidate.chain, candidate.tx_hash)
            .await
        {
            Ok(Some(_)) => return SaveOutcome::Duplicate,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(chain = %candidate.chain, tx_hash = %candidate.tx_hash, error = %e, "Transaction lookup failed");
                return SaveOutcome::Failed;
            }
        }

        let (base_type, sub_type) = match &self.classifier {
            Some(classifier) => match classifier.classify(candidate.tx_hash, &candidate.chain).await {
                Ok(result) => (Some(result.base_type), result.sub_type),
                Err(e) => {
                    tracing::warn!(chain = %candidate.chain, tx_hash = %candidate.tx_hash, error = %e, "Classification failed, storing unclassified");
                    (None, None)
                }
            },
            None => (None, None),
        };

        let record = PersistedTransaction {
            tx_hash: candidate.tx_hash,
            chain: candidate.chain,
            contract_address: candidate.contract_address,
            block_number: candidate.block_number,
            timestamp: candidate.timestamp,
            is_testnet: chain.is_testnet,
            owner: candidate.owner,
            label: self.default_label.clone(),
            base_type,
            sub_type,
        };

        match self.store.insert_transaction(&record).await {
            Ok(InsertOutcome::Inserted) => {
                tracing::info!(
                    chain = %record.chain,
                    tx_hash = %record.tx_hash,
                    contract = %record.contract_address,
                    block = record.block_number,
                    "Stored transaction"
                );
                SaveOutcome::Inserted
            }
            Ok(InsertOutcome::Duplicate) => {
                tracing::debug!(chain = %record.chain, tx_hash = %record.tx_hash, "Concurrent duplicate ignored");
                SaveOutcome::Duplicate
            }
            Err(e) => {
                tracing::error!(chain = %record.chain, tx_hash = %record.tx_hash, error = %e, "Failed to store transaction");
                SaveOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpcConfig;
    use crate::indexer::decoder::fixtures;
    use crate::indexer::types::{BaseType, SubType};
    use crate::rpc::RpcClientManager;
    use crate::testing::{
        chain_config, rpc_log, tx_snapshot, watched, MemoryStore, MockChainClient, MockConnector,
    };
    use alloy::primitives::{Address, B256};

    const CONTRACT: Address = Address::repeat_byte(0xcc);

    fn registry() -> Arc<ChainRegistry> {
        Arc::new(ChainRegistry::new(vec![chain_config("anvil", &["http://a"])]))
    }

    fn setup() -> (EventNormalizer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (EventNormalizer::new(store.clone(), registry(), "Unknown"), store)
    }

    fn candidate(hash: u8) -> NormalizedTransaction {
        NormalizedTransaction {
            tx_hash: B256::repeat_byte(hash),
            chain: "anvil".into(),
            contract_address: CONTRACT,
            block_number: 10,
            timestamp: Utc::now(),
            is_testnet: true,
            owner: Some("user-1".into()),
        }
    }

    #[test]
    fn normalizes_logs_and_drops_pending() {
        let (normalizer, _) = setup();
        let contract = watched("user-1", "anvil", CONTRACT);

        let mut log = rpc_log(CONTRACT, Some(B256::repeat_byte(1)), 42);
        log.block_timestamp = Some(1_700_000_000);
        let tx = normalizer.normalize_log(&contract, &log).unwrap();
        assert_eq!(tx.tx_hash, B256::repeat_byte(1));
        assert_eq!(tx.block_number, 42);
        assert_eq!(tx.timestamp.timestamp(), 1_700_000_000);
        assert!(tx.is_testnet);
        assert_eq!(tx.owner.as_deref(), Some("user-1"));

        assert!(normalizer
            .normalize_log(&contract, &rpc_log(CONTRACT, None, 42))
            .is_none());

        log.removed = true;
        assert!(normalizer.normalize_log(&contract, &log).is_none());
    }

    #[test]
    fn block_scan_matches_sender_or_recipient() {
        let (normalizer, _) = setup();
        let contract = watched("user-1", "anvil", CONTRACT);
        let other = Address::repeat_byte(0x01);
        let block = BlockSnapshot {
            number: 7,
            timestamp: 1_700_000_000,
            transactions: vec![
                tx_snapshot(B256::repeat_byte(1), other, Some(CONTRACT)),
                tx_snapshot(B256::repeat_byte(2), other, Some(other)),
                tx_snapshot(B256::repeat_byte(3), CONTRACT, None),
            ],
        };

        let matched = normalizer.normalize_block(&contract, &block);
        let hashes: Vec<_> = matched.iter().map(|t| t.tx_hash).collect();
        assert_eq!(hashes, vec![B256::repeat_byte(1), B256::repeat_byte(3)]);
        assert!(matched.iter().all(|t| t.block_number == 7));
    }

    #[tokio::test]
    async fn repeated_delivery_stores_once() {
        let (normalizer, store) = setup();
        assert_eq!(normalizer.save(candidate(1)).await, SaveOutcome::Inserted);
        assert_eq!(normalizer.save(candidate(1)).await, SaveOutcome::Duplicate);
        assert_eq!(store.transaction_count(), 1);

        let stored = store.stored("anvil", B256::repeat_byte(1)).unwrap();
        assert_eq!(stored.label, "Unknown");
        assert!(stored.is_testnet);
        assert_eq!(stored.base_type, None);
    }

    #[tokio::test]
    async fn concurrent_duplicates_collapse() {
        let (normalizer, store) = setup();
        let normalizer = Arc::new(normalizer);

        let saves = (0..8).map(|_| {
            let normalizer = normalizer.clone();
            tokio::spawn(async move { normalizer.save(candidate(5)).await })
        });
        let outcomes: Vec<_> = futures::future::join_all(saves)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(
            outcomes.iter().filter(|o| **o == SaveOutcome::Inserted).count(),
            1
        );
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, SaveOutcome::Inserted | SaveOutcome::Duplicate)));
        assert_eq!(store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn failures_are_absorbed() {
        let (normalizer, store) = setup();
        store.set_fail_writes(true);
        assert_eq!(normalizer.save(candidate(1)).await, SaveOutcome::Failed);

        let mut foreign = candidate(2);
        foreign.chain = "nope".into();
        assert_eq!(normalizer.save(foreign).await, SaveOutcome::Skipped);
        assert_eq!(store.transaction_count(), 0);
    }

    #[tokio::test]
    async fn classifies_on_ingest() {
        let client = Arc::new(MockChainClient::new("http://a"));
        let from = Address::repeat_byte(0xa1);
        client.insert_transaction(
            tx_snapshot(B256::repeat_byte(1), from, Some(CONTRACT)),
            vec![fixtures::erc20_transfer(CONTRACT, from, Address::repeat_byte(0xb0), 500)],
        );
        let registry = registry();
        let manager = Arc::new(RpcClientManager::new(
            &registry,
            Arc::new(MockConnector::new(vec![client])),
            &RpcConfig::default(),
        ));
        let store = Arc::new(MemoryStore::new());
        let normalizer = EventNormalizer::new(store.clone(), registry, "Unknown")
            .with_classifier(Arc::new(TransactionClassifier::new(manager)));

        assert_eq!(normalizer.save(candidate(1)).await, SaveOutcome::Inserted);
        let stored = store.stored("anvil", B256::repeat_byte(1)).unwrap();
        assert_eq!(stored.base_type, Some(BaseType::Transfer));
        assert_eq!(stored.sub_type, Some(SubType::Erc20Transfer));

        // not on the node: stored without classification
        assert_eq!(normalizer.save(candidate(2)).await, SaveOutcome::Inserted);
        assert_eq!(store.stored("anvil", B256::repeat_byte(2)).unwrap().base_type, None);
    }
}
