//! Keeps running watchers in line with the active contracts in the store.
//!
//! Each pass is a stateless set difference between the desired keys
//! (`chain:address` of every active contract) and the watcher table, so a
//! contract toggled between ticks needs no transition tracking.
//!
//! A pass holds the watcher table across network calls, so readers go
//! through a published view that is replaced when the pass ends.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::subscription::{Watcher, WatcherStatus};
use crate::chains::ChainRegistry;
use crate::config::SubscriptionMode;
use crate::db::TransactionStore;
use crate::error::MonitorError;
use crate::indexer::types::{to_hex, WatchedContract};
use crate::indexer::EventNormalizer;
use crate::rpc::RpcClientManager;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub started: usize,
    pub stopped: usize,
    /// Watchers whose stream had ended and were torn down for re-creation.
    pub restarted: usize,
    /// Desired contracts with an unsupported or unreachable chain.
    pub skipped: usize,
    /// Desired contracts whose subscription could not be opened.
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatcherSnapshot {
    pub key: String,
    pub chain: String,
    pub address: String,
    pub owner: String,
    pub last_active_at: DateTime<Utc>,
    pub closed: bool,
}

pub struct WatcherReconciler {
    store: Arc<dyn TransactionStore>,
    registry: Arc<ChainRegistry>,
    clients: Arc<RpcClientManager>,
    normalizer: Arc<EventNormalizer>,
    mode: SubscriptionMode,
    watchers: Mutex<HashMap<String, Watcher>>,
    /// Sorted by key; statuses stay live between passes.
    view: RwLock<Vec<(String, WatcherStatus)>>,
    shutdown: CancellationToken,
}

enum StartResult {
    Started(String, Watcher),
    Skipped,
    Failed,
}

impl WatcherReconciler {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        registry: Arc<ChainRegistry>,
        clients: Arc<RpcClientManager>,
        normalizer: Arc<EventNormalizer>,
        mode: SubscriptionMode,
    ) -> Self {
        Self {
            store,
            registry,
            clients,
            normalizer,
            mode,
            watchers: Mutex::new(HashMap::new()),
            view: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Run one reconciliation pass. Returns `None` without doing anything
    /// if another pass holds the watcher table.
    pub async fn reconcile(&self) -> Result<Option<ReconcileReport>, MonitorError> {
        let Ok(mut watchers) = self.watchers.try_lock() else {
            tracing::debug!("Reconciliation already in progress, skipping");
            return Ok(None);
        };
        let mut report = ReconcileReport::default();
        if self.shutdown.is_cancelled() {
            return Ok(Some(report));
        }

        let mut desired: HashMap<String, WatchedContract> = HashMap::new();
        for contract in self.store.find_active_contracts().await? {
            desired.entry(contract.key()).or_insert(contract);
        }

        // Ended streams: tear down and drop the chain's client so the
        // replacement subscribes on a fresh connection.
        let closed: Vec<String> = watchers
            .iter()
            .filter(|(_, w)| w.is_closed())
            .map(|(key, _)| key.clone())
            .collect();
        let mut invalidated = HashSet::new();
        for key in closed {
            if let Some(watcher) = watchers.remove(&key) {
                let chain = watcher.contract().chain.clone();
                watcher.stop().await;
                if invalidated.insert(chain.clone()) {
                    self.invalidate(&chain).await;
                }
                if desired.contains_key(&key) {
                    report.restarted += 1;
                } else {
                    report.stopped += 1;
                }
            }
        }

        let stale: Vec<String> = watchers
            .keys()
            .filter(|key| !desired.contains_key(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(watcher) = watchers.remove(&key) {
                watcher.stop().await;
                report.stopped += 1;
            }
        }

        let missing: Vec<WatchedContract> = desired
            .into_iter()
            .filter(|(key, _)| !watchers.contains_key(key))
            .map(|(_, contract)| contract)
            .collect();

        let starts = missing.into_iter().map(|contract| self.start_watcher(contract));
        for result in futures::future::join_all(starts).await {
            match result {
                StartResult::Started(key, watcher) => {
                    watchers.insert(key, watcher);
                    report.started += 1;
                }
                StartResult::Skipped => report.skipped += 1,
                StartResult::Failed => report.failed += 1,
            }
        }
        self.publish(&watchers).await;

        tracing::info!(
            watchers = watchers.len(),
            started = report.started,
            stopped = report.stopped,
            restarted = report.restarted,
            skipped = report.skipped,
            failed = report.failed,
            "Reconciliation complete"
        );

        Ok(Some(report))
    }

    async fn start_watcher(&self, contract: WatchedContract) -> StartResult {
        let key = contract.key();

        if self.registry.get(&contract.chain).is_none() {
            tracing::warn!(chain = %contract.chain, contract = %contract.address, "Unsupported chain, skipping contract");
            return StartResult::Skipped;
        }

        let client = match self.clients.acquire(&contract.chain).await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(chain = %contract.chain, contract = %contract.address, error = %e, "No RPC client, skipping contract");
                return StartResult::Skipped;
            }
        };

        let chain = contract.chain.clone();
        match Watcher::start(
            contract,
            client,
            self.normalizer.clone(),
            self.mode,
            self.shutdown.child_token(),
        )
        .await
        {
            Ok(watcher) => StartResult::Started(key, watcher),
            Err(e) => {
                tracing::warn!(chain = %chain, key = %key, error = %e, "Failed to open subscription");
                if e.is_connection_failure() {
                    self.invalidate(&chain).await;
                }
                StartResult::Failed
            }
        }
    }

    async fn invalidate(&self, chain: &str) {
        if let Err(e) = self.clients.invalidate(chain).await {
            tracing::warn!(chain = %chain, error = %e, "Failed to invalidate client");
        }
    }

    async fn publish(&self, watchers: &HashMap<String, Watcher>) {
        let mut view: Vec<(String, WatcherStatus)> = watchers
            .iter()
            .map(|(key, watcher)| (key.clone(), watcher.status().clone()))
            .collect();
        view.sort_by(|a, b| a.0.cmp(&b.0));
        *self.view.write().await = view;
    }

    /// Watchers as of the last finished pass. Does not wait for a running one.
    pub async fn snapshot(&self) -> Vec<WatcherSnapshot> {
        self.view
            .read()
            .await
            .iter()
            .map(|(key, status)| {
                let contract = status.contract();
                WatcherSnapshot {
                    key: key.clone(),
                    chain: contract.chain.clone(),
                    address: to_hex(contract.address.as_slice()),
                    owner: contract.owner.clone(),
                    last_active_at: status.last_active_at(),
                    closed: status.is_closed(),
                }
            })
            .collect()
    }

    pub async fn watcher_count(&self) -> usize {
        self.view.read().await.len()
    }

    /// Cancel every watcher. Later passes start nothing new.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut watchers = self.watchers.lock().await;
        let count = watchers.len();
        for (_, watcher) in watchers.drain() {
            watcher.stop().await;
        }
        self.publish(&watchers).await;
        tracing::info!(count, "All watchers stopped");
    }
}

/// Drive `reconcile` on a fixed period until `shutdown` fires. The first
/// pass runs immediately.
pub async fn run_reconciler(
    reconciler: Arc<WatcherReconciler>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = reconciler.reconcile().await {
            tracing::error!(error = %e, "Reconciliation failed");
        }
    }

    reconciler.shutdown().await;
}
