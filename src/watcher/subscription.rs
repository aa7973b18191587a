use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SubscriptionMode;
use crate::error::MonitorError;
use crate::indexer::types::WatchedContract;
use crate::indexer::EventNormalizer;
use crate::rpc::{BlockStream, ChainClient, LogStream};

/// One live subscription bound to a `(chain, contract)` pair.
pub struct Watcher {
    status: WatcherStatus,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Liveness of a watcher, readable without owning it.
#[derive(Clone)]
pub struct WatcherStatus {
    contract: WatchedContract,
    last_active: Arc<AtomicI64>,
    closed: Arc<AtomicBool>,
}

impl WatcherStatus {
    pub fn contract(&self) -> &WatchedContract {
        &self.contract
    }

    pub fn last_active_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_active.load(Ordering::Relaxed))
            .unwrap_or_default()
    }

    /// The node ended the stream; the watcher delivers nothing more.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// State shared between a [`Watcher`] and its delivery task.
#[derive(Clone)]
struct Delivery {
    contract: WatchedContract,
    normalizer: Arc<EventNormalizer>,
    last_active: Arc<AtomicI64>,
    closed: Arc<AtomicBool>,
    token: CancellationToken,
}

impl Watcher {
    /// Open the subscription and spawn its delivery task. Nothing is spawned
    /// if the node refuses the subscription.
    pub async fn start(
        contract: WatchedContract,
        client: Arc<dyn ChainClient>,
        normalizer: Arc<EventNormalizer>,
        mode: SubscriptionMode,
        token: CancellationToken,
    ) -> Result<Self, MonitorError> {
        let delivery = Delivery {
            contract: contract.clone(),
            normalizer,
            last_active: Arc::new(AtomicI64::new(Utc::now().timestamp_millis())),
            closed: Arc::new(AtomicBool::new(false)),
            token: token.clone(),
        };

        let task = match mode {
            SubscriptionMode::Logs => {
                let stream = client.subscribe_logs(contract.address).await?;
                tokio::spawn(delivery.clone().run_logs(stream))
            }
            SubscriptionMode::Blocks => {
                let stream = client.subscribe_blocks().await?;
                tokio::spawn(delivery.clone().run_blocks(stream, client))
            }
        };

        tracing::info!(
            chain = %contract.chain,
            contract = %contract.address,
            ?mode,
            "Watcher started"
        );

        Ok(Self {
            status: WatcherStatus {
                contract,
                last_active: delivery.last_active,
                closed: delivery.closed,
            },
            token,
            task,
        })
    }

    pub fn status(&self) -> &WatcherStatus {
        &self.status
    }

    pub fn contract(&self) -> &WatchedContract {
        self.status.contract()
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    /// Cancel delivery. No item is forwarded after this returns.
    pub fn cancel(&self) {
        self.token.cancel();
        self.task.abort();
    }

    /// Cancel and wait for the task to release its stream.
    pub async fn stop(self) {
        self.cancel();
        let _ = self.task.await;
        tracing::info!(
            chain = %self.status.contract.chain,
            contract = %self.status.contract.address,
            "Watcher stopped"
        );
    }
}

impl Delivery {
    fn touch(&self) {
        self.last_active
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
        tracing::warn!(
            chain = %self.contract.chain,
            contract = %self.contract.address,
            "Subscription stream ended"
        );
    }

    async fn run_logs(self, mut stream: LogStream) {
        loop {
            let log = tokio::select! {
                _ = self.token.cancelled() => return,
                next = stream.next() => match next {
                    Some(log) => log,
                    None => break,
                },
            };

            if let Some(candidate) = self.normalizer.normalize_log(&self.contract, &log) {
                self.normalizer.save(candidate).await;
                self.touch();
            }
        }
        self.mark_closed();
    }

    async fn run_blocks(self, mut stream: BlockStream, client: Arc<dyn ChainClient>) {
        loop {
            let number = tokio::select! {
                _ = self.token.cancelled() => return,
                next = stream.next() => match next {
                    Some(number) => number,
                    None => break,
                },
            };

            let block = match client.block(number).await {
                Ok(block) => block,
                Err(e) => {
                    tracing::warn!(
                        chain = %self.contract.chain,
                        block = number,
                        error = %e,
                        "Failed to fetch block, skipping"
                    );
                    continue;
                }
            };

            for candidate in self.normalizer.normalize_block(&self.contract, &block) {
                if self.token.is_cancelled() {
                    return;
                }
                self.normalizer.save(candidate).await;
                self.touch();
            }
        }
        self.mark_closed();
    }
}
