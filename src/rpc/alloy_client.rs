use std::collections::VecDeque;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::Transaction as ConsensusTx;
use alloy::network::TransactionResponse;
use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log, Transaction};
use async_trait::async_trait;
use futures::StreamExt;

use super::client::{
    BlockSnapshot, BlockStream, ChainClient, ClientConnector, LogStream, ReceiptSnapshot,
    TxSnapshot,
};
use super::retry::{retry_rpc, RetryPolicy};
use crate::config::{ChainConfig, RpcConfig};
use crate::error::MonitorError;

/// Upper bound on the block span of one polled `eth_getLogs` call.
const MAX_POLL_RANGE: u64 = 1000;

/// Connects to endpoints with alloy: WebSocket pub/sub for `ws(s)://`,
/// HTTP with polling subscriptions otherwise.
pub struct AlloyConnector {
    settings: RpcConfig,
}

impl AlloyConnector {
    pub fn new(settings: RpcConfig) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ClientConnector for AlloyConnector {
    async fn connect(
        &self,
        chain: &ChainConfig,
        url: &str,
    ) -> Result<Arc<dyn ChainClient>, MonitorError> {
        let pubsub = url.starts_with("ws://") || url.starts_with("wss://");

        let provider = if pubsub {
            let ws = WsConnect::new(url);
            let connect = ProviderBuilder::new().connect_ws(ws);
            match tokio::time::timeout(self.settings.request_timeout(), connect).await {
                Ok(Ok(provider)) => provider.erased(),
                Ok(Err(e)) => return Err(MonitorError::rpc(url, e)),
                Err(_) => {
                    return Err(MonitorError::Timeout {
                        endpoint: url.to_string(),
                        ms: self.settings.request_timeout_ms,
                    })
                }
            }
        } else {
            ProviderBuilder::new()
                .connect_http(url.parse().map_err(|e| {
                    MonitorError::InvalidInput(format!("Invalid RPC URL '{}': {}", url, e))
                })?)
                .erased()
        };

        tracing::debug!(chain = %chain.key, endpoint = %url, pubsub, "Built RPC client");

        Ok(Arc::new(AlloyChainClient {
            rpc: Endpoint {
                provider,
                url: url.to_string(),
                request_timeout: self.settings.request_timeout(),
            },
            pubsub,
            poll_interval: self.settings.poll_interval(),
            retry: RetryPolicy {
                max_retries: self.settings.max_retries,
                ..RetryPolicy::default()
            },
        }))
    }
}

/// A provider plus the per-call timeout applied to every request.
#[derive(Clone)]
struct Endpoint {
    provider: DynProvider,
    url: String,
    request_timeout: Duration,
}

impl Endpoint {
    async fn timed<F, T, E>(&self, call: F) -> Result<T, MonitorError>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.request_timeout, call.into_future()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(MonitorError::rpc(&self.url, e)),
            Err(_) => Err(MonitorError::Timeout {
                endpoint: self.url.clone(),
                ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    async fn head(&self) -> Result<u64, MonitorError> {
        self.timed(self.provider.get_block_number()).await
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, MonitorError> {
        self.timed(self.provider.get_logs(filter)).await
    }
}

pub struct AlloyChainClient {
    rpc: Endpoint,
    pubsub: bool,
    poll_interval: Duration,
    retry: RetryPolicy,
}

fn tx_snapshot(tx: &Transaction) -> TxSnapshot {
    TxSnapshot {
        hash: TransactionResponse::tx_hash(tx),
        from: TransactionResponse::from(tx),
        to: ConsensusTx::to(tx),
        input: ConsensusTx::input(tx).clone(),
        value: ConsensusTx::value(tx),
        gas_price: ConsensusTx::gas_price(tx),
        block_number: tx.block_number,
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    fn endpoint(&self) -> &str {
        &self.rpc.url
    }

    async fn block_number(&self) -> Result<u64, MonitorError> {
        self.rpc.head().await
    }

    async fn transaction(&self, hash: B256) -> Result<TxSnapshot, MonitorError> {
        let tx = self
            .rpc
            .timed(self.rpc.provider.get_transaction_by_hash(hash))
            .await?
            .ok_or_else(|| MonitorError::not_found("transaction", hash))?;
        Ok(tx_snapshot(&tx))
    }

    async fn receipt(&self, hash: B256) -> Result<ReceiptSnapshot, MonitorError> {
        let receipt = self
            .rpc
            .timed(self.rpc.provider.get_transaction_receipt(hash))
            .await?
            .ok_or_else(|| MonitorError::not_found("receipt", hash))?;

        Ok(ReceiptSnapshot {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            logs: receipt
                .inner
                .logs()
                .iter()
                .map(|log| log.inner.clone())
                .collect(),
        })
    }

    async fn block(&self, number: u64) -> Result<BlockSnapshot, MonitorError> {
        let block = self
            .rpc
            .timed(
                self.rpc
                    .provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .full(),
            )
            .await?
            .ok_or_else(|| MonitorError::not_found("block", number))?;

        Ok(BlockSnapshot {
            number: block.header.number,
            timestamp: block.header.timestamp,
            transactions: block.transactions.txns().map(tx_snapshot).collect(),
        })
    }

    async fn subscribe_logs(&self, address: Address) -> Result<LogStream, MonitorError> {
        let filter = Filter::new().address(address);

        if self.pubsub {
            let sub = self
                .rpc
                .timed(self.rpc.provider.subscribe_logs(&filter))
                .await?;
            return Ok(sub.into_stream().boxed());
        }

        let start = self.rpc.head().await? + 1;
        Ok(poll_logs(
            self.rpc.clone(),
            filter,
            start,
            self.poll_interval,
            self.retry,
        ))
    }

    async fn subscribe_blocks(&self) -> Result<BlockStream, MonitorError> {
        if self.pubsub {
            let sub = self.rpc.timed(self.rpc.provider.subscribe_blocks()).await?;
            return Ok(sub.into_stream().map(|header| header.number).boxed());
        }

        let start = self.rpc.head().await? + 1;
        Ok(poll_blocks(self.rpc.clone(), start, self.poll_interval, self.retry))
    }
}

/// The next inclusive block range to fetch, capped at [`MAX_POLL_RANGE`].
fn poll_range(next: u64, head: u64) -> Option<(u64, u64)> {
    if head < next {
        return None;
    }
    Some((next, std::cmp::min(head, next + MAX_POLL_RANGE - 1)))
}

/// HTTP log subscription: poll the head and fetch logs for each new range.
/// The stream ends once a poll exhausts its retries.
fn poll_logs(
    rpc: Endpoint,
    filter: Filter,
    start: u64,
    poll_interval: Duration,
    retry: RetryPolicy,
) -> LogStream {
    let state = (rpc, filter, start, VecDeque::<Log>::new());

    futures::stream::unfold(state, move |(rpc, filter, mut next, mut pending)| async move {
        loop {
            if let Some(log) = pending.pop_front() {
                return Some((log, (rpc, filter, next, pending)));
            }

            tokio::time::sleep(poll_interval).await;

            let head = match retry_rpc(retry, || rpc.head()).await {
                Ok(head) => head,
                Err(e) => {
                    tracing::warn!(endpoint = %rpc.url, error = %e, "Log polling stopped");
                    return None;
                }
            };
            let Some((from, to)) = poll_range(next, head) else {
                continue;
            };
            let range = filter.clone().from_block(from).to_block(to);
            match retry_rpc(retry, || rpc.logs(&range)).await {
                Ok(logs) => pending.extend(logs),
                Err(e) => {
                    tracing::warn!(endpoint = %rpc.url, error = %e, "Log polling stopped");
                    return None;
                }
            }
            next = to + 1;
        }
    })
    .boxed()
}

/// HTTP block subscription: emit every block number between polls.
fn poll_blocks(
    rpc: Endpoint,
    start: u64,
    poll_interval: Duration,
    retry: RetryPolicy,
) -> BlockStream {
    let state = (rpc, start, VecDeque::<u64>::new());

    futures::stream::unfold(state, move |(rpc, mut next, mut pending)| async move {
        loop {
            if let Some(number) = pending.pop_front() {
                return Some((number, (rpc, next, pending)));
            }

            tokio::time::sleep(poll_interval).await;

            let head = match retry_rpc(retry, || rpc.head()).await {
                Ok(head) => head,
                Err(e) => {
                    tracing::warn!(endpoint = %rpc.url, error = %e, "Block polling stopped");
                    return None;
                }
            };
            if head >= next {
                pending.extend(next..=head);
                next = head + 1;
            }
        }
    })
    .boxed()
}
