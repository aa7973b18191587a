//! Per-chain client cache with endpoint rotation and background reconnection.
//!
//! Each chain moves through `Disconnected -> Connected` on a successful
//! rotation, or `Disconnected -> Reconnecting -> Connected` when every
//! endpoint failed and a background loop had to heal it. Only one
//! reconnection loop exists per chain; `acquire` fails fast while it runs.
//!
//! The slot lock is never held across network I/O, so state reads stay
//! prompt while a rotation is in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::client::{ChainClient, ClientConnector};
use crate::chains::ChainRegistry;
use crate::config::{ChainConfig, RpcConfig};
use crate::error::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Reconnecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

#[derive(Default)]
struct ChainSlot {
    /// Index of the endpoint the next rotation starts from.
    cursor: usize,
    client: Option<Arc<dyn ChainClient>>,
    /// Present while a reconnection loop is running.
    reconnect: Option<CancellationToken>,
}

impl ChainSlot {
    fn state(&self) -> ConnectionState {
        if self.client.is_some() {
            ConnectionState::Connected
        } else if self.reconnect.is_some() {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        }
    }

    fn install(&mut self, index: usize, client: Arc<dyn ChainClient>) {
        self.cursor = index;
        self.client = Some(client);
        if let Some(timer) = self.reconnect.take() {
            timer.cancel();
        }
    }
}

struct ChainHandle {
    config: ChainConfig,
    slot: Mutex<ChainSlot>,
    /// Serializes foreground rotations; later callers reuse the winner.
    connecting: Mutex<()>,
}

/// Owns the one live client per chain. Clients are created lazily and
/// cached until invalidated.
pub struct RpcClientManager {
    chains: HashMap<String, Arc<ChainHandle>>,
    connector: Arc<dyn ClientConnector>,
    probe_timeout: Duration,
    reconnect_interval: Duration,
    shutdown: CancellationToken,
}

impl RpcClientManager {
    pub fn new(
        registry: &ChainRegistry,
        connector: Arc<dyn ClientConnector>,
        settings: &RpcConfig,
    ) -> Self {
        let chains = registry
            .iter()
            .map(|config| {
                (
                    config.key.clone(),
                    Arc::new(ChainHandle {
                        config: config.clone(),
                        slot: Mutex::new(ChainSlot::default()),
                        connecting: Mutex::new(()),
                    }),
                )
            })
            .collect();

        Self {
            chains,
            connector,
            probe_timeout: settings.probe_timeout(),
            reconnect_interval: settings.reconnect_interval(),
            shutdown: CancellationToken::new(),
        }
    }

    fn handle(&self, chain_key: &str) -> Result<&Arc<ChainHandle>, MonitorError> {
        self.chains
            .get(chain_key)
            .ok_or_else(|| MonitorError::UnsupportedChain(chain_key.to_string()))
    }

    /// Return the cached client for a chain, or rotate through its endpoints
    /// to build one. On total failure a background reconnection loop is
    /// scheduled and the call fails with `EndpointUnavailable`.
    pub async fn acquire(&self, chain_key: &str) -> Result<Arc<dyn ChainClient>, MonitorError> {
        let handle = self.handle(chain_key)?;
        let unavailable = || MonitorError::EndpointUnavailable {
            chain: chain_key.to_string(),
        };

        let ready = |slot: &ChainSlot| -> Option<Result<Arc<dyn ChainClient>, MonitorError>> {
            if let Some(client) = &slot.client {
                return Some(Ok(client.clone()));
            }
            if slot.reconnect.is_some() || handle.config.rpc_urls.is_empty() {
                return Some(Err(unavailable()));
            }
            None
        };

        if let Some(result) = ready(&*handle.slot.lock().await) {
            return result;
        }

        let _connecting = handle.connecting.lock().await;
        // Another caller may have finished a rotation while we waited.
        let start = {
            let slot = handle.slot.lock().await;
            if let Some(result) = ready(&slot) {
                return result;
            }
            slot.cursor
        };

        let rotated = rotate(
            self.connector.as_ref(),
            &handle.config,
            start,
            self.probe_timeout,
        )
        .await;

        let mut slot = handle.slot.lock().await;
        match rotated {
            Some((index, client)) => {
                tracing::info!(
                    chain = %chain_key,
                    endpoint = %client.endpoint(),
                    "RPC client connected"
                );
                slot.install(index, client.clone());
                Ok(client)
            }
            None => {
                tracing::warn!(
                    chain = %chain_key,
                    endpoints = handle.config.rpc_urls.len(),
                    retry_secs = self.reconnect_interval.as_secs(),
                    "All endpoints unreachable, scheduling reconnection"
                );
                if slot.reconnect.is_none() {
                    self.spawn_reconnect(handle.clone(), &mut slot);
                }
                Err(unavailable())
            }
        }
    }

    fn spawn_reconnect(&self, handle: Arc<ChainHandle>, slot: &mut ChainSlot) {
        let timer = self.shutdown.child_token();
        slot.reconnect = Some(timer.clone());

        let connector = self.connector.clone();
        let probe_timeout = self.probe_timeout;
        let interval = self.reconnect_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = timer.cancelled() => {
                        // Left behind by `shutdown`; `install` already took
                        // the token on success.
                        let mut slot = handle.slot.lock().await;
                        if slot.reconnect.as_ref().is_some_and(|t| t.is_cancelled()) {
                            slot.reconnect = None;
                        }
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
                if reconnect_step(&handle, connector.as_ref(), probe_timeout).await {
                    return;
                }
            }
        });
    }

    /// Run one reconnection attempt immediately, returning the resulting state.
    pub async fn reconnect_now(&self, chain_key: &str) -> Result<ConnectionState, MonitorError> {
        let handle = self.handle(chain_key)?;
        reconnect_step(handle, self.connector.as_ref(), self.probe_timeout).await;
        Ok(handle.slot.lock().await.state())
    }

    /// Drop a cached client that a caller saw failing. The next `acquire`
    /// starts rotation at the following endpoint.
    pub async fn invalidate(&self, chain_key: &str) -> Result<(), MonitorError> {
        let handle = self.handle(chain_key)?;
        let mut slot = handle.slot.lock().await;
        if let Some(client) = slot.client.take() {
            let count = handle.config.rpc_urls.len().max(1);
            slot.cursor = (slot.cursor + 1) % count;
            tracing::warn!(
                chain = %chain_key,
                endpoint = %client.endpoint(),
                "Dropped cached RPC client"
            );
        }
        Ok(())
    }

    pub async fn state(&self, chain_key: &str) -> Result<ConnectionState, MonitorError> {
        Ok(self.handle(chain_key)?.slot.lock().await.state())
    }

    /// Connection state of every registered chain, sorted by key.
    pub async fn states(&self) -> Vec<(String, ConnectionState)> {
        let mut states = Vec::with_capacity(self.chains.len());
        for (key, handle) in &self.chains {
            states.push((key.clone(), handle.slot.lock().await.state()));
        }
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Stop every reconnection loop. Chains still without a client fall
    /// back to `Disconnected`.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// One pass over the endpoints starting at `start`. Each endpoint is tried
/// at most once; the first to answer the liveness probe wins.
async fn rotate(
    connector: &dyn ClientConnector,
    chain: &ChainConfig,
    start: usize,
    probe_timeout: Duration,
) -> Option<(usize, Arc<dyn ChainClient>)> {
    let count = chain.rpc_urls.len();

    for offset in 0..count {
        let index = (start + offset) % count;
        let url = &chain.rpc_urls[index];

        match tokio::time::timeout(probe_timeout, probe(connector, chain, url)).await {
            Ok(Ok((client, head))) => {
                tracing::debug!(chain = %chain.key, endpoint = %url, head, "Endpoint healthy");
                return Some((index, client));
            }
            Ok(Err(e)) => {
                tracing::warn!(chain = %chain.key, endpoint = %url, error = %e, "Endpoint failed liveness probe");
            }
            Err(_) => {
                tracing::warn!(
                    chain = %chain.key,
                    endpoint = %url,
                    timeout_ms = probe_timeout.as_millis() as u64,
                    "Endpoint liveness probe timed out"
                );
            }
        }
    }

    None
}

async fn probe(
    connector: &dyn ClientConnector,
    chain: &ChainConfig,
    url: &str,
) -> Result<(Arc<dyn ChainClient>, u64), MonitorError> {
    let client = connector.connect(chain, url).await?;
    let head = client.block_number().await?;
    Ok((client, head))
}

/// Returns `true` once the chain is connected.
async fn reconnect_step(
    handle: &ChainHandle,
    connector: &dyn ClientConnector,
    probe_timeout: Duration,
) -> bool {
    let start = {
        let slot = handle.slot.lock().await;
        if slot.client.is_some() {
            return true;
        }
        slot.cursor
    };
    if handle.config.rpc_urls.is_empty() {
        return false;
    }

    match rotate(connector, &handle.config, start, probe_timeout).await {
        Some((index, client)) => {
            tracing::info!(
                chain = %handle.config.key,
                endpoint = %client.endpoint(),
                "RPC client reconnected"
            );
            handle.slot.lock().await.install(index, client);
            true
        }
        None => {
            let mut slot = handle.slot.lock().await;
            slot.cursor = (start + 1) % handle.config.rpc_urls.len();
            tracing::debug!(chain = %handle.config.key, "Reconnection attempt failed");
            false
        }
    }
}
