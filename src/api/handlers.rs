use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::B256;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::types::*;
use super::AppState;
use crate::error::MonitorError;
use crate::indexer::types::{ClassifiedResult, EnrichedTransaction};
use crate::watcher::{ReconcileReport, WatcherSnapshot};

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
        }),
    )
}

pub(crate) fn status_for(e: &MonitorError) -> StatusCode {
    match e {
        MonitorError::UnsupportedChain(_) | MonitorError::FetchFailure { .. } => {
            StatusCode::NOT_FOUND
        }
        MonitorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        MonitorError::EndpointUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        MonitorError::Rpc { .. } | MonitorError::Timeout { .. } => StatusCode::BAD_GATEWAY,
        MonitorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn monitor_error(e: MonitorError) -> ApiError {
    api_error(status_for(&e), e.to_string())
}

fn parse_tx_hash(hex: &str) -> Result<B256, ApiError> {
    B256::from_str(hex).map_err(|e| {
        monitor_error(MonitorError::InvalidInput(format!(
            "Invalid transaction hash '{}': {}",
            hex, e
        )))
    })
}

// ============================================================
// Health & Chains
// ============================================================

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let chains: Vec<ChainHealth> = state
        .clients
        .states()
        .await
        .into_iter()
        .map(|(chain, state)| ChainHealth { chain, state })
        .collect();

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        watchers: state.reconciler.watcher_count().await,
        chains,
    }))
}

pub async fn chains(State(state): State<Arc<AppState>>) -> ApiResult<ChainsResponse> {
    let states: std::collections::HashMap<String, _> =
        state.clients.states().await.into_iter().collect();

    let chains = state
        .registry
        .keys()
        .into_iter()
        .filter_map(|key| state.registry.get(key))
        .map(|chain| ChainInfo {
            key: chain.key.clone(),
            id: chain.id,
            name: chain.name.clone(),
            native_symbol: chain.native_currency.symbol.clone(),
            is_testnet: chain.is_testnet,
            endpoints: chain.rpc_urls.len(),
            state: states
                .get(&chain.key)
                .copied()
                .unwrap_or(crate::rpc::ConnectionState::Disconnected),
        })
        .collect();

    Ok(Json(ChainsResponse { chains }))
}

// ============================================================
// Watchers
// ============================================================

pub async fn watchers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<WatcherSnapshot>> {
    Ok(Json(state.reconciler.snapshot().await))
}

pub async fn reconcile(State(state): State<Arc<AppState>>) -> ApiResult<ReconcileReport> {
    match state.reconciler.reconcile().await {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err(api_error(
            StatusCode::CONFLICT,
            "Reconciliation already in progress",
        )),
        Err(e) => Err(monitor_error(e)),
    }
}

// ============================================================
// Transactions
// ============================================================

pub async fn classify_tx(
    State(state): State<Arc<AppState>>,
    Path((chain, tx_hash)): Path<(String, String)>,
) -> ApiResult<ClassifiedResult> {
    let hash = parse_tx_hash(&tx_hash)?;
    state
        .classifier
        .classify(hash, &chain)
        .await
        .map(Json)
        .map_err(monitor_error)
}

pub async fn enrich_tx(
    State(state): State<Arc<AppState>>,
    Path((chain, tx_hash)): Path<(String, String)>,
) -> ApiResult<EnrichedTransaction> {
    let hash = parse_tx_hash(&tx_hash)?;
    state
        .orchestrator
        .enrich(hash, &chain)
        .await
        .map(Json)
        .map_err(monitor_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::ChainRegistry;
    use crate::config::{RpcConfig, SubscriptionMode};
    use crate::indexer::{EventNormalizer, TransactionClassifier};
    use crate::pipeline::EnrichmentOrchestrator;
    use crate::rpc::{ConnectionState, RpcClientManager};
    use crate::testing::{
        chain_config, tx_snapshot, watched, MemoryStore, MockChainClient, MockConnector,
    };
    use crate::watcher::WatcherReconciler;
    use alloy::primitives::{Address, U256};

    const HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    fn app() -> (Arc<AppState>, Arc<MemoryStore>) {
        let registry = Arc::new(ChainRegistry::new(vec![chain_config("anvil", &["http://a"])]));
        let client = Arc::new(MockChainClient::new("http://a"));
        client.insert_transaction(
            crate::rpc::TxSnapshot {
                value: U256::from(1u64),
                ..tx_snapshot(
                    B256::repeat_byte(0x11),
                    Address::repeat_byte(1),
                    Some(Address::repeat_byte(2)),
                )
            },
            vec![],
        );
        let clients = Arc::new(RpcClientManager::new(
            &registry,
            Arc::new(MockConnector::new(vec![client])),
            &RpcConfig::default(),
        ));
        let store = Arc::new(MemoryStore::new());
        let normalizer = Arc::new(EventNormalizer::new(store.clone(), registry.clone(), "Unknown"));
        let reconciler = Arc::new(WatcherReconciler::new(
            store.clone(),
            registry.clone(),
            clients.clone(),
            normalizer,
            SubscriptionMode::Logs,
        ));
        let state = Arc::new(AppState {
            classifier: Arc::new(TransactionClassifier::new(clients.clone())),
            orchestrator: Arc::new(EnrichmentOrchestrator::new(registry.clone(), clients.clone())),
            registry,
            clients,
            reconciler,
        });
        (state, store)
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            status_for(&MonitorError::UnsupportedChain("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&MonitorError::EndpointUnavailable { chain: "x".into() }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&MonitorError::rpc("http://a", "boom")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&MonitorError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn classify_endpoint() {
        let (state, _) = app();

        let Json(result) = classify_tx(State(state.clone()), Path(("anvil".into(), HASH.into())))
            .await
            .unwrap();
        assert_eq!(result.sub_type, Some(crate::indexer::types::SubType::NativeTransfer));

        let (status, _) = classify_tx(State(state.clone()), Path(("anvil".into(), "0x12".into())))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = classify_tx(State(state), Path(("nope".into(), HASH.into())))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reconcile_and_health() {
        let (state, store) = app();
        store.add_contract(watched("u1", "anvil", Address::repeat_byte(0xcc)));

        let Json(report) = reconcile(State(state.clone())).await.unwrap();
        assert_eq!(report.started, 1);

        let Json(status) = health(State(state.clone())).await.unwrap();
        assert_eq!(status.watchers, 1);
        assert_eq!(status.chains[0].state, ConnectionState::Connected);

        let Json(listed) = watchers(State(state.clone())).await.unwrap();
        assert_eq!(listed[0].key, "anvil:0xcccccccccccccccccccccccccccccccccccccccc");

        let Json(listing) = chains(State(state.clone())).await.unwrap();
        assert_eq!(listing.chains.len(), 1);
        assert_eq!(listing.chains[0].endpoints, 1);

        state.reconciler.shutdown().await;
    }
}
