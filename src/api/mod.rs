pub mod handlers;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::chains::ChainRegistry;
use crate::indexer::TransactionClassifier;
use crate::pipeline::EnrichmentOrchestrator;
use crate::rpc::RpcClientManager;
use crate::watcher::WatcherReconciler;

pub struct AppState {
    pub registry: Arc<ChainRegistry>,
    pub clients: Arc<RpcClientManager>,
    pub reconciler: Arc<WatcherReconciler>,
    pub classifier: Arc<TransactionClassifier>,
    pub orchestrator: Arc<EnrichmentOrchestrator>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/chains", get(handlers::chains))
        .route("/api/v1/watchers", get(handlers::watchers))
        .route("/api/v1/watchers/reconcile", post(handlers::reconcile))
        .route(
            "/api/v1/tx/{chain}/{tx_hash}/classify",
            get(handlers::classify_tx),
        )
        .route("/api/v1/tx/{chain}/{tx_hash}", get(handlers::enrich_tx))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(
    state: Arc<AppState>,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> eyre::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
