use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use contractwatch::api::{self, AppState};
use contractwatch::chains::ChainRegistry;
use contractwatch::config::Config;
use contractwatch::db::{PgStore, TransactionStore};
use contractwatch::indexer::{EventNormalizer, TransactionClassifier};
use contractwatch::pipeline::EnrichmentOrchestrator;
use contractwatch::rpc::{AlloyConnector, RpcClientManager};
use contractwatch::watcher::{run_reconciler, WatcherReconciler};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=debug for more)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("ContractWatch starting");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    let registry = Arc::new(ChainRegistry::from_config(&config));
    tracing::info!(
        chains = registry.len(),
        keys = ?registry.keys(),
        "Configuration loaded from {}",
        config_path
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| eyre::eyre!("Failed to connect to database: {}", e))?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| eyre::eyre!("Failed to run migrations: {}", e))?;

    tracing::info!("Database migrations complete");

    let store: Arc<dyn TransactionStore> = Arc::new(PgStore::new(pool));
    let clients = Arc::new(RpcClientManager::new(
        &registry,
        Arc::new(AlloyConnector::new(config.rpc.clone())),
        &config.rpc,
    ));
    let classifier = Arc::new(TransactionClassifier::new(clients.clone()));

    let mut normalizer = EventNormalizer::new(
        store.clone(),
        registry.clone(),
        config.monitor.default_label.clone(),
    );
    if config.monitor.classify_on_ingest {
        normalizer = normalizer.with_classifier(classifier.clone());
    }

    let reconciler = Arc::new(WatcherReconciler::new(
        store,
        registry.clone(),
        clients.clone(),
        Arc::new(normalizer),
        config.monitor.subscription_mode,
    ));
    let orchestrator = Arc::new(EnrichmentOrchestrator::new(registry.clone(), clients.clone()));

    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();

    handles.push(tokio::spawn(run_reconciler(
        reconciler.clone(),
        config.monitor.reconcile_interval(),
        shutdown.clone(),
    )));

    if config.api.enabled {
        let state = Arc::new(AppState {
            registry,
            clients: clients.clone(),
            reconciler,
            classifier,
            orchestrator,
        });
        let host = config.api.host.clone();
        let port = config.api.port;
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = api::serve(state, &host, port, shutdown).await {
                tracing::error!(error = %e, "API server failed");
            }
        }));
    }

    tracing::info!(
        mode = ?config.monitor.subscription_mode,
        interval_secs = config.monitor.reconcile_interval_secs,
        "Watcher reconciliation started. Press Ctrl+C to stop."
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping watchers...");
    shutdown.cancel();
    clients.shutdown();

    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!("ContractWatch stopped gracefully");
    Ok(())
}
