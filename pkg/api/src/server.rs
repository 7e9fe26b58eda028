use axum::{
    Router,
    routing::{get, put},
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

use crate::AppState;
use crate::handlers::{coredumps, definitions, pods, quotas, watch};
use pkg_controllers::{QuotaController, QuotaReconciler};
use pkg_state::{Registry, StateStore};
use pkg_types::crd::CustomResourceDefinition;

/// Server configuration passed from the binary's CLI.
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub data_dir: String,
    pub resync_interval: Duration,
    pub max_conflict_retries: u32,
}

/// All API routes over the given registry.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/apis/apiextensions/v1/customresourcedefinitions",
            get(definitions::list_definitions).post(definitions::create_definition),
        )
        .route(
            "/apis/coredump.k8s.io/v1alpha1/coredumps",
            get(coredumps::list_all_coredumps),
        )
        .route(
            "/apis/coredump.k8s.io/v1alpha1/namespaces/{ns}/coredumps",
            get(coredumps::list_coredumps).post(coredumps::create_coredump),
        )
        .route(
            "/apis/coredump.k8s.io/v1alpha1/namespaces/{ns}/coredumps/{name}",
            get(coredumps::get_coredump).delete(coredumps::delete_coredump),
        )
        .route(
            "/apis/coredump.k8s.io/v1alpha1/namespaces/{ns}/coredumps/{name}/status",
            put(coredumps::update_coredump_status),
        )
        .route(
            "/apis/coredump.k8s.io/v1alpha1/namespaces/{ns}/coredumpquotas",
            get(quotas::list_quotas),
        )
        .route(
            "/apis/coredump.k8s.io/v1alpha1/namespaces/{ns}/coredumpquotas/{name}",
            get(quotas::get_quota)
                .put(quotas::put_quota)
                .delete(quotas::delete_quota),
        )
        .route(
            "/api/v1/namespaces/{ns}/pods/{name}",
            get(pods::get_pod).put(pods::put_pod).delete(pods::delete_pod),
        )
        .route(
            "/apis/coredump.k8s.io/v1alpha1/watch",
            get(watch::watch_events),
        )
        .with_state(state)
}

pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let store = StateStore::new(&config.data_dir).await?;
    let registry = Registry::new(store.clone());

    seed_definitions(&registry).await?;

    let reconciler =
        QuotaReconciler::new(registry.clone()).with_max_conflict_retries(config.max_conflict_retries);
    let controller = QuotaController::new(reconciler)
        .with_resync_interval(config.resync_interval)
        .start();

    let app = router(AppState { registry });

    info!("Starting API server on {}", config.addr);
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    controller.abort();
    store.close().await?;
    Ok(())
}

/// Register the built-in record types on startup.
async fn seed_definitions(registry: &Registry) -> anyhow::Result<()> {
    for crd in CustomResourceDefinition::builtin() {
        registry.ensure_definition(&crd).await?;
        info!("Record type ready: {}", crd.name);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
