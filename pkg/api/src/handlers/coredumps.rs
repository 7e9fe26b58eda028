use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
};
use pkg_types::coredump::Coredump;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub async fn create_coredump(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
    Json(mut record): Json<Coredump>,
) -> Result<impl IntoResponse, ApiError> {
    record.namespace = ns;
    let created = state.registry.create_coredump(&record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_coredumps(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.registry.list_coredumps(Some(&ns)).await?;
    Ok((StatusCode::OK, Json(records)))
}

pub async fn list_all_coredumps(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.registry.list_coredumps(None).await?;
    Ok((StatusCode::OK, Json(records)))
}

pub async fn get_coredump(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.registry.get_coredump(&ns, &name).await?;
    Ok((StatusCode::OK, Json(record)))
}

/// Cleanup path. The quota controller releases whatever the record held.
pub async fn delete_coredump(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.registry.delete_coredump(&ns, &name).await?;
    Ok((StatusCode::OK, Json(removed)))
}

/// Status subresource: compare-and-swap on `resource_version`, forward-only
/// state changes. Records still `Created` are decided by the quota
/// controller, not here.
pub async fn update_coredump_status(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
    Json(mut record): Json<Coredump>,
) -> Result<impl IntoResponse, ApiError> {
    record.namespace = ns;
    record.name = name;
    let updated = state.registry.update_coredump_status(&record).await?;
    info!(
        "Coredump {}/{} is now {}",
        updated.namespace,
        updated.name,
        updated.state()
    );
    Ok((StatusCode::OK, Json(updated)))
}
