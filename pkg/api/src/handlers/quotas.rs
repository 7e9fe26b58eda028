use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
};
use pkg_types::quota::CoredumpQuota;

use crate::AppState;
use crate::error::ApiError;

pub async fn list_quotas(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let quotas = state.registry.list_quotas(&ns).await?;
    Ok((StatusCode::OK, Json(quotas)))
}

pub async fn get_quota(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let quota = state.registry.get_quota(&ns, &name).await?;
    Ok((StatusCode::OK, Json(quota)))
}

/// Create or replace a quota's spec; the status stays with the controller.
pub async fn put_quota(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
    Json(mut quota): Json<CoredumpQuota>,
) -> Result<impl IntoResponse, ApiError> {
    quota.namespace = ns;
    quota.name = name;
    let stored = state.registry.put_quota(&quota).await?;
    Ok((StatusCode::OK, Json(stored)))
}

pub async fn delete_quota(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.registry.delete_quota(&ns, &name).await?;
    Ok((StatusCode::OK, Json(removed)))
}
