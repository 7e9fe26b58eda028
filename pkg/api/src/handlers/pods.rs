use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
};
use pkg_types::pod::Pod;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub async fn get_pod(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let pod = state.registry.get_pod(&ns, &name).await?;
    Ok((StatusCode::OK, Json(pod)))
}

pub async fn put_pod(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
    Json(mut pod): Json<Pod>,
) -> Result<impl IntoResponse, ApiError> {
    pod.namespace = ns;
    pod.name = name;
    let stored = state.registry.put_pod(&pod).await?;
    info!("Stored pod {}/{} (uid={})", stored.namespace, stored.name, stored.uid);
    Ok((StatusCode::OK, Json(stored)))
}

pub async fn delete_pod(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.delete_pod(&ns, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}
