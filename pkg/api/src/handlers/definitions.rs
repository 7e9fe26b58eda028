use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use pkg_types::crd::CustomResourceDefinition;

use crate::AppState;
use crate::error::ApiError;

pub async fn list_definitions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let definitions = state.registry.list_definitions().await?;
    Ok((StatusCode::OK, Json(definitions)))
}

/// 409 when the definition is already registered.
pub async fn create_definition(
    State(state): State<AppState>,
    Json(crd): Json<CustomResourceDefinition>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.registry.register_definition(&crd).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
