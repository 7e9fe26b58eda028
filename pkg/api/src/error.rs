use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pkg_state::StoreError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists { .. } | StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        StoreError::Serialization(_) | StoreError::Backend(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Wraps a `StoreError` so handlers can return it directly.
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::coredump::CoredumpState;

    #[test]
    fn test_status_mapping() {
        let not_found = StoreError::NotFound {
            kind: "pod",
            name: "default/web-0".to_string(),
        };
        assert_eq!(status_for(&not_found), StatusCode::NOT_FOUND);

        let conflict = StoreError::Conflict {
            kind: "coredump",
            name: "default/x".to_string(),
            expected: 1,
            actual: 2,
        };
        assert_eq!(status_for(&conflict), StatusCode::CONFLICT);

        let regression = StoreError::InvalidTransition {
            name: "default/x".to_string(),
            from: CoredumpState::Denied,
            to: CoredumpState::Allowed,
        };
        assert_eq!(status_for(&regression), StatusCode::UNPROCESSABLE_ENTITY);

        let backend = StoreError::Backend(anyhow::anyhow!("disk full"));
        assert_eq!(status_for(&backend), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
