use pkg_types::coredump::CoredumpState;
use thiserror::Error;

/// Errors returned by typed registry operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// The object changed since the caller read it.
    #[error(
        "{kind} {name} was modified concurrently (expected version {expected}, found {actual})"
    )]
    Conflict {
        kind: &'static str,
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("coredump {name} cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: CoredumpState,
        to: CoredumpState,
    },

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}
