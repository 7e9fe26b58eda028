use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quantity::Quantity;

/// Per-namespace cap on the total size of admitted coredumps.
///
/// Created by an operator; `status` is owned by the quota controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoredumpQuota {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub spec: QuotaSpec,
    #[serde(default)]
    pub status: QuotaStatus,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaSpec {
    /// Maximum total bytes of admitted dumps.
    pub hard: Quantity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QuotaStatus {
    /// Bytes currently reserved by admitted dumps. Absent until the first admission.
    #[serde(default)]
    pub used: Option<Quantity>,
    /// Copy of `spec.hard` as of the last controller write.
    #[serde(default)]
    pub hard: Option<Quantity>,
}

impl CoredumpQuota {
    pub fn new(namespace: &str, name: &str, hard: Quantity) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec: QuotaSpec { hard },
            status: QuotaStatus::default(),
            resource_version: 0,
            created_at: Utc::now(),
        }
    }

    pub fn used(&self) -> Quantity {
        self.status.used.unwrap_or_default()
    }

    pub fn hard(&self) -> Quantity {
        self.spec.hard
    }
}
