use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Container spec ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    #[serde(default)]
    pub image: String,
}

// --- Pod spec ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

// --- Pod ---

/// Pod metadata as served by the pod metadata service.
/// Only the fields needed to validate a workload identity are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pod {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub uid: String,
    #[serde(default)]
    pub spec: PodSpec,
    /// The node this pod is assigned to
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Pod {
    pub fn has_container(&self, name: &str) -> bool {
        self.spec.containers.iter().any(|c| c.name == name)
    }
}
