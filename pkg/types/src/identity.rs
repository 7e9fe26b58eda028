use serde::{Deserialize, Serialize};

/// Owner of a dump: namespace + pod + pod UID + container name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WorkloadIdentity {
    pub namespace: String,
    pub pod: String,
    pub uid: String,
    pub container: String,
}

impl WorkloadIdentity {
    /// True when every field is populated.
    pub fn is_complete(&self) -> bool {
        !self.namespace.is_empty()
            && !self.pod.is_empty()
            && !self.uid.is_empty()
            && !self.container.is_empty()
    }
}

impl std::fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} (uid={}, container={})",
            self.namespace, self.pod, self.uid, self.container
        )
    }
}
