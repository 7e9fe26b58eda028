use async_trait::async_trait;
use std::sync::Arc;

use crate::error::DumpError;
use pkg_types::identity::WorkloadIdentity;
use pkg_types::pod::Pod;

/// Pod metadata service.
#[async_trait]
pub trait PodLookup: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> anyhow::Result<Pod>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    /// The identity does not describe the live pod.
    Mismatch(String),
}

/// Cross-checks a resolved identity against the live pod.
pub struct IdentityValidator {
    pods: Arc<dyn PodLookup>,
}

impl IdentityValidator {
    pub fn new(pods: Arc<dyn PodLookup>) -> Self {
        Self { pods }
    }

    /// The pod must carry the resolved UID and declare the resolved
    /// container. A failed lookup is an error, not a mismatch.
    pub async fn validate(&self, identity: &WorkloadIdentity) -> Result<Validation, DumpError> {
        let pod = self
            .pods
            .get_pod(&identity.namespace, &identity.pod)
            .await
            .map_err(|source| DumpError::Lookup {
                target: format!("pod {}/{}", identity.namespace, identity.pod),
                source,
            })?;

        if pod.uid != identity.uid {
            return Ok(Validation::Mismatch(format!(
                "pod {}/{} has uid {}, dump claims {}",
                identity.namespace, identity.pod, pod.uid, identity.uid
            )));
        }
        if !pod.has_container(&identity.container) {
            return Ok(Validation::Mismatch(format!(
                "pod {}/{} has no container {}",
                identity.namespace, identity.pod, identity.container
            )));
        }
        Ok(Validation::Valid)
    }
}
