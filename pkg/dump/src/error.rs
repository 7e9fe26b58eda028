use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a single run of the dump pipeline.
#[derive(Debug, Error)]
pub enum DumpError {
    /// The container runtime or the pod metadata service could not be queried.
    #[error("lookup of {target} failed: {source}")]
    Lookup {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to persist dump to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The dump was written but its record could not be registered.
    #[error("failed to register coredump {namespace}/{name}: {source}")]
    Registration {
        namespace: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },
}
