use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::info;

use crate::error::DumpError;
use pkg_constants::paths::HOST_LEVEL_DIR;
use pkg_types::identity::WorkloadIdentity;

/// A dump written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedDump {
    pub path: PathBuf,
    /// Bytes written.
    pub size: u64,
}

/// Directory layout of saved dumps:
///
/// ```text
/// {root}/{namespace}/{pod}-{uid}/{container}/coredump-{filename}-{pod}-{time}
/// {root}/others/{filename}-{hostpid}-{time}
/// ```
#[derive(Debug, Clone)]
pub struct DumpStorage {
    root: PathBuf,
}

impl DumpStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workload_path(&self, identity: &WorkloadIdentity, filename: &str, time: i64) -> PathBuf {
        self.root
            .join(path_safe(&identity.namespace))
            .join(path_safe(&format!("{}-{}", identity.pod, identity.uid)))
            .join(path_safe(&identity.container))
            .join(path_safe(&format!(
                "coredump-{}-{}-{}",
                filename, identity.pod, time
            )))
    }

    pub fn host_level_path(&self, filename: &str, host_pid: u32, time: i64) -> PathBuf {
        self.root
            .join(HOST_LEVEL_DIR)
            .join(path_safe(&format!("{}-{}-{}", filename, host_pid, time)))
    }

    /// Stream `payload` into a new file at `path`. Parent directories are
    /// created as needed; an existing file is never overwritten.
    pub async fn persist<R>(&self, path: &Path, payload: &mut R) -> Result<PersistedDump, DumpError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let failed = |source: std::io::Error| DumpError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            let mut builder = tokio::fs::DirBuilder::new();
            builder.recursive(true).mode(0o775);
            builder.create(parent).await.map_err(failed)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(failed)?;
        let size = tokio::io::copy(payload, &mut file).await.map_err(failed)?;
        file.flush().await.map_err(failed)?;
        file.sync_all().await.map_err(failed)?;

        info!("Saved {} bytes to {}", size, path.display());
        Ok(PersistedDump {
            path: path.to_path_buf(),
            size,
        })
    }
}

/// Kernel-supplied names may contain '/'.
fn path_safe(component: &str) -> String {
    component.replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> WorkloadIdentity {
        WorkloadIdentity {
            namespace: "default".to_string(),
            pod: "web-0".to_string(),
            uid: "abc".to_string(),
            container: "nginx".to_string(),
        }
    }

    #[test]
    fn test_paths() {
        let storage = DumpStorage::new("/var/coredump");
        assert_eq!(
            storage.workload_path(&identity(), "nginx", 1700000000),
            PathBuf::from("/var/coredump/default/web-0-abc/nginx/coredump-nginx-web-0-1700000000")
        );
        assert_eq!(
            storage.host_level_path("bin/sh", 4021, 1700000000),
            PathBuf::from("/var/coredump/others/bin_sh-4021-1700000000")
        );
    }

    #[tokio::test]
    async fn test_persist_counts_bytes_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DumpStorage::new(dir.path());
        let path = storage.workload_path(&identity(), "nginx", 1);

        let mut payload: &[u8] = b"core bytes";
        let saved = storage.persist(&path, &mut payload).await.unwrap();
        assert_eq!(saved.size, 10);
        assert_eq!(std::fs::read(&path).unwrap(), b"core bytes");

        let mut again: &[u8] = b"other";
        let err = storage.persist(&path, &mut again).await.unwrap_err();
        assert!(matches!(err, DumpError::Persistence { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), b"core bytes");
    }
}
