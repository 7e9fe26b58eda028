use std::sync::Arc;
use tracing::{debug, warn};

use pkg_container::{ContainerHandle, ContainerInspector};

/// Where a crashed process lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessMatch {
    /// The process ran in the host PID namespace.
    HostLevel,
    Container(ContainerHandle),
    /// No running container owns the PID.
    Unmatched,
}

/// Finds the container whose process table holds a host PID.
pub struct ProcessMatcher {
    inspector: Arc<dyn ContainerInspector>,
}

impl ProcessMatcher {
    pub fn new(inspector: Arc<dyn ContainerInspector>) -> Self {
        Self { inspector }
    }

    /// Locate the container of `host_pid`. A process whose host PID equals
    /// its namespace PID is host-level and no container is queried.
    pub async fn locate(&self, host_pid: u32, namespace_pid: u32) -> anyhow::Result<ProcessMatch> {
        if host_pid == namespace_pid {
            return Ok(ProcessMatch::HostLevel);
        }

        let containers = self.inspector.list_containers().await?;
        debug!(
            "[matcher] scanning {} {} containers for pid {}",
            containers.len(),
            self.inspector.name(),
            host_pid
        );

        for container in containers {
            let table = self.inspector.list_processes(&container).await?;
            if table.pid_column().is_none() {
                warn!(
                    "[matcher] process table of {} has no PID column, skipping",
                    container.id
                );
                continue;
            }
            if table.contains_pid(host_pid) {
                return Ok(ProcessMatch::Container(container));
            }
        }
        Ok(ProcessMatch::Unmatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pkg_container::{IdentityError, ProcessTable};
    use pkg_types::identity::WorkloadIdentity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TableInspector {
        tables: Vec<(ContainerHandle, &'static str)>,
        listed: AtomicUsize,
    }

    fn handle(id: &str) -> ContainerHandle {
        ContainerHandle {
            id: id.to_string(),
            names: vec![format!("k8s_app_{}_default_uid_0", id)],
            sandbox_id: None,
        }
    }

    #[async_trait]
    impl ContainerInspector for TableInspector {
        fn name(&self) -> &str {
            "table"
        }

        async fn list_containers(&self) -> anyhow::Result<Vec<ContainerHandle>> {
            self.listed.fetch_add(1, Ordering::SeqCst);
            Ok(self.tables.iter().map(|(h, _)| h.clone()).collect())
        }

        async fn list_processes(&self, container: &ContainerHandle) -> anyhow::Result<ProcessTable> {
            let (_, table) = self
                .tables
                .iter()
                .find(|(h, _)| h.id == container.id)
                .ok_or_else(|| anyhow::anyhow!("no such container"))?;
            Ok(ProcessTable::parse(table))
        }

        async fn resolve_identity(
            &self,
            _container: &ContainerHandle,
        ) -> Result<WorkloadIdentity, IdentityError> {
            Err(IdentityError::Parse("unused".to_string()))
        }
    }

    fn matcher(tables: Vec<(ContainerHandle, &'static str)>) -> (ProcessMatcher, Arc<TableInspector>) {
        let inspector = Arc::new(TableInspector {
            tables,
            listed: AtomicUsize::new(0),
        });
        (ProcessMatcher::new(inspector.clone()), inspector)
    }

    #[tokio::test]
    async fn test_host_level_skips_container_search() {
        let (matcher, inspector) = matcher(vec![(handle("a"), "PID CMD\n42 sh\n")]);
        assert_eq!(matcher.locate(42, 42).await.unwrap(), ProcessMatch::HostLevel);
        assert_eq!(inspector.listed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_container_with_pid_wins() {
        let (matcher, _) = matcher(vec![
            (handle("a"), "PID CMD\n10 sh\n"),
            (handle("b"), "UID pid CMD\nroot 42 crash\n"),
            (handle("c"), "PID CMD\n42 other\n"),
        ]);
        assert_eq!(
            matcher.locate(42, 1).await.unwrap(),
            ProcessMatch::Container(handle("b"))
        );
    }

    #[tokio::test]
    async fn test_table_without_pid_column_is_skipped() {
        let (matcher, _) = matcher(vec![(handle("a"), "USER CMD\n42 sh\n")]);
        assert_eq!(matcher.locate(42, 1).await.unwrap(), ProcessMatch::Unmatched);
    }
}
