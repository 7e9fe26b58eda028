use anyhow::Result;
use async_trait::async_trait;
use pkg_types::identity::WorkloadIdentity;
use thiserror::Error;

/// A running container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Runtime container ID.
    pub id: String,
    /// Container names (docker may report several).
    pub names: Vec<String>,
    /// Pod sandbox the container belongs to, when the runtime exposes it.
    pub sandbox_id: Option<String>,
}

/// Why a container could not be turned into a workload identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The container name does not follow the kubelet naming scheme.
    #[error("failed to parse the container name {0:?}")]
    Parse(String),

    #[error("incomplete workload identity for container {container}: missing {field}")]
    Incomplete {
        container: String,
        field: &'static str,
    },

    /// The runtime could not be queried.
    #[error(transparent)]
    Lookup(#[from] anyhow::Error),
}

/// Pluggable container runtime capability.
/// Implementations: docker (name decoding), CRI (sandbox metadata).
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    /// Human-readable name of the runtime backend.
    fn name(&self) -> &str;

    /// List running Kubernetes containers.
    async fn list_containers(&self) -> Result<Vec<ContainerHandle>>;

    /// Process table of a container, with host-visible PIDs.
    async fn list_processes(&self, container: &ContainerHandle) -> Result<ProcessTable>;

    /// Decode the workload owning a container.
    async fn resolve_identity(
        &self,
        container: &ContainerHandle,
    ) -> std::result::Result<WorkloadIdentity, IdentityError>;
}

/// A `ps`-style table: column titles plus one row per process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessTable {
    pub titles: Vec<String>,
    pub processes: Vec<Vec<String>>,
}

impl ProcessTable {
    /// Parse whitespace-aligned `ps` output. The first non-empty line holds
    /// the titles; the last column absorbs the rest of each row, since
    /// commands contain spaces.
    pub fn parse(output: &str) -> Self {
        let mut lines = output.lines().filter(|l| !l.trim().is_empty());
        let titles: Vec<String> = match lines.next() {
            Some(header) => header.split_whitespace().map(str::to_string).collect(),
            None => return Self::default(),
        };
        let width = titles.len();
        let processes = lines.map(|line| split_columns(line, width)).collect();
        Self { titles, processes }
    }

    /// Index of a column, matched case-insensitively.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.titles.iter().position(|t| t.eq_ignore_ascii_case(name))
    }

    pub fn pid_column(&self) -> Option<usize> {
        self.column("PID")
    }

    /// Whether any row's PID column equals `pid`.
    pub fn contains_pid(&self, pid: u32) -> bool {
        let Some(index) = self.pid_column() else {
            return false;
        };
        let wanted = pid.to_string();
        self.processes
            .iter()
            .any(|row| row.get(index).map(|p| p.trim()) == Some(wanted.as_str()))
    }
}

fn split_columns(line: &str, width: usize) -> Vec<String> {
    let mut columns = Vec::with_capacity(width);
    let mut rest = line.trim_start();
    while columns.len() + 1 < width {
        match rest.find(char::is_whitespace) {
            Some(end) => {
                columns.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            None => break,
        }
    }
    let rest = rest.trim_end();
    if !rest.is_empty() {
        columns.push(rest.to_string());
    }
    columns
}
