use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{error, info, warn};

use crate::error::DumpError;
use crate::matcher::{ProcessMatch, ProcessMatcher};
use crate::storage::DumpStorage;
use crate::validator::{IdentityValidator, PodLookup, Validation};
use pkg_container::{ContainerInspector, IdentityError};
use pkg_types::Quantity;
use pkg_types::coredump::Coredump;
use pkg_types::identity::WorkloadIdentity;

/// Kernel crash notification (`core_pattern` specifiers `%P %p %e %t`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpEvent {
    pub host_pid: u32,
    pub namespace_pid: u32,
    pub filename: String,
    /// Seconds since the epoch.
    pub time: i64,
}

/// Write side of the coredump record store.
#[async_trait]
pub trait CoredumpRegistrar: Send + Sync {
    /// Register the coredump record type; an existing definition is success.
    async fn ensure_definition(&self) -> anyhow::Result<()>;

    async fn create_coredump(&self, record: &Coredump) -> anyhow::Result<Coredump>;
}

/// What happened to one dump.
#[derive(Debug, Clone, PartialEq)]
pub enum DumpOutcome {
    /// Not containerized, or no running container owns the process.
    HostLevel { path: PathBuf },
    /// Containerized but the owner could not be confirmed; saved host-level.
    Unattributed { path: PathBuf, reason: String },
    /// Saved under the workload and registered.
    Attributed { path: PathBuf, record: Coredump },
}

impl DumpOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DumpOutcome::HostLevel { path }
            | DumpOutcome::Unattributed { path, .. }
            | DumpOutcome::Attributed { path, .. } => path,
        }
    }
}

/// Resolves, validates, saves and registers a single crash dump.
pub struct DumpPipeline {
    inspector: Arc<dyn ContainerInspector>,
    matcher: ProcessMatcher,
    validator: IdentityValidator,
    records: Arc<dyn CoredumpRegistrar>,
    storage: DumpStorage,
}

impl DumpPipeline {
    pub fn new(
        inspector: Arc<dyn ContainerInspector>,
        pods: Arc<dyn PodLookup>,
        records: Arc<dyn CoredumpRegistrar>,
        storage: DumpStorage,
    ) -> Self {
        Self {
            matcher: ProcessMatcher::new(inspector.clone()),
            inspector,
            validator: IdentityValidator::new(pods),
            records,
            storage,
        }
    }

    /// Run the pipeline over one dump. `payload` is consumed exactly once,
    /// into whichever file the dump ends up in.
    pub async fn run<R>(&self, event: &DumpEvent, payload: &mut R) -> Result<DumpOutcome, DumpError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let located = self
            .matcher
            .locate(event.host_pid, event.namespace_pid)
            .await
            .map_err(|source| {
                error!(
                    "Failed to find the container of pid {} ({}): {}",
                    event.host_pid, event.filename, source
                );
                DumpError::Lookup {
                    target: format!("container of pid {}", event.host_pid),
                    source,
                }
            })?;

        let container = match located {
            ProcessMatch::HostLevel => {
                let path = self.save_host_level(event, payload).await?;
                return Ok(DumpOutcome::HostLevel { path });
            }
            ProcessMatch::Unmatched => {
                info!(
                    "No running container owns pid {}, saving {} host-level",
                    event.host_pid, event.filename
                );
                let path = self.save_host_level(event, payload).await?;
                return Ok(DumpOutcome::HostLevel { path });
            }
            ProcessMatch::Container(container) => container,
        };

        let identity = match self.inspector.resolve_identity(&container).await {
            Ok(identity) => identity,
            Err(IdentityError::Lookup(source)) => {
                error!(
                    "Failed to inspect container {} for pid {} ({}): {}",
                    container.id, event.host_pid, event.filename, source
                );
                return Err(DumpError::Lookup {
                    target: format!("container {}", container.id),
                    source,
                });
            }
            Err(e) => {
                warn!("Cannot attribute {}: {}", event.filename, e);
                return self.unattributed(event, payload, e.to_string()).await;
            }
        };

        match self.validator.validate(&identity).await {
            Ok(Validation::Valid) => {}
            Ok(Validation::Mismatch(reason)) => {
                warn!("Rejecting identity {} for {}: {}", identity, event.filename, reason);
                return self.unattributed(event, payload, reason).await;
            }
            Err(e) => {
                error!("Failed to validate {} for {}: {}", identity, event.filename, e);
                return Err(e);
            }
        }

        self.save_for_workload(event, &identity, payload).await
    }

    async fn save_for_workload<R>(
        &self,
        event: &DumpEvent,
        identity: &WorkloadIdentity,
        payload: &mut R,
    ) -> Result<DumpOutcome, DumpError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let path = self
            .storage
            .workload_path(identity, &event.filename, event.time);
        let saved = self.storage.persist(&path, payload).await.map_err(|e| {
            error!("Failed to save {} of {}: {}", event.filename, identity, e);
            e
        })?;

        let record = Coredump::new(
            identity,
            event.host_pid,
            &event.filename,
            event.time,
            Quantity::from_bytes(saved.size),
        );
        let registered = self.register(&record).await.map_err(|source| {
            error!(
                "Saved {} but failed to register {}/{} for {}: {}",
                saved.path.display(),
                record.namespace,
                record.name,
                identity,
                source
            );
            DumpError::Registration {
                namespace: record.namespace.clone(),
                name: record.name.clone(),
                source,
            }
        })?;

        info!(
            "Registered coredump {}/{} ({}) for {}",
            registered.namespace,
            registered.name,
            registered.spec.size,
            identity
        );
        Ok(DumpOutcome::Attributed {
            path: saved.path,
            record: registered,
        })
    }

    async fn register(&self, record: &Coredump) -> anyhow::Result<Coredump> {
        self.records.ensure_definition().await?;
        self.records.create_coredump(record).await
    }

    async fn unattributed<R>(
        &self,
        event: &DumpEvent,
        payload: &mut R,
        reason: String,
    ) -> Result<DumpOutcome, DumpError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let path = self.save_host_level(event, payload).await?;
        Ok(DumpOutcome::Unattributed { path, reason })
    }

    async fn save_host_level<R>(&self, event: &DumpEvent, payload: &mut R) -> Result<PathBuf, DumpError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let path = self
            .storage
            .host_level_path(&event.filename, event.host_pid, event.time);
        let saved = self.storage.persist(&path, payload).await.map_err(|e| {
            error!("Failed to save host-level dump {}: {}", event.filename, e);
            e
        })?;
        Ok(saved.path)
    }
}
