use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::StateStore;
use crate::error::StoreError;
use pkg_constants::state::{COREDUMPS_PREFIX, DEFINITIONS_PREFIX, PODS_PREFIX, QUOTAS_PREFIX};
use pkg_types::coredump::{Coredump, CoredumpState};
use pkg_types::crd::CustomResourceDefinition;
use pkg_types::pod::Pod;
use pkg_types::quota::CoredumpQuota;
use pkg_types::validate::validate_name;

type Result<T> = std::result::Result<T, StoreError>;

/// Typed access to coredump records, quotas, pods and record-type
/// definitions on top of the raw key-value `StateStore`.
///
/// Every write bumps the object's `resource_version`. Writes that take an
/// expected version fail with `StoreError::Conflict` when the stored object
/// has moved on.
#[derive(Clone)]
pub struct Registry {
    store: StateStore,
}

impl Registry {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn definition_key(name: &str) -> String {
        format!("{}{}", DEFINITIONS_PREFIX, name)
    }

    pub fn coredump_key(ns: &str, name: &str) -> String {
        format!("{}{}/{}", COREDUMPS_PREFIX, ns, name)
    }

    pub fn quota_key(ns: &str, name: &str) -> String {
        format!("{}{}/{}", QUOTAS_PREFIX, ns, name)
    }

    pub fn pod_key(ns: &str, name: &str) -> String {
        format!("{}{}/{}", PODS_PREFIX, ns, name)
    }

    // ─── Raw helpers ────────────────────────────────────────────────

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        self.store.put(key, &data).await?;
        Ok(())
    }

    async fn list<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let entries = self.store.list_prefix(prefix).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_slice(&value) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Skipping undecodable entry {}: {}", key, e);
                    None
                }
            })
            .collect())
    }

    // ─── Record-type definitions ────────────────────────────────────

    /// Register a record type. Fails with `AlreadyExists` if it is already known.
    pub async fn register_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<CustomResourceDefinition> {
        let _guard = self.store.write_guard().await;
        let key = Self::definition_key(&crd.name);
        if self.read::<CustomResourceDefinition>(&key).await?.is_some() {
            return Err(StoreError::AlreadyExists {
                kind: "customresourcedefinition",
                name: crd.name.clone(),
            });
        }
        let mut crd = crd.clone();
        crd.created_at = Some(Utc::now());
        self.write(&key, &crd).await?;
        info!("Registered definition {}", crd.name);
        Ok(crd)
    }

    /// Register a record type, treating `AlreadyExists` as success.
    pub async fn ensure_definition(&self, crd: &CustomResourceDefinition) -> Result<()> {
        match self.register_definition(crd).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn list_definitions(&self) -> Result<Vec<CustomResourceDefinition>> {
        self.list(DEFINITIONS_PREFIX).await
    }

    // ─── Coredumps ──────────────────────────────────────────────────

    /// Register a new coredump record in state `Created`.
    pub async fn create_coredump(&self, record: &Coredump) -> Result<Coredump> {
        if record.namespace.is_empty() || record.name.is_empty() {
            return Err(StoreError::Invalid(
                "coredump needs both a namespace and a name".to_string(),
            ));
        }
        let _guard = self.store.write_guard().await;

        let definition = CustomResourceDefinition::coredumps();
        if self
            .read::<CustomResourceDefinition>(&Self::definition_key(&definition.name))
            .await?
            .is_none()
        {
            return Err(StoreError::NotFound {
                kind: "customresourcedefinition",
                name: definition.name,
            });
        }

        let key = Self::coredump_key(&record.namespace, &record.name);
        if self.store.get(&key).await?.is_some() {
            return Err(StoreError::AlreadyExists {
                kind: "coredump",
                name: format!("{}/{}", record.namespace, record.name),
            });
        }

        let mut record = record.clone();
        record.id = Uuid::new_v4().to_string();
        record.resource_version = 1;
        record.created_at = Utc::now();
        record.status.state = CoredumpState::Created;
        self.write(&key, &record).await?;
        info!(
            "Created coredump {}/{} (size={})",
            record.namespace, record.name, record.spec.size
        );
        Ok(record)
    }

    pub async fn get_coredump(&self, ns: &str, name: &str) -> Result<Coredump> {
        self.read(&Self::coredump_key(ns, name))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "coredump",
                name: format!("{}/{}", ns, name),
            })
    }

    /// List coredump records in one namespace, or in all namespaces.
    pub async fn list_coredumps(&self, ns: Option<&str>) -> Result<Vec<Coredump>> {
        let prefix = match ns {
            Some(ns) => format!("{}{}/", COREDUMPS_PREFIX, ns),
            None => COREDUMPS_PREFIX.to_string(),
        };
        self.list(&prefix).await
    }

    /// List the records of a namespace together with the event sequence
    /// they reflect: every event up to the returned sequence is visible in
    /// the listing, none after it.
    pub async fn snapshot_coredumps(&self, ns: &str) -> Result<(Vec<Coredump>, u64)> {
        let _guard = self.store.write_guard().await;
        let records = self.list_coredumps(Some(ns)).await?;
        let seq = self.store.event_log.current_seq().await;
        Ok((records, seq))
    }

    /// Transition a record's status. `record.resource_version` must match
    /// the stored version and the state may only move forward. The saver may
    /// also fill in `spec.volume` through this call.
    ///
    /// Records still in `Created` can only have their message rewritten here;
    /// the decision out of `Created` goes through `commit_admission` or
    /// `deny_coredump`.
    pub async fn update_coredump_status(&self, record: &Coredump) -> Result<Coredump> {
        let _guard = self.store.write_guard().await;
        let current = self.checked_coredump(record).await?;
        if current.state() == CoredumpState::Created && record.state() != CoredumpState::Created {
            return Err(StoreError::InvalidTransition {
                name: format!("{}/{}", record.namespace, record.name),
                from: current.state(),
                to: record.state(),
            });
        }

        let mut updated = current;
        updated.status = record.status.clone();
        updated.spec.volume = record.spec.volume.clone();
        updated.resource_version += 1;
        self.write(
            &Self::coredump_key(&updated.namespace, &updated.name),
            &updated,
        )
        .await?;
        Ok(updated)
    }

    /// Remove a record, returning it as it was stored.
    pub async fn delete_coredump(&self, ns: &str, name: &str) -> Result<Coredump> {
        let _guard = self.store.write_guard().await;
        let key = Self::coredump_key(ns, name);
        let current: Coredump = self.read(&key).await?.ok_or_else(|| StoreError::NotFound {
            kind: "coredump",
            name: format!("{}/{}", ns, name),
        })?;
        self.store.delete(&key).await?;
        info!("Deleted coredump {}/{} ({})", ns, name, current.state());
        Ok(current)
    }

    /// Atomically admit a `Created` record. The record must still be at its
    /// expected version and `quotas` must be exactly the namespace's quotas,
    /// each at its expected version. Quotas are written first, then the
    /// record's new status.
    pub async fn commit_admission(
        &self,
        admitted: &Coredump,
        quotas: &[CoredumpQuota],
    ) -> Result<Coredump> {
        let _guard = self.store.write_guard().await;
        let current = self.checked_decision(admitted, CoredumpState::Allowed).await?;
        self.check_namespace_quotas(&admitted.namespace, quotas).await?;

        self.write_quotas(quotas).await?;
        self.write_status(current, admitted).await
    }

    /// Atomically deny a `Created` record. `quotas` are the namespace quotas
    /// the denial was decided against; if any of them changed, or one was
    /// added or removed, the denial fails with `Conflict` and nothing is written.
    pub async fn deny_coredump(
        &self,
        denied: &Coredump,
        quotas: &[CoredumpQuota],
    ) -> Result<Coredump> {
        let _guard = self.store.write_guard().await;
        let current = self.checked_decision(denied, CoredumpState::Denied).await?;
        self.check_namespace_quotas(&denied.namespace, quotas).await?;
        self.write_status(current, denied).await
    }

    async fn write_status(&self, current: Coredump, decided: &Coredump) -> Result<Coredump> {
        let mut updated = current;
        updated.status = decided.status.clone();
        updated.resource_version += 1;
        self.write(
            &Self::coredump_key(&updated.namespace, &updated.name),
            &updated,
        )
        .await?;
        Ok(updated)
    }

    /// Like `checked_coredump`, but only for the move from `Created` to `to`.
    async fn checked_decision(&self, decided: &Coredump, to: CoredumpState) -> Result<Coredump> {
        let current = self.checked_coredump(decided).await?;
        if current.state() != CoredumpState::Created || decided.state() != to {
            return Err(StoreError::InvalidTransition {
                name: format!("{}/{}", decided.namespace, decided.name),
                from: current.state(),
                to: decided.state(),
            });
        }
        Ok(current)
    }

    /// Load the stored record and verify `expected` may be written over it.
    async fn checked_coredump(&self, expected: &Coredump) -> Result<Coredump> {
        let name = format!("{}/{}", expected.namespace, expected.name);
        let current: Coredump = self
            .read(&Self::coredump_key(&expected.namespace, &expected.name))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "coredump",
                name: name.clone(),
            })?;
        if current.resource_version != expected.resource_version {
            return Err(StoreError::Conflict {
                kind: "coredump",
                name,
                expected: expected.resource_version,
                actual: current.resource_version,
            });
        }
        if !current.state().can_transition_to(expected.state()) {
            return Err(StoreError::InvalidTransition {
                name,
                from: current.state(),
                to: expected.state(),
            });
        }
        Ok(current)
    }

    // ─── Quotas ─────────────────────────────────────────────────────

    /// Create a quota or replace the spec of an existing one. The status of
    /// an existing quota is owned by the controller and is preserved.
    pub async fn put_quota(&self, quota: &CoredumpQuota) -> Result<CoredumpQuota> {
        validate_name(&quota.namespace).map_err(|e| StoreError::Invalid(e.to_string()))?;
        validate_name(&quota.name).map_err(|e| StoreError::Invalid(e.to_string()))?;

        let _guard = self.store.write_guard().await;
        let key = Self::quota_key(&quota.namespace, &quota.name);
        let mut quota = quota.clone();
        match self.read::<CoredumpQuota>(&key).await? {
            Some(existing) => {
                quota.status = existing.status;
                quota.created_at = existing.created_at;
                quota.resource_version = existing.resource_version + 1;
            }
            None => {
                quota.created_at = Utc::now();
                quota.resource_version = 1;
            }
        }
        self.write(&key, &quota).await?;
        info!(
            "Stored quota {}/{} (hard={})",
            quota.namespace, quota.name, quota.spec.hard
        );
        Ok(quota)
    }

    pub async fn get_quota(&self, ns: &str, name: &str) -> Result<CoredumpQuota> {
        self.read(&Self::quota_key(ns, name))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "coredumpquota",
                name: format!("{}/{}", ns, name),
            })
    }

    pub async fn list_quotas(&self, ns: &str) -> Result<Vec<CoredumpQuota>> {
        self.list(&format!("{}{}/", QUOTAS_PREFIX, ns)).await
    }

    pub async fn list_all_quotas(&self) -> Result<Vec<CoredumpQuota>> {
        self.list(QUOTAS_PREFIX).await
    }

    pub async fn delete_quota(&self, ns: &str, name: &str) -> Result<CoredumpQuota> {
        let _guard = self.store.write_guard().await;
        let key = Self::quota_key(ns, name);
        let current: CoredumpQuota =
            self.read(&key).await?.ok_or_else(|| StoreError::NotFound {
                kind: "coredumpquota",
                name: format!("{}/{}", ns, name),
            })?;
        self.store.delete(&key).await?;
        Ok(current)
    }

    /// Write several quotas at once. Either every quota is still at the
    /// version the caller read, and all are written, or nothing is written.
    pub async fn update_quotas(&self, quotas: &[CoredumpQuota]) -> Result<Vec<CoredumpQuota>> {
        let _guard = self.store.write_guard().await;
        self.check_quota_versions(quotas).await?;
        self.write_quotas(quotas).await
    }

    /// `quotas` must name every quota currently in `ns`, each at its stored
    /// version. A quota created since the caller listed reports `Conflict`
    /// with an expected version of 0.
    async fn check_namespace_quotas(&self, ns: &str, quotas: &[CoredumpQuota]) -> Result<()> {
        self.check_quota_versions(quotas).await?;
        for current in self.list_quotas(ns).await? {
            if !quotas.iter().any(|q| q.name == current.name) {
                return Err(StoreError::Conflict {
                    kind: "coredumpquota",
                    name: format!("{}/{}", current.namespace, current.name),
                    expected: 0,
                    actual: current.resource_version,
                });
            }
        }
        Ok(())
    }

    async fn check_quota_versions(&self, quotas: &[CoredumpQuota]) -> Result<()> {
        for quota in quotas {
            let name = format!("{}/{}", quota.namespace, quota.name);
            let current: CoredumpQuota = self
                .read(&Self::quota_key(&quota.namespace, &quota.name))
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    kind: "coredumpquota",
                    name: name.clone(),
                })?;
            if current.resource_version != quota.resource_version {
                return Err(StoreError::Conflict {
                    kind: "coredumpquota",
                    name,
                    expected: quota.resource_version,
                    actual: current.resource_version,
                });
            }
        }
        Ok(())
    }

    async fn write_quotas(&self, quotas: &[CoredumpQuota]) -> Result<Vec<CoredumpQuota>> {
        let mut written = Vec::with_capacity(quotas.len());
        for quota in quotas {
            let mut quota = quota.clone();
            quota.resource_version += 1;
            self.write(&Self::quota_key(&quota.namespace, &quota.name), &quota)
                .await?;
            written.push(quota);
        }
        Ok(written)
    }

    // ─── Pods ───────────────────────────────────────────────────────

    pub async fn put_pod(&self, pod: &Pod) -> Result<Pod> {
        validate_name(&pod.namespace).map_err(|e| StoreError::Invalid(e.to_string()))?;
        if pod.name.is_empty() || pod.uid.is_empty() {
            return Err(StoreError::Invalid("pod needs a name and a uid".to_string()));
        }
        let _guard = self.store.write_guard().await;
        self.write(&Self::pod_key(&pod.namespace, &pod.name), pod)
            .await?;
        Ok(pod.clone())
    }

    pub async fn get_pod(&self, ns: &str, name: &str) -> Result<Pod> {
        self.read(&Self::pod_key(ns, name))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "pod",
                name: format!("{}/{}", ns, name),
            })
    }

    pub async fn delete_pod(&self, ns: &str, name: &str) -> Result<()> {
        let _guard = self.store.write_guard().await;
        let key = Self::pod_key(ns, name);
        if self.store.get(&key).await?.is_none() {
            return Err(StoreError::NotFound {
                kind: "pod",
                name: format!("{}/{}", ns, name),
            });
        }
        self.store.delete(&key).await?;
        Ok(())
    }
}
