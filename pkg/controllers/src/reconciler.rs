use pkg_state::{Registry, StoreError};
use pkg_types::Quantity;
use pkg_types::coredump::{ALLOWED_MESSAGE, Coredump, CoredumpState};
use pkg_types::quota::CoredumpQuota;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use pkg_constants::controller::DEFAULT_MAX_CONFLICT_RETRIES;

type Result<T> = std::result::Result<T, StoreError>;

/// Result of checking a dump against the quotas of its namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionDecision {
    /// Quotas with the dump's size added to `status.used`.
    Allowed { quotas: Vec<CoredumpQuota> },
    Denied { message: String },
}

/// Decide whether a dump of `size` fits every quota. The first quota that
/// would be exceeded denies the dump; nothing is reserved in that case.
pub fn check_admission(quotas: &[CoredumpQuota], size: Quantity) -> AdmissionDecision {
    for quota in quotas {
        let candidate = quota.used().saturating_add(size);
        if candidate > quota.hard() {
            return AdmissionDecision::Denied {
                message: format!(
                    "Quota exceeded, required {}, but {} has only {}",
                    candidate,
                    quota.name,
                    quota.hard()
                ),
            };
        }
    }

    let quotas = quotas
        .iter()
        .map(|quota| {
            let mut quota = quota.clone();
            quota.status.used = Some(quota.used().saturating_add(size));
            quota.status.hard = Some(quota.spec.hard);
            quota
        })
        .collect();
    AdmissionDecision::Allowed { quotas }
}

/// What `admit` did with a record.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmitOutcome {
    Allowed(Coredump),
    Denied(Coredump),
    /// The record is gone or already past `Created`.
    Skipped,
}

/// Outcome of a usage recomputation for one namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    /// Event sequence the recomputation reflects.
    pub seq: u64,
    /// Quotas whose status had drifted and was rewritten.
    pub repaired: Vec<CoredumpQuota>,
}

/// Quota arithmetic for coredump records. Every write is a compare-and-swap
/// against the versions just read; on conflict the inputs are re-read and
/// the decision is taken again, up to `max_conflict_retries` times.
#[derive(Clone)]
pub struct QuotaReconciler {
    registry: Registry,
    max_conflict_retries: u32,
}

impl QuotaReconciler {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Admit or deny a `Created` record against its namespace's quotas.
    pub async fn admit(&self, record: &Coredump) -> Result<AdmitOutcome> {
        let mut current = record.clone();
        let mut attempt = 0;
        loop {
            if current.state() != CoredumpState::Created {
                return Ok(AdmitOutcome::Skipped);
            }
            let result = self.try_admit(&current).await;
            match result {
                // A quota or the record itself may have changed or vanished.
                Err(e)
                    if (e.is_conflict() || e.is_not_found())
                        && attempt < self.max_conflict_retries =>
                {
                    attempt += 1;
                    debug!(
                        "Admission of {}/{} must be retried (attempt {}): {}",
                        current.namespace, current.name, attempt, e
                    );
                    current = match self
                        .registry
                        .get_coredump(&current.namespace, &current.name)
                        .await
                    {
                        Ok(fresh) => fresh,
                        Err(e) if e.is_not_found() => return Ok(AdmitOutcome::Skipped),
                        Err(e) => return Err(e),
                    };
                }
                other => return other,
            }
        }
    }

    async fn try_admit(&self, record: &Coredump) -> Result<AdmitOutcome> {
        let quotas = self.registry.list_quotas(&record.namespace).await?;
        let mut next = record.clone();

        match check_admission(&quotas, record.size()) {
            AdmissionDecision::Denied { message } => {
                next.status.state = CoredumpState::Denied;
                next.status.message = message;
                let denied = self.registry.deny_coredump(&next, &quotas).await?;
                info!(
                    "Denied coredump {}/{}: {}",
                    denied.namespace, denied.name, denied.status.message
                );
                Ok(AdmitOutcome::Denied(denied))
            }
            AdmissionDecision::Allowed { quotas } => {
                next.status.state = CoredumpState::Allowed;
                next.status.message = ALLOWED_MESSAGE.to_string();
                let allowed = self.registry.commit_admission(&next, &quotas).await?;
                info!(
                    "Allowed coredump {}/{} ({}) against {} quota(s)",
                    allowed.namespace,
                    allowed.name,
                    allowed.spec.size,
                    quotas.len()
                );
                Ok(AdmitOutcome::Allowed(allowed))
            }
        }
    }

    /// Return the size of a deleted record to every quota of its namespace.
    /// Records that never held quota release nothing.
    pub async fn release(&self, record: &Coredump) -> Result<Vec<CoredumpQuota>> {
        if !record.state().holds_quota() {
            return Ok(Vec::new());
        }
        let size = record.size();
        let mut attempt = 0;
        loop {
            let quotas = self.registry.list_quotas(&record.namespace).await?;
            let released: Vec<CoredumpQuota> = quotas
                .into_iter()
                .map(|mut quota| {
                    if quota.used() < size {
                        warn!(
                            "Quota {}/{} uses {} but releasing {} for {}, clamping to 0",
                            quota.namespace,
                            quota.name,
                            quota.used(),
                            size,
                            record.name
                        );
                    }
                    quota.status.used = Some(quota.used().saturating_sub(size));
                    quota.status.hard = Some(quota.spec.hard);
                    quota
                })
                .collect();

            match self.registry.update_quotas(&released).await {
                Ok(written) => {
                    info!(
                        "Released {} of coredump {}/{} from {} quota(s)",
                        size,
                        record.namespace,
                        record.name,
                        written.len()
                    );
                    return Ok(written);
                }
                Err(e) if e.is_conflict() && attempt < self.max_conflict_retries => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Recompute `used` for every quota in `ns` as the total size of the
    /// records that hold quota, and rewrite the quotas that disagree.
    pub async fn reconcile_usage(&self, ns: &str) -> Result<UsageReport> {
        let mut attempt = 0;
        loop {
            // Quotas are read before the records so that an admission landing
            // in between fails the version check below.
            let quotas = self.registry.list_quotas(ns).await?;
            let (records, seq) = self.registry.snapshot_coredumps(ns).await?;
            let total = records
                .iter()
                .filter(|r| r.state().holds_quota())
                .fold(Quantity::ZERO, |acc, r| acc.saturating_add(r.size()));

            let drifted: Vec<CoredumpQuota> = quotas
                .into_iter()
                .filter(|q| q.used() != total || q.status.hard != Some(q.spec.hard))
                .map(|mut q| {
                    if q.used() != total {
                        warn!(
                            "Quota {}/{} drifted: used {}, admitted dumps total {}",
                            q.namespace,
                            q.name,
                            q.used(),
                            total
                        );
                    }
                    q.status.used = Some(total);
                    q.status.hard = Some(q.spec.hard);
                    q
                })
                .collect();

            if drifted.is_empty() {
                return Ok(UsageReport {
                    seq,
                    repaired: Vec::new(),
                });
            }
            match self.registry.update_quotas(&drifted).await {
                Ok(repaired) => return Ok(UsageReport { seq, repaired }),
                Err(e) if e.is_conflict() && attempt < self.max_conflict_retries => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Namespaces that have coredump records or quotas.
    pub async fn namespaces(&self) -> Result<HashSet<String>> {
        let mut namespaces: HashSet<String> = self
            .registry
            .list_coredumps(None)
            .await?
            .into_iter()
            .map(|r| r.namespace)
            .collect();
        namespaces.extend(
            self.registry
                .list_all_quotas()
                .await?
                .into_iter()
                .map(|q| q.namespace),
        );
        Ok(namespaces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_state::StateStore;
    use pkg_types::crd::CustomResourceDefinition;
    use pkg_types::identity::WorkloadIdentity;

    fn quota(name: &str, hard: u64, used: Option<u64>) -> CoredumpQuota {
        let mut q = CoredumpQuota::new("default", name, Quantity::from_bytes(hard));
        q.status.used = used.map(Quantity::from_bytes);
        q
    }

    fn dump(time: i64, size: u64) -> Coredump {
        let identity = WorkloadIdentity {
            namespace: "default".to_string(),
            pod: "web-0".to_string(),
            uid: "abc".to_string(),
            container: "nginx".to_string(),
        };
        Coredump::new(&identity, 4021, "nginx", time, Quantity::from_bytes(size))
    }

    async fn setup() -> (tempfile::TempDir, QuotaReconciler) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_str().unwrap()).await.unwrap();
        let registry = Registry::new(store);
        registry
            .ensure_definition(&CustomResourceDefinition::coredumps())
            .await
            .unwrap();
        (dir, QuotaReconciler::new(registry))
    }

    #[test]
    fn test_decision_denies_over_hard_limit() {
        let decision = check_admission(&[quota("dumps", 100, Some(80))], Quantity::from_bytes(30));
        assert_eq!(
            decision,
            AdmissionDecision::Denied {
                message: "Quota exceeded, required 110, but dumps has only 100".to_string()
            }
        );
    }

    #[test]
    fn test_decision_allows_and_reserves() {
        let decision = check_admission(&[quota("dumps", 100, Some(80))], Quantity::from_bytes(15));
        let AdmissionDecision::Allowed { quotas } = decision else {
            panic!("expected admission");
        };
        assert_eq!(quotas[0].used(), Quantity::from_bytes(95));
        assert_eq!(quotas[0].status.hard, Some(Quantity::from_bytes(100)));
    }

    #[test]
    fn test_decision_any_quota_denies() {
        let quotas = [quota("big", 1000, None), quota("small", 10, Some(5))];
        let decision = check_admission(&quotas, Quantity::from_bytes(6));
        assert!(matches!(decision, AdmissionDecision::Denied { message } if message.contains("small")));
    }

    #[test]
    fn test_decision_without_quotas_admits() {
        assert_eq!(
            check_admission(&[], Quantity::from_bytes(1 << 40)),
            AdmissionDecision::Allowed { quotas: Vec::new() }
        );
    }

    #[tokio::test]
    async fn test_admit_then_deny() {
        let (_dir, reconciler) = setup().await;
        let registry = reconciler.registry().clone();
        registry.put_quota(&quota("dumps", 100, Some(80))).await.unwrap();

        let small = registry.create_coredump(&dump(1, 15)).await.unwrap();
        let AdmitOutcome::Allowed(allowed) = reconciler.admit(&small).await.unwrap() else {
            panic!("expected admission");
        };
        assert_eq!(allowed.status.message, ALLOWED_MESSAGE);
        let q = registry.get_quota("default", "dumps").await.unwrap();
        assert_eq!(q.used(), Quantity::from_bytes(95));

        let big = registry.create_coredump(&dump(2, 30)).await.unwrap();
        let AdmitOutcome::Denied(denied) = reconciler.admit(&big).await.unwrap() else {
            panic!("expected denial");
        };
        assert!(denied.status.message.contains("dumps"));
        let q2 = registry.get_quota("default", "dumps").await.unwrap();
        assert_eq!(q2.used(), Quantity::from_bytes(95));
        assert_eq!(q2.resource_version, q.resource_version);

        // Already decided.
        assert_eq!(reconciler.admit(&denied).await.unwrap(), AdmitOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_status_writes_cannot_skip_admission() {
        let (_dir, reconciler) = setup().await;
        let registry = reconciler.registry().clone();
        registry.put_quota(&quota("dumps", 100, None)).await.unwrap();

        let first = registry.create_coredump(&dump(1, 60)).await.unwrap();
        assert!(matches!(
            reconciler.admit(&first).await.unwrap(),
            AdmitOutcome::Allowed(_)
        ));

        let second = registry.create_coredump(&dump(2, 50)).await.unwrap();
        let mut forged = second.clone();
        forged.status.state = CoredumpState::Allowed;
        assert!(registry.update_coredump_status(&forged).await.is_err());

        // The record is still pending and gets a real decision.
        assert!(matches!(
            reconciler.admit(&second).await.unwrap(),
            AdmitOutcome::Denied(_)
        ));
        let gone = registry.delete_coredump("default", &second.name).await.unwrap();
        assert!(reconciler.release(&gone).await.unwrap().is_empty());
        assert_eq!(
            registry.get_quota("default", "dumps").await.unwrap().used(),
            Quantity::from_bytes(60)
        );
    }

    #[tokio::test]
    async fn test_admit_with_stale_record_rereads() {
        let (_dir, reconciler) = setup().await;
        let registry = reconciler.registry().clone();
        let created = registry.create_coredump(&dump(1, 10)).await.unwrap();

        let mut stale = created.clone();
        stale.resource_version = 0;
        assert!(matches!(
            reconciler.admit(&stale).await.unwrap(),
            AdmitOutcome::Allowed(_)
        ));
    }

    #[tokio::test]
    async fn test_release_only_for_quota_holders() {
        let (_dir, reconciler) = setup().await;
        let registry = reconciler.registry().clone();
        registry.put_quota(&quota("dumps", 100, None)).await.unwrap();
        registry.put_quota(&quota("backup", 50, None)).await.unwrap();

        let allowed = registry.create_coredump(&dump(1, 20)).await.unwrap();
        reconciler.admit(&allowed).await.unwrap();
        let denied = registry.create_coredump(&dump(2, 80)).await.unwrap();
        assert!(matches!(
            reconciler.admit(&denied).await.unwrap(),
            AdmitOutcome::Denied(_)
        ));

        let gone = registry.delete_coredump("default", &denied.name).await.unwrap();
        assert!(reconciler.release(&gone).await.unwrap().is_empty());
        for q in registry.list_quotas("default").await.unwrap() {
            assert_eq!(q.used(), Quantity::from_bytes(20));
        }

        let gone = registry.delete_coredump("default", &allowed.name).await.unwrap();
        assert_eq!(reconciler.release(&gone).await.unwrap().len(), 2);
        for q in registry.list_quotas("default").await.unwrap() {
            assert_eq!(q.used(), Quantity::ZERO);
        }
    }

    #[tokio::test]
    async fn test_admit_then_delete_restores_usage() {
        let (_dir, reconciler) = setup().await;
        let registry = reconciler.registry().clone();
        registry.put_quota(&quota("dumps", 100, Some(42))).await.unwrap();

        let record = registry.create_coredump(&dump(1, 10)).await.unwrap();
        reconciler.admit(&record).await.unwrap();
        assert_eq!(
            registry.get_quota("default", "dumps").await.unwrap().used(),
            Quantity::from_bytes(52)
        );

        let gone = registry.delete_coredump("default", &record.name).await.unwrap();
        reconciler.release(&gone).await.unwrap();
        assert_eq!(
            registry.get_quota("default", "dumps").await.unwrap().used(),
            Quantity::from_bytes(42)
        );
    }

    #[tokio::test]
    async fn test_release_clamps_at_zero() {
        let (_dir, reconciler) = setup().await;
        let registry = reconciler.registry().clone();
        let record = registry.create_coredump(&dump(1, 10)).await.unwrap();
        reconciler.admit(&record).await.unwrap();
        registry.put_quota(&quota("late", 100, None)).await.unwrap();

        let gone = registry.delete_coredump("default", &record.name).await.unwrap();
        let released = reconciler.release(&gone).await.unwrap();
        assert_eq!(released[0].used(), Quantity::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_lose_no_update() {
        let (_dir, reconciler) = setup().await;
        let reconciler = reconciler.with_max_conflict_retries(64);
        let registry = reconciler.registry().clone();
        registry.put_quota(&quota("dumps", 1000, None)).await.unwrap();

        let mut records = Vec::new();
        for i in 0..16 {
            records.push(registry.create_coredump(&dump(i, 7)).await.unwrap());
        }

        let mut handles = Vec::new();
        for record in records {
            let reconciler = reconciler.clone();
            handles.push(tokio::spawn(async move { reconciler.admit(&record).await }));
        }
        for handle in handles {
            assert!(matches!(
                handle.await.unwrap().unwrap(),
                AdmitOutcome::Allowed(_)
            ));
        }

        let q = registry.get_quota("default", "dumps").await.unwrap();
        assert_eq!(q.used(), Quantity::from_bytes(16 * 7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_exceed_hard() {
        let (_dir, reconciler) = setup().await;
        let reconciler = reconciler.with_max_conflict_retries(64);
        let registry = reconciler.registry().clone();
        registry.put_quota(&quota("dumps", 50, None)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let record = registry.create_coredump(&dump(i, 10)).await.unwrap();
            let reconciler = reconciler.clone();
            handles.push(tokio::spawn(async move { reconciler.admit(&record).await }));
        }
        let mut allowed = 0;
        for handle in handles {
            if let AdmitOutcome::Allowed(_) = handle.await.unwrap().unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
        let q = registry.get_quota("default", "dumps").await.unwrap();
        assert_eq!(q.used(), Quantity::from_bytes(50));
    }

    #[tokio::test]
    async fn test_reconcile_usage_repairs_drift() {
        let (_dir, reconciler) = setup().await;
        let registry = reconciler.registry().clone();
        let record = registry.create_coredump(&dump(1, 10)).await.unwrap();
        reconciler.admit(&record).await.unwrap();
        registry.put_quota(&quota("dumps", 100, Some(77))).await.unwrap();

        let report = reconciler.reconcile_usage("default").await.unwrap();
        assert_eq!(report.repaired.len(), 1);
        assert_eq!(report.repaired[0].used(), Quantity::from_bytes(10));

        let again = reconciler.reconcile_usage("default").await.unwrap();
        assert!(again.repaired.is_empty());
        assert!(again.seq >= report.seq);
    }
}
