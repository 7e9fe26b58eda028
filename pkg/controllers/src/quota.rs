use pkg_constants::state::COREDUMPS_PREFIX;
use pkg_state::watch::{EventLog, EventType, WatchEvent};
use pkg_types::coredump::{Coredump, CoredumpState};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::reconciler::{AdmitOutcome, QuotaReconciler};
use pkg_constants::controller::DEFAULT_RESYNC_INTERVAL_SECS;

/// Controller that keeps coredump quota usage in line with the lifecycle of
/// coredump records.
///
/// New `Created` records are admitted or denied, deleted records that held
/// quota release it. A periodic resync re-runs admission for records still
/// `Created` and repairs usage drift.
pub struct QuotaController {
    reconciler: QuotaReconciler,
    events: EventLog,
    resync_interval: Duration,
    /// Last seen state of every record, keyed by `{ns}/{name}`.
    cache: HashMap<String, Coredump>,
    /// Highest resource version already acted on, per record. Covers the
    /// controller's own status writes.
    processed: HashMap<String, u64>,
    /// Per namespace, the event sequence up to which usage was recomputed
    /// from scratch.
    reconciled: HashMap<String, u64>,
    /// Last event sequence handled.
    last_seq: u64,
}

impl QuotaController {
    pub fn new(reconciler: QuotaReconciler) -> Self {
        let events = reconciler.registry().store().event_log.clone();
        Self {
            reconciler,
            events,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            cache: HashMap::new(),
            processed: HashMap::new(),
            reconciled: HashMap::new(),
            last_seq: 0,
        }
    }

    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    /// Start the controller loop as a background task. The first resync
    /// runs immediately.
    pub fn start(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "QuotaController started (resync={}s)",
                self.resync_interval.as_secs()
            );
            let mut event_rx = self.events.subscribe();
            self.last_seq = self.events.current_seq().await;
            let mut interval = tokio::time::interval(self.resync_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.resync().await;
                    }
                    result = event_rx.recv() => {
                        match result {
                            Ok(event) => self.observe(event).await,
                            Err(RecvError::Lagged(missed)) => {
                                warn!("QuotaController lagged behind by {} events", missed);
                                self.catch_up().await;
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
            }
            info!("QuotaController stopped");
        })
    }

    /// Replay the buffered events missed after a lag, or resync when the
    /// buffer no longer reaches back far enough.
    async fn catch_up(&mut self) {
        if self.events.covers(self.last_seq).await {
            for event in self.events.events_since(self.last_seq).await {
                self.observe(event).await;
            }
        } else {
            warn!("Event buffer no longer covers seq {}, resyncing", self.last_seq);
            self.resync().await;
        }
    }

    async fn observe(&mut self, event: WatchEvent) {
        if event.seq <= self.last_seq {
            return;
        }
        self.last_seq = event.seq;

        let Some(key) = event.key.strip_prefix(COREDUMPS_PREFIX) else {
            return;
        };
        let key = key.to_string();
        let Some(value) = event.value.as_deref() else {
            return;
        };
        let record: Coredump = match serde_json::from_slice(value) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping undecodable coredump event {}: {}", event.key, e);
                return;
            }
        };

        match event.event_type {
            EventType::Put => self.on_put(key, record).await,
            EventType::Delete => self.on_delete(key, record, event.seq).await,
        }
    }

    async fn on_put(&mut self, key: String, record: Coredump) {
        let previous = self.cache.insert(key.clone(), record.clone());
        if self
            .processed
            .get(&key)
            .is_some_and(|seen| *seen >= record.resource_version)
        {
            debug!("Coredump {} v{} already handled", key, record.resource_version);
            return;
        }

        match (previous, record.state()) {
            (_, CoredumpState::Created) => self.admit(key, record).await,
            (Some(prev), state) if prev.state() != state => {
                info!("Coredump {} moved {} -> {}", key, prev.state(), state);
                self.processed.insert(key, record.resource_version);
            }
            _ => {
                self.processed.insert(key, record.resource_version);
            }
        }
    }

    async fn on_delete(&mut self, key: String, record: Coredump, seq: u64) {
        self.cache.remove(&key);
        self.processed.remove(&key);

        if !record.state().holds_quota() {
            debug!("Coredump {} ({}) deleted, nothing reserved", key, record.state());
            return;
        }
        if self
            .reconciled
            .get(&record.namespace)
            .is_some_and(|upto| *upto >= seq)
        {
            debug!("Coredump {} deletion already reflected in usage", key);
            return;
        }
        if let Err(e) = self.reconciler.release(&record).await {
            error!(
                "Failed to release {} for deleted coredump {} (pod {}, uid {}): {}",
                record.spec.size, key, record.spec.pod, record.spec.uid, e
            );
        }
    }

    async fn admit(&mut self, key: String, record: Coredump) {
        match self.reconciler.admit(&record).await {
            Ok(AdmitOutcome::Allowed(updated)) | Ok(AdmitOutcome::Denied(updated)) => {
                self.processed.insert(key.clone(), updated.resource_version);
                self.cache.insert(key, updated);
            }
            Ok(AdmitOutcome::Skipped) => {
                self.processed.insert(key, record.resource_version);
            }
            Err(e) => {
                // Left Created; the next resync retries.
                error!(
                    "Failed to admit coredump {} ({}, pod {}, uid {}): {}",
                    key, record.spec.size, record.spec.pod, record.spec.uid, e
                );
            }
        }
    }

    /// Rebuild the cache from the store, admit every record still `Created`
    /// and recompute usage per namespace.
    async fn resync(&mut self) {
        let records = match self.reconciler.registry().list_coredumps(None).await {
            Ok(records) => records,
            Err(e) => {
                warn!("QuotaController resync failed to list coredumps: {}", e);
                return;
            }
        };

        self.cache = records
            .iter()
            .map(|r| (format!("{}/{}", r.namespace, r.name), r.clone()))
            .collect();
        self.processed.retain(|key, _| self.cache.contains_key(key));

        let pending: Vec<Coredump> = records
            .into_iter()
            .filter(|r| r.state() == CoredumpState::Created)
            .collect();
        if !pending.is_empty() {
            info!("Resync: {} coredump(s) awaiting admission", pending.len());
        }
        for record in pending {
            let key = format!("{}/{}", record.namespace, record.name);
            self.admit(key, record).await;
        }

        let namespaces = match self.reconciler.namespaces().await {
            Ok(namespaces) => namespaces,
            Err(e) => {
                warn!("QuotaController resync failed to list namespaces: {}", e);
                return;
            }
        };
        for ns in namespaces {
            match self.reconciler.reconcile_usage(&ns).await {
                Ok(report) => {
                    if !report.repaired.is_empty() {
                        info!("Resync: repaired {} quota(s) in {}", report.repaired.len(), ns);
                    }
                    self.reconciled.insert(ns, report.seq);
                }
                Err(e) => warn!("Resync: failed to reconcile usage in {}: {}", ns, e),
            }
        }
    }
}
