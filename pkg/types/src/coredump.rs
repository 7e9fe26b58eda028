use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::WorkloadIdentity;
use crate::quantity::Quantity;
use crate::validate::sanitize_object_name;

/// Status message attached to every freshly registered record.
pub const CREATED_MESSAGE: &str =
    "Created, not saved yet, need to check quota and then save it to persistent volume";

/// Status message attached when the quota controller admits a record.
pub const ALLOWED_MESSAGE: &str = "Ready for saving to persistent volume";

// --- Lifecycle ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum CoredumpState {
    /// Registered by the detector, waiting for a quota decision.
    #[default]
    Created,
    /// Rejected by the quota controller; the dump stays in the host cache only.
    Denied,
    /// Admitted against every quota of the namespace.
    Allowed,
    /// Persisted long-term by the saver.
    Saved,
    /// The saver gave up after admission.
    FailedToSave,
}

impl CoredumpState {
    /// Whether a record in this state has its size counted in the namespace quotas.
    pub fn holds_quota(self) -> bool {
        matches!(
            self,
            CoredumpState::Allowed | CoredumpState::Saved | CoredumpState::FailedToSave
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CoredumpState::Denied | CoredumpState::Saved | CoredumpState::FailedToSave
        )
    }

    /// States only move forward. Re-writing the same state (e.g. to change
    /// the message) is allowed.
    pub fn can_transition_to(self, next: CoredumpState) -> bool {
        use CoredumpState::*;
        self == next
            || matches!(
                (self, next),
                (Created, Denied) | (Created, Allowed) | (Allowed, Saved) | (Allowed, FailedToSave)
            )
    }
}

impl std::fmt::Display for CoredumpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoredumpState::Created => write!(f, "Created"),
            CoredumpState::Denied => write!(f, "Denied"),
            CoredumpState::Allowed => write!(f, "Allowed"),
            CoredumpState::Saved => write!(f, "Saved"),
            CoredumpState::FailedToSave => write!(f, "FailedToSave"),
        }
    }
}

// --- Spec / status ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoredumpSpec {
    pub container_name: String,
    pub pod: String,
    pub uid: String,
    /// PID of the crashed process as seen in the initial PID namespace.
    pub pid: u32,
    /// Executable name reported by the kernel.
    pub filename: String,
    /// Kernel time of the dump.
    pub dump_time: DateTime<Utc>,
    /// Persistent volume the saver wrote the dump to (empty until saved).
    #[serde(default)]
    pub volume: String,
    pub size: Quantity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CoredumpStatus {
    #[serde(default)]
    pub state: CoredumpState,
    #[serde(default)]
    pub message: String,
}

// --- Coredump ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coredump {
    /// Server-assigned unique id.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub spec: CoredumpSpec,
    #[serde(default)]
    pub status: CoredumpStatus,
    /// Bumped by the registry on every write; used for compare-and-swap.
    #[serde(default)]
    pub resource_version: u64,
    pub created_at: DateTime<Utc>,
}

impl Coredump {
    /// Build a new record in state `Created` for a dump owned by `identity`.
    pub fn new(
        identity: &WorkloadIdentity,
        pid: u32,
        filename: &str,
        time: i64,
        size: Quantity,
    ) -> Self {
        Self {
            id: String::new(),
            name: Self::record_name(filename, &identity.pod, time),
            namespace: identity.namespace.clone(),
            spec: CoredumpSpec {
                container_name: identity.container.clone(),
                pod: identity.pod.clone(),
                uid: identity.uid.clone(),
                pid,
                filename: filename.to_string(),
                dump_time: DateTime::from_timestamp(time, 0).unwrap_or_default(),
                volume: String::new(),
                size,
            },
            status: CoredumpStatus {
                state: CoredumpState::Created,
                message: CREATED_MESSAGE.to_string(),
            },
            resource_version: 0,
            created_at: Utc::now(),
        }
    }

    /// Object name of the record for a dump: `coredump-{filename}-{pod}-{time}`.
    pub fn record_name(filename: &str, pod: &str, time: i64) -> String {
        sanitize_object_name(&format!("coredump-{}-{}-{}", filename, pod, time))
    }

    pub fn state(&self) -> CoredumpState {
        self.status.state
    }

    pub fn size(&self) -> Quantity {
        self.spec.size
    }

    pub fn identity(&self) -> WorkloadIdentity {
        WorkloadIdentity {
            namespace: self.namespace.clone(),
            pod: self.spec.pod.clone(),
            uid: self.spec.uid.clone(),
            container: self.spec.container_name.clone(),
        }
    }
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
    fn new_record_starts_created() {
        let cd = Coredump::new(&identity(), 4242, "nginx", 1_700_000_000, Quantity::from_bytes(2048));
        assert_eq!(cd.name, "coredump-nginx-web-0-1700000000");
        assert_eq!(cd.namespace, "default");
        assert_eq!(cd.state(), CoredumpState::Created);
        assert_eq!(cd.status.message, CREATED_MESSAGE);
        assert_eq!(cd.spec.dump_time.timestamp(), 1_700_000_000);
        assert_eq!(cd.spec.size.to_string(), "2Ki");
        assert_eq!(cd.identity(), identity());
    }

    #[test]
    fn record_name_is_sanitized() {
        assert_eq!(
            Coredump::record_name("My_App", "web-0", 12),
            "coredump-my-app-web-0-12"
        );
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        use CoredumpState::*;
        assert!(Created.can_transition_to(Allowed));
        assert!(Created.can_transition_to(Denied));
        assert!(Allowed.can_transition_to(Saved));
        assert!(Allowed.can_transition_to(FailedToSave));
        assert!(Allowed.can_transition_to(Allowed));
        assert!(!Allowed.can_transition_to(Created));
        assert!(!Denied.can_transition_to(Allowed));
        assert!(!Saved.can_transition_to(FailedToSave));
        assert!(!Created.can_transition_to(Saved));
    }

    #[test]
    fn quota_holding_states() {
        assert!(!CoredumpState::Created.holds_quota());
        assert!(!CoredumpState::Denied.holds_quota());
        assert!(CoredumpState::Allowed.holds_quota());
        assert!(CoredumpState::Saved.holds_quota());
        assert!(CoredumpState::FailedToSave.holds_quota());
    }
}
