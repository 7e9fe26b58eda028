use chrono::{DateTime, Utc};
use pkg_constants::network::{COREDUMP_API_GROUP, COREDUMP_API_VERSION};
use serde::{Deserialize, Serialize};

pub const COREDUMP_PLURAL: &str = "coredumps";
pub const COREDUMP_QUOTA_PLURAL: &str = "coredumpquotas";

/// Registration of a record type with the object store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomResourceDefinition {
    /// `{plural}.{group}`
    pub name: String,
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    #[serde(default = "namespaced_default")]
    pub namespaced: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn namespaced_default() -> bool {
    true
}

impl CustomResourceDefinition {
    pub fn new(kind: &str, plural: &str) -> Self {
        Self {
            name: format!("{}.{}", plural, COREDUMP_API_GROUP),
            group: COREDUMP_API_GROUP.to_string(),
            version: COREDUMP_API_VERSION.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            namespaced: true,
            created_at: None,
        }
    }

    pub fn coredumps() -> Self {
        Self::new("Coredump", COREDUMP_PLURAL)
    }

    pub fn coredump_quotas() -> Self {
        Self::new("CoredumpQuota", COREDUMP_QUOTA_PLURAL)
    }

    /// Every record type this system stores.
    pub fn builtin() -> [Self; 2] {
        [Self::coredumps(), Self::coredump_quotas()]
    }
}
