//! State store / registry constants.

/// Key prefix for registered record-type definitions.
pub const DEFINITIONS_PREFIX: &str = "/registry/customresourcedefinitions/";

/// Key prefix for coredump records (`{prefix}{namespace}/{name}`).
pub const COREDUMPS_PREFIX: &str = "/registry/coredumps/";

/// Key prefix for coredump quota records (`{prefix}{namespace}/{name}`).
pub const QUOTAS_PREFIX: &str = "/registry/coredumpquotas/";

/// Key prefix for pod metadata (`{prefix}{namespace}/{name}`).
pub const PODS_PREFIX: &str = "/registry/pods/";

/// Number of recent watch events kept for replay.
pub const EVENT_LOG_CAPACITY: usize = 4096;

/// Capacity of the live broadcast channel feeding watchers.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
