//! Quota controller constants.

/// How often the quota controller re-evaluates pending records and usage.
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 30;

/// How many times an admission or release is retried after a version conflict.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 8;
