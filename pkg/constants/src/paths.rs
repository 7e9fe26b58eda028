//! Filesystem path constants.

// ─── Server ────────────────────────────────────────────────────────────────

/// Default config file path for the server.
pub const DEFAULT_SERVER_CONFIG: &str = "/etc/coredump/server.yaml";

/// Default data directory for the server state store.
pub const DEFAULT_SERVER_DATA_DIR: &str = "/var/lib/coredump/data";

// ─── Detector ─────────────────────────────────────────────────────────────

/// Default config file path for the detector.
pub const DEFAULT_DETECTOR_CONFIG: &str = "/etc/coredump/detector.yaml";

/// Root directory where dump files are written.
pub const DEFAULT_DUMP_DIR: &str = "/var/coredump";

/// Subdirectory of the dump root for dumps that cannot be attributed to a pod.
pub const HOST_LEVEL_DIR: &str = "others";

// ─── Container runtime ────────────────────────────────────────────────────

/// Docker CLI used by the docker inspector.
pub const DEFAULT_DOCKER_BIN: &str = "docker";

/// crictl CLI used by the CRI inspector.
pub const DEFAULT_CRICTL_BIN: &str = "crictl";

/// procfs mount point scanned when building CRI process tables.
pub const PROC_ROOT: &str = "/proc";
