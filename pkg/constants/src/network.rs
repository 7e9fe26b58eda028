//! Network-related constants.

/// Default port for the coredump API server.
pub const DEFAULT_API_PORT: u16 = 6443;

/// Default API server address (HTTP) used by the detector and the CLI.
pub const DEFAULT_API_ADDR: &str = "http://127.0.0.1:6443";

/// API group serving coredump and quota records.
pub const COREDUMP_API_GROUP: &str = "coredump.k8s.io";

/// API version of the coredump group.
pub const COREDUMP_API_VERSION: &str = "v1alpha1";
