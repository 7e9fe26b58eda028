use serde::{Deserialize, Serialize};

/// Server configuration file (YAML).
///
/// Example `server.yaml`:
/// ```yaml
/// port: 6443
/// data-dir: /var/lib/coredump/data
/// resync-interval-secs: 30
/// max-conflict-retries: 8
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigFile {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default, alias = "resync-interval-secs")]
    pub resync_interval_secs: Option<u64>,
    #[serde(default, alias = "max-conflict-retries")]
    pub max_conflict_retries: Option<u32>,
}

/// Detector configuration file (YAML).
///
/// Example `detector.yaml`:
/// ```yaml
/// server: http://10.0.0.1:6443
/// dump-dir: /var/coredump
/// runtime: cri
/// crictl-bin: /usr/local/bin/crictl
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorConfigFile {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default, alias = "dump-dir")]
    pub dump_dir: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default, alias = "docker-bin")]
    pub docker_bin: Option<String>,
    #[serde(default, alias = "crictl-bin")]
    pub crictl_bin: Option<String>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
