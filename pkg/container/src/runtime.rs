use anyhow::Result;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::cri::CriInspector;
use crate::docker::DockerInspector;
use crate::inspect::ContainerInspector;
use pkg_constants::paths::PROC_ROOT;

/// Container runtime flavour the node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Docker,
    Cri,
}

impl FromStr for RuntimeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(RuntimeKind::Docker),
            "cri" | "containerd" | "cri-o" => Ok(RuntimeKind::Cri),
            other => anyhow::bail!("unknown container runtime '{}' (expected docker or cri)", other),
        }
    }
}

/// Build the inspector for the selected runtime.
pub fn inspector_for(
    kind: RuntimeKind,
    docker_bin: &str,
    crictl_bin: &str,
) -> Arc<dyn ContainerInspector> {
    match kind {
        RuntimeKind::Docker => {
            info!("Using docker runtime inspector ({})", docker_bin);
            Arc::new(DockerInspector::new(docker_bin))
        }
        RuntimeKind::Cri => {
            info!("Using CRI runtime inspector ({})", crictl_bin);
            Arc::new(CriInspector::new(crictl_bin, Path::new(PROC_ROOT)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_kind_parse() {
        assert_eq!("docker".parse::<RuntimeKind>().unwrap(), RuntimeKind::Docker);
        assert_eq!("CRI".parse::<RuntimeKind>().unwrap(), RuntimeKind::Cri);
        assert_eq!("containerd".parse::<RuntimeKind>().unwrap(), RuntimeKind::Cri);
        assert!("podman".parse::<RuntimeKind>().is_err());
    }

    #[test]
    fn test_inspector_names() {
        assert_eq!(inspector_for(RuntimeKind::Docker, "docker", "crictl").name(), "docker");
        assert_eq!(inspector_for(RuntimeKind::Cri, "docker", "crictl").name(), "cri");
    }
}
