use anyhow::{Result, anyhow};
use async_trait::async_trait;
use pkg_types::identity::WorkloadIdentity;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::inspect::{ContainerHandle, ContainerInspector, IdentityError, ProcessTable};

/// CRI runtime backend — invokes `crictl` against the node's runtime socket.
///
/// Workload identity comes from the pod sandbox metadata. CRI has no `top`,
/// so process tables are built from procfs: every process sharing the PID
/// namespace of the container's init process.
pub struct CriInspector {
    crictl_bin: String,
    proc_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CriContainerList {
    #[serde(default)]
    containers: Vec<CriContainer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CriContainer {
    id: String,
    #[serde(default)]
    pod_sandbox_id: String,
    metadata: CriMetadata,
}

#[derive(Debug, Deserialize)]
struct CriMetadata {
    #[serde(default)]
    name: String,
}

impl CriInspector {
    pub fn new(crictl_bin: &str, proc_root: &Path) -> Self {
        Self {
            crictl_bin: crictl_bin.to_string(),
            proc_root: proc_root.to_path_buf(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = tokio::process::Command::new(&self.crictl_bin)
            .args(args)
            .output()
            .await
            .map_err(|e| anyhow!("[cri] failed to run {}: {}", self.crictl_bin, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("[cri] {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Parse `crictl ps -o json`.
pub fn parse_container_list(json: &str) -> Result<Vec<ContainerHandle>> {
    let list: CriContainerList =
        serde_json::from_str(json).map_err(|e| anyhow!("[cri] invalid container list: {}", e))?;
    Ok(list
        .containers
        .into_iter()
        .map(|c| ContainerHandle {
            id: c.id,
            names: vec![c.metadata.name],
            sandbox_id: (!c.pod_sandbox_id.is_empty()).then_some(c.pod_sandbox_id),
        })
        .collect())
}

/// Extract the init PID from `crictl inspect -o json`.
pub fn parse_init_pid(json: &str) -> Result<u32> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| anyhow!("[cri] invalid inspect output: {}", e))?;
    value
        .get("info")
        .and_then(|info| info.get("pid"))
        .and_then(|pid| pid.as_u64())
        .filter(|pid| *pid > 0)
        .and_then(|pid| u32::try_from(pid).ok())
        .ok_or_else(|| anyhow!("[cri] inspect output has no init pid"))
}

/// Build an identity from `crictl inspectp -o json` and the container name.
pub fn parse_sandbox_identity(
    json: &str,
    container: &str,
) -> std::result::Result<WorkloadIdentity, IdentityError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| IdentityError::Lookup(anyhow!("[cri] invalid inspectp output: {}", e)))?;
    let metadata = value.get("status").and_then(|s| s.get("metadata"));
    let field = |name: &'static str| -> std::result::Result<String, IdentityError> {
        metadata
            .and_then(|m| m.get(name))
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or(IdentityError::Incomplete {
                container: container.to_string(),
                field: name,
            })
    };

    if container.is_empty() {
        return Err(IdentityError::Incomplete {
            container: container.to_string(),
            field: "container name",
        });
    }
    Ok(WorkloadIdentity {
        namespace: field("namespace")?,
        pod: field("name")?,
        uid: field("uid")?,
        container: container.to_string(),
    })
}

/// List every process in `proc_root` that shares the PID namespace of `init_pid`.
pub async fn scan_pid_namespace(proc_root: &Path, init_pid: u32) -> Result<ProcessTable> {
    let target = tokio::fs::read_link(proc_root.join(init_pid.to_string()).join("ns/pid"))
        .await
        .map_err(|e| anyhow!("[cri] cannot read pid namespace of {}: {}", init_pid, e))?;

    let mut processes = Vec::new();
    let mut entries = tokio::fs::read_dir(proc_root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(pid) = file_name.to_str().filter(|n| n.chars().all(|c| c.is_ascii_digit()))
        else {
            continue;
        };
        // Processes can exit while we scan.
        let Ok(ns) = tokio::fs::read_link(entry.path().join("ns/pid")).await else {
            continue;
        };
        if ns != target {
            continue;
        }
        let comm = tokio::fs::read_to_string(entry.path().join("comm"))
            .await
            .unwrap_or_default();
        processes.push(vec![pid.to_string(), comm.trim().to_string()]);
    }
    processes.sort_by_key(|row| row[0].parse::<u64>().unwrap_or(u64::MAX));

    Ok(ProcessTable {
        titles: vec!["PID".to_string(), "COMMAND".to_string()],
        processes,
    })
}

#[async_trait]
impl ContainerInspector for CriInspector {
    fn name(&self) -> &str {
        "cri"
    }

    async fn list_containers(&self) -> Result<Vec<ContainerHandle>> {
        let stdout = self.run(&["ps", "-o", "json"]).await?;
        parse_container_list(&stdout)
    }

    async fn list_processes(&self, container: &ContainerHandle) -> Result<ProcessTable> {
        let stdout = self.run(&["inspect", "-o", "json", &container.id]).await?;
        let init_pid = parse_init_pid(&stdout)?;
        debug!("[cri] container {} has init pid {}", container.id, init_pid);
        scan_pid_namespace(&self.proc_root, init_pid).await
    }

    async fn resolve_identity(
        &self,
        container: &ContainerHandle,
    ) -> std::result::Result<WorkloadIdentity, IdentityError> {
        let sandbox = container
            .sandbox_id
            .as_deref()
            .ok_or_else(|| IdentityError::Incomplete {
                container: container.id.clone(),
                field: "pod sandbox id",
            })?;
        let stdout = self.run(&["inspectp", "-o", "json", sandbox]).await?;
        let name = container.names.first().map(String::as_str).unwrap_or_default();
        parse_sandbox_identity(&stdout, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_parse_container_list() {
        let json = r#"{"containers":[
            {"id":"c1","podSandboxId":"s1","metadata":{"name":"nginx","attempt":0},"state":"CONTAINER_RUNNING"},
            {"id":"c2","metadata":{"name":"sidecar"}}
        ]}"#;
        let handles = parse_container_list(json).unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].sandbox_id.as_deref(), Some("s1"));
        assert_eq!(handles[0].names, vec!["nginx"]);
        assert_eq!(handles[1].sandbox_id, None);
    }

    #[test]
    fn test_parse_init_pid() {
        assert_eq!(parse_init_pid(r#"{"info":{"pid":4242}}"#).unwrap(), 4242);
        assert!(parse_init_pid(r#"{"info":{}}"#).is_err());
        assert!(parse_init_pid(r#"{"info":{"pid":0}}"#).is_err());
    }

    #[test]
    fn test_parse_sandbox_identity() {
        let json = r#"{"status":{"metadata":{"name":"web-0","namespace":"default","uid":"abc","attempt":0}}}"#;
        let id = parse_sandbox_identity(json, "nginx").unwrap();
        assert_eq!(id.pod, "web-0");
        assert_eq!(id.namespace, "default");
        assert_eq!(id.uid, "abc");
        assert_eq!(id.container, "nginx");

        let missing_uid = r#"{"status":{"metadata":{"name":"web-0","namespace":"default"}}}"#;
        assert!(matches!(
            parse_sandbox_identity(missing_uid, "nginx"),
            Err(IdentityError::Incomplete { field: "uid", .. })
        ));
    }

    #[tokio::test]
    async fn test_scan_matches_pid_namespace() {
        let root = tempfile::tempdir().unwrap();
        let make = |pid: &str, ns: &str, comm: &str| {
            let dir = root.path().join(pid).join("ns");
            std::fs::create_dir_all(&dir).unwrap();
            symlink(ns, dir.join("pid")).unwrap();
            std::fs::write(root.path().join(pid).join("comm"), format!("{}\n", comm)).unwrap();
        };
        make("100", "pid:[4026532001]", "nginx");
        make("105", "pid:[4026532001]", "worker");
        make("200", "pid:[4026531836]", "systemd");
        std::fs::create_dir_all(root.path().join("self")).unwrap();

        let table = scan_pid_namespace(root.path(), 100).await.unwrap();
        assert_eq!(table.processes.len(), 2);
        assert!(table.contains_pid(105));
        assert!(!table.contains_pid(200));
        assert_eq!(table.processes[1][1], "worker");
    }
}
