use anyhow::Result;
use async_trait::async_trait;
use pkg_types::identity::WorkloadIdentity;

use crate::inspect::{ContainerHandle, ContainerInspector, IdentityError, ProcessTable};
use crate::naming::{is_kubernetes_container, parse_container_name};

/// Docker runtime backend — invokes the `docker` CLI.
///
/// Workload identity is decoded from the kubelet container name.
pub struct DockerInspector {
    docker_bin: String,
}

impl DockerInspector {
    pub fn new(docker_bin: &str) -> Self {
        Self {
            docker_bin: docker_bin.to_string(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = tokio::process::Command::new(&self.docker_bin)
            .args(args)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("[docker] failed to run {}: {}", self.docker_bin, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("[docker] {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Parse `docker ps --format '{{.ID}}\t{{.Names}}'` output, keeping only
/// containers created by the kubelet.
pub fn parse_container_listing(output: &str) -> Vec<ContainerHandle> {
    output
        .lines()
        .filter_map(|line| {
            let (id, names) = line.trim().split_once('\t')?;
            let names: Vec<String> = names
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
            if !names.iter().any(|n| is_kubernetes_container(n)) {
                return None;
            }
            Some(ContainerHandle {
                id: id.to_string(),
                names,
                sandbox_id: None,
            })
        })
        .collect()
}

#[async_trait]
impl ContainerInspector for DockerInspector {
    fn name(&self) -> &str {
        "docker"
    }

    async fn list_containers(&self) -> Result<Vec<ContainerHandle>> {
        let stdout = self
            .run(&["ps", "--no-trunc", "--format", "{{.ID}}\t{{.Names}}"])
            .await?;
        Ok(parse_container_listing(&stdout))
    }

    async fn list_processes(&self, container: &ContainerHandle) -> Result<ProcessTable> {
        let stdout = self.run(&["top", &container.id]).await?;
        Ok(ProcessTable::parse(&stdout))
    }

    async fn resolve_identity(
        &self,
        container: &ContainerHandle,
    ) -> std::result::Result<WorkloadIdentity, IdentityError> {
        let name = container
            .names
            .iter()
            .find(|n| is_kubernetes_container(n))
            .ok_or_else(|| IdentityError::Parse(container.names.join(",")))?;
        parse_container_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_keeps_kubelet_containers() {
        let out = "aaa111\tk8s_nginx_web-0_default_abc_0\nbbb222\tredis\nccc333\tfoo,k8s_app_api_prod_uid_1_x\n";
        let handles = parse_container_listing(out);
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].id, "aaa111");
        assert_eq!(handles[1].names, vec!["foo", "k8s_app_api_prod_uid_1_x"]);
    }

    #[tokio::test]
    async fn test_identity_from_name() {
        let inspector = DockerInspector::new("docker");
        let handle = ContainerHandle {
            id: "aaa111".to_string(),
            names: vec!["/k8s_nginx_web-0_default_abc_0".to_string()],
            sandbox_id: None,
        };
        let id = inspector.resolve_identity(&handle).await.unwrap();
        assert_eq!(id.namespace, "default");
        assert_eq!(id.container, "nginx");

        let bad = ContainerHandle {
            id: "x".to_string(),
            names: vec!["/k8s_broken".to_string()],
            sandbox_id: None,
        };
        assert!(matches!(
            inspector.resolve_identity(&bad).await,
            Err(IdentityError::Parse(_))
        ));
    }
}
