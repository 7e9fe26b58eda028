use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ErrorBody;
use pkg_dump::{CoredumpRegistrar, PodLookup};
use pkg_state::watch::WatchEvent;
use pkg_types::coredump::Coredump;
use pkg_types::crd::CustomResourceDefinition;
use pkg_types::pod::Pod;
use pkg_types::quota::CoredumpQuota;

const COREDUMP_API: &str = "/apis/coredump.k8s.io/v1alpha1";

/// HTTP client for the coredump API server.
#[derive(Clone)]
pub struct ApiClient {
    server: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(server: &str) -> Result<Self> {
        Ok(Self {
            server: server.trim_end_matches('/').to_string(),
            http: reqwest::Client::builder().build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    fn coredumps_path(ns: &str) -> String {
        format!("{}/namespaces/{}/coredumps", COREDUMP_API, ns)
    }

    fn quotas_path(ns: &str) -> String {
        format!("{}/namespaces/{}/coredumpquotas", COREDUMP_API, ns)
    }

    fn pod_path(ns: &str, name: &str) -> String {
        format!("/api/v1/namespaces/{}/pods/{}", ns, name)
    }

    // ─── Record-type definitions ────────────────────────────────────

    pub async fn list_definitions(&self) -> Result<Vec<CustomResourceDefinition>> {
        let resp = self
            .http
            .get(self.url("/apis/apiextensions/v1/customresourcedefinitions"))
            .send()
            .await?;
        decode(resp).await
    }

    /// Register a record type; an existing registration counts as success.
    pub async fn ensure_definition(&self, crd: &CustomResourceDefinition) -> Result<()> {
        let resp = self
            .http
            .post(self.url("/apis/apiextensions/v1/customresourcedefinitions"))
            .json(crd)
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            debug!("Definition {} already registered", crd.name);
            return Ok(());
        }
        decode::<CustomResourceDefinition>(resp).await.map(|_| ())
    }

    // ─── Coredumps ──────────────────────────────────────────────────

    pub async fn create_coredump(&self, record: &Coredump) -> Result<Coredump> {
        let resp = self
            .http
            .post(self.url(&Self::coredumps_path(&record.namespace)))
            .json(record)
            .send()
            .await?;
        decode(resp).await
    }

    /// Records in `ns`, or in every namespace.
    pub async fn list_coredumps(&self, ns: Option<&str>) -> Result<Vec<Coredump>> {
        let path = match ns {
            Some(ns) => Self::coredumps_path(ns),
            None => format!("{}/coredumps", COREDUMP_API),
        };
        let resp = self.http.get(self.url(&path)).send().await?;
        decode(resp).await
    }

    pub async fn get_coredump(&self, ns: &str, name: &str) -> Result<Coredump> {
        let path = format!("{}/{}", Self::coredumps_path(ns), name);
        let resp = self.http.get(self.url(&path)).send().await?;
        decode(resp).await
    }

    pub async fn delete_coredump(&self, ns: &str, name: &str) -> Result<Coredump> {
        let path = format!("{}/{}", Self::coredumps_path(ns), name);
        let resp = self.http.delete(self.url(&path)).send().await?;
        decode(resp).await
    }

    pub async fn update_coredump_status(&self, record: &Coredump) -> Result<Coredump> {
        let path = format!(
            "{}/{}/status",
            Self::coredumps_path(&record.namespace),
            record.name
        );
        let resp = self.http.put(self.url(&path)).json(record).send().await?;
        decode(resp).await
    }

    // ─── Quotas ─────────────────────────────────────────────────────

    pub async fn put_quota(&self, quota: &CoredumpQuota) -> Result<CoredumpQuota> {
        let path = format!("{}/{}", Self::quotas_path(&quota.namespace), quota.name);
        let resp = self.http.put(self.url(&path)).json(quota).send().await?;
        decode(resp).await
    }

    pub async fn get_quota(&self, ns: &str, name: &str) -> Result<CoredumpQuota> {
        let path = format!("{}/{}", Self::quotas_path(ns), name);
        let resp = self.http.get(self.url(&path)).send().await?;
        decode(resp).await
    }

    pub async fn list_quotas(&self, ns: &str) -> Result<Vec<CoredumpQuota>> {
        let resp = self.http.get(self.url(&Self::quotas_path(ns))).send().await?;
        decode(resp).await
    }

    pub async fn delete_quota(&self, ns: &str, name: &str) -> Result<CoredumpQuota> {
        let path = format!("{}/{}", Self::quotas_path(ns), name);
        let resp = self.http.delete(self.url(&path)).send().await?;
        decode(resp).await
    }

    // ─── Pods ───────────────────────────────────────────────────────

    pub async fn put_pod(&self, pod: &Pod) -> Result<Pod> {
        let resp = self
            .http
            .put(self.url(&Self::pod_path(&pod.namespace, &pod.name)))
            .json(pod)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn get_pod(&self, ns: &str, name: &str) -> Result<Pod> {
        let resp = self
            .http
            .get(self.url(&Self::pod_path(ns, name)))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn delete_pod(&self, ns: &str, name: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&Self::pod_path(ns, name)))
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    // ─── Watch ──────────────────────────────────────────────────────

    /// Stream watch events under `prefix` after `from_seq` into `handle`
    /// until the server closes the stream or `handle` returns false.
    pub async fn watch<F>(&self, prefix: &str, from_seq: u64, mut handle: F) -> Result<()>
    where
        F: FnMut(WatchEvent) -> bool,
    {
        let mut resp = self
            .http
            .get(self.url(&format!("{}/watch", COREDUMP_API)))
            .query(&[("prefix", prefix.to_string()), ("seq", from_seq.to_string())])
            .send()
            .await?;
        resp = check(resp).await?;

        let mut buffer = String::new();
        while let Some(chunk) = resp.chunk().await? {
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(end) = buffer.find('\n') {
                let line: String = buffer.drain(..=end).collect();
                let Some(data) = line.trim_end().strip_prefix("data:") else {
                    continue;
                };
                match serde_json::from_str::<WatchEvent>(data.trim_start()) {
                    Ok(event) => {
                        if !handle(event) {
                            return Ok(());
                        }
                    }
                    Err(e) => debug!("Skipping undecodable watch event: {}", e),
                }
            }
        }
        Ok(())
    }
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    bail!("server returned {}: {}", status, message)
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    Ok(check(resp).await?.json().await?)
}

#[async_trait]
impl PodLookup for ApiClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        ApiClient::get_pod(self, namespace, name).await
    }
}

#[async_trait]
impl CoredumpRegistrar for ApiClient {
    async fn ensure_definition(&self) -> Result<()> {
        ApiClient::ensure_definition(self, &CustomResourceDefinition::coredumps()).await
    }

    async fn create_coredump(&self, record: &Coredump) -> Result<Coredump> {
        ApiClient::create_coredump(self, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppState;
    use crate::server::router;
    use chrono::Utc;
    use pkg_state::{Registry, StateStore};
    use pkg_types::Quantity;
    use pkg_types::coredump::CoredumpState;
    use pkg_types::identity::WorkloadIdentity;
    use pkg_types::pod::{ContainerSpec, PodSpec};
    use tokio::net::TcpListener;

    async fn serve() -> (tempfile::TempDir, Registry, ApiClient) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_str().unwrap()).await.unwrap();
        let registry = Registry::new(store);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(AppState {
            registry: registry.clone(),
        });
        tokio::spawn(async move { axum::serve(listener, app).await });
        let client = ApiClient::new(&format!("http://{}/", addr)).unwrap();
        (dir, registry, client)
    }

    fn record() -> Coredump {
        let identity = WorkloadIdentity {
            namespace: "default".to_string(),
            pod: "web-0".to_string(),
            uid: "abc".to_string(),
            container: "nginx".to_string(),
        };
        Coredump::new(&identity, 4021, "nginx", 1700000000, Quantity::from_bytes(2048))
    }

    #[tokio::test]
    async fn test_registrar_over_http() {
        let (_dir, registry, client) = serve().await;

        // No definition yet.
        assert!(CoredumpRegistrar::create_coredump(&client, &record()).await.is_err());

        CoredumpRegistrar::ensure_definition(&client).await.unwrap();
        CoredumpRegistrar::ensure_definition(&client).await.unwrap();
        assert_eq!(client.list_definitions().await.unwrap().len(), 1);

        let created = CoredumpRegistrar::create_coredump(&client, &record())
            .await
            .unwrap();
        assert_eq!(created.resource_version, 1);
        let stored = registry.get_coredump("default", &created.name).await.unwrap();
        assert_eq!(stored.spec.size, Quantity::from_bytes(2048));
        assert_eq!(client.list_coredumps(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_updates_are_checked() {
        let (_dir, registry, client) = serve().await;
        client
            .ensure_definition(&CustomResourceDefinition::coredumps())
            .await
            .unwrap();
        let created = client.create_coredump(&record()).await.unwrap();

        // Only the quota controller decides a pending record.
        let mut forged = created.clone();
        forged.status.state = CoredumpState::Allowed;
        let err = client.update_coredump_status(&forged).await.unwrap_err();
        assert!(err.to_string().contains("422"));

        let mut admitted = created.clone();
        admitted.status.state = CoredumpState::Allowed;
        let allowed = registry.commit_admission(&admitted, &[]).await.unwrap();

        // Stale version
        let mut stale = created.clone();
        stale.status.state = CoredumpState::Saved;
        let err = client.update_coredump_status(&stale).await.unwrap_err();
        assert!(err.to_string().contains("409"));

        let mut saved = allowed.clone();
        saved.status.state = CoredumpState::Saved;
        saved.spec.volume = "pvc-dumps".to_string();
        let saved = client.update_coredump_status(&saved).await.unwrap();
        assert_eq!(saved.spec.volume, "pvc-dumps");

        let mut back = saved.clone();
        back.status.state = CoredumpState::Allowed;
        let err = client.update_coredump_status(&back).await.unwrap_err();
        assert!(err.to_string().contains("422"));

        let removed = client.delete_coredump("default", &created.name).await.unwrap();
        assert_eq!(removed.state(), CoredumpState::Saved);
        assert!(client.get_coredump("default", &created.name).await.is_err());
    }

    #[tokio::test]
    async fn test_pods_and_quotas() {
        let (_dir, _registry, client) = serve().await;
        let err = PodLookup::get_pod(&client, "default", "web-0").await.unwrap_err();
        assert!(err.to_string().contains("404"));

        let pod = Pod {
            name: "web-0".to_string(),
            namespace: "default".to_string(),
            uid: "abc".to_string(),
            spec: PodSpec {
                containers: vec![ContainerSpec {
                    name: "nginx".to_string(),
                    image: "nginx:1.27".to_string(),
                }],
            },
            node_name: Some("node-1".to_string()),
            created_at: Utc::now(),
        };
        client.put_pod(&pod).await.unwrap();
        let fetched = PodLookup::get_pod(&client, "default", "web-0").await.unwrap();
        assert!(fetched.has_container("nginx"));
        client.delete_pod("default", "web-0").await.unwrap();

        let quota = CoredumpQuota::new("default", "dumps", "1Gi".parse().unwrap());
        client.put_quota(&quota).await.unwrap();
        let listed = client.list_quotas("default").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].spec.hard.to_string(), "1Gi");
        client.delete_quota("default", "dumps").await.unwrap();
        assert!(client.get_quota("default", "dumps").await.is_err());
    }

    #[tokio::test]
    async fn test_watch_replays_backlog() {
        let (_dir, registry, client) = serve().await;
        registry
            .put_quota(&CoredumpQuota::new("default", "dumps", Quantity::from_bytes(10)))
            .await
            .unwrap();
        registry
            .put_quota(&CoredumpQuota::new("other", "dumps", Quantity::from_bytes(10)))
            .await
            .unwrap();

        let mut keys = Vec::new();
        client
            .watch("/registry/coredumpquotas/default/", 0, |event| {
                keys.push(event.key);
                false
            })
            .await
            .unwrap();
        assert_eq!(keys, vec!["/registry/coredumpquotas/default/dumps".to_string()]);
    }
}
