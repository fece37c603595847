use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use pkg_store::Store;
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use pkg_types::replicaset::ReplicaSet;

/// Deadline for any single API call. A hung server must not wedge a control
/// loop for longer than this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Typed client for the API server. Cheap to clone and safe to share
/// between loops.
///
/// Also implements [`Store`] for each resource kind, so control loops
/// written against the store contract can be pointed at a remote API
/// server without changes.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(api_server_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: api_server_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    // --- Pods ---

    pub async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.list_path("/pods").await
    }

    pub async fn get_pod(&self, name: &str) -> Result<Option<Pod>> {
        self.get_path(&format!("/pods/{}", name)).await
    }

    pub async fn create_pod(&self, pod: &Pod) -> Result<()> {
        self.create_path("/pods", pod).await
    }

    pub async fn update_pod(&self, name: &str, pod: &Pod) -> Result<()> {
        self.update_path(&format!("/pods/{}", name), pod).await
    }

    pub async fn delete_pod(&self, name: &str) -> Result<()> {
        self.delete_path(&format!("/pods/{}", name)).await
    }

    // --- ReplicaSets ---

    pub async fn list_replicasets(&self) -> Result<Vec<ReplicaSet>> {
        self.list_path("/replicasets").await
    }

    pub async fn get_replicaset(&self, name: &str) -> Result<Option<ReplicaSet>> {
        self.get_path(&format!("/replicasets/{}", name)).await
    }

    pub async fn create_replicaset(&self, rs: &ReplicaSet) -> Result<()> {
        self.create_path("/replicasets", rs).await
    }

    pub async fn update_replicaset(&self, name: &str, rs: &ReplicaSet) -> Result<()> {
        self.update_path(&format!("/replicasets/{}", name), rs).await
    }

    pub async fn delete_replicaset(&self, name: &str) -> Result<()> {
        self.delete_path(&format!("/replicasets/{}", name)).await
    }

    // --- Nodes ---

    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.list_path("/nodes").await
    }

    pub async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        self.get_path(&format!("/nodes/{}", name)).await
    }

    pub async fn create_node(&self, node: &Node) -> Result<()> {
        self.create_path("/nodes", node).await
    }

    pub async fn update_node(&self, name: &str, node: &Node) -> Result<()> {
        self.update_path(&format!("/nodes/{}", name), node).await
    }

    pub async fn delete_node(&self, name: &str) -> Result<()> {
        self.delete_path(&format!("/nodes/{}", name)).await
    }

    // --- Shared plumbing ---

    async fn list_path<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| anyhow!("GET {}: {}", path, e))?;

        if resp.status() != StatusCode::OK {
            return Err(anyhow!("GET {}: status {}", path, resp.status()));
        }
        Ok(resp.json().await?)
    }

    async fn get_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| anyhow!("GET {}: {}", path, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if resp.status() != StatusCode::OK {
            return Err(anyhow!("GET {}: status {}", path, resp.status()));
        }
        Ok(Some(resp.json().await?))
    }

    async fn create_path<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow!("POST {}: {}", path, e))?;

        if resp.status() != StatusCode::CREATED {
            return Err(anyhow!("POST {}: status {}", path, resp.status()));
        }
        Ok(())
    }

    async fn update_path<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<()> {
        let resp = self
            .http
            .put(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow!("PUT {}: {}", path, e))?;

        if resp.status() != StatusCode::OK {
            return Err(anyhow!("PUT {}: status {}", path, resp.status()));
        }
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        let resp = self
            .http
            .delete(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| anyhow!("DELETE {}: {}", path, e))?;

        if resp.status() != StatusCode::NO_CONTENT {
            return Err(anyhow!("DELETE {}: status {}", path, resp.status()));
        }
        Ok(())
    }
}

// PUT is an upsert at the store level, so `put` maps onto it for creation
// and update alike.

#[async_trait]
impl Store<Pod> for ApiClient {
    async fn list(&self) -> Result<Vec<Pod>> {
        self.list_pods().await
    }

    async fn get(&self, name: &str) -> Result<Option<Pod>> {
        self.get_pod(name).await
    }

    async fn put(&self, name: &str, value: Pod) -> Result<()> {
        self.update_pod(name, &value).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.delete_pod(name).await
    }
}

#[async_trait]
impl Store<ReplicaSet> for ApiClient {
    async fn list(&self) -> Result<Vec<ReplicaSet>> {
        self.list_replicasets().await
    }

    async fn get(&self, name: &str) -> Result<Option<ReplicaSet>> {
        self.get_replicaset(name).await
    }

    async fn put(&self, name: &str, value: ReplicaSet) -> Result<()> {
        self.update_replicaset(name, &value).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.delete_replicaset(name).await
    }
}

#[async_trait]
impl Store<Node> for ApiClient {
    async fn list(&self) -> Result<Vec<Node>> {
        self.list_nodes().await
    }

    async fn get(&self, name: &str) -> Result<Option<Node>> {
        self.get_node(name).await
    }

    async fn put(&self, name: &str, value: Node) -> Result<()> {
        self.update_node(name, &value).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.delete_node(name).await
    }
}
