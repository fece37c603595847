use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use pkg_runtime::ContainerRuntime;
use pkg_store::Store;
use pkg_types::container::ContainerStatus;
use pkg_types::node::Node;
use pkg_types::pod::{Pod, PodStatus};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A pod that fails to start this many times is marked Failed for good.
pub const MAX_RETRY_COUNT: u32 = 3;

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Per-node agent: owns the containers on one node and is the single
/// writer of status, container id, and the retry fields for pods bound to
/// that node.
pub struct Kubelet {
    name: String,
    pods: Arc<dyn Store<Pod>>,
    nodes: Arc<dyn Store<Node>>,
    runtime: Arc<dyn ContainerRuntime>,
    poll_interval: Duration,
}

impl Kubelet {
    pub fn new(
        name: impl Into<String>,
        pods: Arc<dyn Store<Pod>>,
        nodes: Arc<dyn Store<Node>>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            name: name.into(),
            pods,
            nodes,
            runtime,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Startup sync followed by the reconcile loop, as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Kubelet {} started (interval={}ms)",
                self.name,
                self.poll_interval.as_millis()
            );
            if let Err(e) = self.sync().await {
                warn!("Kubelet {}: startup sync failed: {}", self.name, e);
            }

            let mut interval = tokio::time::interval(self.poll_interval);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    /// Rediscover existing containers on startup and link them back to
    /// their pods. Containers with no pod at all are stopped and removed;
    /// containers of pods bound to other nodes are left alone.
    pub async fn sync(&self) -> Result<()> {
        let containers = self.runtime.list().await?;

        for container in containers {
            let Some(mut pod) = self.pods.get(&container.name).await? else {
                self.remove_container(&container.name, &container.id).await;
                continue;
            };

            if pod.spec.node_name != self.name {
                continue;
            }

            if pod.container_id.is_empty() || pod.container_id != container.id {
                info!(
                    "Sync: linking container {} to pod {}",
                    container.id, pod.spec.name
                );
                pod.container_id = container.id;
                pod.status = PodStatus::Running;
                let name = pod.spec.name.clone();
                self.pods.put(&name, pod).await?;
            }
        }
        Ok(())
    }

    /// One pass of the main loop: reconcile pods bound to this node, then
    /// collect orphaned containers, then heartbeat.
    pub async fn tick(&self) {
        match self.pods.list().await {
            Ok(pods) => {
                for pod in pods {
                    if pod.spec.node_name != self.name {
                        continue;
                    }
                    let name = pod.spec.name.clone();
                    if let Err(e) = self.reconcile_pod(pod).await {
                        warn!(
                            "Kubelet {}: failed to reconcile pod {}: {}",
                            self.name, name, e
                        );
                    }
                }
            }
            Err(e) => warn!("Kubelet {}: failed to list pods: {}", self.name, e),
        }

        self.cleanup_orphaned_containers().await;
        self.update_heartbeat().await;
    }

    /// Drive one pod a step toward its declared state.
    async fn reconcile_pod(&self, pod: Pod) -> Result<()> {
        // a failed inspection means the container is gone
        let container_state = if pod.container_id.is_empty() {
            None
        } else {
            self.runtime.get_status(&pod.container_id).await.ok()
        };

        let updated = match (pod.status, &container_state) {
            // no container yet; respect the back-off window
            (PodStatus::Pending, None) => {
                if let Some(next_retry_at) = pod.next_retry_at {
                    if Utc::now() < next_retry_at {
                        return Ok(());
                    }
                }
                self.create_and_run(pod).await?
            }

            // created earlier and now up; observe it
            (PodStatus::Pending, Some(state)) if state.status == ContainerStatus::Running => {
                let mut pod = pod;
                pod.status = PodStatus::Running;
                pod
            }

            // converged
            (PodStatus::Running, Some(state)) if state.status == ContainerStatus::Running => {
                return Ok(());
            }

            // container died underneath us
            (PodStatus::Running, Some(_)) => {
                let mut pod = pod;
                pod.status = PodStatus::Failed;
                pod
            }

            // container vanished entirely; reset so it gets recreated
            (PodStatus::Running, None) => {
                let mut pod = pod;
                pod.status = PodStatus::Pending;
                pod.container_id = String::new();
                pod
            }

            _ => {
                return Err(anyhow!(
                    "unhandled state for pod {} ({})",
                    pod.spec.name,
                    pod.status
                ))
            }
        };

        let name = updated.spec.name.clone();
        self.pods.put(&name, updated).await
    }

    /// Start the pod's container, backing off exponentially on failure and
    /// marking the pod Failed once retries are exhausted.
    async fn create_and_run(&self, mut pod: Pod) -> Result<Pod> {
        match self.runtime.run(&pod.spec).await {
            Ok(container_id) => {
                pod.container_id = container_id;
                pod.retry_count = 0;
                pod.status = PodStatus::Running;
                Ok(pod)
            }
            Err(e) => {
                if pod.retry_count == MAX_RETRY_COUNT {
                    warn!(
                        "Kubelet {}: pod {} exhausted retries: {}",
                        self.name, pod.spec.name, e
                    );
                    pod.status = PodStatus::Failed;
                    pod.message = e.to_string();
                    return Ok(pod);
                }

                pod.retry_count += 1;
                pod.next_retry_at = Some(next_retry_at(pod.retry_count));
                warn!(
                    "Kubelet {}: failed to start pod {} (attempt {}): {}",
                    self.name, pod.spec.name, pod.retry_count, e
                );
                Ok(pod)
            }
        }
    }

    /// Stop and remove containers whose pods no longer exist in the store
    /// (deleted via the API or scaled down).
    async fn cleanup_orphaned_containers(&self) {
        let containers = match self.runtime.list().await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(
                    "Kubelet {}: failed to list containers for cleanup: {}",
                    self.name, e
                );
                return;
            }
        };

        for container in containers {
            match self.pods.get(&container.name).await {
                Ok(None) => self.remove_container(&container.name, &container.id).await,
                Ok(Some(_)) => {}
                Err(e) => warn!(
                    "Kubelet {}: failed to look up pod {}: {}",
                    self.name, container.name, e
                ),
            }
        }
    }

    async fn remove_container(&self, name: &str, id: &str) {
        info!(
            "Kubelet {}: removing orphan container {} ({})",
            self.name, name, id
        );
        if let Err(e) = self.runtime.stop(id).await {
            warn!("Kubelet {}: failed to stop container {}: {}", self.name, id, e);
        }
        if let Err(e) = self.runtime.remove(id).await {
            warn!(
                "Kubelet {}: failed to remove container {}: {}",
                self.name, id, e
            );
        }
    }

    async fn update_heartbeat(&self) {
        match self.nodes.get(&self.name).await {
            Ok(Some(mut node)) => {
                node.last_heartbeat = Some(Utc::now());
                if let Err(e) = self.nodes.put(&self.name, node).await {
                    warn!("Kubelet {}: failed to write heartbeat: {}", self.name, e);
                }
            }
            // not registered yet; the next tick will try again
            Ok(None) => {}
            Err(e) => warn!("Kubelet {}: failed to load node record: {}", self.name, e),
        }
    }
}

/// `now + min(MAX_DELAY, BASE_DELAY * 2^retries)`
fn next_retry_at(retry_count: u32) -> DateTime<Utc> {
    let factor = 2u32.saturating_pow(retry_count);
    let delay = BASE_DELAY.saturating_mul(factor).min(MAX_DELAY);
    Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60))
}
