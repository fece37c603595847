use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use pkg_store::Store;
use pkg_types::node::{Node, NodeState};
use pkg_types::pod::Pod;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Round-robin scheduler: binds every unscheduled pod to a Ready node.
///
/// The rotation cursor is process-local; a restart resets it, which only
/// costs approximate balance. A bound pod is never rebound.
pub struct Scheduler {
    pods: Arc<dyn Store<Pod>>,
    nodes: Arc<dyn Store<Node>>,
    next_index: AtomicUsize,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(pods: Arc<dyn Store<Pod>>, nodes: Arc<dyn Store<Node>>) -> Self {
        Self {
            pods,
            nodes,
            next_index: AtomicUsize::new(0),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start the scheduling loop as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Scheduler started (interval={}ms)",
                self.poll_interval.as_millis()
            );
            let mut interval = tokio::time::interval(self.poll_interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.reconcile().await {
                    warn!("Scheduler reconcile error: {}", e);
                }
            }
        })
    }

    /// One pass over all pods; transient errors on a single pod are logged
    /// and the pass continues.
    pub async fn reconcile(&self) -> Result<()> {
        for pod in self.pods.list().await? {
            if pod.spec.node_name.is_empty() {
                if let Err(e) = self.schedule_one(pod).await {
                    warn!("{}", e);
                }
            }
        }
        Ok(())
    }

    async fn schedule_one(&self, mut pod: Pod) -> Result<()> {
        let Some(node) = self.pick_node().await? else {
            return Err(anyhow!(
                "no node available for scheduling pod {}",
                pod.spec.name
            ));
        };

        info!("Assigning pod {} to node {}", pod.spec.name, node.name);
        pod.spec.node_name = node.name;
        let name = pod.spec.name.clone();
        self.pods.put(&name, pod).await
    }

    async fn pick_node(&self) -> Result<Option<Node>> {
        let ready = self.ready_nodes().await?;
        if ready.is_empty() {
            return Ok(None);
        }
        let idx = self.next_index.fetch_add(1, Ordering::Relaxed) % ready.len();
        Ok(ready.into_iter().nth(idx))
    }

    async fn ready_nodes(&self) -> Result<Vec<Node>> {
        let mut nodes: Vec<Node> = self
            .nodes
            .list()
            .await?
            .into_iter()
            .filter(|n| n.status == NodeState::Ready)
            .collect();

        // sort by name for a deterministic rotation
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pkg_store::MemStore;
    use pkg_types::pod::PodSpec;
    use std::collections::HashMap;

    fn make_node(name: &str, status: NodeState) -> Node {
        Node {
            name: name.to_string(),
            status,
            last_heartbeat: Some(Utc::now()),
        }
    }

    fn make_pod(name: &str) -> Pod {
        Pod::new(PodSpec {
            name: name.to_string(),
            image: "alpine".to_string(),
            node_name: String::new(),
            command: vec![],
            env: HashMap::new(),
            labels: HashMap::new(),
        })
    }

    fn make_scheduler() -> (Scheduler, Arc<MemStore<Pod>>, Arc<MemStore<Node>>) {
        let pods = Arc::new(MemStore::new());
        let nodes = Arc::new(MemStore::new());
        let scheduler = Scheduler::new(pods.clone(), nodes.clone());
        (scheduler, pods, nodes)
    }

    #[tokio::test]
    async fn spreads_pods_round_robin_over_ready_nodes() {
        let (scheduler, pods, nodes) = make_scheduler();
        nodes
            .put("node-b", make_node("node-b", NodeState::Ready))
            .await
            .unwrap();
        nodes
            .put("node-a", make_node("node-a", NodeState::Ready))
            .await
            .unwrap();
        for i in 0..4 {
            let pod = make_pod(&format!("pod-{}", i));
            pods.put(&pod.spec.name.clone(), pod).await.unwrap();
        }

        scheduler.reconcile().await.unwrap();

        let scheduled = pods.list().await.unwrap();
        assert!(scheduled.iter().all(|p| !p.spec.node_name.is_empty()));
        let on_a = scheduled
            .iter()
            .filter(|p| p.spec.node_name == "node-a")
            .count();
        let on_b = scheduled
            .iter()
            .filter(|p| p.spec.node_name == "node-b")
            .count();
        assert_eq!(on_a, 2);
        assert_eq!(on_b, 2);
    }

    #[tokio::test]
    async fn rotation_is_deterministic_by_node_name() {
        let (scheduler, pods, nodes) = make_scheduler();
        for name in ["node-c", "node-a", "node-b"] {
            nodes.put(name, make_node(name, NodeState::Ready)).await.unwrap();
        }

        let mut assigned = Vec::new();
        for i in 0..4 {
            let name = format!("pod-{}", i);
            pods.put(&name, make_pod(&name)).await.unwrap();
            scheduler.reconcile().await.unwrap();
            assigned.push(pods.get(&name).await.unwrap().unwrap().spec.node_name);
        }

        assert_eq!(assigned, ["node-a", "node-b", "node-c", "node-a"]);
    }

    #[tokio::test]
    async fn ignores_not_ready_nodes() {
        let (scheduler, pods, nodes) = make_scheduler();
        nodes
            .put("node-up", make_node("node-up", NodeState::Ready))
            .await
            .unwrap();
        nodes
            .put("node-down", make_node("node-down", NodeState::NotReady))
            .await
            .unwrap();
        pods.put("pod-0", make_pod("pod-0")).await.unwrap();
        pods.put("pod-1", make_pod("pod-1")).await.unwrap();

        scheduler.reconcile().await.unwrap();

        for pod in pods.list().await.unwrap() {
            assert_eq!(pod.spec.node_name, "node-up");
        }
    }

    #[tokio::test]
    async fn leaves_pods_unscheduled_without_ready_nodes() {
        let (scheduler, pods, nodes) = make_scheduler();
        nodes
            .put("node-down", make_node("node-down", NodeState::NotReady))
            .await
            .unwrap();
        pods.put("pod-0", make_pod("pod-0")).await.unwrap();

        scheduler.reconcile().await.unwrap();

        let pod = pods.get("pod-0").await.unwrap().unwrap();
        assert_eq!(pod.spec.node_name, "");
    }

    #[tokio::test]
    async fn never_rebinds_a_bound_pod() {
        let (scheduler, pods, nodes) = make_scheduler();
        nodes
            .put("node-a", make_node("node-a", NodeState::Ready))
            .await
            .unwrap();

        let mut pod = make_pod("bound");
        pod.spec.node_name = "node-gone".to_string();
        pods.put("bound", pod).await.unwrap();

        scheduler.reconcile().await.unwrap();

        let pod = pods.get("bound").await.unwrap().unwrap();
        assert_eq!(pod.spec.node_name, "node-gone");
    }
}
