use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use pkg_store::Store;
use pkg_types::node::{Node, NodeState};

/// A node whose heartbeat is older than this is NotReady.
pub const HEARTBEAT_THRESHOLD: Duration = Duration::from_secs(15);

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Controller that flips node state on heartbeat staleness. Writes every
/// node back each pass whether or not the state changed; the write is
/// idempotent.
pub struct NodeController {
    nodes: Arc<dyn Store<Node>>,
    heartbeat_threshold: Duration,
    poll_interval: Duration,
}

impl NodeController {
    pub fn new(nodes: Arc<dyn Store<Node>>) -> Self {
        Self {
            nodes,
            heartbeat_threshold: HEARTBEAT_THRESHOLD,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start the controller loop as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "NodeController started (interval={}ms)",
                self.poll_interval.as_millis()
            );
            let mut interval = tokio::time::interval(self.poll_interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.reconcile_all().await {
                    warn!("NodeController reconcile error: {}", e);
                }
            }
        })
    }

    /// One pass: re-derive every node's state from its heartbeat age.
    pub async fn reconcile_all(&self) -> Result<()> {
        let now = Utc::now();
        for mut node in self.nodes.list().await? {
            // a missing heartbeat is always stale
            let fresh = node.last_heartbeat.is_some_and(|hb| {
                let age = now.signed_duration_since(hb).to_std().unwrap_or_default();
                age <= self.heartbeat_threshold
            });
            let new_status = if fresh {
                NodeState::Ready
            } else {
                NodeState::NotReady
            };

            if node.status != new_status {
                info!("Node {} status: {} -> {}", node.name, node.status, new_status);
            }
            node.status = new_status;

            let name = node.name.clone();
            if let Err(e) = self.nodes.put(&name, node).await {
                warn!("Failed to update node {}: {}", name, e);
            }
        }
        Ok(())
    }
}
