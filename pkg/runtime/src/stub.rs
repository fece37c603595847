use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::{ContainerInfo, ContainerRuntime};
use pkg_types::container::{ContainerState, ContainerStatus};
use pkg_types::pod::PodSpec;

#[derive(Debug, Clone)]
struct StubContainer {
    id: String,
    name: String,
    state: ContainerState,
}

/// In-memory stand-in used where namespaces are unavailable, and as the
/// backend of the end-to-end suite. Containers are bookkeeping entries
/// only; nothing actually runs.
#[derive(Default)]
pub struct StubRuntime {
    containers: DashMap<String, StubContainer>,
    next_id: AtomicU64,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a container to Exited, the way a crashed process would.
    pub fn set_exited(&self, container_id: &str, exit_code: i32) -> bool {
        match self.containers.get_mut(container_id) {
            Some(mut c) => {
                c.state = ContainerState::exited(exit_code);
                true
            }
            None => false,
        }
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn run(&self, spec: &PodSpec) -> Result<String> {
        let id = format!("stub-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        info!("Stub runtime: started container {} for pod {}", id, spec.name);
        self.containers.insert(
            id.clone(),
            StubContainer {
                id: id.clone(),
                name: spec.name.clone(),
                state: ContainerState::running(),
            },
        );
        Ok(id)
    }

    async fn stop(&self, container_id: &str) -> Result<()> {
        let mut c = self
            .containers
            .get_mut(container_id)
            .ok_or_else(|| anyhow!("container {} not found", container_id))?;
        if c.state.status == ContainerStatus::Running {
            c.state = ContainerState::exited(0);
        }
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        self.containers.remove(container_id);
        Ok(())
    }

    async fn get_status(&self, container_id: &str) -> Result<ContainerState> {
        self.containers
            .get(container_id)
            .map(|c| c.state.clone())
            .ok_or_else(|| anyhow!("container {} not found", container_id))
    }

    async fn list(&self) -> Result<Vec<ContainerInfo>> {
        Ok(self
            .containers
            .iter()
            .map(|c| ContainerInfo {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect())
    }
}
