pub mod docker;
pub mod stub;

#[cfg(target_os = "linux")]
pub mod child;
#[cfg(target_os = "linux")]
mod image;
#[cfg(target_os = "linux")]
pub mod namespace;
#[cfg(target_os = "linux")]
mod rootfs;

/// No-op off Linux so binaries can call the child hook unconditionally.
#[cfg(not(target_os = "linux"))]
pub mod child {
    pub fn run_if_child() -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub use namespace::NamespaceRuntime;

pub use docker::DockerRuntime;
pub use stub::StubRuntime;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

use pkg_types::container::ContainerState;
use pkg_types::pod::PodSpec;

/// A container as reported by [`ContainerRuntime::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
}

/// The contract the kubelet drives. Implementations name each container
/// after its pod, which is the only link used for adoption and orphan
/// detection.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a detached container for the spec; returns the runtime id.
    async fn run(&self, spec: &PodSpec) -> Result<String>;

    /// Graceful then forceful. Stopping a stopped container is not an error.
    async fn stop(&self, container_id: &str) -> Result<()>;

    /// Requires the container to be stopped.
    async fn remove(&self, container_id: &str) -> Result<()>;

    /// Err for an unknown id; the kubelet reads that as "container gone".
    async fn get_status(&self, container_id: &str) -> Result<ContainerState>;

    /// All containers owned by this runtime, recovered ones included.
    async fn list(&self) -> Result<Vec<ContainerInfo>>;
}

/// Pick a runtime implementation by name.
pub fn detect(kind: &str, root_dir: &str) -> Result<Arc<dyn ContainerRuntime>> {
    match kind {
        "namespace" => detect_namespace(root_dir),
        "docker" => Ok(Arc::new(DockerRuntime::new())),
        "stub" => Ok(Arc::new(StubRuntime::new())),
        other => Err(anyhow!("unknown runtime {:?}", other)),
    }
}

#[cfg(target_os = "linux")]
fn detect_namespace(root_dir: &str) -> Result<Arc<dyn ContainerRuntime>> {
    Ok(Arc::new(NamespaceRuntime::new(root_dir)?))
}

#[cfg(not(target_os = "linux"))]
fn detect_namespace(_root_dir: &str) -> Result<Arc<dyn ContainerRuntime>> {
    tracing::info!("Namespace runtime needs Linux, falling back to stub");
    Ok(Arc::new(StubRuntime::new()))
}
