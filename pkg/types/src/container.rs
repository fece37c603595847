use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStatus {
    Running,
    Exited,
    Unknown,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Running => write!(f, "Running"),
            ContainerStatus::Exited => write!(f, "Exited"),
            ContainerStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Point-in-time observation of a container, as reported by the runtime.
/// Never persisted; the kubelet re-derives it every reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub status: ContainerStatus,
    #[serde(default)]
    pub exit_code: i32,
}

impl ContainerState {
    pub fn running() -> Self {
        Self {
            status: ContainerStatus::Running,
            exit_code: 0,
        }
    }

    pub fn exited(exit_code: i32) -> Self {
        Self {
            status: ContainerStatus::Exited,
            exit_code,
        }
    }
}
