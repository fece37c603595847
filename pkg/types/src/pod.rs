use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Pod spec ---

/// Declared state for a single container, written by a user or stamped out
/// from a ReplicaSet template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    /// Cluster-unique name; doubles as the container name in the runtime.
    pub name: String,
    pub image: String,
    /// Empty until the scheduler binds the pod to a node.
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

// --- Pod status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PodStatus {
    #[default]
    Pending,
    Running,
    Failed,
    Unknown,
}

impl std::fmt::Display for PodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PodStatus::Pending => write!(f, "Pending"),
            PodStatus::Running => write!(f, "Running"),
            PodStatus::Failed => write!(f, "Failed"),
            PodStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

// --- Pod ---

/// A pod record as stored by the API server. `spec.name` is the primary key.
///
/// Writers: the scheduler sets `spec.node_name` once while it is empty; the
/// kubelet of the assigned node owns `status`, `container_id` and the retry
/// fields; the ReplicaSet controller creates and deletes whole records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
    /// Runtime-assigned id; empty until a container has been started.
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub retry_count: u32,
    /// Earliest time the kubelet may retry a failed start. `None` means
    /// retry immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl Pod {
    pub fn new(spec: PodSpec) -> Self {
        Self {
            spec,
            status: PodStatus::Pending,
            container_id: String::new(),
            message: String::new(),
            retry_count: 0,
            next_retry_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_is_identity() {
        let mut spec = PodSpec {
            name: "web-a1b2c3d4".to_string(),
            image: "alpine".to_string(),
            node_name: "node-1".to_string(),
            command: vec!["sleep".to_string(), "300".to_string()],
            env: HashMap::new(),
            labels: HashMap::from([("app".to_string(), "web".to_string())]),
        };
        spec.env.insert("FOO".to_string(), "bar".to_string());

        let pod = Pod {
            spec,
            status: PodStatus::Running,
            container_id: "ctr-1".to_string(),
            message: String::new(),
            retry_count: 2,
            next_retry_at: Some(Utc::now()),
        };

        let encoded = serde_json::to_string(&pod).unwrap();
        let decoded: Pod = serde_json::from_str(&encoded).unwrap();
        assert_eq!(pod, decoded);
    }

    #[test]
    fn status_defaults_to_pending() {
        let pod: Pod =
            serde_json::from_str(r#"{"spec":{"name":"solo","image":"alpine"}}"#).unwrap();
        assert_eq!(pod.status, PodStatus::Pending);
        assert_eq!(pod.spec.node_name, "");
        assert!(pod.container_id.is_empty());
        assert!(pod.next_retry_at.is_none());
    }
}
