use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeState {
    Ready,
    #[default]
    NotReady,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Ready => write!(f, "Ready"),
            NodeState::NotReady => write!(f, "NotReady"),
        }
    }
}

/// A worker host, registered by its kubelet at startup or by an operator.
///
/// The owning kubelet stamps `last_heartbeat` every tick; the node
/// controller flips `status` based on heartbeat freshness. An absent
/// heartbeat is always considered stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub status: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_is_identity() {
        let node = Node {
            name: "node-1".to_string(),
            status: NodeState::Ready,
            last_heartbeat: Some(Utc::now()),
        };
        let decoded: Node =
            serde_json::from_str(&serde_json::to_string(&node).unwrap()).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn missing_fields_default_to_not_ready() {
        let node: Node = serde_json::from_str(r#"{"name":"node-2"}"#).unwrap();
        assert_eq!(node.status, NodeState::NotReady);
        assert!(node.last_heartbeat.is_none());
    }
}
