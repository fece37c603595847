use crate::pod::PodSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A desired count of pods matching a label selector.
///
/// `current_count` is observed state and is written only by the ReplicaSet
/// controller; everything else belongs to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaSet {
    pub name: String,
    pub desired_count: u32,
    #[serde(default)]
    pub current_count: u32,
    /// Pods whose labels contain every entry here are owned by this set.
    #[serde(default)]
    pub selector: HashMap<String, String>,
    /// Spec used when stamping out new pods. `name` and `node_name` are
    /// ignored; replacements are generated per pod.
    pub template: PodSpec,
}
