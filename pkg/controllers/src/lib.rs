pub mod node;
pub mod replicaset;

pub use node::NodeController;
pub use replicaset::{matches_selector, ReplicaSetController};
