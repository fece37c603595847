pub mod handlers;
pub mod server;

use std::sync::Arc;

use pkg_store::Store;
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use pkg_types::replicaset::ReplicaSet;

/// Shared application state injected into all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pods: Arc<dyn Store<Pod>>,
    pub replicasets: Arc<dyn Store<ReplicaSet>>,
    pub nodes: Arc<dyn Store<Node>>,
}
