use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::handlers;
use crate::AppState;

/// Build the full route table. No business logic lives here — handlers
/// decode, hit the store, and map to status codes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/pods",
            get(handlers::list_pods).post(handlers::create_pod),
        )
        .route(
            "/pods/{name}",
            get(handlers::get_pod)
                .put(handlers::update_pod)
                .delete(handlers::delete_pod),
        )
        .route(
            "/replicasets",
            get(handlers::list_replicasets).post(handlers::create_replicaset),
        )
        .route(
            "/replicasets/{name}",
            get(handlers::get_replicaset)
                .put(handlers::update_replicaset)
                .delete(handlers::delete_replicaset),
        )
        .route(
            "/nodes",
            get(handlers::list_nodes).post(handlers::create_node),
        )
        .route(
            "/nodes/{name}",
            get(handlers::get_node)
                .put(handlers::update_node)
                .delete(handlers::delete_node),
        )
        .with_state(state)
}

/// Serve the API on an already-bound listener until the process exits.
pub async fn serve(state: AppState, listener: TcpListener) -> anyhow::Result<()> {
    info!("API server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
