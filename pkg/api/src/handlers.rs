use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{info, warn};

use crate::AppState;
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use pkg_types::replicaset::ReplicaSet;

// ============================================================
// Pods
// ============================================================

pub async fn list_pods(State(state): State<AppState>) -> impl IntoResponse {
    match state.pods.list().await {
        Ok(pods) => (StatusCode::OK, Json(pods)).into_response(),
        Err(e) => {
            warn!("Failed to list pods: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn create_pod(
    State(state): State<AppState>,
    body: Result<Json<Pod>, JsonRejection>,
) -> impl IntoResponse {
    // Status defaults to Pending via serde when the caller omits it.
    let Json(pod) = match body {
        Ok(body) => body,
        Err(rejection) => return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response(),
    };

    match state.pods.put(&pod.spec.name, pod.clone()).await {
        Ok(()) => {
            info!("Created pod {}", pod.spec.name);
            (StatusCode::CREATED, Json(pod)).into_response()
        }
        Err(e) => {
            warn!("Failed to create pod {}: {}", pod.spec.name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn get_pod(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.pods.get(&name).await {
        Ok(Some(pod)) => (StatusCode::OK, Json(pod)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to get pod {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn update_pod(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Pod>, JsonRejection>,
) -> impl IntoResponse {
    let Json(pod) = match body {
        Ok(body) => body,
        Err(rejection) => return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response(),
    };

    // Full replace, keyed by the path name.
    match state.pods.put(&name, pod.clone()).await {
        Ok(()) => (StatusCode::OK, Json(pod)).into_response(),
        Err(e) => {
            warn!("Failed to update pod {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn delete_pod(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.pods.delete(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!("Failed to delete pod {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ============================================================
// ReplicaSets
// ============================================================

pub async fn list_replicasets(State(state): State<AppState>) -> impl IntoResponse {
    match state.replicasets.list().await {
        Ok(sets) => (StatusCode::OK, Json(sets)).into_response(),
        Err(e) => {
            warn!("Failed to list replicasets: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn create_replicaset(
    State(state): State<AppState>,
    body: Result<Json<ReplicaSet>, JsonRejection>,
) -> impl IntoResponse {
    let Json(rs) = match body {
        Ok(body) => body,
        Err(rejection) => return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response(),
    };

    match state.replicasets.put(&rs.name, rs.clone()).await {
        Ok(()) => {
            info!("Created replicaset {} (desired={})", rs.name, rs.desired_count);
            (StatusCode::CREATED, Json(rs)).into_response()
        }
        Err(e) => {
            warn!("Failed to create replicaset {}: {}", rs.name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn get_replicaset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.replicasets.get(&name).await {
        Ok(Some(rs)) => (StatusCode::OK, Json(rs)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to get replicaset {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn update_replicaset(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<ReplicaSet>, JsonRejection>,
) -> impl IntoResponse {
    let Json(rs) = match body {
        Ok(body) => body,
        Err(rejection) => return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response(),
    };

    match state.replicasets.put(&name, rs.clone()).await {
        Ok(()) => (StatusCode::OK, Json(rs)).into_response(),
        Err(e) => {
            warn!("Failed to update replicaset {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn delete_replicaset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.replicasets.delete(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!("Failed to delete replicaset {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ============================================================
// Nodes
// ============================================================

pub async fn list_nodes(State(state): State<AppState>) -> impl IntoResponse {
    match state.nodes.list().await {
        Ok(nodes) => (StatusCode::OK, Json(nodes)).into_response(),
        Err(e) => {
            warn!("Failed to list nodes: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn create_node(
    State(state): State<AppState>,
    body: Result<Json<Node>, JsonRejection>,
) -> impl IntoResponse {
    let Json(node) = match body {
        Ok(body) => body,
        Err(rejection) => return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response(),
    };

    match state.nodes.put(&node.name, node.clone()).await {
        Ok(()) => {
            info!("Registered node {}", node.name);
            (StatusCode::CREATED, Json(node)).into_response()
        }
        Err(e) => {
            warn!("Failed to create node {}: {}", node.name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.nodes.get(&name).await {
        Ok(Some(node)) => (StatusCode::OK, Json(node)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to get node {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn update_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Node>, JsonRejection>,
) -> impl IntoResponse {
    let Json(node) = match body {
        Ok(body) => body,
        Err(rejection) => return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response(),
    };

    match state.nodes.put(&name, node.clone()).await {
        Ok(()) => (StatusCode::OK, Json(node)).into_response(),
        Err(e) => {
            warn!("Failed to update node {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn delete_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.nodes.delete(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!("Failed to delete node {}: {}", name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
