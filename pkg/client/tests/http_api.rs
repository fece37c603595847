//! HTTP round-trip tests: a real axum server over in-memory stores,
//! exercised through the typed client.

use std::collections::HashMap;
use std::sync::Arc;

use pkg_api::server::serve;
use pkg_api::AppState;
use pkg_client::ApiClient;
use pkg_store::MemStore;
use pkg_types::node::{Node, NodeState};
use pkg_types::pod::{Pod, PodSpec, PodStatus};
use pkg_types::replicaset::ReplicaSet;

async fn spawn_server() -> String {
    let state = AppState {
        pods: Arc::new(MemStore::new()),
        replicasets: Arc::new(MemStore::new()),
        nodes: Arc::new(MemStore::new()),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(serve(state, listener));
    format!("http://{}", addr)
}

fn pod(name: &str) -> Pod {
    Pod::new(PodSpec {
        name: name.to_string(),
        image: "alpine".to_string(),
        node_name: String::new(),
        command: vec!["sleep".to_string(), "300".to_string()],
        env: HashMap::new(),
        labels: HashMap::from([("app".to_string(), "web".to_string())]),
    })
}

#[tokio::test]
async fn pod_create_get_delete_round_trip() {
    let url = spawn_server().await;
    let client = ApiClient::new(&url).expect("client");

    let created = pod("round-trip");
    client.create_pod(&created).await.expect("create");

    let fetched = client.get_pod("round-trip").await.expect("get");
    assert_eq!(fetched, Some(created));

    client.delete_pod("round-trip").await.expect("delete");
    assert_eq!(client.get_pod("round-trip").await.expect("get"), None);

    // DELETE of a missing pod is still 204.
    client.delete_pod("round-trip").await.expect("repeat delete");
}

#[tokio::test]
async fn post_defaults_pod_status_to_pending() {
    let url = spawn_server().await;
    let client = ApiClient::new(&url).expect("client");

    let body = serde_json::json!({
        "spec": {"name": "bare", "image": "alpine"}
    });
    let resp = reqwest::Client::new()
        .post(format!("{}/pods", url))
        .json(&body)
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);

    let fetched = client.get_pod("bare").await.expect("get").expect("found");
    assert_eq!(fetched.status, PodStatus::Pending);
    assert_eq!(fetched.spec.node_name, "");
}

#[tokio::test]
async fn put_is_full_replace_and_upsert() {
    let url = spawn_server().await;
    let client = ApiClient::new(&url).expect("client");

    // PUT on a name that doesn't exist yet creates it.
    let mut p = pod("upserted");
    client.update_pod("upserted", &p).await.expect("put new");
    assert!(client.get_pod("upserted").await.expect("get").is_some());

    p.spec.node_name = "node-1".to_string();
    p.status = PodStatus::Running;
    p.container_id = "ctr-9".to_string();
    client.update_pod("upserted", &p).await.expect("put replace");

    let fetched = client.get_pod("upserted").await.expect("get").expect("found");
    assert_eq!(fetched, p);
}

#[tokio::test]
async fn malformed_body_is_rejected_with_400() {
    let url = spawn_server().await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{}/pods", url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    // Well-formed JSON of the wrong shape is a 400 too.
    let resp = http
        .post(format!("{}/pods", url))
        .json(&serde_json::json!({"spec": 42}))
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_resources_are_404() {
    let url = spawn_server().await;
    let client = ApiClient::new(&url).expect("client");

    assert_eq!(client.get_pod("ghost").await.expect("pod"), None);
    assert_eq!(client.get_replicaset("ghost").await.expect("rs"), None);
    assert_eq!(client.get_node("ghost").await.expect("node"), None);
}

#[tokio::test]
async fn replicaset_and_node_round_trips() {
    let url = spawn_server().await;
    let client = ApiClient::new(&url).expect("client");

    let rs = ReplicaSet {
        name: "web".to_string(),
        desired_count: 3,
        current_count: 0,
        selector: HashMap::from([("app".to_string(), "web".to_string())]),
        template: pod("unused").spec,
    };
    client.create_replicaset(&rs).await.expect("create rs");
    assert_eq!(
        client.list_replicasets().await.expect("list rs"),
        vec![rs.clone()]
    );

    let node = Node {
        name: "node-1".to_string(),
        status: NodeState::Ready,
        last_heartbeat: None,
    };
    client.create_node(&node).await.expect("create node");
    assert_eq!(
        client.get_node("node-1").await.expect("get node"),
        Some(node)
    );

    client.delete_replicaset("web").await.expect("delete rs");
    assert!(client.list_replicasets().await.expect("list").is_empty());
}
