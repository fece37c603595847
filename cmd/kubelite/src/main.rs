//! All-in-one launcher: API server, scheduler, controllers, and two
//! kubelets in a single process, backed by in-memory stores. Handy for
//! demos and local poking; the cluster state is gone when the process is.

use chrono::Utc;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use pkg_api::{server, AppState};
use pkg_client::ApiClient;
use pkg_controllers::{NodeController, ReplicaSetController};
use pkg_kubelet::Kubelet;
use pkg_scheduler::Scheduler;
use pkg_store::{MemStore, Store};
use pkg_types::node::{Node, NodeState};
use pkg_types::pod::Pod;
use pkg_types::replicaset::ReplicaSet;

#[derive(Parser, Debug)]
#[command(name = "kubelite", about = "kubelite all-in-one cluster")]
struct Cli {
    /// Port for the embedded API server
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Directory for images and container state
    #[arg(long, default_value = "/tmp/kubelite")]
    root_dir: String,

    /// Container runtime: namespace, docker, or stub
    #[arg(long, default_value = "namespace")]
    runtime: String,
}

fn main() -> anyhow::Result<()> {
    // a re-exec'd container child never returns from this call
    pkg_runtime::child::run_if_child()?;
    run()
}

#[tokio::main]
async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let pods: Arc<dyn Store<Pod>> = Arc::new(MemStore::new());
    let replicasets: Arc<dyn Store<ReplicaSet>> = Arc::new(MemStore::new());
    let nodes: Arc<dyn Store<Node>> = Arc::new(MemStore::new());

    let state = AppState {
        pods,
        replicasets,
        nodes,
    };
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], cli.port))).await?;
    tokio::spawn(server::serve(state, listener));

    // every loop goes through the API, exactly as it would split across
    // processes
    let client = Arc::new(ApiClient::new(&format!("http://localhost:{}", cli.port))?);

    for name in ["node-1", "node-2"] {
        client
            .create_node(&Node {
                name: name.to_string(),
                status: NodeState::Ready,
                last_heartbeat: Some(Utc::now()),
            })
            .await?;
    }

    let runtime = pkg_runtime::detect(&cli.runtime, &cli.root_dir)?;

    Scheduler::new(client.clone(), client.clone()).start();
    ReplicaSetController::new(client.clone(), client.clone()).start();
    NodeController::new(client.clone()).start();
    Kubelet::new("node-1", client.clone(), client.clone(), runtime.clone()).start();
    Kubelet::new("node-2", client.clone(), client.clone(), runtime).start();

    info!("kubelite is running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
