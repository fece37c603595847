use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use pkg_api::{server, AppState};
use pkg_store::{open_db, DiskStore};
use pkg_types::config::{load_config_file, ServerConfigFile};
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use pkg_types::replicaset::ReplicaSet;

#[derive(Parser, Debug)]
#[command(name = "kubelite-apiserver", about = "kubelite API server (cluster state)")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = "/etc/kubelite/config.yaml")]
    config: String,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory for the state database
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let file_cfg: ServerConfigFile = load_config_file(&cli.config)?;

    // Merge: CLI args > config file > defaults
    let port = cli.port.or(file_cfg.port).unwrap_or(8080);
    let db_path = cli
        .db
        .or(file_cfg.db)
        .unwrap_or_else(|| "kubelite-data".to_string());

    info!("Starting kubelite-apiserver");
    info!("  Port:     {}", port);
    info!("  Database: {}", db_path);

    let db = open_db(&db_path).await?;
    let state = AppState {
        pods: Arc::new(DiskStore::<Pod>::new(db.clone(), "pods")),
        replicasets: Arc::new(DiskStore::<ReplicaSet>::new(db.clone(), "replicasets")),
        nodes: Arc::new(DiskStore::<Node>::new(db, "nodes")),
    };

    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    server::serve(state, listener).await
}
