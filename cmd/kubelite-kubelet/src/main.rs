use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use pkg_client::ApiClient;
use pkg_kubelet::Kubelet;
use pkg_types::node::{Node, NodeState};

#[derive(Parser, Debug)]
#[command(name = "kubelite-kubelet", about = "kubelite node agent")]
struct Cli {
    /// API server URL
    #[arg(long, default_value = "http://localhost:8080")]
    api_server: String,

    /// Node name (cluster-unique)
    #[arg(long)]
    name: String,

    /// Directory for images and container state
    #[arg(long, default_value = "/var/lib/kubelite")]
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

    let client = Arc::new(ApiClient::new(&cli.api_server)?);

    // register ourselves before the first reconcile pass
    client
        .create_node(&Node {
            name: cli.name.clone(),
            status: NodeState::Ready,
            last_heartbeat: Some(Utc::now()),
        })
        .await
        .context("register node")?;
    info!(
        "Kubelet {}: registered with API server at {}",
        cli.name, cli.api_server
    );

    let runtime = pkg_runtime::detect(&cli.runtime, &cli.root_dir)?;

    let kubelet = Kubelet::new(cli.name, client.clone(), client, runtime);
    kubelet.start().await?;
    Ok(())
}
