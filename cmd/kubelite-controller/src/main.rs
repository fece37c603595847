use clap::Parser;
use std::sync::Arc;
use tracing::info;

use pkg_client::ApiClient;
use pkg_controllers::{NodeController, ReplicaSetController};

#[derive(Parser, Debug)]
#[command(
    name = "kubelite-controller",
    about = "kubelite controllers (ReplicaSet + node health)"
)]
struct Cli {
    /// API server URL
    #[arg(long, default_value = "http://localhost:8080")]
    api_server: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    info!("Connecting to API server at {}", cli.api_server);
    let client = Arc::new(ApiClient::new(&cli.api_server)?);

    let node_controller = NodeController::new(client.clone());
    node_controller.start();

    let rs_controller = ReplicaSetController::new(client.clone(), client);
    rs_controller.start().await?;
    Ok(())
}
