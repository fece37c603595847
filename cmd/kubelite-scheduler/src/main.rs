use clap::Parser;
use std::sync::Arc;
use tracing::info;

use pkg_client::ApiClient;
use pkg_scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "kubelite-scheduler", about = "kubelite pod scheduler")]
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

    let scheduler = Scheduler::new(client.clone(), client);
    scheduler.start().await?;
    Ok(())
}
