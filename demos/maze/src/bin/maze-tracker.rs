//! Membership tracker for maze sessions.

use clap::Parser;
use std::sync::Arc;
use tandem_node::InMemoryTracker;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "maze-tracker")]
#[command(about = "Keep the membership list of maze sessions")]
struct Args {
    /// Socket address to listen on
    #[arg(short, long, env = "TANDEM_TRACKER_LISTEN", default_value = "127.0.0.1:7000")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tandem_net=info")),
        )
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(&args.listen).await?;
    tandem_net::serve_tracker(listener, Arc::new(InMemoryTracker::new())).await?;
    Ok(())
}
