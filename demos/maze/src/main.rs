//! Maze treasure hunt on a Tandem session.
//!
//! Every player runs one node; the first to start hosts the game as primary.
//! Start a tracker, then any number of players:
//!   cargo run -p tandem-maze --bin maze-tracker -- --listen 127.0.0.1:7000
//!   cargo run -p tandem-maze --bin maze-node -- --listen alice/a1@127.0.0.1:7101
//!   cargo run -p tandem-maze --bin maze-node -- --listen bob/b2@127.0.0.1:7102

mod maze;
mod presenter;

use anyhow::Context;
use clap::Parser;
use maze::Maze;
use presenter::TerminalPresenter;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_core::{ActionKind, Address};
use tandem_net::{RemoteGateway, RemoteTracker};
use tandem_node::{GameNode, NodeConfig, NodeEnv, NodeError, Tracker};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "maze-node")]
#[command(about = "Join or start a maze treasure hunt")]
struct Args {
    /// This node's address, `[name/]key@host:port`
    #[arg(short, long, env = "TANDEM_LISTEN")]
    listen: Address,

    /// Tracker endpoint
    #[arg(short, long, env = "TANDEM_TRACKER", default_value = "ws://127.0.0.1:7000")]
    tracker: String,

    /// Board width and height, used when this node starts the game
    #[arg(long, default_value_t = 15)]
    size: usize,

    /// Number of treasures kept on the board
    #[arg(long, default_value_t = 10)]
    treasures: usize,

    /// Protocol settings (TOML)
    #[arg(short, long, env = "TANDEM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout belongs to the board.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tandem_maze=info,tandem_node=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => NodeConfig::default(),
    };

    let tracker = Arc::new(RemoteTracker::new(args.tracker.as_str(), config.rpc_timeout()));
    let members = tracker
        .list_nodes()
        .await
        .with_context(|| format!("no tracker at {}", args.tracker))?;
    let listener = tandem_net::bind(&args.listen).await?;

    let title = format!("{} ({})", args.listen.user_name(), args.listen);
    let node = GameNode::new(
        args.listen.clone(),
        Maze::new(args.size, args.treasures),
        members,
        NodeEnv {
            gateway: Arc::new(RemoteGateway::new(config.rpc_timeout())),
            config,
            tracker,
            presenter: Box::new(move || Box::new(TerminalPresenter::new(title.clone()))),
        },
    );
    let server = tokio::spawn(tandem_net::serve_node(listener, node.clone()));
    node.init().await.context("joining the session")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let action = match line.trim() {
            "w" | "4" => ActionKind::up(),
            "s" | "2" => ActionKind::down(),
            "a" | "1" => ActionKind::left(),
            "d" | "3" => ActionKind::right(),
            "" | "0" => ActionKind::Stay,
            "q" | "9" => break,
            other => {
                tracing::warn!("Unknown command {:?}", other);
                continue;
            }
        };
        match node.submit_local_action(action).await {
            Ok(()) => {}
            Err(e @ (NodeError::SessionLost { .. } | NodeError::ShuttingDown)) => {
                tracing::error!("{}", e);
                break;
            }
            Err(e) => tracing::warn!("{} was not played: {}", action, e),
        }
    }

    if let Err(e) = node.leave().await {
        tracing::warn!("Left without saying goodbye: {}", e);
    }
    server.abort();
    Ok(())
}
