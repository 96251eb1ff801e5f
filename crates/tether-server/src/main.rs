//! Tether demo server.
//!
//! Serves one tether session over a WebSocket at `/_socket` and exits when
//! the client terminates or on Ctrl-C.

mod demo;
mod handler;
mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::{Arc, Mutex};
use tether_core::{Session, SessionConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::demo::{DemoModel, DemoRemote};

#[derive(Parser, Debug)]
#[command(name = "tether-server")]
#[command(about = "WebSocket host for a tether demo session")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Send `<`, `>` and `&` unescaped in model strings
    #[arg(long)]
    no_escape_html: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting tether server");

    let config = SessionConfig {
        escape_html: !args.no_escape_html,
        ..SessionConfig::default()
    };
    let model = Arc::new(Mutex::new(DemoModel::sample()));
    let remote = Arc::new(DemoRemote::new(model.clone()));
    let session = Arc::new(Session::with_model(remote, model, config));
    info!(
        "Session {} exposes {}",
        session.id(),
        session.dispatcher().operations().join(", ")
    );

    let addr = server::start_server(session.clone(), &args.host, args.port).await?;

    // Print port for the launcher to read (intentional stdout for IPC)
    println!("TETHER_PORT={}", addr.port());

    info!("Tether server running on {}", addr);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, exiting");
        }
        _ = session.terminated() => {
            info!("Client terminated the session, exiting");
        }
    }

    Ok(())
}
