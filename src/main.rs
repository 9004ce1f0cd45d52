//! mselect: an interactive probe for multistream-select negotiation.
//!
//! Dials a peer (or accepts one inbound connection), performs the
//! multistream hello exchange, then forwards operator lines as delimited
//! frames and interprets the responses. Special handling:
//! - `ls` requests and prints the peer's supported-protocol list
//! - a line starting with `/` proposes that protocol; on acceptance the
//!   tool drops into raw bidirectional byte relay

mod config;
mod frame;
mod listing;
mod relay;
mod session;

use config::{Config, Mode};
use session::{Session, SessionConfig};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let stream = match &config.mode {
        Mode::Listen { port } => {
            let listener = TcpListener::bind(("0.0.0.0", *port)).await?;
            info!(port = *port, "listening for one inbound connection");
            let (stream, addr) = listener.accept().await?;
            info!(peer = %addr, "accepted connection");
            stream
        }
        Mode::Dial { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            info!(host = %host, port = *port, "connected");
            stream
        }
    };

    let session = Session::new(SessionConfig {
        verbose: config.verbose,
    });
    session
        .run(
            stream,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await?;

    Ok(())
}
