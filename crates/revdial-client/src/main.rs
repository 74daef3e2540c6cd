//! Reverse dialer tunnel agent binary
//!
//! ```bash
//! revdial-client --server https://tunnel.example.com:8443/connect --tunnel-id edge-7
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use revdial_client::{Client, ClientConfig};
use std::time::Duration;
use tracing::{error, info};

/// Reverse dialer tunnel agent
#[derive(Parser, Debug)]
#[command(
    name = "revdial-client",
    about = "Connects out to a tunnel server and serves reverse dials",
    version
)]
struct Args {
    /// Server URL (must be https)
    #[arg(long, env = "REVDIAL_SERVER", default_value = "https://localhost:8443/connect")]
    server: String,

    /// Tunnel id presented to the server's authorizer
    #[arg(long, env = "REVDIAL_TUNNEL_ID")]
    tunnel_id: String,

    /// Extra upgrade header as name=value; repeatable
    #[arg(long = "header", value_name = "NAME=VALUE")]
    headers: Vec<String>,

    /// Seconds to wait before reconnecting after a failure
    #[arg(long, env = "REVDIAL_RETRY_AFTER", default_value = "10")]
    retry_after: u64,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .with_target(true)
        .init();

    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut config =
        ClientConfig::new(&args.server).with_header("tunnel-id", &args.tunnel_id);
    for header in &args.headers {
        let (name, value) = parse_header(header)?;
        config = config.with_header(name, value);
    }

    let client = Client::new(config).context("failed to create client")?;
    let retry_after = Duration::from_secs(args.retry_after);

    info!(server = %args.server, tunnel_id = %args.tunnel_id, "starting agent");

    loop {
        tokio::select! {
            result = client.connect() => {
                if let Err(err) = result {
                    error!(error = %err, "session failed, retrying in {}s", retry_after.as_secs());
                }
                client.close().await;
                tokio::time::sleep(retry_after).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                client.close().await;
                return Ok(());
            }
        }
    }
}

fn parse_header(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| anyhow!("invalid header {raw:?}, expected NAME=VALUE"))
}
