//! Reverse dialer tunnel server binary
//!
//! ```bash
//! # Listen with a generated development certificate
//! revdial-server --listen 0.0.0.0:8443
//!
//! # Production material
//! revdial-server --listen 0.0.0.0:8443 --cert /etc/revdial/tls.crt --key /etc/revdial/tls.key
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use revdial_server::{Server, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

/// Reverse dialer tunnel server
#[derive(Parser, Debug)]
#[command(
    name = "revdial-server",
    about = "Accepts reverse tunnel agents and dials through them",
    version
)]
struct Args {
    /// QUIC listen address
    #[arg(long, env = "REVDIAL_LISTEN", default_value = "0.0.0.0:8443")]
    listen: SocketAddr,

    /// Upgrade path clients must request
    #[arg(long, env = "REVDIAL_PATH", default_value = "/connect")]
    path: String,

    /// TLS certificate file (self-signed material is generated when missing)
    #[arg(long, env = "REVDIAL_CERT", default_value = "cert.pem")]
    cert: PathBuf,

    /// TLS private key file
    #[arg(long, env = "REVDIAL_KEY", default_value = "key.pem")]
    key: PathBuf,

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

    let config = ServerConfig::new(args.listen)
        .with_upgrade_path(args.path)
        .with_certificate(args.cert, args.key);

    let server = Server::bind(config).context("failed to start server")?;
    info!("listening on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => {
            result.context("server terminated")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down gracefully");
            server.shutdown();
        }
    }

    Ok(())
}
