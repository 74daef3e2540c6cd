//! Reverse dialer tunnel agent
//!
//! The agent dials out to a centrally-reachable tunnel server and holds
//! one long-lived session. From then on the relationship inverts: the
//! server dials TCP/UDP targets *through* the agent as if they were
//! ordinary local connections, and the agent can dial through the server
//! the same way.
//!
//! ```no_run
//! use revdial_client::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("https://tunnel.example.com:8443/connect")
//!         .with_header("tunnel-id", "edge-7");
//!     let client = Client::new(config)?;
//!
//!     // Blocks driving the keepalive loop until the session dies.
//!     client.connect().await?;
//!     Ok(())
//! }
//! ```

mod client;

pub use client::{Client, ClientConfig, ClientError};
