//! Reverse dialer tunnel server
//!
//! Accepts inbound QUIC sessions, authorizes their upgrade requests and
//! parks each session in the registry so local callers can dial through
//! it:
//!
//! ```no_run
//! use revdial_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::new("0.0.0.0:8443".parse()?))?;
//!     tokio::spawn({
//!         let registry = server.registry().clone();
//!         async move {
//!             // Once an agent with `tunnel-id: t1` connects:
//!             if let Ok(dialer) = registry.get_dialer("t1") {
//!                 let _conn = dialer.dial("tcp", "10.0.0.5:80").await;
//!             }
//!         }
//!     });
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

mod auth;
mod server;

pub use auth::{AuthDecision, AuthError, Authorizer, HeaderAuthorizer, TUNNEL_ID_HEADER};
pub use server::{Server, ServerConfig, ServerError};
