//! Chat Gate Library
//!
//! Messaging API that only answers callers holding a valid access token
//! from an external OIDC identity provider.
//!
//! # Features
//!
//! - **Asymmetric JWT verification**: RS/PS/ES signatures checked against the issuer's JWKS
//! - **Fixed claim policy**: expiry, issuer, token use and client id
//! - **Bearer or cookie tokens**: one transport, chosen in configuration
//! - **Prometheus metrics**: auth outcomes, key fetches, HTTP traffic
//!
//! # Example
//!
//! ```no_run
//! use chat_gate::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod messages;
pub mod metrics;
pub mod router;
pub mod server;

// Re-export commonly used types
pub use auth::{AuthError, AuthenticatedUser, Authenticator, JwtAuthenticator};
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
