//! HTTP server module
//!
//! Accepts connections with `hyper` on `tokio` and hands every request to
//! [`handlers::handle_request`]. Each connection runs in its own task; a
//! failing connection is logged and never stops the accept loop.
//!
//! # Example
//!
//! ```no_run
//! use chat_gate::config::Config;
//! use chat_gate::server::Server;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let server = Server::new(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod handlers;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::messages::{InMemoryMessageStore, MessageStore};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),
}

/// Collaborators shared by every request
pub struct AppState {
    pub authenticator: Arc<dyn Authenticator>,
    pub messages: Arc<dyn MessageStore>,
    /// Emit `Secure; SameSite=None` on cookies the server sets
    pub secure_cookies: bool,
    /// Serve `GET /metrics`
    pub metrics_enabled: bool,
}

impl AppState {
    pub fn new(authenticator: Arc<dyn Authenticator>, messages: Arc<dyn MessageStore>) -> Self {
        Self {
            authenticator,
            messages,
            secure_cookies: false,
            metrics_enabled: true,
        }
    }

    /// JWT authentication against the configured issuer, in-memory messages
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(config.auth.authenticator()),
            Arc::new(InMemoryMessageStore::new()),
        )
        .with_secure_cookies(config.server.secure_cookies)
        .with_metrics(config.metrics.enabled)
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }
}

/// HTTP Server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind the configured address and wire the state from configuration
    ///
    /// Port 0 lets the OS pick a free port; see [`Server::local_addr`].
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let state = AppState::from_config(&config);
        info!(
            issuer = %config.auth.issuer,
            jwks_url = %config.auth.jwks_url(),
            token_source = config.auth.token_source.label(),
            "Token verification configured"
        );
        Self::bind(&config.server.address, state).await
    }

    /// Bind `address` with explicit collaborators
    pub async fn bind(address: &str, state: AppState) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        // Actual address, important for port 0
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(state),
            listener,
            local_addr,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Starting server on {}", self.local_addr);

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handlers::handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}
