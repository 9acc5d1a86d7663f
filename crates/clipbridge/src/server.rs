//! `ClipbridgeServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → relay.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clipbridge_protocol::{Codec, JsonCodec};
use clipbridge_room::{RelayConfig, RelayService};
use clipbridge_transport::{Transport, WebSocketTransport};

use crate::ClipbridgeError;
use crate::handler::handle_connection;

/// How long a connection may stay silent before it is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) relay: Arc<RelayService>,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Clipbridge server.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use clipbridge::prelude::*;
///
/// # async fn start() -> Result<(), ClipbridgeError> {
/// let server = ClipbridgeServer::builder()
///     .bind("0.0.0.0:8080")
///     .idle_timeout(Duration::from_secs(60))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ClipbridgeServerBuilder {
    bind_addr: String,
    relay_config: RelayConfig,
    idle_timeout: Duration,
}

impl ClipbridgeServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            relay_config: RelayConfig::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the relay configuration (TTL, limits, code format).
    pub fn relay_config(mut self, config: RelayConfig) -> Self {
        self.relay_config = config;
        self
    }

    /// Sets how long a connection may send nothing before it is closed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener and starts the relay (and its sweeper).
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<ClipbridgeServer<JsonCodec>, ClipbridgeError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let idle_timeout = if self.idle_timeout.is_zero() {
            tracing::warn!("idle_timeout of zero, using default");
            DEFAULT_IDLE_TIMEOUT
        } else {
            self.idle_timeout
        };

        let state = Arc::new(ServerState {
            relay: Arc::new(RelayService::start(self.relay_config)),
            codec: JsonCodec,
            idle_timeout,
        });

        Ok(ClipbridgeServer { transport, state })
    }
}

impl Default for ClipbridgeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Clipbridge server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct ClipbridgeServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl ClipbridgeServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> ClipbridgeServerBuilder {
        ClipbridgeServerBuilder::new()
    }
}

impl<C: Codec> ClipbridgeServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The relay shared by every connection. Clone the `Arc` to keep
    /// administering rooms after [`run`](Self::run) takes the server.
    pub fn relay(&self) -> &Arc<RelayService> {
        &self.state.relay
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), ClipbridgeError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then stops the
    /// sweeper and closes every room. Joined connections see their room
    /// channel end and close; others close at their idle timeout.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ClipbridgeError> {
        tracing::info!(
            addr = ?self.transport.local_addr().ok(),
            "clipbridge server running"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutdown requested");
        self.state.relay.shutdown().await;
        Ok(())
    }
}
