//! `RebusServer` builder and server loop.
//!
//! This is the entry point for running a Rebus server. It ties together
//! all the layers: transport → protocol → room registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rebus_protocol::{Codec, JsonCodec};
use rebus_room::{GameConfig, RoomRegistry};
use rebus_transport::{Transport, WebSocketTransport};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;

use crate::RebusError;
use crate::handler::handle_connection;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Network-facing settings. Game rules live in [`GameConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: String,

    /// A connection that sends nothing for this long is dropped. Clients
    /// keep quiet sockets alive with `ping`.
    pub idle_timeout: Duration,

    /// How often the registry forgets rooms whose actor has stopped.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            idle_timeout: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a Rebus server.
///
/// # Example
///
/// ```rust,no_run
/// use rebus::prelude::*;
///
/// # async fn run() -> Result<(), RebusError> {
/// let server = RebusServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
///
/// // The creation surface talks to the registry directly.
/// let room = server.registry().create_room().await;
/// println!("room {} ready", room.code);
///
/// server.run().await
/// # }
/// ```
pub struct RebusServerBuilder {
    config: ServerConfig,
    game_config: GameConfig,
    registry: Option<Arc<RoomRegistry>>,
}

impl RebusServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            game_config: GameConfig::default(),
            registry: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Sets the rules new rooms are created with.
    ///
    /// Ignored when an existing registry is supplied through
    /// [`registry`](Self::registry).
    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.game_config = config;
        self
    }

    /// Serves rooms from an existing registry instead of a fresh one.
    pub fn registry(mut self, registry: Arc<RoomRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<RebusServer<JsonCodec>, RebusError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(RoomRegistry::new(self.game_config)));

        let state = Arc::new(ServerState {
            registry,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(RebusServer { transport, state })
    }
}

impl Default for RebusServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound Rebus server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RebusServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl RebusServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> RebusServerBuilder {
        RebusServerBuilder::new()
    }
}

impl<C: Codec> RebusServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RebusError> {
        Ok(self.transport.local_addr()?)
    }

    /// The registry this server routes into. Rooms are created and fed
    /// their puzzles through it.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the server accept loop.
    ///
    /// Spawns the registry sweep, then accepts connections and spawns a
    /// handler task for each. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), RebusError> {
        tracing::info!(addr = %self.state.config.bind_addr, "Rebus server running");
        spawn_sweeper(
            Arc::clone(&self.state.registry),
            self.state.config.sweep_interval,
        );

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Periodically drops registry entries for rooms that have shut down.
fn spawn_sweeper(registry: Arc<RoomRegistry>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            registry.sweep().await;
        }
    });
}
