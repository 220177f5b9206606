//! wsrelay production server.
//!
//! Production glue around [`wsrelay_core`]'s action-based relay logic, using
//! tokio-tungstenite for WebSocket transport, axum for the stats endpoint,
//! and system time with OS randomness.
//!
//! # Architecture
//!
//! [`RelayDriver`] follows the Sans-IO pattern: it turns events into
//! actions and never touches a socket. [`Server`] owns the listeners, runs
//! one task per connection, feeds socket activity to the driver under a
//! single lock, and executes the returned actions after releasing it.
//!
//! # Components
//!
//! - [`Server`]: production runtime that executes `RelayDriver` actions
//! - [`ChannelHandle`]: per-connection send capability (unbounded channel)
//! - [`stats`]: HTTP monitoring routes
//! - [`SystemEnv`]: production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod stats;
mod system_env;
mod transport;

use std::{net::SocketAddr, sync::Arc, time::Duration};

pub use error::ServerError;
use futures_util::StreamExt;
pub use system_env::SystemEnv;
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::tungstenite::{
    Message,
    handshake::server::{ErrorResponse, Request, Response},
    http::StatusCode,
};
pub use transport::{ChannelHandle, WsListener};
use wsrelay_core::{
    ConnectionHandle, ConnectionId, Environment, LogLevel, RelayAction, RelayConfig, RelayDriver,
    RelayEvent, extract_username,
};

/// How long teardown waits for queued frames to flush before aborting the writer.
const WRITER_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Driver shared by every connection task and the stats routes.
pub type SharedDriver = Arc<Mutex<RelayDriver<SystemEnv, ChannelHandle>>>;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// WebSocket listener address (e.g., "127.0.0.1:8080")
    pub ws_bind: String,
    /// Stats HTTP listener address (e.g., "127.0.0.1:8081")
    pub http_bind: String,
    /// Driver configuration (prefix, limits)
    pub driver: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            ws_bind: "127.0.0.1:8080".to_string(),
            http_bind: "127.0.0.1:8081".to_string(),
            driver: RelayConfig::default(),
        }
    }
}

/// Production relay server.
///
/// Wraps `RelayDriver` with WebSocket and HTTP listeners.
pub struct Server {
    /// The action-based relay driver
    driver: SharedDriver,
    /// WebSocket listener
    transport: WsListener,
    /// Stats HTTP listener
    stats_listener: tokio::net::TcpListener,
    /// Environment
    env: SystemEnv,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// tungstenite answers pings and close frames itself, so the driver is
    /// told not to queue replies of its own.
    pub async fn bind(mut config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if !config.driver.prefix.starts_with('/') {
            return Err(ServerError::Config(format!(
                "prefix '{}' must start with '/'",
                config.driver.prefix
            )));
        }

        config.driver.transport_replies_to_control = true;
        let env = SystemEnv::new();
        let driver = Arc::new(Mutex::new(RelayDriver::new(env.clone(), config.driver)));

        let transport = WsListener::bind(&config.ws_bind).await?;
        let stats_listener = transport::bind_tcp(&config.http_bind).await?;
        tracing::info!("Stats endpoint bound to {}", stats_listener.local_addr()?);

        Ok(Self { driver, transport, stats_listener, env })
    }

    /// WebSocket address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Stats HTTP address the server is bound to.
    pub fn stats_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.stats_listener.local_addr()?)
    }

    /// Run the server, accepting connections and serving stats.
    ///
    /// This method runs until the process is shut down.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let stats_app = stats::router(Arc::clone(&self.driver));
        let stats_listener = self.stats_listener;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(stats_listener, stats_app).await {
                tracing::error!("Stats endpoint error: {}", e);
            }
        });

        loop {
            match self.transport.accept().await {
                Ok((stream, peer)) => {
                    let driver = Arc::clone(&self.driver);
                    let env = self.env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, driver, env).await {
                            tracing::debug!("Connection from {} ended: {}", peer, e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}

/// Handle a single WebSocket connection from accept to teardown.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    driver: SharedDriver,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let (handle, outbound) = ChannelHandle::channel();

    let (connection_id, prefix) = {
        let mut relay = driver.lock().await;
        let connection_id = fresh_connection_id(&relay, &env);
        let actions = relay.process_event(RelayEvent::ConnectionOpened {
            connection_id,
            handle: handle.clone(),
        })?;
        let accepted = relay.registry().is_live(connection_id);
        let prefix = relay.config().prefix.clone();
        drop(relay);

        execute_actions(actions);
        if !accepted {
            return Ok(());
        }
        (connection_id, prefix)
    };

    tracing::debug!("Connection {} from {}", connection_id, peer);

    let mut username = None;
    let handshake = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match extract_username(req.uri().path(), &prefix) {
                Ok(name) => {
                    username = Some(name);
                    Ok(response)
                },
                Err(e) => {
                    let mut rejection = ErrorResponse::new(Some(e.to_string()));
                    *rejection.status_mut() = StatusCode::BAD_REQUEST;
                    Err(rejection)
                },
            }
        },
    )
    .await;

    let ws_stream = match (handshake, username) {
        (Ok(ws_stream), Some(username)) => {
            if let Err(e) = dispatch(
                &driver,
                RelayEvent::HandshakeCompleted { connection_id, username },
            )
            .await
            {
                dispatch_closed(&driver, connection_id, "join rejected").await;
                return Err(e);
            }
            ws_stream
        },
        (Ok(_), None) => {
            dispatch_closed(&driver, connection_id, "handshake without username").await;
            return Err(ServerError::Protocol("handshake completed without username".to_string()));
        },
        (Err(e), _) => {
            dispatch_closed(&driver, connection_id, "handshake failed").await;
            return Err(e.into());
        },
    };

    let (sink, mut source) = ws_stream.split();
    let writer = tokio::spawn(transport::write_frames(sink, outbound));
    drop(handle);

    while let Some(message) = source.next().await {
        let event = match message {
            Ok(Message::Text(text)) => {
                RelayEvent::TextFrame { connection_id, text: text.as_str().to_string() }
            },
            Ok(Message::Ping(payload)) => {
                RelayEvent::PingFrame { connection_id, payload: payload.to_vec() }
            },
            Ok(Message::Close(frame)) => RelayEvent::CloseFrame {
                connection_id,
                reason: frame.map(|f| f.reason.as_str().to_string()),
            },
            Ok(Message::Binary(data)) => {
                tracing::debug!("Ignoring {}-byte binary frame from {}", data.len(), connection_id);
                continue;
            },
            Ok(Message::Pong(_) | Message::Frame(_)) => continue,
            Err(e) => {
                tracing::debug!("Read error on {}: {}", connection_id, e);
                break;
            },
        };

        let closing = matches!(event, RelayEvent::CloseFrame { .. });
        if let Err(e) = dispatch(&driver, event).await {
            tracing::warn!("Frame processing error on {}: {}", connection_id, e);
        }
        if closing {
            break;
        }
    }

    dispatch_closed(&driver, connection_id, "connection closed").await;
    if !transport::drain_writer(writer, WRITER_DRAIN_GRACE).await {
        tracing::debug!("Writer for {} did not drain in time, aborted", connection_id);
    }

    Ok(())
}

/// Draw a connection id that is not currently live.
fn fresh_connection_id(
    driver: &RelayDriver<SystemEnv, ChannelHandle>,
    env: &SystemEnv,
) -> ConnectionId {
    loop {
        let connection_id = ConnectionId(env.random_u64());
        if !driver.registry().is_live(connection_id) {
            return connection_id;
        }
    }
}

/// Process one event under the driver lock, then execute its actions.
async fn dispatch(
    driver: &SharedDriver,
    event: RelayEvent<ChannelHandle>,
) -> Result<(), ServerError> {
    let actions = driver.lock().await.process_event(event)?;
    execute_actions(actions);
    Ok(())
}

async fn dispatch_closed(driver: &SharedDriver, connection_id: ConnectionId, reason: &str) {
    let event = RelayEvent::ConnectionClosed { connection_id, reason: reason.to_string() };
    if let Err(e) = dispatch(driver, event).await {
        tracing::error!("Teardown of {} failed: {}", connection_id, e);
    }
}

/// Execute relay actions.
fn execute_actions(actions: Vec<RelayAction<ChannelHandle>>) {
    for action in actions {
        match action {
            RelayAction::Deliver(delivery) => {
                let connection_id = delivery.connection_id;
                if !delivery.handle.send(delivery.frame) {
                    tracing::debug!("Dropped frame for closed connection {}", connection_id);
                }
            },

            RelayAction::Log { level, message, .. } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}
