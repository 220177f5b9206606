//! Relay driver.
//!
//! Single dispatch point for every transport event. Owns the session
//! registry, calls the router for text frames, and returns actions for the
//! runtime to execute. No I/O happens here.

use std::{collections::BTreeSet, time::Instant};

use crate::{
    env::Environment,
    envelope::EnvelopeError,
    error::RelayError,
    handle::{ConnectionHandle, ConnectionId, OutboundFrame},
    registry::{ConnectionRegistry, RegistryStats},
    router::{self, Delivery, RouteOutcome},
};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upgrade path prefix; clients connect to `<prefix>/<username>`
    pub prefix: String,
    /// Maximum concurrent connections, joined or pending
    pub max_connections: usize,
    /// The transport answers pings and close frames at the protocol layer.
    ///
    /// When set, `PingFrame` and `CloseFrame` are only logged and the driver
    /// queues no pong or close echo of its own.
    pub transport_replies_to_control: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            prefix: "/ws".to_string(),
            max_connections: 10_000,
            transport_replies_to_control: false,
        }
    }
}

/// Events that the relay driver processes.
///
/// Produced by the transport. Events for one connection arrive in order and
/// never overlap.
#[derive(Debug, Clone)]
pub enum RelayEvent<H> {
    /// TCP connection accepted; WebSocket handshake not done yet
    ConnectionOpened {
        /// Id assigned by the transport
        connection_id: ConnectionId,
        /// Send/close capability for the connection
        handle: H,
    },

    /// Handshake succeeded and the upgrade path named a user
    HandshakeCompleted {
        /// Upgraded connection
        connection_id: ConnectionId,
        /// Username taken from the upgrade path
        username: String,
    },

    /// Text frame received
    TextFrame {
        /// Connection that sent the frame
        connection_id: ConnectionId,
        /// Frame contents
        text: String,
    },

    /// Ping frame received
    PingFrame {
        /// Connection that sent the ping
        connection_id: ConnectionId,
        /// Ping payload, echoed in the pong
        payload: Vec<u8>,
    },

    /// Peer started the close handshake
    CloseFrame {
        /// Connection that sent the close frame
        connection_id: ConnectionId,
        /// Close reason sent by the peer, if any
        reason: Option<String>,
    },

    /// Connection is gone (closed by peer, error, or eviction)
    ConnectionClosed {
        /// Connection that closed
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },
}

/// Actions that the relay driver produces.
#[derive(Debug, Clone)]
pub enum RelayAction<H> {
    /// Queue a frame on a connection
    Deliver(Delivery<H>),

    /// Log a message
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
        /// When the event occurred
        timestamp: Instant,
    },
}

/// Log levels for relay actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based relay driver.
pub struct RelayDriver<E, H>
where
    E: Environment,
    H: ConnectionHandle,
{
    /// Connections and sessions
    registry: ConnectionRegistry<H>,
    /// Environment (time, RNG)
    env: E,
    /// Relay configuration
    config: RelayConfig,
}

impl<E, H> RelayDriver<E, H>
where
    E: Environment,
    H: ConnectionHandle,
{
    /// Create a new relay driver.
    pub fn new(env: E, config: RelayConfig) -> Self {
        Self { registry: ConnectionRegistry::new(), env, config }
    }

    /// Process a relay event and return actions to execute.
    ///
    /// This is the main entry point for the relay driver.
    pub fn process_event(
        &mut self,
        event: RelayEvent<H>,
    ) -> Result<Vec<RelayAction<H>>, RelayError> {
        match event {
            RelayEvent::ConnectionOpened { connection_id, handle } => {
                Ok(self.handle_connection_opened(connection_id, handle))
            },
            RelayEvent::HandshakeCompleted { connection_id, username } => {
                self.handle_handshake_completed(connection_id, &username)
            },
            RelayEvent::TextFrame { connection_id, text } => {
                self.handle_text_frame(connection_id, &text)
            },
            RelayEvent::PingFrame { connection_id, payload } => {
                Ok(self.handle_ping(connection_id, payload))
            },
            RelayEvent::CloseFrame { connection_id, reason } => {
                Ok(self.handle_close_frame(connection_id, reason))
            },
            RelayEvent::ConnectionClosed { connection_id, reason } => {
                Ok(self.handle_connection_closed(connection_id, &reason))
            },
        }
    }

    fn handle_connection_opened(
        &mut self,
        connection_id: ConnectionId,
        handle: H,
    ) -> Vec<RelayAction<H>> {
        if self.registry.connection_count() >= self.config.max_connections {
            return vec![
                self.deliver(connection_id, handle, OutboundFrame::close("max connections exceeded")),
                self.log(
                    LogLevel::Warn,
                    format!("connection {connection_id} rejected: max connections exceeded"),
                ),
            ];
        }

        if !self.registry.add_connection(connection_id, handle.clone()) {
            return vec![
                self.deliver(connection_id, handle, OutboundFrame::close("connection id collision")),
                self.log(LogLevel::Error, format!("connection id {connection_id} already live")),
            ];
        }

        vec![self.log(LogLevel::Debug, format!("connection {connection_id} accepted"))]
    }

    fn handle_handshake_completed(
        &mut self,
        connection_id: ConnectionId,
        username: &str,
    ) -> Result<Vec<RelayAction<H>>, RelayError> {
        let outcome = self.registry.join(username, connection_id)?;
        let mut actions = Vec::new();

        if let Some(evicted) = outcome.evicted {
            actions.push(self.log(
                LogLevel::Warn,
                format!(
                    "duplicate login [{username}:{}], disconnecting previous connection",
                    evicted.connection_id
                ),
            ));
            actions.push(self.deliver(
                evicted.connection_id,
                evicted.handle,
                OutboundFrame::close("logged in from another connection"),
            ));
        }

        if let Some(previous) = outcome.released_username {
            actions.push(self.log(
                LogLevel::Info,
                format!("user [{previous}:{connection_id}] renamed to {username}"),
            ));
        }

        actions.push(self.log(LogLevel::Info, format!("user [{username}:{connection_id}] joined")));
        Ok(actions)
    }

    fn handle_text_frame(
        &self,
        connection_id: ConnectionId,
        text: &str,
    ) -> Result<Vec<RelayAction<H>>, RelayError> {
        let routed = match router::route(&self.registry, connection_id, text) {
            Ok(routed) => routed,
            Err(err @ EnvelopeError::Malformed(_)) => {
                return Ok(vec![self.log(
                    LogLevel::Warn,
                    format!("dropping frame from {connection_id}: {err}"),
                )]);
            },
            Err(err) => return Err(err.into()),
        };

        let summary = match &routed.outcome {
            RouteOutcome::NotJoined => {
                format!("text from {connection_id} before join, replied with error")
            },
            RouteOutcome::Targeted { source, requested, delivered } => {
                format!("{source} -> {delivered}/{requested} targets")
            },
            RouteOutcome::Broadcast { source, delivered } => {
                format!("{source} broadcast to {delivered} connections")
            },
        };

        let mut actions: Vec<_> = routed.deliveries.into_iter().map(RelayAction::Deliver).collect();
        actions.push(self.log(LogLevel::Debug, summary));
        Ok(actions)
    }

    fn handle_ping(&self, connection_id: ConnectionId, payload: Vec<u8>) -> Vec<RelayAction<H>> {
        let mut actions =
            vec![self.log(LogLevel::Debug, format!("connection {connection_id} heartbeat"))];
        if self.config.transport_replies_to_control {
            return actions;
        }

        if let Some(handle) = self.registry.connection(connection_id) {
            actions.push(self.deliver(connection_id, handle.clone(), OutboundFrame::Pong(payload)));
        }

        actions
    }

    fn handle_close_frame(
        &self,
        connection_id: ConnectionId,
        reason: Option<String>,
    ) -> Vec<RelayAction<H>> {
        let reason = reason.unwrap_or_default();
        let mut actions = vec![self.log(
            LogLevel::Debug,
            format!("connection {connection_id} requested close: {reason:?}"),
        )];
        if self.config.transport_replies_to_control {
            return actions;
        }

        if let Some(handle) = self.registry.connection(connection_id) {
            actions.push(self.deliver(connection_id, handle.clone(), OutboundFrame::Close { reason }));
        }

        actions
    }

    fn handle_connection_closed(
        &mut self,
        connection_id: ConnectionId,
        reason: &str,
    ) -> Vec<RelayAction<H>> {
        let Some(removed) = self.registry.remove_connection(connection_id) else {
            return Vec::new();
        };

        let message = match removed.username {
            Some(username) => format!("user [{username}:{connection_id}] left: {reason}"),
            None => format!("connection {connection_id} closed: {reason}"),
        };

        vec![self.log(LogLevel::Info, message)]
    }

    /// Unbind a username without closing its connection.
    pub fn leave(&mut self, username: &str) -> Vec<RelayAction<H>> {
        match self.registry.leave(username) {
            Some(connection_id) => {
                vec![self.log(LogLevel::Info, format!("user [{username}:{connection_id}] left"))]
            },
            None => Vec::new(),
        }
    }

    fn deliver(&self, connection_id: ConnectionId, handle: H, frame: OutboundFrame) -> RelayAction<H> {
        RelayAction::Deliver(Delivery { connection_id, handle, frame })
    }

    fn log(&self, level: LogLevel, message: String) -> RelayAction<H> {
        RelayAction::Log { level, message, timestamp: self.env.now() }
    }

    /// Counts for the statistics endpoint.
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Bound usernames, sorted.
    pub fn usernames(&self) -> BTreeSet<String> {
        self.registry.usernames()
    }

    /// Read access to the session registry.
    pub fn registry(&self) -> &ConnectionRegistry<H> {
        &self.registry
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Relay configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

impl<E, H> std::fmt::Debug for RelayDriver<E, H>
where
    E: Environment,
    H: ConnectionHandle,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayDriver")
            .field("connection_count", &self.registry.connection_count())
            .field("session_count", &self.registry.session_count())
            .finish()
    }
}
