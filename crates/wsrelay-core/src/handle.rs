//! Connection identity and the send/close capability the transport provides.
//!
//! The registry never owns a connection. It stores a clone of the handle the
//! transport gave it and hands clones back out inside delivery actions, so a
//! send can happen after the registry lock is released.

use std::fmt;

/// Opaque identifier of one transport connection.
///
/// Assigned by the transport on accept; unique for the lifetime of the
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A frame queued for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Pong answering a ping, echoing its payload.
    Pong(Vec<u8>),
    /// Close the connection.
    Close {
        /// Human-readable close reason.
        reason: String,
    },
}

impl OutboundFrame {
    /// Text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Close frame with a reason.
    pub fn close(reason: impl Into<String>) -> Self {
        Self::Close { reason: reason.into() }
    }
}

/// Send/close capability for one live connection.
///
/// Sends are best-effort and must not block: implementations queue the frame
/// and return immediately. A send to a connection that is already gone is
/// dropped and reported as `false`; callers never retry.
pub trait ConnectionHandle: Clone + Send + Sync + fmt::Debug + 'static {
    /// Queue `frame` for delivery. Returns `false` if the peer is gone.
    fn send(&self, frame: OutboundFrame) -> bool;
}
