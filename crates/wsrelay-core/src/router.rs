//! Message routing.
//!
//! Decides, for one inbound text frame, which connections receive it. The
//! router only reads the registry and returns deliveries; it never sends.
//!
//! Rules, in order:
//!
//! 1. A sender with no username gets a single "not joined" envelope back and
//!    nothing else happens.
//! 2. An envelope with a non-empty `targets` list goes to each target that
//!    resolves, skipping the sender and blank names. Unknown targets are
//!    dropped without telling the sender. There is no fallback to broadcast.
//! 3. Everything else is broadcast to every joined connection except the
//!    sender.
//!
//! Recipients always get the original text, never a re-encoded copy.

use crate::{
    envelope::{Envelope, EnvelopeError, Payload},
    handle::{ConnectionHandle, ConnectionId, OutboundFrame},
    registry::ConnectionRegistry,
};

/// One frame bound for one connection.
#[derive(Debug, Clone)]
pub struct Delivery<H> {
    /// Recipient connection
    pub connection_id: ConnectionId,
    /// Recipient handle
    pub handle: H,
    /// Frame to send
    pub frame: OutboundFrame,
}

/// What the router decided, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Sender has not joined; at most one reply went back to it.
    NotJoined,
    /// Explicitly addressed message.
    Targeted {
        /// Resolved sender username
        source: String,
        /// Entries in the target list
        requested: usize,
        /// Targets that resolved to a connection
        delivered: usize,
    },
    /// Broadcast to every other joined connection.
    Broadcast {
        /// Resolved sender username
        source: String,
        /// Connections reached
        delivered: usize,
    },
}

/// Deliveries for one inbound frame plus a summary.
#[derive(Debug, Clone)]
pub struct Routed<H> {
    /// Frames to send, in order
    pub deliveries: Vec<Delivery<H>>,
    /// Routing decision
    pub outcome: RouteOutcome,
}

/// Route one text frame received on `sender`.
///
/// Returns an error only for a `{...}` frame that is not a valid envelope;
/// nothing is delivered in that case.
pub fn route<H: ConnectionHandle>(
    registry: &ConnectionRegistry<H>,
    sender: ConnectionId,
    text: &str,
) -> Result<Routed<H>, EnvelopeError> {
    let Some(source) = registry.resolve_username(sender) else {
        return reply_not_joined(registry, sender);
    };

    let payload = Payload::parse(text)?;

    let routed = match payload.explicit_targets() {
        Some(targets) => route_targeted(registry, source, targets, text),
        None => broadcast(registry, sender, source, text),
    };

    Ok(routed)
}

fn reply_not_joined<H: ConnectionHandle>(
    registry: &ConnectionRegistry<H>,
    sender: ConnectionId,
) -> Result<Routed<H>, EnvelopeError> {
    let deliveries = match registry.connection(sender) {
        Some(handle) => vec![Delivery {
            connection_id: sender,
            handle: handle.clone(),
            frame: OutboundFrame::Text(Envelope::not_joined().to_json()?),
        }],
        // Evicted or already closed: nobody to answer.
        None => Vec::new(),
    };

    Ok(Routed { deliveries, outcome: RouteOutcome::NotJoined })
}

fn route_targeted<H: ConnectionHandle>(
    registry: &ConnectionRegistry<H>,
    source: &str,
    targets: &[String],
    text: &str,
) -> Routed<H> {
    let deliveries: Vec<_> = targets
        .iter()
        .filter(|target| target.as_str() != source)
        .filter(|target| !target.trim().is_empty())
        .filter_map(|target| registry.resolve_connection(target))
        .map(|(connection_id, handle)| Delivery {
            connection_id,
            handle: handle.clone(),
            frame: OutboundFrame::text(text),
        })
        .collect();

    let outcome = RouteOutcome::Targeted {
        source: source.to_string(),
        requested: targets.len(),
        delivered: deliveries.len(),
    };
    Routed { deliveries, outcome }
}

fn broadcast<H: ConnectionHandle>(
    registry: &ConnectionRegistry<H>,
    sender: ConnectionId,
    source: &str,
    text: &str,
) -> Routed<H> {
    let deliveries: Vec<_> = registry
        .registered_connections()
        .filter(|(connection_id, _, _)| *connection_id != sender)
        .map(|(connection_id, handle, _)| Delivery {
            connection_id,
            handle: handle.clone(),
            frame: OutboundFrame::text(text),
        })
        .collect();

    let outcome = RouteOutcome::Broadcast { source: source.to_string(), delivered: deliveries.len() };
    Routed { deliveries, outcome }
}
