//! wsrelay core: session registry and message routing.
//!
//! Sans-IO heart of the relay. The transport turns socket activity into
//! [`RelayEvent`]s; [`RelayDriver`] applies them to the
//! [`ConnectionRegistry`], asks the [`router`] who should receive each text
//! frame, and hands back [`RelayAction`]s for the transport to execute.
//!
//! # Components
//!
//! - [`ConnectionRegistry`]: live connections and username sessions
//! - [`router`]: broadcast and targeted delivery decisions
//! - [`Envelope`] / [`Payload`]: the JSON message format
//! - [`extract_username`]: username from the upgrade path
//! - [`RelayDriver`]: event dispatch (pure logic, no I/O)
//! - [`Environment`]: time and randomness, swappable under test

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
pub mod envelope;
pub mod env;
mod error;
mod handle;
pub mod identity;
mod registry;
pub mod router;

pub use driver::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};
pub use env::Environment;
pub use envelope::{Envelope, EnvelopeError, NOT_JOINED_BODY, Payload, SERVER_SOURCE};
pub use error::RelayError;
pub use handle::{ConnectionHandle, ConnectionId, OutboundFrame};
pub use identity::{IdentityError, extract_username};
pub use registry::{
    ConnectionRegistry, EvictedSession, JoinOutcome, RegistryError, RegistryStats,
    RemovedConnection,
};
pub use router::{Delivery, RouteOutcome, Routed, route};
