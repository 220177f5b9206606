//! Relay driver errors.
//!
//! Per-module input errors ([`RegistryError`], [`EnvelopeError`],
//! [`IdentityError`](crate::identity::IdentityError)) live beside the code
//! that raises them; [`RelayError`] wraps the ones that can escape
//! [`RelayDriver::process_event`](crate::RelayDriver::process_event).

use thiserror::Error;

use crate::{envelope::EnvelopeError, registry::RegistryError};

/// Errors returned by the relay driver.
///
/// None of these are fatal for the process. The runtime logs them and, for
/// a failed join, closes the offending connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Registry rejected the operation (blank username, connection gone).
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A reply envelope could not be encoded.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}
