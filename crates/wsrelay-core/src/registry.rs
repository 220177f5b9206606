//! Session registry.
//!
//! Tracks every live connection and the username bound to it. Three views
//! are kept in step:
//!
//! - the ordered set of live connection ids (broadcast enumeration),
//! - connection id → handle,
//! - username ↔ connection id (forward and reverse index).
//!
//! A connection is added pending (no username) when the transport accepts
//! it and gains a username on [`ConnectionRegistry::join`]. Each username
//! binds at most one connection and each connection at most one username.
//!
//! The registry is a plain `&mut self` structure. Callers that share it
//! across tasks put it behind one lock, which makes every operation here
//! atomic with respect to every other.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::handle::{ConnectionHandle, ConnectionId};

/// Invalid registry input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Username is empty or whitespace only.
    #[error("username must not be blank")]
    BlankUsername,

    /// Connection is not live (never added, already removed, or evicted).
    #[error("connection {0} is not live")]
    UnknownConnection(ConnectionId),
}

/// Point-in-time counts for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Connections in the live set
    pub live_connections: usize,
    /// Connections with a registered handle
    pub mapped_connections: usize,
    /// Usernames currently bound
    pub live_sessions: usize,
}

/// Connection displaced by a duplicate login.
#[derive(Debug, Clone)]
pub struct EvictedSession<H> {
    /// Connection that held the username
    pub connection_id: ConnectionId,
    /// Its handle, for closing it
    pub handle: H,
}

/// Result of a successful [`ConnectionRegistry::join`].
#[derive(Debug, Clone)]
pub struct JoinOutcome<H> {
    /// Previous holder of the username, already removed from the registry.
    ///
    /// The caller closes it through the handle.
    pub evicted: Option<EvictedSession<H>>,
    /// Username this connection was bound to before, if it changed names.
    pub released_username: Option<String>,
}

impl<H> JoinOutcome<H> {
    fn unchanged() -> Self {
        Self { evicted: None, released_username: None }
    }
}

/// Connection removed by [`ConnectionRegistry::remove_connection`].
#[derive(Debug, Clone)]
pub struct RemovedConnection<H> {
    /// The connection's handle
    pub handle: H,
    /// Username that was bound to it, now released
    pub username: Option<String>,
}

/// Registry of live connections and username sessions.
#[derive(Debug)]
pub struct ConnectionRegistry<H> {
    /// Live connection ids, ordered for deterministic enumeration
    live: BTreeSet<ConnectionId>,
    /// Connection id → transport handle
    handles: HashMap<ConnectionId, H>,
    /// Username → connection id. Enforces one connection per username
    user_connections: HashMap<String, ConnectionId>,
    /// Connection id → username (reverse index)
    connection_users: HashMap<ConnectionId, String>,
}

impl<H> Default for ConnectionRegistry<H> {
    fn default() -> Self {
        Self {
            live: BTreeSet::new(),
            handles: HashMap::new(),
            user_connections: HashMap::new(),
            connection_users: HashMap::new(),
        }
    }
}

impl<H: ConnectionHandle> ConnectionRegistry<H> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection, not yet bound to a username.
    ///
    /// Returns `false` if the id is already live.
    pub fn add_connection(&mut self, connection_id: ConnectionId, handle: H) -> bool {
        if !self.live.insert(connection_id) {
            return false;
        }

        self.handles.insert(connection_id, handle);
        true
    }

    /// Remove a connection from every view.
    ///
    /// Any username bound to it is released first, so no stale session
    /// outlives the connection. Returns `None` if the connection was not
    /// live; calling this twice is the same as calling it once.
    pub fn remove_connection(&mut self, connection_id: ConnectionId) -> Option<RemovedConnection<H>> {
        let username = self.connection_users.remove(&connection_id);
        if let Some(name) = &username {
            self.user_connections.remove(name);
        }

        self.live.remove(&connection_id);
        let handle = self.handles.remove(&connection_id)?;

        Some(RemovedConnection { handle, username })
    }

    /// Bind `username` to a live connection.
    ///
    /// If another connection holds the name, it is evicted: removed from all
    /// views and returned in [`JoinOutcome::evicted`] for the caller to close.
    /// The newest registration always wins. A connection that already had a
    /// different name gives it up.
    pub fn join(
        &mut self,
        username: &str,
        connection_id: ConnectionId,
    ) -> Result<JoinOutcome<H>, RegistryError> {
        if username.trim().is_empty() {
            return Err(RegistryError::BlankUsername);
        }
        if !self.handles.contains_key(&connection_id) {
            return Err(RegistryError::UnknownConnection(connection_id));
        }

        let mut outcome = JoinOutcome::unchanged();

        match self.user_connections.get(username).copied() {
            Some(holder) if holder == connection_id => return Ok(outcome),
            Some(holder) => {
                if let Some(removed) = self.remove_connection(holder) {
                    outcome.evicted =
                        Some(EvictedSession { connection_id: holder, handle: removed.handle });
                }
            },
            None => {},
        }

        if let Some(previous) = self.connection_users.remove(&connection_id) {
            self.user_connections.remove(&previous);
            outcome.released_username = Some(previous);
        }

        self.user_connections.insert(username.to_string(), connection_id);
        self.connection_users.insert(connection_id, username.to_string());
        Ok(outcome)
    }

    /// Unbind a username without touching its connection.
    ///
    /// Returns the connection it was bound to, if any.
    pub fn leave(&mut self, username: &str) -> Option<ConnectionId> {
        let connection_id = self.user_connections.remove(username)?;
        self.connection_users.remove(&connection_id);
        Some(connection_id)
    }

    /// Connection bound to `username`.
    pub fn resolve_connection(&self, username: &str) -> Option<(ConnectionId, &H)> {
        let connection_id = *self.user_connections.get(username)?;
        self.handles.get(&connection_id).map(|handle| (connection_id, handle))
    }

    /// Username bound to a connection.
    pub fn resolve_username(&self, connection_id: ConnectionId) -> Option<&str> {
        self.connection_users.get(&connection_id).map(String::as_str)
    }

    /// Handle of a live connection, joined or not.
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&H> {
        self.handles.get(&connection_id)
    }

    /// Check if a connection is live.
    pub fn is_live(&self, connection_id: ConnectionId) -> bool {
        self.live.contains(&connection_id)
    }

    /// Live connections that have joined, in connection id order.
    pub fn registered_connections(&self) -> impl Iterator<Item = (ConnectionId, &H, &str)> + '_ {
        self.live.iter().filter_map(|id| {
            let username = self.connection_users.get(id)?;
            let handle = self.handles.get(id)?;
            Some((*id, handle, username.as_str()))
        })
    }

    /// Snapshot of bound usernames, sorted.
    pub fn usernames(&self) -> BTreeSet<String> {
        self.user_connections.keys().cloned().collect()
    }

    /// Counts for the statistics endpoint.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live_connections: self.live.len(),
            mapped_connections: self.handles.len(),
            live_sessions: self.user_connections.len(),
        }
    }

    /// Total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.live.len()
    }

    /// Total number of bound usernames.
    pub fn session_count(&self) -> usize {
        self.user_connections.len()
    }
}
