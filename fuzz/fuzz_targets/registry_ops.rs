//! Fuzz target for RelayDriver event sequences
//!
//! Drives the relay with arbitrary interleavings of opens, joins, frames and
//! closes over a small id and name space.
//!
//! # Invariants
//!
//! - Each username resolves to exactly one live connection
//! - Forward and reverse lookups agree
//! - Stats counts match the registry views
//! - No event sequence panics

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use wsrelay_core::{
    ConnectionHandle, ConnectionId, Environment, OutboundFrame, RelayConfig, RelayDriver,
    RelayEvent,
};

const NAMES: &[&str] = &["alice", "bob", "carol", " ", ""];

#[derive(Debug, Clone)]
struct NullHandle;

impl ConnectionHandle for NullHandle {
    fn send(&self, _frame: OutboundFrame) -> bool {
        true
    }
}

#[derive(Clone)]
struct FuzzEnv;

impl Environment for FuzzEnv {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0);
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Open(u8),
    Join(u8, u8),
    Text(u8, String),
    Ping(u8, Vec<u8>),
    CloseFrame(u8),
    Closed(u8),
}

fuzz_target!(|events: Vec<FuzzEvent>| {
    let config = RelayConfig { max_connections: 6, ..RelayConfig::default() };
    let mut driver = RelayDriver::new(FuzzEnv, config);

    for event in events {
        let event = match event {
            FuzzEvent::Open(id) => RelayEvent::ConnectionOpened {
                connection_id: ConnectionId(u64::from(id % 8)),
                handle: NullHandle,
            },
            FuzzEvent::Join(id, name) => RelayEvent::HandshakeCompleted {
                connection_id: ConnectionId(u64::from(id % 8)),
                username: NAMES[usize::from(name) % NAMES.len()].to_string(),
            },
            FuzzEvent::Text(id, text) => {
                RelayEvent::TextFrame { connection_id: ConnectionId(u64::from(id % 8)), text }
            },
            FuzzEvent::Ping(id, payload) => {
                RelayEvent::PingFrame { connection_id: ConnectionId(u64::from(id % 8)), payload }
            },
            FuzzEvent::CloseFrame(id) => {
                RelayEvent::CloseFrame { connection_id: ConnectionId(u64::from(id % 8)), reason: None }
            },
            FuzzEvent::Closed(id) => RelayEvent::ConnectionClosed {
                connection_id: ConnectionId(u64::from(id % 8)),
                reason: "fuzz".to_string(),
            },
        };

        // Join errors (blank name, unknown connection) are expected
        let _ = driver.process_event(event);

        let registry = driver.registry();
        let stats = driver.stats();
        assert!(stats.live_connections <= 6);
        assert_eq!(stats.live_connections, stats.mapped_connections);
        assert_eq!(stats.live_sessions, registry.usernames().len());
        for name in registry.usernames() {
            let (id, _) = registry.resolve_connection(&name).expect("bound name resolves");
            assert!(registry.is_live(id));
            assert_eq!(registry.resolve_username(id), Some(name.as_str()));
        }
    }
});
