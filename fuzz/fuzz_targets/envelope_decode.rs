//! Fuzz target for Payload::parse and the router
//!
//! Feeds arbitrary text frames through payload classification and then
//! through the router with a small joined population:
//! - Malformed JSON inside `{...}`
//! - Wrong field types (`targets` as a string, `dataBody` missing)
//! - Huge or deeply nested target lists
//!
//! The fuzzer should NEVER panic. Invalid envelopes must return an error
//! and deliver nothing; valid ones must never deliver back to the sender.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wsrelay_core::{ConnectionHandle, ConnectionId, ConnectionRegistry, OutboundFrame, Payload, route};

#[derive(Debug, Clone)]
struct NullHandle;

impl ConnectionHandle for NullHandle {
    fn send(&self, _frame: OutboundFrame) -> bool {
        true
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = Payload::parse(text);

    let mut registry = ConnectionRegistry::new();
    for (id, name) in ["A", "B", "C"].iter().enumerate() {
        registry.add_connection(ConnectionId(id as u64), NullHandle);
        let _ = registry.join(name, ConnectionId(id as u64));
    }

    if let Ok(routed) = route(&registry, ConnectionId(0), text) {
        assert!(routed.deliveries.iter().all(|d| d.connection_id != ConnectionId(0)));
        assert!(routed.deliveries.iter().all(|d| d.frame == OutboundFrame::text(text)));
    }
});
