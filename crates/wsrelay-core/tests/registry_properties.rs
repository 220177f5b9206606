//! Property-based tests for the session registry.
//!
//! Random operation sequences are applied to both the registry and a small
//! reference model; after every step the two must agree and the registry's
//! forward and reverse lookups must stay inverse to each other.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use wsrelay_core::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, OutboundFrame, RegistryError, route,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestHandle(u64);

impl ConnectionHandle for TestHandle {
    fn send(&self, _frame: OutboundFrame) -> bool {
        true
    }
}

const NAMES: &[&str] = &["alice", "bob", "carol", "dave"];
const MAX_ID: u64 = 6;

#[derive(Debug, Clone)]
enum Op {
    Add(u64),
    Remove(u64),
    Join(usize, u64),
    Leave(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..MAX_ID).prop_map(Op::Add),
        (0..MAX_ID).prop_map(Op::Remove),
        (0..NAMES.len(), 0..MAX_ID).prop_map(|(name, id)| Op::Join(name, id)),
        (0..NAMES.len()).prop_map(Op::Leave),
    ]
}

/// Reference model: plain sets and maps with the intended semantics.
#[derive(Debug, Default)]
struct Model {
    live: BTreeSet<u64>,
    sessions: BTreeMap<String, u64>,
}

impl Model {
    fn add(&mut self, id: u64) -> bool {
        self.live.insert(id)
    }

    fn remove(&mut self, id: u64) {
        self.live.remove(&id);
        self.sessions.retain(|_, holder| *holder != id);
    }

    fn join(&mut self, name: &str, id: u64) -> bool {
        if !self.live.contains(&id) {
            return false;
        }
        if let Some(&holder) = self.sessions.get(name) {
            if holder == id {
                return true;
            }
            self.remove(holder);
        }
        self.sessions.retain(|_, holder| *holder != id);
        self.sessions.insert(name.to_string(), id);
        true
    }

    fn leave(&mut self, name: &str) {
        self.sessions.remove(name);
    }
}

fn assert_consistent(registry: &ConnectionRegistry<TestHandle>, model: &Model) {
    let stats = registry.stats();
    assert_eq!(stats.live_connections, model.live.len());
    assert_eq!(stats.mapped_connections, model.live.len());
    assert_eq!(stats.live_sessions, model.sessions.len());

    let names: BTreeSet<String> = model.sessions.keys().cloned().collect();
    assert_eq!(registry.usernames(), names);

    for id in 0..MAX_ID {
        assert_eq!(registry.is_live(ConnectionId(id)), model.live.contains(&id));
    }

    for (name, &id) in &model.sessions {
        let (resolved, handle) = registry.resolve_connection(name).expect("session resolves");
        assert_eq!(resolved, ConnectionId(id));
        assert_eq!(handle, &TestHandle(id));
        assert_eq!(registry.resolve_username(resolved), Some(name.as_str()));
        assert!(registry.is_live(resolved));
    }
}

proptest! {
    #[test]
    fn registry_matches_model(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut registry = ConnectionRegistry::new();
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Add(id) => {
                    let added = registry.add_connection(ConnectionId(id), TestHandle(id));
                    prop_assert_eq!(added, model.add(id));
                },
                Op::Remove(id) => {
                    registry.remove_connection(ConnectionId(id));
                    model.remove(id);
                },
                Op::Join(name, id) => {
                    let result = registry.join(NAMES[name], ConnectionId(id));
                    let accepted = model.join(NAMES[name], id);
                    prop_assert_eq!(result.is_ok(), accepted);
                    if !accepted {
                        prop_assert!(matches!(result, Err(RegistryError::UnknownConnection(_))));
                    }
                },
                Op::Leave(name) => {
                    registry.leave(NAMES[name]);
                    model.leave(NAMES[name]);
                },
            }
            assert_consistent(&registry, &model);
        }
    }

    #[test]
    fn repeated_joins_keep_one_session(attempts in 2u64..20) {
        let mut registry = ConnectionRegistry::new();
        let mut evicted = Vec::new();

        for id in 0..attempts {
            registry.add_connection(ConnectionId(id), TestHandle(id));
            let outcome = registry.join("alice", ConnectionId(id)).unwrap();
            if let Some(session) = outcome.evicted {
                evicted.push(session.connection_id.0);
            }
        }

        prop_assert_eq!(registry.session_count(), 1);
        prop_assert_eq!(
            registry.resolve_connection("alice").map(|(id, _)| id),
            Some(ConnectionId(attempts - 1))
        );
        prop_assert_eq!(evicted, (0..attempts - 1).collect::<Vec<_>>());
        prop_assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn broadcast_reaches_every_other_joined(joined in 1u64..12, pending in 0u64..6) {
        let mut registry = ConnectionRegistry::new();
        for id in 0..joined {
            registry.add_connection(ConnectionId(id), TestHandle(id));
            registry.join(&format!("user{id}"), ConnectionId(id)).unwrap();
        }
        for id in 100..100 + pending {
            registry.add_connection(ConnectionId(id), TestHandle(id));
        }

        let routed = route(&registry, ConnectionId(0), "hello").unwrap();

        prop_assert_eq!(routed.deliveries.len() as u64, joined - 1);
        prop_assert!(routed.deliveries.iter().all(|d| d.connection_id != ConnectionId(0)));
        prop_assert!(routed.deliveries.iter().all(|d| d.connection_id.0 < 100));
    }

    #[test]
    fn removal_is_idempotent(ids in prop::collection::btree_set(0u64..32, 1..10), victim in 0u64..32) {
        let mut registry = ConnectionRegistry::new();
        for &id in &ids {
            registry.add_connection(ConnectionId(id), TestHandle(id));
            registry.join(&format!("user{id}"), ConnectionId(id)).unwrap();
        }

        let first = registry.remove_connection(ConnectionId(victim));
        let after_first = registry.stats();
        let second = registry.remove_connection(ConnectionId(victim));

        prop_assert_eq!(first.is_some(), ids.contains(&victim));
        prop_assert!(second.is_none());
        prop_assert_eq!(registry.stats(), after_first);
        let victim_key = format!("user{victim}");
        prop_assert!(registry.resolve_connection(&victim_key).is_none());
    }
}
