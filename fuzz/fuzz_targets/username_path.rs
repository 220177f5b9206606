//! Fuzz target for extract_username
//!
//! Arbitrary upgrade paths against a few prefixes. Every accepted path must
//! yield a non-blank username without separators.
//!
//! The fuzzer should NEVER panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wsrelay_core::extract_username;

fuzz_target!(|data: &[u8]| {
    let Ok(path) = std::str::from_utf8(data) else {
        return;
    };

    for prefix in ["/ws", "/", "", "/api/ws"] {
        if let Ok(username) = extract_username(path, prefix) {
            assert!(!username.trim().is_empty());
            assert!(!username.contains('/'));
        }
    }
});
