//! Username extraction from the WebSocket upgrade path.
//!
//! A client connects to `<prefix>/<username>`. Empty segments are ignored, so
//! `/ws//alice/` and `/ws/alice` name the same user. Anything with zero or
//! more than one segment after the prefix is rejected before the connection
//! can join.

use thiserror::Error;

/// Rejected upgrade path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Path does not start with the service prefix.
    #[error("path {path:?} is outside prefix {prefix:?}")]
    PrefixMismatch {
        /// Request path
        path: String,
        /// Expected prefix
        prefix: String,
    },

    /// No username segment after the prefix.
    #[error("path {0:?} carries no username")]
    MissingUsername(String),

    /// More than one segment after the prefix.
    #[error("path {path:?} has {segments} segments after the prefix, expected 1")]
    TooManySegments {
        /// Request path
        path: String,
        /// Number of segments found after the prefix
        segments: usize,
    },
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.trim().is_empty())
}

/// Extract the candidate username from an upgrade request path.
///
/// `path` must not contain a query string; strip it first (HTTP request
/// parsers already expose the bare path).
pub fn extract_username(path: &str, prefix: &str) -> Result<String, IdentityError> {
    let mut path_segments = segments(path);

    for expected in segments(prefix) {
        if path_segments.next() != Some(expected) {
            return Err(IdentityError::PrefixMismatch {
                path: path.to_string(),
                prefix: prefix.to_string(),
            });
        }
    }

    let rest: Vec<&str> = path_segments.collect();
    match rest.as_slice() {
        [] => Err(IdentityError::MissingUsername(path.to_string())),
        [username] => Ok((*username).to_string()),
        _ => Err(IdentityError::TooManySegments { path: path.to_string(), segments: rest.len() }),
    }
}
