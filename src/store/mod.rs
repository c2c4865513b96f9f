//! Event store.
//!
//! The pipeline needs four things from the remote store: a client-generated
//! key, a fire-and-forget write, a child listing, and a delete. Values are
//! JSON documents stored at leaf paths such as `history/{userId}/{key}`.
//!
//! - `RemoteStore`: synchronous backend (SQLite, in-memory)
//! - `StoreClient`: single writer thread in front of a backend; writes and
//!   deletes complete through callbacks
//! - `PushKeyGenerator`: time-ordered unique keys

mod client;
mod keys;
mod memory;
mod sqlite;

use anyhow::{anyhow, Result};
use serde_json::Value;

pub(crate) use client::new_child;
pub use client::{Completion, StoreClient, StoreMetrics};
pub use keys::PushKeyGenerator;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// One child of a listed path.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildSnapshot {
    pub key: String,
    pub value: Value,
}

pub trait RemoteStore: Send {
    /// Store `value` at `path`, replacing anything already there.
    fn write(&mut self, path: &str, value: &Value) -> Result<()>;

    /// Direct children of `path`, ordered by key.
    fn read_children(&mut self, path: &str) -> Result<Vec<ChildSnapshot>>;

    /// Remove `path` and everything below it. Deleting a missing path is not an error.
    fn delete(&mut self, path: &str) -> Result<()>;
}

const FORBIDDEN_PATH_CHARS: &[char] = &['.', '#', '$', '[', ']'];

/// Reject empty segments and characters the store cannot key on.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(anyhow!("store path must not be empty"));
    }
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(anyhow!("store path '{}' has an empty segment", path));
        }
        validate_segment(segment)?;
    }
    Ok(())
}

/// Reject a single path segment (such as a user id) the store cannot key on.
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(anyhow!("store path segment must not be empty"));
    }
    if segment.contains('/') || segment.contains(FORBIDDEN_PATH_CHARS) {
        return Err(anyhow!(
            "store path segment '{}' contains a forbidden character",
            segment
        ));
    }
    Ok(())
}

pub fn child_path(parent: &str, key: &str) -> String {
    format!("{}/{}", parent, key)
}

/// Split a leaf path into (parent, key).
pub(crate) fn split_path(path: &str) -> Result<(&str, &str)> {
    validate_path(path)?;
    path.rsplit_once('/')
        .ok_or_else(|| anyhow!("store path '{}' has no parent", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_validation() {
        assert!(validate_path("history/user-1/-NxAbc").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("history//x").is_err());
        assert!(validate_path("history/a.b").is_err());
        assert!(validate_path("history/$user").is_err());
    }

    #[test]
    fn segment_validation() {
        assert!(validate_segment("driver-7").is_ok());
        for bad in ["", "a/b", "john.doe", "x#1", "[x]"] {
            assert!(validate_segment(bad).is_err(), "{:?} accepted", bad);
        }
    }

    #[test]
    fn split_path_needs_a_parent() {
        assert_eq!(split_path("history/u/k").unwrap(), ("history/u", "k"));
        assert!(split_path("history").is_err());
    }
}
