//! Coordination store interface
//!
//! The recipes are written against a ZooKeeper-like service: a tree of
//! path-addressed nodes with atomic create/delete/get, ephemeral nodes tied to
//! a session, and one-shot change notifications. The real network client is
//! out of scope; `MemoryStore` provides an in-process implementation with the
//! same semantics.

pub mod memory;

pub use memory::{MemorySession, MemoryStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::common::{Error, Result};

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateMode {
    /// Survives until explicitly deleted
    Persistent,
    /// Removed automatically when the creating session closes
    Ephemeral,
}

/// What a fired watch observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEvent {
    /// The watched path was created
    Created,
    /// The watched path was deleted
    Deleted,
    /// A child was added to or removed from the watched path
    ChildrenChanged,
    /// The watched path's value changed
    DataChanged,
}

/// A one-shot change notification.
///
/// Fires at most once per registration; observing further changes requires
/// registering a new watch.
pub type Watch = oneshot::Receiver<WatchEvent>;

/// Client interface to the coordination service.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create a node. Fails with `AlreadyExists` if the path is taken.
    async fn create(&self, path: &str, value: &str, mode: CreateMode) -> Result<()>;

    /// Delete a node. Fails with `NotFound` if absent, `NotEmpty` if it has
    /// children.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Read a node's value. Fails with `NotFound` if absent.
    async fn get(&self, path: &str) -> Result<String>;

    /// List the names of a node's children.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// List children and register a one-shot watch that fires on the next
    /// child addition or removal. Listing and registration are atomic: a
    /// change after the returned listing is guaranteed to fire the watch.
    async fn children_watch(&self, path: &str) -> Result<(Vec<String>, Watch)>;

    /// Report whether the path exists and register a one-shot watch that
    /// fires on its next creation or deletion.
    async fn exists_watch(&self, path: &str) -> Result<(bool, Watch)>;
}

/// Join a parent path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Check that a path is absolute and well-formed.
pub fn validate_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::InvalidArgument(format!(
            "path must be absolute: {:?}",
            path
        )));
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(Error::InvalidArgument(format!(
            "path must not end with '/': {:?}",
            path
        )));
    }
    if path.contains("//") {
        return Err(Error::InvalidArgument(format!(
            "path contains an empty segment: {:?}",
            path
        )));
    }
    Ok(())
}
