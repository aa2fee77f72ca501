//! In-memory coordination store
//!
//! A single-process stand-in for the coordination service, with the same
//! contract the recipes rely on: a node tree, ephemeral nodes removed when
//! their session closes, and one-shot watches. Listing plus watch
//! registration happens under one lock, so no change can slip between a
//! returned listing and the watch that covers it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use super::{validate_path, CoordinationStore, CreateMode, Watch, WatchEvent};
use crate::common::{Error, Result};

struct Node {
    value: String,
    /// Session id of the creator, for ephemeral nodes only
    ephemeral_owner: Option<u64>,
}

#[derive(Default)]
struct Shared {
    nodes: HashMap<String, Node>,
    exists_watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    child_watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    next_session: u64,
}

impl Shared {
    fn fire_exists(&mut self, path: &str, event: WatchEvent) {
        if let Some(senders) = self.exists_watches.remove(path) {
            for tx in senders {
                let _ = tx.send(event);
            }
        }
    }

    fn fire_children(&mut self, path: &str) {
        if let Some(senders) = self.child_watches.remove(path) {
            for tx in senders {
                let _ = tx.send(WatchEvent::ChildrenChanged);
            }
        }
    }

    fn child_names(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        let mut names: Vec<String> = self
            .nodes
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    fn exists(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }
}

/// In-memory node tree shared by all sessions created from it.
#[derive(Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session. Ephemeral nodes created through it are removed
    /// when the session closes (or is dropped).
    pub fn session(&self) -> MemorySession {
        let mut shared = self.shared.lock().unwrap();
        shared.next_session += 1;
        MemorySession {
            shared: Arc::clone(&self.shared),
            id: shared.next_session,
            closed: AtomicBool::new(false),
        }
    }
}

/// One client session against a [`MemoryStore`].
pub struct MemorySession {
    shared: Arc<Mutex<Shared>>,
    id: u64,
    closed: AtomicBool,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the session: all ephemeral nodes it created are deleted and the
    /// affected watches fire. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut shared = self.shared.lock().unwrap();
        let mut owned: Vec<String> = shared
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(self.id))
            .map(|(path, _)| path.clone())
            .collect();
        owned.sort();
        for path in owned {
            shared.nodes.remove(&path);
            shared.fire_exists(&path, WatchEvent::Deleted);
            shared.fire_children(parent_of(&path));
            debug!(session = self.id, path = %path, "ephemeral node expired");
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::SessionExpired)
        } else {
            Ok(())
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

#[async_trait]
impl CoordinationStore for MemorySession {
    async fn create(&self, path: &str, value: &str, mode: CreateMode) -> Result<()> {
        self.check_open()?;
        validate_path(path)?;
        if path == "/" {
            return Err(Error::AlreadyExists(path.to_string()));
        }

        let mut shared = self.shared.lock().unwrap();
        if shared.nodes.contains_key(path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        let parent = parent_of(path);
        if !shared.exists(parent) {
            return Err(Error::NotFound(parent.to_string()));
        }
        if let Some(node) = shared.nodes.get(parent) {
            if node.ephemeral_owner.is_some() {
                return Err(Error::NoChildrenForEphemerals(parent.to_string()));
            }
        }

        shared.nodes.insert(
            path.to_string(),
            Node {
                value: value.to_string(),
                ephemeral_owner: match mode {
                    CreateMode::Ephemeral => Some(self.id),
                    CreateMode::Persistent => None,
                },
            },
        );
        shared.fire_exists(path, WatchEvent::Created);
        shared.fire_children(parent);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check_open()?;
        validate_path(path)?;
        if path == "/" {
            return Err(Error::InvalidArgument("cannot delete root".into()));
        }

        let mut shared = self.shared.lock().unwrap();
        if !shared.nodes.contains_key(path) {
            return Err(Error::NotFound(path.to_string()));
        }
        if !shared.child_names(path).is_empty() {
            return Err(Error::NotEmpty(path.to_string()));
        }
        shared.nodes.remove(path);
        shared.fire_exists(path, WatchEvent::Deleted);
        shared.fire_children(parent_of(path));
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<String> {
        self.check_open()?;
        validate_path(path)?;
        if path == "/" {
            return Ok(String::new());
        }
        let shared = self.shared.lock().unwrap();
        shared
            .nodes
            .get(path)
            .map(|node| node.value.clone())
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        self.check_open()?;
        validate_path(path)?;
        let shared = self.shared.lock().unwrap();
        if !shared.exists(path) {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(shared.child_names(path))
    }

    async fn children_watch(&self, path: &str) -> Result<(Vec<String>, Watch)> {
        self.check_open()?;
        validate_path(path)?;
        let mut shared = self.shared.lock().unwrap();
        if !shared.exists(path) {
            return Err(Error::NotFound(path.to_string()));
        }
        let names = shared.child_names(path);
        let (tx, rx) = oneshot::channel();
        shared
            .child_watches
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok((names, rx))
    }

    async fn exists_watch(&self, path: &str) -> Result<(bool, Watch)> {
        self.check_open()?;
        validate_path(path)?;
        let mut shared = self.shared.lock().unwrap();
        let exists = shared.exists(path);
        let (tx, rx) = oneshot::channel();
        shared
            .exists_watches
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok((exists, rx))
    }
}
