//! Replicated map: a local mirror of a path's children
//!
//! The map watches one path and keeps `child name -> deserialized value` in a
//! local [`LockedMap`]. The store delivers each watch exactly once, so the
//! reconciliation task re-arms the watch on every fired event before applying
//! the observed diff; the re-arm returns the listing it covers, so no change
//! can fall between reaction and re-registration.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::common::{Error, Result};
use crate::ds::{LockedMap, StringSet};
use crate::store::{join, validate_path, CoordinationStore, Watch, WatchEvent};

/// Turns a node's raw stored value into the application value.
pub type DeserializeFn<V> = Arc<dyn Fn(&str) -> Result<V> + Send + Sync>;

/// Invoked once per reconciliation cycle that observed any change, after all
/// map mutations for that cycle are applied.
pub type ChangeCallback<V> = Arc<dyn Fn(&ReplicatedMap<V>) + Send + Sync>;

struct Inner<V> {
    store: Arc<dyn CoordinationStore>,
    path: String,
    entries: LockedMap<V>,
    deserialize: DeserializeFn<V>,
    on_change: ChangeCallback<V>,
    shutdown_tx: mpsc::Sender<()>,
    terminal: Mutex<Option<Error>>,
}

/// Eventually-consistent local mirror of the children of one store path.
///
/// Cheap to clone; all clones share the mirror. The background task holds no
/// strong handle, so dropping the last clone stops it.
pub struct ReplicatedMap<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for ReplicatedMap<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> ReplicatedMap<V> {
    /// Create a map mirroring `path`, performing the initial load
    /// synchronously and then spawning the watch-and-reconcile task.
    ///
    /// A failure to list or watch `path` is returned and nothing is spawned.
    pub async fn new(
        store: Arc<dyn CoordinationStore>,
        path: &str,
        deserialize: DeserializeFn<V>,
        on_change: ChangeCallback<V>,
    ) -> Result<Self> {
        validate_path(path)?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let map = ReplicatedMap {
            inner: Arc::new(Inner {
                store,
                path: path.to_string(),
                entries: LockedMap::new(),
                deserialize,
                on_change,
                shutdown_tx,
                terminal: Mutex::new(None),
            }),
        };

        let (children, watch) = map.inner.store.children_watch(path).await?;
        map.reconcile(children).await;

        tokio::spawn(run(Arc::downgrade(&map.inner), watch, shutdown_rx));
        Ok(map)
    }

    /// Get a mirrored value
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.entries.get(key)
    }

    /// Check whether a child is currently mirrored
    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.contains(key)
    }

    /// Names of the mirrored children
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// The watched path
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Stop the background reconciliation task. Idempotent; the task also
    /// stops when the last map handle is dropped.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.try_send(());
    }

    /// Take the error that stopped the background task, if it stopped on one.
    pub fn take_error(&self) -> Option<Error> {
        self.inner.terminal.lock().unwrap().take()
    }

    /// Apply one observed child listing: fetch and insert added entries, drop
    /// removed ones, then fire the change callback if anything changed.
    async fn reconcile(&self, children: Vec<String>) {
        let current: StringSet = children.into_iter().collect();
        let known: StringSet = self.inner.entries.keys().into_iter().collect();
        let added = current.difference(&known);
        let removed = known.difference(&current);

        for key in &added {
            let node = join(&self.inner.path, key);
            let raw = match self.inner.store.get(&node).await {
                Ok(raw) => raw,
                Err(e) => {
                    // Skipped this round; picked up again on the next event
                    warn!(path = %node, error = %e, "skipping entry fetch");
                    continue;
                }
            };
            match (self.inner.deserialize)(&raw) {
                Ok(value) => {
                    self.inner.entries.put(key.clone(), value);
                }
                Err(e) => {
                    warn!(path = %node, error = %e, "skipping undecodable entry");
                }
            }
        }
        for key in &removed {
            self.inner.entries.delete(key);
        }

        if !added.is_empty() || !removed.is_empty() {
            debug!(
                path = %self.inner.path,
                added = added.len(),
                removed = removed.len(),
                "applied child diff"
            );
            (self.inner.on_change)(self);
        }
    }

    fn set_terminal(&self, e: Error) {
        error!(path = %self.inner.path, error = %e, "reconciliation stopped");
        *self.inner.terminal.lock().unwrap() = Some(e);
    }
}

/// The perpetual watch-and-reconcile cycle.
///
/// Holds only a weak handle: when every [`ReplicatedMap`] clone is dropped,
/// the shutdown sender goes with them and the wait below resolves.
async fn run<V: Clone + Send + Sync + 'static>(
    inner: Weak<Inner<V>>,
    mut watch: Watch,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            event = &mut watch => event,
            // Some(()) is an explicit shutdown; None means all handles dropped
            _ = shutdown_rx.recv() => return,
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let map = ReplicatedMap { inner };

        match event {
            Ok(WatchEvent::ChildrenChanged) => {
                // Re-arm first: the watch just consumed itself, and the fresh
                // registration returns the listing it covers.
                match map.inner.store.children_watch(&map.inner.path).await {
                    Ok((children, next)) => {
                        watch = next;
                        map.reconcile(children).await;
                    }
                    Err(e) => {
                        map.set_terminal(e);
                        return;
                    }
                }
            }
            Ok(other) => {
                map.set_terminal(Error::UnexpectedEvent(format!(
                    "{:?} on {}",
                    other, map.inner.path
                )));
                return;
            }
            Err(_) => {
                map.set_terminal(Error::StoreUnavailable("watch channel closed".into()));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CreateMode, MemoryStore};
    use async_trait::async_trait;
    use tokio::sync::oneshot;

    fn identity() -> DeserializeFn<String> {
        Arc::new(|raw: &str| Ok(raw.to_string()))
    }

    fn no_callback() -> ChangeCallback<String> {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn test_new_propagates_listing_error() {
        let store = MemoryStore::new();
        let session: Arc<dyn CoordinationStore> = Arc::new(store.session());

        let err = ReplicatedMap::new(session, "/missing", identity(), no_callback()).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    /// Store stub whose children watch fires an event kind the map never
    /// expects.
    struct RiggedStore {
        event: WatchEvent,
    }

    #[async_trait]
    impl CoordinationStore for RiggedStore {
        async fn create(&self, _: &str, _: &str, _: CreateMode) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, path: &str) -> Result<()> {
            Err(Error::NotFound(path.to_string()))
        }
        async fn get(&self, path: &str) -> Result<String> {
            Err(Error::NotFound(path.to_string()))
        }
        async fn children(&self, _: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn children_watch(&self, _: &str) -> Result<(Vec<String>, Watch)> {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(self.event);
            Ok((vec![], rx))
        }
        async fn exists_watch(&self, _: &str) -> Result<(bool, Watch)> {
            let (_tx, rx) = oneshot::channel();
            Ok((false, rx))
        }
    }

    #[tokio::test]
    async fn test_unexpected_event_is_terminal() {
        let store: Arc<dyn CoordinationStore> = Arc::new(RiggedStore {
            event: WatchEvent::DataChanged,
        });
        let map = ReplicatedMap::new(store, "/svc", identity(), no_callback())
            .await
            .unwrap();

        // Let the background task observe the rigged event
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        let err = map.take_error().unwrap();
        assert!(matches!(err, Error::UnexpectedEvent(_)));
        // Taken once
        assert!(map.take_error().is_none());
    }
}
