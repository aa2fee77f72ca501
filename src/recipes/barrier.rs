//! Double barrier over a coordination store
//!
//! N participants block in `enter` until all have created their ephemeral
//! entry nodes, then block in `leave` until every entry node is gone. The
//! leave phase uses the classic sorted-neighbor protocol: each participant
//! watches a single neighbor's node instead of polling the whole set, so watch
//! fan-out stays at one node per participant rather than one event waking
//! everyone.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::common::{BarrierSpec, Error, Result};
use crate::store::{join, CoordinationStore, CreateMode, Watch, WatchEvent};

/// Name of the readiness marker node under the barrier path. Created by the
/// participant that observes the entry threshold; releases everyone waiting in
/// `enter`.
pub const READY_NODE: &str = "READY";

/// Barrier lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BarrierState {
    Outside = 0,
    Entering = 1,
    Inside = 2,
    Leaving = 3,
    Destroyed = 4,
}

impl BarrierState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarrierState::Outside => "outside",
            BarrierState::Entering => "entering",
            BarrierState::Inside => "inside",
            BarrierState::Leaving => "leaving",
            BarrierState::Destroyed => "destroyed",
        }
    }

    fn from_u8(v: u8) -> BarrierState {
        match v {
            0 => BarrierState::Outside,
            1 => BarrierState::Entering,
            2 => BarrierState::Inside,
            3 => BarrierState::Leaving,
            _ => BarrierState::Destroyed,
        }
    }
}

/// One participant's handle on a double barrier.
///
/// The state machine is per-handle and transitions only through atomic
/// compare-and-swap; a concurrent call that loses a transition race gets
/// `Error::InvalidState` instead of blocking.
pub struct DoubleBarrier {
    store: Arc<dyn CoordinationStore>,
    barrier_path: String,
    ready_path: String,
    entry_name: String,
    entry_path: String,
    size: usize,
    state: AtomicU8,
    cancel_tx: mpsc::Sender<()>,
    // Only the single in-flight enter/leave wait ever locks this.
    cancel_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl DoubleBarrier {
    /// Create a barrier handle, ensuring the shared barrier path exists.
    ///
    /// The path create is idempotent: another participant having created it
    /// already is not an error.
    pub async fn create(store: Arc<dyn CoordinationStore>, spec: BarrierSpec) -> Result<Self> {
        spec.validate()?;
        if spec.entry_name == READY_NODE {
            return Err(Error::InvalidArgument(format!(
                "entry name {:?} is reserved",
                READY_NODE
            )));
        }

        let barrier_path = format!("/{}", spec.name);
        match store.create(&barrier_path, "", CreateMode::Persistent).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(e),
        }

        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        Ok(Self {
            ready_path: join(&barrier_path, READY_NODE),
            entry_path: join(&barrier_path, &spec.entry_name),
            entry_name: spec.entry_name,
            size: spec.size,
            barrier_path,
            store,
            state: AtomicU8::new(BarrierState::Outside as u8),
            cancel_tx,
            cancel_rx: tokio::sync::Mutex::new(cancel_rx),
        })
    }

    /// Current state.
    pub fn state(&self) -> BarrierState {
        BarrierState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Shared barrier path.
    pub fn path(&self) -> &str {
        &self.barrier_path
    }

    /// This participant's entry name.
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    fn cas(&self, from: BarrierState, to: BarrierState) -> Result<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| Error::InvalidState {
                expected: from.as_str(),
                actual: BarrierState::from_u8(actual).as_str(),
            })
    }

    /// Enter the barrier, blocking until all `size` participants have arrived
    /// or the wait is cancelled.
    ///
    /// Valid only from `Outside`. On cancellation this returns
    /// `Error::Cancelled` with the state left at `Entering` and the entry
    /// node still in place; recovery is `destroy`.
    pub async fn enter(&self) -> Result<()> {
        let state = self.state();
        if state != BarrierState::Outside {
            return Err(Error::InvalidState {
                expected: BarrierState::Outside.as_str(),
                actual: state.as_str(),
            });
        }

        if let Err(e) = self
            .store
            .create(&self.entry_path, "", CreateMode::Ephemeral)
            .await
        {
            return Err(Error::EntryFailed(e.to_string()));
        }

        self.cas(BarrierState::Outside, BarrierState::Entering)?;

        // Arm the readiness watch before counting, so a marker created after
        // the count cannot be missed.
        let (ready_exists, ready_watch) = self.store.exists_watch(&self.ready_path).await?;
        let children = self.store.children(&self.barrier_path).await?;

        if children.len() < self.size {
            if ready_exists {
                // Raced with the creator of the marker between its create and
                // our listing; the threshold is already met.
                debug!(path = %self.barrier_path, "readiness marker already present");
            } else {
                debug!(
                    path = %self.barrier_path,
                    present = children.len(),
                    size = self.size,
                    "waiting for participants"
                );
                self.wait(ready_watch, WatchEvent::Created).await?;
            }
        } else {
            match self
                .store
                .create(&self.ready_path, "", CreateMode::Ephemeral)
                .await
            {
                Ok(()) => debug!(path = %self.ready_path, "created readiness marker"),
                // Another participant observed the threshold first
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e),
            }
        }

        self.cas(BarrierState::Entering, BarrierState::Inside)
    }

    /// Leave the barrier, blocking until every participant's entry node is
    /// gone or the wait is cancelled.
    ///
    /// Valid only from `Inside`. On cancellation the participant's own entry
    /// node may remain for diagnosis; recovery is `destroy`.
    pub async fn leave(&self) -> Result<()> {
        self.cas(BarrierState::Inside, BarrierState::Leaving)?;

        match self.store.delete(&self.ready_path).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        loop {
            let mut children = self.store.children(&self.barrier_path).await?;
            // A laggard enter may have re-created the marker; it is not a
            // participant.
            children.retain(|c| c != READY_NODE);

            if children.is_empty() {
                break;
            }
            if children.len() == 1 && children[0] == self.entry_name {
                self.delete_own_entry().await?;
                break;
            }

            children.sort();

            let wait_name = if children[0] == self.entry_name {
                // Lowest entry holds its node and waits on the highest.
                children[children.len() - 1].clone()
            } else {
                // Everyone else drops their node and waits on the lowest.
                self.delete_own_entry().await?;
                children[0].clone()
            };

            let wait_path = join(&self.barrier_path, &wait_name);
            let (exists, watch) = self.store.exists_watch(&wait_path).await?;
            if !exists {
                // Neighbor vanished between the listing and the watch; list
                // again rather than waiting on a node that is already gone.
                continue;
            }
            debug!(path = %wait_path, "waiting for neighbor to leave");
            self.wait(watch, WatchEvent::Deleted).await?;
        }

        self.cas(BarrierState::Leaving, BarrierState::Outside)
    }

    /// Post a cancellation signal without blocking.
    ///
    /// At most one signal is ever pending: posting while one is pending is a
    /// no-op. Each signal unblocks at most one in-flight `enter` or `leave`
    /// wait. Cancellation does not roll back state or remove nodes; callers
    /// recover with `destroy`.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }

    /// Tear the barrier down: cancel any in-flight wait, best-effort delete
    /// the barrier path and everything under it, and move to `Destroyed`
    /// unconditionally.
    pub async fn destroy(&self) {
        self.cancel();
        if let Ok(children) = self.store.children(&self.barrier_path).await {
            for child in children {
                let _ = self.store.delete(&join(&self.barrier_path, &child)).await;
            }
        }
        let _ = self.store.delete(&self.barrier_path).await;
        // Terminal state always wins, no CAS.
        self.state
            .store(BarrierState::Destroyed as u8, Ordering::Release);
        debug!(path = %self.barrier_path, "barrier destroyed");
    }

    async fn delete_own_entry(&self) -> Result<()> {
        match self.store.delete(&self.entry_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Block on the watch or the cancellation signal, whichever fires first.
    async fn wait(&self, watch: Watch, want: WatchEvent) -> Result<()> {
        let mut cancel_rx = self.cancel_rx.lock().await;
        tokio::select! {
            event = watch => match event {
                Ok(ev) if ev == want => Ok(()),
                Ok(ev) => Err(Error::UnexpectedEvent(format!(
                    "expected {:?}, got {:?}",
                    want, ev
                ))),
                Err(_) => Err(Error::StoreUnavailable("watch channel closed".into())),
            },
            _ = cancel_rx.recv() => Err(Error::Cancelled),
        }
    }
}
