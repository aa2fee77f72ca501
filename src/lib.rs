//! # minicoord
//!
//! Distributed coordination recipes on top of a ZooKeeper-like store of
//! path-addressed nodes with ephemeral nodes and one-shot change
//! notifications:
//! - **Double barrier**: N participants block in `enter` until all have
//!   arrived, then block in `leave` until all have departed
//! - **Replicated map**: a local, eventually-consistent mirror of a path's
//!   children, kept live by re-armed watches, with caller-supplied
//!   deserialization and a change callback
//!
//! The store itself is an external collaborator behind the
//! [`CoordinationStore`] trait; [`MemoryStore`] is an in-process
//! implementation with the same semantics, used by the tests.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use minicoord::{BarrierSpec, DoubleBarrier, MemoryStore};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! let barrier = DoubleBarrier::create(
//!     Arc::new(store.session()),
//!     BarrierSpec::new("compute", "worker-1", 1),
//! )
//! .await
//! .unwrap();
//!
//! barrier.enter().await.unwrap();
//! // ... synchronized work ...
//! barrier.leave().await.unwrap();
//! # });
//! ```

pub mod common;
pub mod ds;
pub mod recipes;
pub mod store;

// Re-export commonly used types
pub use common::{BarrierSpec, Error, Result};
pub use recipes::{BarrierState, DoubleBarrier, ReplicatedMap};
pub use store::{CoordinationStore, CreateMode, MemoryStore, WatchEvent};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
