//! Coordination recipes built on the store interface
//!
//! - Double barrier: N participants synchronize entry and exit
//! - Replicated map: a live local mirror of a path's children

pub mod barrier;
pub mod replicated_map;

pub use barrier::{BarrierState, DoubleBarrier, READY_NODE};
pub use replicated_map::{ChangeCallback, DeserializeFn, ReplicatedMap};
