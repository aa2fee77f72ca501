//! Common utilities and types shared across minicoord

pub mod config;
pub mod error;

pub use config::BarrierSpec;
pub use error::{Error, Result};
