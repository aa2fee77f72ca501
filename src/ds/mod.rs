//! Locked collection utilities used by the recipes

pub mod locked_map;
pub mod string_set;

pub use locked_map::LockedMap;
pub use string_set::StringSet;
