//! Domain types: display vocabulary, mapping table and sync state.
//!
//! Nothing in here performs I/O or depends on an async runtime.

pub mod display;
pub mod mapping;
pub mod state;
