//! Application layer for tm-obs-sync.
//!
//! The application layer runs the synchronization: it knows *what* to do
//! with events from both sides, but delegates *how* to reach OBS and
//! Tournament Manager to the infrastructure layer through the
//! [`SceneClient`] and [`DisplayClient`] traits.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or speaking a wire protocol (that is infrastructure)
//! - Reading files or parsing TOML

pub mod backoff;
pub mod clients;
pub mod engine;

pub use backoff::{Backoff, BackoffPolicy};
pub use clients::{ClientError, DisplayClient, SceneClient, SceneEvent};
pub use engine::{EngineError, EngineSettings, EngineStatus, SyncEngine};
