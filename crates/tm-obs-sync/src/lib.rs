//! tm-obs-sync library crate.
//!
//! Keeps an OBS program scene and a VEX Tournament Manager audience display
//! showing the same thing.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! OBS (obs-websocket v5)              Tournament Manager (fieldset socket)
//!         ↕                                          ↕
//! [tm-obs-sync]
//!   ├── domain/           Settings schema, JSON wire messages
//!   ├── application/      SyncEngine, SceneClient/DisplayClient traits, backoff
//!   └── infrastructure/
//!         ├── obs         obs-websocket client (tokio-tungstenite)
//!         ├── tm          fieldset client (tokio-tungstenite)
//!         ├── memory      in-memory clients for tests
//!         └── settings_file  TOML load/save and file discovery
//! ```
//!
//! The decisions (what to mirror, when to stay quiet) are made by
//! [`tm_obs_core::EventRouter`]; this crate only feeds it events and carries
//! out its commands.
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `tm-obs-core`; it spawns tasks but
//!   never opens a socket itself.
//! - `infrastructure` depends on all other layers plus `tokio-tungstenite`.

/// Domain layer: settings schema and wire messages (no I/O).
pub mod domain;

/// Application layer: the sync engine and collaborator traits.
pub mod application;

/// Infrastructure layer: WebSocket clients, test doubles, settings files.
pub mod infrastructure;
