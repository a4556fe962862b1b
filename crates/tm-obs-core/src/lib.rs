//! # tm-obs-core
//!
//! Pure synchronization logic for TM-OBS-Sync: the bridge that keeps an OBS
//! program scene and a VEX Tournament Manager audience display mirrored.
//!
//! This crate performs no I/O.  It has no async runtime, no sockets and no
//! file access, which keeps every decision deterministic and unit-testable.
//!
//! # Architecture overview (for beginners)
//!
//! The two applications never talk to each other directly.  The bridge
//! listens to both, and every time one of them changes it asks:
//! "what should the other one show now?"
//!
//! - **`domain::display`** – The vocabulary: scene names, the closed set of
//!   audience display modes, match state, competition type.
//! - **`domain::mapping`** – The [`MappingTable`]: which scene stands for which
//!   display mode.  Built once from configuration and validated up front.
//! - **`domain::state`** – The [`SyncState`]: what the bridge believes each
//!   side is showing, plus the echo-suppression token that stops the bridge
//!   from ping-ponging its own changes.
//! - **`router`** – The [`EventRouter`]: takes one event, consults the table
//!   and state, and returns a [`RouteOutcome`] saying whether to send a
//!   [`Command`] to the other side.

pub mod domain;
pub mod router;

// Re-export the most-used types at the crate root so callers can write
// `tm_obs_core::EventRouter` instead of `tm_obs_core::router::EventRouter`.
pub use domain::display::{
    Competition, DisplayMode, FieldIndex, MatchState, ParseDisplayModeError, SceneId,
};
pub use domain::mapping::{ConfigError, MappingTable, ResolveError, ResolvedDisplay, SceneMapping};
pub use domain::state::{Expectation, Observation, Side, SyncState};
pub use router::{
    Command, DisplayEvent, DisplaySnapshot, EventRouter, RouteOutcome, Snapshot, SyncDirections,
};
