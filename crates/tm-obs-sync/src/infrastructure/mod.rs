//! Infrastructure layer for tm-obs-sync.
//!
//! The infrastructure layer handles all I/O: the two WebSocket clients, the
//! settings file, and in-memory stand-ins for tests.
//!
//! # Responsibilities
//!
//! - Connecting to OBS and authenticating (obs-websocket v5)
//! - Connecting to a Tournament Manager fieldset
//! - Correlating command responses with their callers
//! - Locating, reading and writing the settings file
//!
//! # What does NOT belong here?
//!
//! - Deciding what to mirror (that is `tm-obs-core`)
//! - Task supervision and reconnect policy (that is the application layer)

pub mod memory;
pub mod obs;
pub mod rpc;
pub mod settings_file;
pub mod socket;
pub mod tm;

pub use memory::{MemoryDisplayClient, MemorySceneClient};
pub use obs::{ObsClientConfig, ObsSceneClient};
pub use settings_file::{find_settings_file, load_settings, save_settings, SettingsFileError};
pub use tm::{TmClientConfig, TmDisplayClient};
