//! Domain layer for tm-obs-sync.
//!
//! Pure types with no I/O: the settings file schema and the JSON messages of
//! the two WebSocket protocols.  The synchronization logic itself lives in
//! the `tm-obs-core` crate.

pub mod messages;
pub mod settings;

pub use settings::{
    EngineSection, FieldSceneEntry, ObsSettings, OtherSceneEntry, Settings, SettingsError,
    TmSettings,
};
