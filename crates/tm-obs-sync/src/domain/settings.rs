//! Settings file schema and validation.
//!
//! The settings file is TOML.  Every field except the mapping lists has a
//! default, so a minimal file only needs the scenes:
//!
//! ```toml
//! [[field_scene_mappings]]
//! obs_scene = "Field 1"
//!
//! [[other_scene_mappings]]
//! obs_scene = "Rankings"
//! tm_display = "RANKINGS"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the key is absent, so older files keep working when new
//! keys are added.
//!
//! Reading and writing the file lives in `infrastructure::settings_file`; this
//! module only describes and checks the content.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tm_obs_core::{
    Competition, ConfigError, DisplayMode, MappingTable, SceneId, SceneMapping, SyncDirections,
};

/// Problems with the content of a settings file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("{0} host must be specified")]
    MissingHost(&'static str),

    #[error("{0} port must be between 1 and 65535")]
    InvalidPort(&'static str),

    #[error("VEX TM fieldset title must be specified")]
    MissingFieldsetTitle,

    /// `tm_display` of an other-scene mapping is blank.
    #[error("TM display name cannot be empty (other scene mapping #{position})")]
    EmptyDisplayName { position: usize },

    #[error("invalid TM display '{value}'. Valid options: {valid}")]
    UnknownDisplay { value: String, valid: String },

    #[error("OBS scene '{0}' cannot be in both field and other mappings")]
    SceneInBothLists(String),

    #[error("invalid [engine] settings: {0}")]
    Engine(String),

    /// The mapping lists do not form a valid table.
    #[error(transparent)]
    Mapping(#[from] ConfigError),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// `tracing` level used when neither `RUST_LOG` nor `--debug` is given.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Mirror tournament display changes onto OBS.
    #[serde(default = "default_true")]
    pub sync_tm_to_obs: bool,
    /// Mirror OBS scene changes onto the tournament display.
    #[serde(default = "default_true")]
    pub sync_obs_to_tm: bool,
    #[serde(default)]
    pub obs: ObsSettings,
    #[serde(default)]
    pub vex_tm: TmSettings,
    #[serde(default)]
    pub engine: EngineSection,
    /// Camera scenes, one per field, in field order.
    #[serde(default)]
    pub field_scene_mappings: Vec<FieldSceneEntry>,
    /// Scenes that always stand for one display mode.
    #[serde(default)]
    pub other_scene_mappings: Vec<OtherSceneEntry>,
}

/// Where OBS listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObsSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_obs_port")]
    pub port: u16,
    /// obs-websocket server password; omit when authentication is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Where Tournament Manager listens and which fieldset to follow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TmSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_tm_port")]
    pub port: u16,
    #[serde(default)]
    pub competition: Competition,
    #[serde(default = "default_fieldset_title")]
    pub fieldset_title: String,
}

/// Reconnect and timeout tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSection {
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    /// `0` retries forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default)]
    pub exit_on_reconnect_exhaustion: bool,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSceneEntry {
    pub obs_scene: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OtherSceneEntry {
    pub obs_scene: String,
    /// Display name such as `"RANKINGS"`; matched case-insensitively.
    pub tm_display: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_obs_port() -> u16 {
    4455
}
fn default_tm_port() -> u16 {
    8080
}
fn default_fieldset_title() -> String {
    "Match Field Set #1".to_string()
}
fn default_reconnect_initial_ms() -> u64 {
    500
}
fn default_reconnect_max_ms() -> u64 {
    30_000
}
fn default_command_timeout_ms() -> u64 {
    5_000
}
fn default_shutdown_grace_ms() -> u64 {
    2_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sync_tm_to_obs: default_true(),
            sync_obs_to_tm: default_true(),
            obs: ObsSettings::default(),
            vex_tm: TmSettings::default(),
            engine: EngineSection::default(),
            field_scene_mappings: Vec::new(),
            other_scene_mappings: Vec::new(),
        }
    }
}

impl Default for ObsSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_obs_port(),
            password: None,
        }
    }
}

impl Default for TmSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_tm_port(),
            competition: Competition::default(),
            fieldset_title: default_fieldset_title(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            max_reconnect_attempts: 0,
            exit_on_reconnect_exhaustion: false,
            command_timeout_ms: default_command_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

impl Settings {
    /// A starter file for a two-field event, written by `--init`.
    pub fn example() -> Self {
        let field = |name: &str| FieldSceneEntry {
            obs_scene: name.to_string(),
        };
        let other = |name: &str, display: DisplayMode| OtherSceneEntry {
            obs_scene: name.to_string(),
            tm_display: display.name().to_string(),
        };
        Self {
            field_scene_mappings: vec![field("Field 1"), field("Field 2")],
            other_scene_mappings: vec![
                other("Logo", DisplayMode::Logo),
                other("Rankings", DisplayMode::Rankings),
                other("Schedule", DisplayMode::Schedule),
                other("Match Results", DisplayMode::Results),
            ],
            ..Self::default()
        }
    }

    /// Checks the whole file and builds the mapping table.
    ///
    /// # Errors
    ///
    /// The first problem found, as a [`SettingsError`].
    pub fn mapping_table(&self) -> Result<MappingTable, SettingsError> {
        self.check_endpoints()?;
        self.check_engine()?;

        let field_scenes: HashSet<&str> = self
            .field_scene_mappings
            .iter()
            .map(|m| m.obs_scene.as_str())
            .collect();
        if let Some(shared) = self
            .other_scene_mappings
            .iter()
            .find(|m| field_scenes.contains(m.obs_scene.as_str()))
        {
            return Err(SettingsError::SceneInBothLists(shared.obs_scene.clone()));
        }

        let mut direct = Vec::with_capacity(self.other_scene_mappings.len());
        for (position, mapping) in self.other_scene_mappings.iter().enumerate() {
            if mapping.tm_display.trim().is_empty() {
                return Err(SettingsError::EmptyDisplayName { position });
            }
            let display: DisplayMode =
                mapping
                    .tm_display
                    .parse()
                    .map_err(|_| SettingsError::UnknownDisplay {
                        value: mapping.tm_display.clone(),
                        valid: valid_display_names(),
                    })?;
            direct.push(SceneMapping::Direct {
                scene: SceneId::new(mapping.obs_scene.as_str()),
                display,
            });
        }

        let fields = self
            .field_scene_mappings
            .iter()
            .enumerate()
            .map(|(field, mapping)| SceneMapping::Field {
                scene: SceneId::new(mapping.obs_scene.as_str()),
                field,
            });

        Ok(MappingTable::new(
            self.vex_tm.competition,
            fields.chain(direct),
        )?)
    }

    /// Validates without keeping the table.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.mapping_table().map(|_| ())
    }

    pub fn directions(&self) -> SyncDirections {
        SyncDirections {
            obs_to_tm: self.sync_obs_to_tm,
            tm_to_obs: self.sync_tm_to_obs,
        }
    }

    /// `true` when neither direction is enabled.
    pub fn is_observe_only(&self) -> bool {
        !self.sync_obs_to_tm && !self.sync_tm_to_obs
    }

    fn check_endpoints(&self) -> Result<(), SettingsError> {
        if self.obs.host.trim().is_empty() {
            return Err(SettingsError::MissingHost("OBS"));
        }
        if self.obs.port == 0 {
            return Err(SettingsError::InvalidPort("OBS"));
        }
        if self.vex_tm.host.trim().is_empty() {
            return Err(SettingsError::MissingHost("VEX TM"));
        }
        if self.vex_tm.port == 0 {
            return Err(SettingsError::InvalidPort("VEX TM"));
        }
        if self.vex_tm.fieldset_title.trim().is_empty() {
            return Err(SettingsError::MissingFieldsetTitle);
        }
        Ok(())
    }

    fn check_engine(&self) -> Result<(), SettingsError> {
        let engine = &self.engine;
        if engine.reconnect_initial_ms == 0 {
            return Err(SettingsError::Engine(
                "reconnect_initial_ms must be greater than 0".to_string(),
            ));
        }
        if engine.reconnect_initial_ms > engine.reconnect_max_ms {
            return Err(SettingsError::Engine(
                "reconnect_initial_ms must not exceed reconnect_max_ms".to_string(),
            ));
        }
        if engine.command_timeout_ms == 0 {
            return Err(SettingsError::Engine(
                "command_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn valid_display_names() -> String {
    DisplayMode::ALL
        .iter()
        .map(|mode| mode.name())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
