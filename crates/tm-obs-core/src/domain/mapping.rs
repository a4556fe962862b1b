//! The mapping table: which scene stands for which display mode.
//!
//! A [`MappingTable`] is built once at startup from the configured mapping
//! entries and never changes afterwards.  It answers the two questions the
//! router asks on every event:
//!
//! - "The scene switcher just showed scene S.  What should the display show?"
//!   ([`MappingTable::resolve_scene_to_display`])
//! - "The display just switched to mode D on field F.  Which scene is that?"
//!   ([`MappingTable::resolve_display_to_scene`])
//!
//! # Two kinds of mappings
//!
//! ```text
//! Field scenes (ordered):   "Field 1" ↔ field 0     "Field 2" ↔ field 1
//!                           → INTRO when idle, IN_MATCH when running
//! Direct scenes:            "Rankings" ↔ RANKINGS   "Logo" ↔ LOGO
//! ```
//!
//! Construction validates the whole table and fails fast with a
//! [`ConfigError`]; an engine is never started with an ambiguous table.

use std::collections::HashMap;

use thiserror::Error;

use super::display::{Competition, DisplayMode, FieldIndex, MatchState, SceneId};

/// Reasons a set of mapping entries cannot form a valid table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No field scenes and no direct mappings were supplied.
    #[error("at least one scene mapping (field or direct) must be configured")]
    NoMappings,

    /// A scene name is empty or whitespace only.
    #[error("scene name in mapping #{position} is empty")]
    EmptySceneName { position: usize },

    /// The same scene appears in more than one mapping entry.
    #[error("scene '{scene}' is mapped more than once (entries #{first} and #{second})")]
    DuplicateScene {
        scene: SceneId,
        first: usize,
        second: usize,
    },

    /// Two direct mappings point at the same display mode.
    #[error("display {display} is mapped to both '{first}' and '{second}'")]
    DuplicateDisplay {
        display: DisplayMode,
        first: SceneId,
        second: SceneId,
    },

    /// INTRO / IN_MATCH may only come from field scenes.
    #[error("display {display} cannot be mapped directly to '{scene}'; use a field scene")]
    FieldModeInDirectMapping { display: DisplayMode, scene: SceneId },

    /// Two field scenes claim the same field.
    #[error("field {field} is mapped to both '{first}' and '{second}'")]
    DuplicateField {
        field: FieldIndex,
        first: SceneId,
        second: SceneId,
    },

    /// Field indices must run 0, 1, 2, ... without gaps.
    #[error("field scene '{scene}' has field {field}, but only {count} field scene(s) exist")]
    NonDenseField {
        field: FieldIndex,
        scene: SceneId,
        count: usize,
    },

    /// The display mode does not exist for the configured competition.
    #[error("display {display} (scene '{scene}') is not available for {competition}")]
    DisplayNotAvailable {
        display: DisplayMode,
        scene: SceneId,
        competition: Competition,
    },
}

/// Misses while translating between scenes and display modes.
///
/// These are never fatal: the router logs them and drops the event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("scene '{0}' is not mapped")]
    UnmappedScene(SceneId),
    #[error("display {0} is not mapped to any scene")]
    UnmappedDisplay(DisplayMode),
    /// A field mode arrived without a field, or for a field with no scene.
    #[error("no field scene for field {0:?}")]
    UnknownField(Option<FieldIndex>),
}

/// One authored mapping entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneMapping {
    /// A camera scene for one competition field.
    Field { scene: SceneId, field: FieldIndex },
    /// A scene that always stands for one display mode.
    Direct { scene: SceneId, display: DisplayMode },
}

impl SceneMapping {
    /// The scene this entry maps.
    pub fn scene(&self) -> &SceneId {
        match self {
            SceneMapping::Field { scene, .. } | SceneMapping::Direct { scene, .. } => scene,
        }
    }
}

/// The display side of a resolved scene: a mode, plus the field for field scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDisplay {
    pub mode: DisplayMode,
    pub field: Option<FieldIndex>,
}

/// Immutable bidirectional scene ↔ display lookup.
#[derive(Debug, Clone)]
pub struct MappingTable {
    competition: Competition,
    /// Authored order, kept for diagnostics.
    entries: Vec<SceneMapping>,
    by_scene: HashMap<SceneId, SceneMapping>,
    by_display: HashMap<DisplayMode, SceneId>,
    by_field: HashMap<FieldIndex, SceneId>,
}

impl MappingTable {
    /// Builds a table from authored entries.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for empty input, empty or duplicate scene
    /// names, duplicate direct display modes, duplicate or non-dense field
    /// indices, INTRO / IN_MATCH in a direct mapping, or a display mode the
    /// competition does not offer.
    pub fn new(
        competition: Competition,
        entries: impl IntoIterator<Item = SceneMapping>,
    ) -> Result<Self, ConfigError> {
        let entries: Vec<SceneMapping> = entries.into_iter().collect();
        if entries.is_empty() {
            return Err(ConfigError::NoMappings);
        }

        let mut positions: HashMap<&SceneId, usize> = HashMap::new();
        let mut by_scene = HashMap::with_capacity(entries.len());
        let mut by_display: HashMap<DisplayMode, SceneId> = HashMap::new();
        let mut by_field: HashMap<FieldIndex, SceneId> = HashMap::new();

        for (position, entry) in entries.iter().enumerate() {
            let scene = entry.scene();
            if scene.as_str().trim().is_empty() {
                return Err(ConfigError::EmptySceneName { position });
            }
            if let Some(&first) = positions.get(scene) {
                return Err(ConfigError::DuplicateScene {
                    scene: scene.clone(),
                    first,
                    second: position,
                });
            }
            positions.insert(scene, position);

            match entry {
                SceneMapping::Field { field, .. } => {
                    if let Some(first) = by_field.get(field) {
                        return Err(ConfigError::DuplicateField {
                            field: *field,
                            first: first.clone(),
                            second: scene.clone(),
                        });
                    }
                    by_field.insert(*field, scene.clone());
                }
                SceneMapping::Direct { display, .. } => {
                    if display.is_field_mode() {
                        return Err(ConfigError::FieldModeInDirectMapping {
                            display: *display,
                            scene: scene.clone(),
                        });
                    }
                    if !display.is_available_for(competition) {
                        return Err(ConfigError::DisplayNotAvailable {
                            display: *display,
                            scene: scene.clone(),
                            competition,
                        });
                    }
                    if let Some(first) = by_display.get(display) {
                        return Err(ConfigError::DuplicateDisplay {
                            display: *display,
                            first: first.clone(),
                            second: scene.clone(),
                        });
                    }
                    by_display.insert(*display, scene.clone());
                }
            }
            by_scene.insert(scene.clone(), entry.clone());
        }

        // Unique indices that are all below the count cover 0..count exactly.
        let count = by_field.len();
        if let Some((field, scene)) = by_field.iter().find(|(field, _)| **field >= count) {
            return Err(ConfigError::NonDenseField {
                field: *field,
                scene: scene.clone(),
                count,
            });
        }

        Ok(Self {
            competition,
            entries,
            by_scene,
            by_display,
            by_field,
        })
    }

    /// Builds a table from an ordered field scene list and direct mappings.
    ///
    /// Field scene `i` in `field_scenes` gets field index `i`.
    pub fn from_lists(
        competition: Competition,
        field_scenes: impl IntoIterator<Item = SceneId>,
        direct: impl IntoIterator<Item = (SceneId, DisplayMode)>,
    ) -> Result<Self, ConfigError> {
        let fields = field_scenes
            .into_iter()
            .enumerate()
            .map(|(field, scene)| SceneMapping::Field { scene, field });
        let direct = direct
            .into_iter()
            .map(|(scene, display)| SceneMapping::Direct { scene, display });
        Self::new(competition, fields.chain(direct))
    }

    /// The competition the table was validated against.
    pub fn competition(&self) -> Competition {
        self.competition
    }

    /// Entries in authored order.
    pub fn entries(&self) -> &[SceneMapping] {
        &self.entries
    }

    /// Number of field scenes.
    pub fn field_count(&self) -> usize {
        self.by_field.len()
    }

    /// Number of direct mappings.
    pub fn direct_count(&self) -> usize {
        self.by_display.len()
    }

    /// Returns `true` when `scene` appears in the table.
    pub fn contains_scene(&self, scene: &SceneId) -> bool {
        self.by_scene.contains_key(scene)
    }

    /// The field index of `scene`, if it is a field scene.
    pub fn field_of(&self, scene: &SceneId) -> Option<FieldIndex> {
        match self.by_scene.get(scene) {
            Some(SceneMapping::Field { field, .. }) => Some(*field),
            _ => None,
        }
    }

    /// Translates a scene into the display mode it stands for.
    ///
    /// Field scenes become INTRO or IN_MATCH depending on `match_state` and
    /// carry their field index; direct scenes return their configured mode.
    ///
    /// # Errors
    ///
    /// [`ResolveError::UnmappedScene`] if `scene` is not in the table.
    pub fn resolve_scene_to_display(
        &self,
        scene: &SceneId,
        match_state: MatchState,
    ) -> Result<ResolvedDisplay, ResolveError> {
        match self.by_scene.get(scene) {
            Some(SceneMapping::Field { field, .. }) => Ok(ResolvedDisplay {
                mode: match_state.field_display(),
                field: Some(*field),
            }),
            Some(SceneMapping::Direct { display, .. }) => Ok(ResolvedDisplay {
                mode: *display,
                field: None,
            }),
            None => Err(ResolveError::UnmappedScene(scene.clone())),
        }
    }

    /// Translates a display mode (plus field for field modes) into a scene.
    ///
    /// # Errors
    ///
    /// [`ResolveError::UnknownField`] when a field mode has no field or the
    /// field has no scene; [`ResolveError::UnmappedDisplay`] when a direct
    /// mode has no scene.
    pub fn resolve_display_to_scene(
        &self,
        display: DisplayMode,
        field: Option<FieldIndex>,
    ) -> Result<&SceneId, ResolveError> {
        if display.is_field_mode() {
            return field
                .and_then(|f| self.by_field.get(&f))
                .ok_or(ResolveError::UnknownField(field));
        }
        self.by_display
            .get(&display)
            .ok_or(ResolveError::UnmappedDisplay(display))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> MappingTable {
        MappingTable::from_lists(
            Competition::V5RC,
            [SceneId::from("Field 1"), SceneId::from("Field 2")],
            [
                (SceneId::from("Rankings"), DisplayMode::Rankings),
                (SceneId::from("Logo"), DisplayMode::Logo),
                (SceneId::from("Bracket"), DisplayMode::Bracket),
            ],
        )
        .expect("sample table is valid")
    }

    #[test]
    fn test_field_scene_resolves_by_match_state() {
        // Arrange
        let table = sample_table();
        let scene = SceneId::from("Field 2");

        // Act
        let idle = table.resolve_scene_to_display(&scene, MatchState::Idle).unwrap();
        let running = table
            .resolve_scene_to_display(&scene, MatchState::Running)
            .unwrap();

        // Assert
        assert_eq!(idle.mode, DisplayMode::Intro);
        assert_eq!(running.mode, DisplayMode::InMatch);
        assert_eq!(idle.field, Some(1));
    }

    #[test]
    fn test_direct_scene_ignores_match_state() {
        let table = sample_table();
        let resolved = table
            .resolve_scene_to_display(&SceneId::from("Rankings"), MatchState::Running)
            .unwrap();
        assert_eq!(resolved.mode, DisplayMode::Rankings);
        assert_eq!(resolved.field, None);
    }

    #[test]
    fn test_unmapped_scene_is_reported() {
        let table = sample_table();
        let err = table
            .resolve_scene_to_display(&SceneId::from("Pit Cam"), MatchState::Idle)
            .unwrap_err();
        assert_eq!(err, ResolveError::UnmappedScene(SceneId::from("Pit Cam")));
    }

    #[test]
    fn test_field_modes_resolve_to_field_scene() {
        let table = sample_table();
        assert_eq!(
            table.resolve_display_to_scene(DisplayMode::InMatch, Some(0)).unwrap(),
            &SceneId::from("Field 1")
        );
        assert_eq!(
            table.resolve_display_to_scene(DisplayMode::Intro, Some(1)).unwrap(),
            &SceneId::from("Field 2")
        );
    }

    #[test]
    fn test_field_mode_without_field_is_unknown_field() {
        let table = sample_table();
        assert_eq!(
            table.resolve_display_to_scene(DisplayMode::Intro, None),
            Err(ResolveError::UnknownField(None))
        );
        assert_eq!(
            table.resolve_display_to_scene(DisplayMode::InMatch, Some(7)),
            Err(ResolveError::UnknownField(Some(7)))
        );
    }

    #[test]
    fn test_unmapped_direct_display_is_reported() {
        let table = sample_table();
        assert_eq!(
            table.resolve_display_to_scene(DisplayMode::Schedule, None),
            Err(ResolveError::UnmappedDisplay(DisplayMode::Schedule))
        );
    }

    #[test]
    fn test_direct_mappings_round_trip() {
        let table = sample_table();
        for display in [DisplayMode::Rankings, DisplayMode::Logo, DisplayMode::Bracket] {
            let scene = table.resolve_display_to_scene(display, None).unwrap().clone();
            let back = table.resolve_scene_to_display(&scene, MatchState::Idle).unwrap();
            assert_eq!(back.mode, display);
        }
    }

    #[test]
    fn test_field_mappings_round_trip_with_matching_state() {
        let table = sample_table();
        for (mode, state) in [
            (DisplayMode::Intro, MatchState::Idle),
            (DisplayMode::InMatch, MatchState::Running),
        ] {
            for field in 0..table.field_count() {
                let scene = table.resolve_display_to_scene(mode, Some(field)).unwrap().clone();
                let back = table.resolve_scene_to_display(&scene, state).unwrap();
                assert_eq!(back.mode, mode);
                assert_eq!(back.field, Some(field));
            }
        }
    }

    #[test]
    fn test_duplicate_direct_display_is_rejected() {
        // Arrange: two scenes both claim RANKINGS
        let result = MappingTable::from_lists(
            Competition::V5RC,
            [],
            [
                (SceneId::from("Rankings A"), DisplayMode::Rankings),
                (SceneId::from("Rankings B"), DisplayMode::Rankings),
            ],
        );

        // Assert
        assert_eq!(
            result.unwrap_err(),
            ConfigError::DuplicateDisplay {
                display: DisplayMode::Rankings,
                first: SceneId::from("Rankings A"),
                second: SceneId::from("Rankings B"),
            }
        );
    }

    #[test]
    fn test_scene_in_both_lists_is_rejected() {
        let result = MappingTable::from_lists(
            Competition::V5RC,
            [SceneId::from("Field 1")],
            [(SceneId::from("Field 1"), DisplayMode::Logo)],
        );
        assert!(matches!(
            result,
            Err(ConfigError::DuplicateScene { first: 0, second: 1, .. })
        ));
    }

    #[test]
    fn test_field_mode_in_direct_mapping_is_rejected() {
        let result = MappingTable::from_lists(
            Competition::V5RC,
            [],
            [(SceneId::from("Intro"), DisplayMode::Intro)],
        );
        assert!(matches!(
            result,
            Err(ConfigError::FieldModeInDirectMapping { display: DisplayMode::Intro, .. })
        ));
    }

    #[test]
    fn test_competition_restricted_display_is_rejected() {
        let result = MappingTable::from_lists(
            Competition::VIQRC,
            [],
            [(SceneId::from("Selection"), DisplayMode::AllianceSelection)],
        );
        assert!(matches!(
            result,
            Err(ConfigError::DisplayNotAvailable {
                competition: Competition::VIQRC,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let result = MappingTable::new(Competition::V5RC, []);
        assert_eq!(result.unwrap_err(), ConfigError::NoMappings);
    }

    #[test]
    fn test_blank_scene_name_is_rejected() {
        let result = MappingTable::from_lists(Competition::V5RC, [SceneId::from("  ")], []);
        assert_eq!(result.unwrap_err(), ConfigError::EmptySceneName { position: 0 });
    }

    #[test]
    fn test_two_scenes_on_one_field_are_rejected() {
        // Arrange
        let entries = [
            SceneMapping::Field {
                scene: SceneId::from("Field A"),
                field: 0,
            },
            SceneMapping::Field {
                scene: SceneId::from("Field B"),
                field: 0,
            },
        ];

        // Act
        let result = MappingTable::new(Competition::V5RC, entries);

        // Assert
        assert_eq!(
            result.unwrap_err(),
            ConfigError::DuplicateField {
                field: 0,
                first: SceneId::from("Field A"),
                second: SceneId::from("Field B"),
            }
        );
    }

    #[test]
    fn test_field_gap_is_rejected() {
        let entries = [
            SceneMapping::Field {
                scene: SceneId::from("Field A"),
                field: 0,
            },
            SceneMapping::Field {
                scene: SceneId::from("Field C"),
                field: 7,
            },
        ];

        let result = MappingTable::new(Competition::V5RC, entries);

        assert_eq!(
            result.unwrap_err(),
            ConfigError::NonDenseField {
                field: 7,
                scene: SceneId::from("Field C"),
                count: 2,
            }
        );
    }

    #[test]
    fn test_fields_out_of_authored_order_are_accepted() {
        let entries = [
            SceneMapping::Field {
                scene: SceneId::from("Field 2"),
                field: 1,
            },
            SceneMapping::Field {
                scene: SceneId::from("Field 1"),
                field: 0,
            },
        ];

        let table = MappingTable::new(Competition::V5RC, entries).unwrap();

        assert_eq!(
            table.resolve_display_to_scene(DisplayMode::Intro, Some(0)),
            Ok(&SceneId::from("Field 1"))
        );
    }

    #[test]
    fn test_entries_keep_authored_order() {
        let table = sample_table();
        let names: Vec<&str> = table.entries().iter().map(|e| e.scene().as_str()).collect();
        assert_eq!(names, ["Field 1", "Field 2", "Rankings", "Logo", "Bracket"]);
        assert_eq!(table.field_count(), 2);
        assert_eq!(table.direct_count(), 3);
    }
}
