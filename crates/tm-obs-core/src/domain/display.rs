//! Vocabulary shared by both sides of the bridge.
//!
//! The scene switcher speaks in *scenes* (free-form names chosen by the
//! operator).  The tournament display speaks in a closed set of *audience
//! display modes* plus "which field is active" and "is a match running".
//! This module defines the types for both vocabularies.
//!
//! # Field scenes (for beginners)
//!
//! Most display modes map to exactly one scene (RANKINGS → "Rankings").  The
//! two field modes, INTRO and IN_MATCH, are different: every competition field
//! has its own camera scene, and whether the display should show the intro or
//! the in-match overlay depends on the match state, not on the scene.  That is
//! why [`MatchState::field_display`] exists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position of a field scene in the configured field list.
///
/// Index `i` corresponds to the tournament display's field identifier `i`.
pub type FieldIndex = usize;

/// Name of a scene in the scene switcher.
///
/// Scene names are opaque: the bridge never interprets them, it only compares
/// them for equality and looks them up in the mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    /// Wraps a scene name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the scene name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SceneId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Competition program the tournament is running.
///
/// Some display modes only exist for one program (see
/// [`DisplayMode::is_available_for`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Competition {
    /// VEX V5 Robotics Competition.
    #[default]
    V5RC,
    /// VEX IQ Robotics Competition.
    VIQRC,
}

impl fmt::Display for Competition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Competition::V5RC => f.write_str("V5RC"),
            Competition::VIQRC => f.write_str("VIQRC"),
        }
    }
}

/// Audience display mode of a tournament fieldset.
///
/// The set is closed: the tournament software offers exactly these screens.
/// Names on the wire and in settings files use `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayMode {
    Blank,
    Logo,
    Intro,
    InMatch,
    #[serde(alias = "SAVED_MATCH_RESULTS")]
    Results,
    Schedule,
    Rankings,
    ScRankings,
    AllianceSelection,
    Bracket,
    Award,
    Inspection,
}

impl DisplayMode {
    /// Every display mode, in the order the tournament software lists them.
    pub const ALL: [DisplayMode; 12] = [
        DisplayMode::Blank,
        DisplayMode::Logo,
        DisplayMode::Intro,
        DisplayMode::InMatch,
        DisplayMode::Results,
        DisplayMode::Schedule,
        DisplayMode::Rankings,
        DisplayMode::ScRankings,
        DisplayMode::AllianceSelection,
        DisplayMode::Bracket,
        DisplayMode::Award,
        DisplayMode::Inspection,
    ];

    /// Returns the canonical upper-case name (e.g. `"IN_MATCH"`).
    pub fn name(self) -> &'static str {
        match self {
            DisplayMode::Blank => "BLANK",
            DisplayMode::Logo => "LOGO",
            DisplayMode::Intro => "INTRO",
            DisplayMode::InMatch => "IN_MATCH",
            DisplayMode::Results => "RESULTS",
            DisplayMode::Schedule => "SCHEDULE",
            DisplayMode::Rankings => "RANKINGS",
            DisplayMode::ScRankings => "SC_RANKINGS",
            DisplayMode::AllianceSelection => "ALLIANCE_SELECTION",
            DisplayMode::Bracket => "BRACKET",
            DisplayMode::Award => "AWARD",
            DisplayMode::Inspection => "INSPECTION",
        }
    }

    /// `true` for INTRO and IN_MATCH, the two modes produced by field scenes.
    pub fn is_field_mode(self) -> bool {
        matches!(self, DisplayMode::Intro | DisplayMode::InMatch)
    }

    /// Returns `true` when `competition` offers this display mode.
    ///
    /// Alliance selection and the elimination bracket only exist in V5RC.
    pub fn is_available_for(self, competition: Competition) -> bool {
        match self {
            DisplayMode::AllianceSelection | DisplayMode::Bracket => {
                competition == Competition::V5RC
            }
            _ => true,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a string is not a known display mode name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown display mode '{0}'")]
pub struct ParseDisplayModeError(pub String);

impl FromStr for DisplayMode {
    type Err = ParseDisplayModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("SAVED_MATCH_RESULTS") {
            return Ok(DisplayMode::Results);
        }
        DisplayMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseDisplayModeError(s.to_string()))
    }
}

/// Whether a match is currently running on the active field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchState {
    /// No match loaded, or the loaded match has not started.
    #[default]
    Idle,
    /// A match is running (paused matches count as running).
    Running,
}

impl MatchState {
    /// The display mode a field scene stands for in this match state.
    pub fn field_display(self) -> DisplayMode {
        match self {
            MatchState::Idle => DisplayMode::Intro,
            MatchState::Running => DisplayMode::InMatch,
        }
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchState::Idle => f.write_str("idle"),
            MatchState::Running => f.write_str("running"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
