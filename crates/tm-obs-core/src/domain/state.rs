//! What the bridge believes both sides are currently showing.
//!
//! [`SyncState`] is the single piece of mutable shared state in the system.
//! Only the [`EventRouter`](crate::router::EventRouter) mutates it, and only in
//! response to inbound observations; outbound commands never write to it.
//!
//! # Echo suppression
//!
//! When the router mirrors a change from side A onto side B, side B will
//! shortly report that very change back.  Without bookkeeping the router would
//! treat that report as a fresh external change and mirror it back onto A.
//!
//! The state therefore holds a single-slot [`Expectation`]: "we told side B to
//! show X and are waiting to see it".  The next observation from side B is
//! compared against it:
//!
//! ```text
//! observation == expected  →  Echo      (token consumed, nothing mirrored)
//! observation != expected  →  External  (token cleared, treated as genuine)
//! ```
//!
//! Observations from side A never touch a token that belongs to side B.
//!
//! A newer command replaces the token, but the command it replaced may still
//! be on its way.  Replaced tokens are kept as *superseded* until their echo
//! shows up, so a quick A→X, A→Y sequence swallows both reflections instead
//! of mirroring the late X back onto A.

use super::display::{DisplayMode, FieldIndex, MatchState, SceneId};

/// Replaced expectations remembered at most; older ones are forgotten.
const MAX_SUPERSEDED: usize = 8;

/// One of the two synchronized applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The video-production scene switcher.
    Scenes,
    /// The tournament audience display.
    Display,
}

impl Side {
    /// The other side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Scenes => Side::Display,
            Side::Display => Side::Scenes,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Scenes => f.write_str("scene switcher"),
            Side::Display => f.write_str("tournament display"),
        }
    }
}

/// A value we commanded one side to show and expect to see reflected back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// The scene switcher should report this scene.
    Scene(SceneId),
    /// The display should report this mode.
    Display(DisplayMode),
}

impl Expectation {
    /// The side the expectation is waiting on.
    pub fn side(&self) -> Side {
        match self {
            Expectation::Scene(_) => Side::Scenes,
            Expectation::Display(_) => Side::Display,
        }
    }
}

/// Result of comparing an observation with the pending expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The observation is the reflection of our own command.
    Echo,
    /// The observation is an independent change.
    External,
}

/// Believed state of both sides plus the echo-suppression token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    scene: Option<SceneId>,
    display: Option<DisplayMode>,
    field: Option<FieldIndex>,
    match_state: MatchState,
    pending: Option<Expectation>,
    /// Replaced tokens whose commands may still be in flight, oldest first.
    superseded: Vec<Expectation>,
    last_origin: Option<Side>,
    scenes_off_map: bool,
    display_off_map: bool,
}

impl SyncState {
    /// Everything unknown, match idle, no pending expectation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last mapped scene the scene switcher reported.
    pub fn scene(&self) -> Option<&SceneId> {
        self.scene.as_ref()
    }

    /// Last mapped mode the display reported.
    pub fn display(&self) -> Option<DisplayMode> {
        self.display
    }

    /// Latest known field.
    pub fn field(&self) -> Option<FieldIndex> {
        self.field
    }

    pub fn match_state(&self) -> MatchState {
        self.match_state
    }

    /// The outstanding echo expectation, if any.
    pub fn pending(&self) -> Option<&Expectation> {
        self.pending.as_ref()
    }

    /// Which side caused the most recent believed-state change.
    pub fn last_origin(&self) -> Option<Side> {
        self.last_origin
    }

    /// `true` when `side` last reported something the mapping table does not cover.
    pub fn is_off_map(&self, side: Side) -> bool {
        match side {
            Side::Scenes => self.scenes_off_map,
            Side::Display => self.display_off_map,
        }
    }

    /// Compares a scene observation with the outstanding expectations.
    ///
    /// Consumes the token on a match; clears scene-side tokens on a mismatch.
    pub fn observe_scene(&mut self, scene: &SceneId) -> Observation {
        self.observe(&Expectation::Scene(scene.clone()))
    }

    /// Compares a display observation with the outstanding expectations.
    pub fn observe_display(&mut self, display: DisplayMode) -> Observation {
        self.observe(&Expectation::Display(display))
    }

    fn observe(&mut self, observed: &Expectation) -> Observation {
        let side = observed.side();

        if self.pending.as_ref() == Some(observed) {
            self.pending = None;
            self.superseded.retain(|e| e.side() != side);
            return Observation::Echo;
        }

        if let Some(position) = self.superseded.iter().position(|e| e == observed) {
            // Same-side commands sent before this one were overtaken by it.
            let mut index = 0;
            self.superseded.retain(|e| {
                let keep = index > position || e.side() != side;
                index += 1;
                keep
            });
            return Observation::Echo;
        }

        if self.pending.as_ref().is_some_and(|e| e.side() == side) {
            self.pending = None;
        }
        self.superseded.retain(|e| e.side() != side);
        Observation::External
    }

    /// The most recent value `side` was commanded to show and has not yet
    /// reported, if any.
    pub fn expected(&self, side: Side) -> Option<&Expectation> {
        self.pending
            .iter()
            .chain(self.superseded.iter().rev())
            .find(|e| e.side() == side)
    }

    /// Records the scene switcher's current (mapped) scene.
    pub fn apply_scene_change(&mut self, scene: SceneId, origin: Side) {
        self.scene = Some(scene);
        self.scenes_off_map = false;
        self.last_origin = Some(origin);
    }

    /// Records the display's current (mapped) mode.
    pub fn apply_display_change(&mut self, display: DisplayMode, origin: Side) {
        self.display = Some(display);
        self.display_off_map = false;
        self.last_origin = Some(origin);
    }

    /// Records the latest match state and field.
    pub fn apply_match_state_change(&mut self, match_state: MatchState, field: FieldIndex) {
        self.match_state = match_state;
        self.field = Some(field);
    }

    /// Records the match state when no field accompanies it.
    pub fn apply_match_state(&mut self, match_state: MatchState) {
        self.match_state = match_state;
    }

    /// Records a field id carried by a display event.
    pub fn apply_field(&mut self, field: FieldIndex) {
        self.field = Some(field);
    }

    /// Marks `side` as showing something outside the mapping table.
    ///
    /// The believed value is left untouched.
    pub fn mark_off_map(&mut self, side: Side) {
        match side {
            Side::Scenes => self.scenes_off_map = true,
            Side::Display => self.display_off_map = true,
        }
    }

    /// Arms the echo-suppression token.
    ///
    /// A token it replaces is kept as superseded until its echo arrives.
    pub fn expect(&mut self, expectation: Expectation) {
        if let Some(previous) = self.pending.replace(expectation) {
            if self.superseded.len() == MAX_SUPERSEDED {
                self.superseded.remove(0);
            }
            self.superseded.push(previous);
        }
    }

    /// Drops the token, or a superseded one, equal to `expectation`.
    ///
    /// Returns `true` when something was dropped.
    pub fn withdraw(&mut self, expectation: &Expectation) -> bool {
        if self.pending.as_ref() == Some(expectation) {
            self.pending = None;
            return true;
        }
        match self.superseded.iter().rposition(|e| e == expectation) {
            Some(position) => {
                self.superseded.remove(position);
                true
            }
            None => false,
        }
    }

    /// Drops every token, superseded ones included.
    pub fn clear_pending(&mut self) {
        self.pending = None;
        self.superseded.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_unknown_and_idle() {
        let state = SyncState::new();
        assert_eq!(state.scene(), None);
        assert_eq!(state.display(), None);
        assert_eq!(state.field(), None);
        assert_eq!(state.match_state(), MatchState::Idle);
        assert_eq!(state.pending(), None);
    }

    #[test]
    fn test_matching_scene_observation_consumes_token() {
        // Arrange
        let mut state = SyncState::new();
        state.expect(Expectation::Scene(SceneId::from("Rankings")));

        // Act
        let first = state.observe_scene(&SceneId::from("Rankings"));
        let second = state.observe_scene(&SceneId::from("Rankings"));

        // Assert: the token works exactly once
        assert_eq!(first, Observation::Echo);
        assert_eq!(second, Observation::External);
        assert_eq!(state.pending(), None);
    }

    #[test]
    fn test_mismatching_observation_clears_token() {
        let mut state = SyncState::new();
        state.expect(Expectation::Display(DisplayMode::Rankings));

        assert_eq!(state.observe_display(DisplayMode::Logo), Observation::External);
        assert_eq!(state.pending(), None);
    }

    #[test]
    fn test_observation_from_other_side_keeps_token() {
        let mut state = SyncState::new();
        state.expect(Expectation::Display(DisplayMode::Rankings));

        assert_eq!(
            state.observe_scene(&SceneId::from("Rankings")),
            Observation::External
        );
        assert_eq!(
            state.pending(),
            Some(&Expectation::Display(DisplayMode::Rankings))
        );
    }

    #[test]
    fn test_apply_changes_record_origin_and_clear_off_map() {
        let mut state = SyncState::new();
        state.mark_off_map(Side::Scenes);

        state.apply_scene_change(SceneId::from("Logo"), Side::Scenes);
        assert_eq!(state.scene(), Some(&SceneId::from("Logo")));
        assert!(!state.is_off_map(Side::Scenes));
        assert_eq!(state.last_origin(), Some(Side::Scenes));

        state.apply_display_change(DisplayMode::Logo, Side::Display);
        assert_eq!(state.last_origin(), Some(Side::Display));
    }

    #[test]
    fn test_mark_off_map_keeps_believed_value() {
        let mut state = SyncState::new();
        state.apply_scene_change(SceneId::from("Logo"), Side::Scenes);

        state.mark_off_map(Side::Scenes);

        assert_eq!(state.scene(), Some(&SceneId::from("Logo")));
        assert!(state.is_off_map(Side::Scenes));
        assert!(!state.is_off_map(Side::Display));
    }

    #[test]
    fn test_withdraw_only_drops_equal_token() {
        let mut state = SyncState::new();
        state.expect(Expectation::Display(DisplayMode::Logo));

        assert!(!state.withdraw(&Expectation::Display(DisplayMode::Award)));
        assert!(state.pending().is_some());
        assert!(state.withdraw(&Expectation::Display(DisplayMode::Logo)));
        assert!(state.pending().is_none());
    }

    #[test]
    fn test_overtaken_command_echo_is_still_swallowed() {
        // Arrange: two display commands in flight, newest last.
        let mut state = SyncState::new();
        state.expect(Expectation::Display(DisplayMode::Rankings));
        state.expect(Expectation::Display(DisplayMode::Logo));

        // Act + Assert: both reflections arrive in order.
        assert_eq!(state.observe_display(DisplayMode::Rankings), Observation::Echo);
        assert_eq!(
            state.pending(),
            Some(&Expectation::Display(DisplayMode::Logo))
        );
        assert_eq!(state.observe_display(DisplayMode::Logo), Observation::Echo);
        assert_eq!(state.expected(Side::Display), None);
    }

    #[test]
    fn test_newest_echo_drops_overtaken_commands() {
        let mut state = SyncState::new();
        state.expect(Expectation::Display(DisplayMode::Rankings));
        state.expect(Expectation::Display(DisplayMode::Logo));

        assert_eq!(state.observe_display(DisplayMode::Logo), Observation::Echo);

        // The overtaken switch can no longer be told apart from an operator.
        assert_eq!(state.observe_display(DisplayMode::Rankings), Observation::External);
    }

    #[test]
    fn test_expected_is_latest_for_side() {
        let mut state = SyncState::new();
        state.expect(Expectation::Scene(SceneId::from("Logo")));
        state.expect(Expectation::Scene(SceneId::from("Rankings")));
        state.expect(Expectation::Display(DisplayMode::Schedule));

        assert_eq!(
            state.expected(Side::Scenes),
            Some(&Expectation::Scene(SceneId::from("Rankings")))
        );
        assert_eq!(
            state.expected(Side::Display),
            Some(&Expectation::Display(DisplayMode::Schedule))
        );
    }

    #[test]
    fn test_external_change_clears_only_its_side() {
        let mut state = SyncState::new();
        state.expect(Expectation::Scene(SceneId::from("Logo")));
        state.expect(Expectation::Display(DisplayMode::Schedule));

        assert_eq!(
            state.observe_scene(&SceneId::from("Pit Cam")),
            Observation::External
        );

        assert_eq!(state.expected(Side::Scenes), None);
        assert_eq!(
            state.expected(Side::Display),
            Some(&Expectation::Display(DisplayMode::Schedule))
        );
    }

    #[test]
    fn test_withdraw_reaches_overtaken_command() {
        let mut state = SyncState::new();
        state.expect(Expectation::Display(DisplayMode::Rankings));
        state.expect(Expectation::Display(DisplayMode::Logo));

        assert!(state.withdraw(&Expectation::Display(DisplayMode::Rankings)));

        assert_eq!(
            state.pending(),
            Some(&Expectation::Display(DisplayMode::Logo))
        );
        assert_eq!(state.observe_display(DisplayMode::Rankings), Observation::External);
    }

    #[test]
    fn test_clear_pending_forgets_overtaken_commands() {
        let mut state = SyncState::new();
        state.expect(Expectation::Display(DisplayMode::Rankings));
        state.expect(Expectation::Display(DisplayMode::Logo));

        state.clear_pending();

        assert_eq!(state.expected(Side::Display), None);
        assert_eq!(state.observe_display(DisplayMode::Rankings), Observation::External);
    }

    #[test]
    fn test_overtaken_commands_are_capped() {
        let mut state = SyncState::new();
        let modes = [
            DisplayMode::Intro,
            DisplayMode::InMatch,
            DisplayMode::Results,
            DisplayMode::Schedule,
            DisplayMode::Rankings,
            DisplayMode::ScRankings,
            DisplayMode::AllianceSelection,
            DisplayMode::Bracket,
            DisplayMode::Award,
            DisplayMode::Logo,
        ];
        for mode in modes {
            state.expect(Expectation::Display(mode));
        }

        // Ten tokens: the newest is pending, eight are kept, the oldest is gone.
        let mut oldest_kept = state.clone();
        assert_eq!(oldest_kept.observe_display(DisplayMode::InMatch), Observation::Echo);
        assert_eq!(state.observe_display(DisplayMode::Intro), Observation::External);
    }

    #[test]
    fn test_match_state_change_updates_field() {
        let mut state = SyncState::new();
        state.apply_match_state_change(MatchState::Running, 2);
        assert_eq!(state.match_state(), MatchState::Running);
        assert_eq!(state.field(), Some(2));
    }

    #[test]
    fn test_expectation_side() {
        assert_eq!(Expectation::Scene(SceneId::from("a")).side(), Side::Scenes);
        assert_eq!(Expectation::Display(DisplayMode::Logo).side(), Side::Display);
        assert_eq!(Side::Scenes.opposite(), Side::Display);
    }
}
