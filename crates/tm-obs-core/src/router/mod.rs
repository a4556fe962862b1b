//! Event router: the translation and decision core of the bridge.
//!
//! The router receives one inbound event at a time from either side, resolves
//! it through the [`MappingTable`], updates the [`SyncState`] and decides
//! whether the other side must be told to change.  It performs no I/O: the
//! decision comes back as a [`RouteOutcome`] and the caller carries out any
//! [`Command`].
//!
//! # Decision pipeline (one event)
//!
//! ```text
//! event ──► echo of our own command? ──yes──► consume token, record, stop
//!                 │ no
//!                 ▼
//!           resolve through table ──miss──► mark side off-map, ignore
//!                 │
//!                 ▼
//!           record in SyncState
//!                 │
//!                 ▼
//!           direction enabled? ──no──► tracked only
//!                 │
//!                 ▼
//!           other side already there? ──yes──► unchanged
//!                 │ no
//!                 ▼
//!           arm echo token, return Dispatch(command)
//! ```
//!
//! Because every method takes `&mut self`, two events can never interleave
//! their decisions; the engine owns the router inside a single actor task.

use tracing::{debug, info, warn};

use crate::domain::display::{DisplayMode, FieldIndex, MatchState, SceneId};
use crate::domain::mapping::{MappingTable, ResolveError};
use crate::domain::state::{Expectation, Observation, Side, SyncState};

/// Which mirroring directions are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDirections {
    /// Scene switcher changes drive the display.
    pub obs_to_tm: bool,
    /// Display changes drive the scene switcher.
    pub tm_to_obs: bool,
}

impl SyncDirections {
    /// Both directions enabled.
    pub const BOTH: SyncDirections = SyncDirections {
        obs_to_tm: true,
        tm_to_obs: true,
    };

    /// Returns `true` when changes observed on `source` are mirrored.
    pub fn mirrors_from(self, source: Side) -> bool {
        match source {
            Side::Scenes => self.obs_to_tm,
            Side::Display => self.tm_to_obs,
        }
    }
}

impl Default for SyncDirections {
    fn default() -> Self {
        Self::BOTH
    }
}

/// An event reported by the display side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// The audience display switched mode.  `field` is present when the
    /// display reported which field it is showing.
    DisplayChanged {
        mode: DisplayMode,
        field: Option<FieldIndex>,
    },
    /// A match started or stopped, or a new field became active.
    MatchStateChanged { state: MatchState, field: FieldIndex },
}

/// Full state of the display side as queried after (re)connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySnapshot {
    pub mode: DisplayMode,
    pub field: Option<FieldIndex>,
    pub match_state: MatchState,
}

/// Freshly queried state of one or both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub scene: Option<SceneId>,
    pub display: Option<DisplaySnapshot>,
}

/// A change the router wants applied to one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch the scene switcher's program scene.
    SetScene(SceneId),
    /// Switch the audience display.
    SetDisplay {
        mode: DisplayMode,
        field: Option<FieldIndex>,
    },
}

impl Command {
    /// The side the command is addressed to.
    pub fn target(&self) -> Side {
        match self {
            Command::SetScene(_) => Side::Scenes,
            Command::SetDisplay { .. } => Side::Display,
        }
    }

    /// The observation this command should produce on its target.
    pub fn expectation(&self) -> Expectation {
        match self {
            Command::SetScene(scene) => Expectation::Scene(scene.clone()),
            Command::SetDisplay { mode, .. } => Expectation::Display(*mode),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::SetScene(scene) => write!(f, "set scene '{scene}'"),
            Command::SetDisplay { mode, field: Some(field) } => {
                write!(f, "set display {mode} (field {field})")
            }
            Command::SetDisplay { mode, field: None } => write!(f, "set display {mode}"),
        }
    }
}

/// What the router decided for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Send this command to the other side.
    Dispatch(Command),
    /// The event was the reflection of our own command.
    EchoConsumed,
    /// The other side already shows the matching value.
    Unchanged,
    /// State was recorded but the direction is disabled.
    TrackedOnly,
    /// The event could not be resolved and was dropped.
    Ignored(ResolveError),
}

impl RouteOutcome {
    /// The command to dispatch, if any.
    pub fn command(&self) -> Option<&Command> {
        match self {
            RouteOutcome::Dispatch(command) => Some(command),
            _ => None,
        }
    }
}

/// Translates events between the two sides and suppresses echo loops.
#[derive(Debug, Clone)]
pub struct EventRouter {
    table: MappingTable,
    directions: SyncDirections,
    state: SyncState,
}

impl EventRouter {
    /// Creates a router with a fresh, all-unknown [`SyncState`].
    pub fn new(table: MappingTable, directions: SyncDirections) -> Self {
        Self {
            table,
            directions,
            state: SyncState::new(),
        }
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    pub fn directions(&self) -> SyncDirections {
        self.directions
    }

    /// Read-only view of the believed state.
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Handles a program scene change reported by the scene switcher.
    pub fn on_scene_changed(&mut self, scene: SceneId) -> RouteOutcome {
        debug!("scene switcher reported scene '{scene}'");

        if self.state.observe_scene(&scene) == Observation::Echo {
            debug!("scene '{scene}' is the echo of our own command");
            self.state.apply_scene_change(scene, Side::Display);
            return RouteOutcome::EchoConsumed;
        }

        let resolved = match self
            .table
            .resolve_scene_to_display(&scene, self.state.match_state())
        {
            Ok(resolved) => resolved,
            Err(e) => {
                self.state.mark_off_map(Side::Scenes);
                warn!("ignoring scene change: {e}");
                return RouteOutcome::Ignored(e);
            }
        };

        self.state.apply_scene_change(scene.clone(), Side::Scenes);

        if !self.directions.obs_to_tm {
            return RouteOutcome::TrackedOnly;
        }
        if self.display_settles_on(resolved.mode) {
            return RouteOutcome::Unchanged;
        }

        info!("syncing scene '{scene}' -> display {}", resolved.mode);
        self.arm(Command::SetDisplay {
            mode: resolved.mode,
            field: resolved.field,
        })
    }

    /// Handles an audience display change reported by the display.
    pub fn on_display_changed(
        &mut self,
        mode: DisplayMode,
        field: Option<FieldIndex>,
    ) -> RouteOutcome {
        debug!("display reported {mode} (field {field:?})");

        // Last field reported on the display stream wins.
        if let Some(field) = field {
            self.state.apply_field(field);
        }

        if self.state.observe_display(mode) == Observation::Echo {
            debug!("display {mode} is the echo of our own command");
            self.state.apply_display_change(mode, Side::Scenes);
            return RouteOutcome::EchoConsumed;
        }

        let scene = match self.table.resolve_display_to_scene(mode, self.state.field()) {
            Ok(scene) => scene.clone(),
            Err(e) => {
                self.state.mark_off_map(Side::Display);
                warn!("ignoring display change: {e}");
                return RouteOutcome::Ignored(e);
            }
        };

        self.state.apply_display_change(mode, Side::Display);

        if !self.directions.tm_to_obs {
            return RouteOutcome::TrackedOnly;
        }
        self.switch_scene_to(scene)
    }

    /// Handles a match start/stop or field activation reported by the display.
    ///
    /// When the active scene is the field scene for `field`, the display mode
    /// is recomputed (INTRO ↔ IN_MATCH).  When instead the display shows a
    /// field mode, the scene switcher follows the newly active field.
    pub fn on_match_state_changed(
        &mut self,
        match_state: MatchState,
        field: FieldIndex,
    ) -> RouteOutcome {
        debug!("match on field {field} is now {match_state}");
        self.state.apply_match_state_change(match_state, field);

        let active_field = if self.state.is_off_map(Side::Scenes) {
            None
        } else {
            self.state.scene().and_then(|scene| self.table.field_of(scene))
        };

        if active_field == Some(field) {
            if !self.directions.obs_to_tm {
                return RouteOutcome::TrackedOnly;
            }
            let mode = match_state.field_display();
            if self.display_settles_on(mode) {
                return RouteOutcome::Unchanged;
            }
            info!("match {match_state} on active field {field} -> display {mode}");
            return self.arm(Command::SetDisplay {
                mode,
                field: Some(field),
            });
        }

        let showing_field = match self.state.display() {
            Some(display) if display.is_field_mode() && !self.state.is_off_map(Side::Display) => {
                display
            }
            _ => return RouteOutcome::Unchanged,
        };
        if !self.directions.tm_to_obs {
            return RouteOutcome::TrackedOnly;
        }
        match self.table.resolve_display_to_scene(showing_field, Some(field)) {
            Ok(scene) => {
                let scene = scene.clone();
                self.switch_scene_to(scene)
            }
            Err(e) => {
                warn!("cannot follow field change: {e}");
                RouteOutcome::Ignored(e)
            }
        }
    }

    /// Routes any [`DisplayEvent`].
    pub fn on_display_event(&mut self, event: DisplayEvent) -> RouteOutcome {
        match event {
            DisplayEvent::DisplayChanged { mode, field } => self.on_display_changed(mode, field),
            DisplayEvent::MatchStateChanged { state, field } => {
                self.on_match_state_changed(state, field)
            }
        }
    }

    /// Records freshly queried facts without deciding anything.
    ///
    /// Any pending echo token is left alone; see [`EventRouter::reconcile`].
    pub fn absorb(&mut self, snapshot: &Snapshot) {
        if let Some(scene) = &snapshot.scene {
            if self.table.contains_scene(scene) {
                self.state.apply_scene_change(scene.clone(), Side::Scenes);
            } else {
                debug!("scene switcher is on unmapped scene '{scene}'");
                self.state.mark_off_map(Side::Scenes);
            }
        }

        if let Some(shown) = &snapshot.display {
            match shown.field {
                Some(field) => self.state.apply_match_state_change(shown.match_state, field),
                None => self.state.apply_match_state(shown.match_state),
            }
            let mode = shown.mode;
            let covered = self
                .table
                .resolve_display_to_scene(mode, self.state.field())
                .is_ok();
            if covered {
                self.state.apply_display_change(mode, Side::Display);
            } else {
                debug!("display is on unmapped mode {mode}");
                self.state.mark_off_map(Side::Display);
            }
        }
    }

    /// Brings both sides back in line after a (re)connection.
    ///
    /// Absorbs `snapshot`, then pushes the believed value of `authority` onto
    /// the other side if the two disagree.  At most one command results and
    /// it is armed for echo suppression like any other dispatch.
    pub fn reconcile(&mut self, snapshot: Snapshot, authority: Side) -> RouteOutcome {
        match self.state.last_origin() {
            Some(origin) => {
                debug!("reconciling from the {authority}; last change came from the {origin}")
            }
            None => debug!("reconciling from the {authority}; no change seen yet"),
        }
        self.state.clear_pending();
        self.absorb(&snapshot);

        if !self.directions.mirrors_from(authority) {
            return RouteOutcome::TrackedOnly;
        }
        if self.state.is_off_map(authority) {
            return RouteOutcome::Unchanged;
        }

        match authority {
            Side::Scenes => {
                let scene = match self.state.scene() {
                    Some(scene) => scene.clone(),
                    None => return RouteOutcome::Unchanged,
                };
                let resolved = match self
                    .table
                    .resolve_scene_to_display(&scene, self.state.match_state())
                {
                    Ok(resolved) => resolved,
                    Err(e) => return RouteOutcome::Ignored(e),
                };
                if self.display_settles_on(resolved.mode) {
                    return RouteOutcome::Unchanged;
                }
                info!("resync: scene '{scene}' -> display {}", resolved.mode);
                self.arm(Command::SetDisplay {
                    mode: resolved.mode,
                    field: resolved.field,
                })
            }
            Side::Display => {
                let mode = match self.state.display() {
                    Some(mode) => mode,
                    None => return RouteOutcome::Unchanged,
                };
                match self.table.resolve_display_to_scene(mode, self.state.field()) {
                    Ok(scene) => {
                        let scene = scene.clone();
                        info!("resync: display {mode} -> scene '{scene}'");
                        self.switch_scene_to(scene)
                    }
                    Err(e) => RouteOutcome::Ignored(e),
                }
            }
        }
    }

    /// Tells the router that `command` was not applied.
    ///
    /// The matching echo token is withdrawn so the next observation from that
    /// side is treated as genuine.  SyncState keeps its last observed values.
    pub fn dispatch_failed(&mut self, command: &Command) {
        if self.state.withdraw(&command.expectation()) {
            debug!("withdrew echo expectation after failed {command}");
        }
    }

    fn switch_scene_to(&mut self, scene: SceneId) -> RouteOutcome {
        if self.scene_settles_on(&scene) {
            return RouteOutcome::Unchanged;
        }
        info!("syncing display -> scene '{scene}'");
        self.arm(Command::SetScene(scene))
    }

    /// `true` when the display shows `mode`, or is already being switched to
    /// it.  A command still in flight outranks the last reported mode.
    fn display_settles_on(&self, mode: DisplayMode) -> bool {
        match self.state.expected(Side::Display) {
            Some(Expectation::Display(expected)) => *expected == mode,
            _ => !self.state.is_off_map(Side::Display) && self.state.display() == Some(mode),
        }
    }

    fn scene_settles_on(&self, scene: &SceneId) -> bool {
        match self.state.expected(Side::Scenes) {
            Some(Expectation::Scene(expected)) => expected == scene,
            _ => !self.state.is_off_map(Side::Scenes) && self.state.scene() == Some(scene),
        }
    }

    fn arm(&mut self, command: Command) -> RouteOutcome {
        self.state.expect(command.expectation());
        RouteOutcome::Dispatch(command)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
