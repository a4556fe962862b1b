//! Integration tests for the sync engine.
//!
//! The engine runs for real (supervisors, actor, dispatchers) against the
//! in-memory scene switcher and display, which echo every applied command
//! back on their event streams the way OBS and Tournament Manager do.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tm_obs_core::{
    Competition, DisplayEvent, DisplayMode, DisplaySnapshot, FieldIndex, MappingTable, MatchState,
    SceneId, Side, SyncDirections,
};
use tm_obs_sync::application::{
    BackoffPolicy, ClientError, DisplayClient, EngineSettings, EngineStatus, SyncEngine,
};
use tm_obs_sync::infrastructure::{MemoryDisplayClient, MemorySceneClient};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn table() -> MappingTable {
    MappingTable::from_lists(
        Competition::V5RC,
        [SceneId::from("Field 1"), SceneId::from("Field 2")],
        [
            (SceneId::from("Logo"), DisplayMode::Logo),
            (SceneId::from("Rankings"), DisplayMode::Rankings),
            (SceneId::from("Schedule"), DisplayMode::Schedule),
        ],
    )
    .expect("test table must be valid")
}

fn fast_settings() -> EngineSettings {
    EngineSettings {
        reconnect: BackoffPolicy {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(20),
            max_attempts: None,
        },
        command_timeout: Duration::from_millis(500),
        shutdown_grace: Duration::from_millis(200),
        exit_on_reconnect_exhaustion: false,
    }
}

struct Harness {
    engine: SyncEngine,
    scenes: Arc<MemorySceneClient>,
    display: Arc<MemoryDisplayClient>,
}

fn harness(scene: &str, display: DisplaySnapshot, directions: SyncDirections) -> Harness {
    let scenes = Arc::new(MemorySceneClient::new(scene));
    let display = Arc::new(MemoryDisplayClient::with_state(display));
    let engine = SyncEngine::new(
        table(),
        directions,
        fast_settings(),
        Arc::clone(&scenes) as _,
        Arc::clone(&display) as _,
    );
    Harness {
        engine,
        scenes,
        display,
    }
}

fn showing(mode: DisplayMode) -> DisplaySnapshot {
    DisplaySnapshot {
        mode,
        field: None,
        match_state: MatchState::Idle,
    }
}

/// Polls `condition` every few milliseconds for up to two seconds.
async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Waits until the engine has absorbed both sides and has nothing in flight.
async fn wait_synced(engine: &SyncEngine, scene: &str, mode: DisplayMode) {
    let scene = SceneId::from(scene);
    wait_until("both sides to be absorbed", || async {
        engine.sync_state().await.map_or(false, |state| {
            state.scene() == Some(&scene)
                && state.display() == Some(mode)
                && state.pending().is_none()
        })
    })
    .await;
}

/// Gives the engine time to react to anything it has not reacted to yet.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// A display whose connection works but whose screen switches never answer.
struct StalledDisplay {
    inner: MemoryDisplayClient,
    attempted: AtomicBool,
}

#[async_trait]
impl DisplayClient for StalledDisplay {
    async fn subscribe(&self) -> Result<mpsc::Receiver<DisplayEvent>, ClientError> {
        self.inner.subscribe().await
    }

    async fn set_display(
        &self,
        _mode: DisplayMode,
        _field: Option<FieldIndex>,
    ) -> Result<(), ClientError> {
        self.attempted.store(true, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn current_state(&self) -> Result<DisplaySnapshot, ClientError> {
        self.inner.current_state().await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_initial_sync_pushes_scene_onto_display() {
    // Arrange: OBS shows Rankings, the display shows the logo.
    let h = harness("Rankings", showing(DisplayMode::Logo), SyncDirections::BOTH);

    // Act
    tokio_test::assert_ok!(h.engine.start().await);

    // Assert: one command to the display, whose echo is swallowed.
    wait_synced(&h.engine, "Rankings", DisplayMode::Rankings).await;
    settle().await;
    assert_eq!(h.display.commands(), vec![(DisplayMode::Rankings, None)]);
    assert!(h.scenes.commands().is_empty());

    h.engine.stop().await;
}

#[tokio::test]
async fn test_display_change_switches_scene_once() {
    // Arrange
    let h = harness("Logo", showing(DisplayMode::Logo), SyncDirections::BOTH);
    h.engine.start().await.unwrap();
    wait_synced(&h.engine, "Logo", DisplayMode::Logo).await;

    // Act: tournament staff put up the rankings.
    assert!(
        h.display
            .emit(DisplayEvent::DisplayChanged {
                mode: DisplayMode::Rankings,
                field: None,
            })
            .await
    );

    // Assert: OBS switches once and the echo does not bounce back.
    wait_synced(&h.engine, "Rankings", DisplayMode::Rankings).await;
    settle().await;
    assert_eq!(h.scenes.commands(), vec![SceneId::from("Rankings")]);
    assert!(h.display.commands().is_empty());
    assert_eq!(h.scenes.current(), SceneId::from("Rankings"));

    h.engine.stop().await;
}

#[tokio::test]
async fn test_disabled_direction_only_tracks() {
    // Arrange
    let directions = SyncDirections {
        obs_to_tm: false,
        tm_to_obs: true,
    };
    let h = harness("Logo", showing(DisplayMode::Logo), directions);
    h.engine.start().await.unwrap();
    wait_synced(&h.engine, "Logo", DisplayMode::Logo).await;

    // Act
    assert!(h.scenes.emit("Rankings").await);

    // Assert
    let rankings = SceneId::from("Rankings");
    wait_until("the scene change to be tracked", || async {
        h.engine
            .sync_state()
            .await
            .map_or(false, |state| state.scene() == Some(&rankings))
    })
    .await;
    settle().await;
    assert!(h.display.commands().is_empty());

    h.engine.stop().await;
}

#[tokio::test]
async fn test_display_reconnect_reconciles_with_one_command() {
    // Arrange
    let h = harness("Logo", showing(DisplayMode::Logo), SyncDirections::BOTH);
    h.engine.start().await.unwrap();
    wait_synced(&h.engine, "Logo", DisplayMode::Logo).await;

    // Act: the display drops and comes back showing the schedule.
    h.display.set_offline_state(showing(DisplayMode::Schedule));
    h.display.disconnect();
    wait_until("the display to reconnect", || async {
        h.display.connect_count() == 2 && !h.display.commands().is_empty()
    })
    .await;

    // Assert: OBS is the authority again, so the display goes back to the logo.
    wait_synced(&h.engine, "Logo", DisplayMode::Logo).await;
    settle().await;
    assert_eq!(h.display.commands(), vec![(DisplayMode::Logo, None)]);
    assert!(h.scenes.commands().is_empty());

    h.engine.stop().await;
}

#[tokio::test]
async fn test_scene_reconnect_takes_display_as_authority() {
    // Arrange
    let h = harness("Logo", showing(DisplayMode::Logo), SyncDirections::BOTH);
    h.engine.start().await.unwrap();
    wait_synced(&h.engine, "Logo", DisplayMode::Logo).await;

    // Act: OBS drops, and the producer cuts to rankings while it is away.
    h.scenes.disconnect();
    assert!(!h.scenes.emit("Rankings").await);
    wait_until("OBS to reconnect and be corrected", || async {
        h.scenes.connect_count() == 2 && !h.scenes.commands().is_empty()
    })
    .await;

    // Assert: the display mirrors into OBS, so OBS is pulled back to the logo
    // and the display is left alone.
    wait_synced(&h.engine, "Logo", DisplayMode::Logo).await;
    settle().await;
    assert_eq!(h.scenes.commands(), vec![SceneId::from("Logo")]);
    assert!(h.display.commands().is_empty());
    assert_eq!(h.scenes.current(), SceneId::from("Logo"));

    h.engine.stop().await;
}

#[tokio::test]
async fn test_stop_abandons_stalled_command_after_grace() {
    // Arrange: the first command to the display never completes, and the
    // command timeout is far longer than the shutdown grace.
    let scenes = Arc::new(MemorySceneClient::new("Rankings"));
    let display = Arc::new(StalledDisplay {
        inner: MemoryDisplayClient::with_state(showing(DisplayMode::Logo)),
        attempted: AtomicBool::new(false),
    });
    let settings = EngineSettings {
        command_timeout: Duration::from_secs(30),
        shutdown_grace: Duration::from_millis(200),
        ..fast_settings()
    };
    let engine = SyncEngine::new(
        table(),
        SyncDirections::BOTH,
        settings,
        Arc::clone(&scenes) as _,
        Arc::clone(&display) as _,
    );
    engine.start().await.unwrap();
    wait_until("the display command to be sent", || async {
        display.attempted.load(Ordering::SeqCst)
    })
    .await;

    // Act
    let started = tokio::time::Instant::now();
    engine.stop().await;
    let elapsed = started.elapsed();

    // Assert
    assert!(
        elapsed < Duration::from_secs(2),
        "stop took {elapsed:?} with a stalled command"
    );
    assert_eq!(*engine.status().borrow(), EngineStatus::Stopped);
    assert!(!scenes.is_connected());
}

#[tokio::test]
async fn test_rejected_command_keeps_engine_running() {
    // Arrange
    let h = harness("Logo", showing(DisplayMode::Logo), SyncDirections::BOTH);
    h.engine.start().await.unwrap();
    wait_synced(&h.engine, "Logo", DisplayMode::Logo).await;
    h.scenes.reject_commands(true);

    // Act
    h.display
        .emit(DisplayEvent::DisplayChanged {
            mode: DisplayMode::Rankings,
            field: None,
        })
        .await;

    // Assert: the command was attempted, its expectation withdrawn, and the
    // engine carries on.
    wait_until("the scene command to be attempted", || async {
        h.scenes.commands() == vec![SceneId::from("Rankings")]
    })
    .await;
    wait_until("the expectation to be withdrawn", || async {
        h.engine
            .sync_state()
            .await
            .map_or(false, |state| state.pending().is_none())
    })
    .await;
    assert_eq!(*h.engine.status().borrow(), EngineStatus::Running);
    assert_eq!(h.scenes.current(), SceneId::from("Logo"));

    h.engine.stop().await;
}

#[tokio::test]
async fn test_unmapped_scene_is_ignored_until_display_moves() {
    // Arrange
    let h = harness("Logo", showing(DisplayMode::Logo), SyncDirections::BOTH);
    h.engine.start().await.unwrap();
    wait_synced(&h.engine, "Logo", DisplayMode::Logo).await;

    // Act: the producer cuts to a scene the table does not know.
    h.scenes.emit("Backstage Camera").await;
    wait_until("the scene side to be off the map", || async {
        h.engine
            .sync_state()
            .await
            .map_or(false, |state| state.is_off_map(Side::Scenes))
    })
    .await;

    // Assert: nothing is sent to the display.
    settle().await;
    assert!(h.display.commands().is_empty());

    // Act: the display re-announces the logo; OBS is pulled back to it even
    // though the believed scene never changed.
    h.display
        .emit(DisplayEvent::DisplayChanged {
            mode: DisplayMode::Logo,
            field: None,
        })
        .await;
    wait_until("OBS to be pulled back", || async {
        h.scenes.commands() == vec![SceneId::from("Logo")]
    })
    .await;

    h.engine.stop().await;
}

#[tokio::test]
async fn test_match_start_on_active_field_shows_in_match() {
    // Arrange: OBS on field 1's camera, display on that field's intro.
    let h = harness(
        "Field 1",
        DisplaySnapshot {
            mode: DisplayMode::Intro,
            field: Some(0),
            match_state: MatchState::Idle,
        },
        SyncDirections::BOTH,
    );
    h.engine.start().await.unwrap();
    wait_synced(&h.engine, "Field 1", DisplayMode::Intro).await;

    // Act
    h.display
        .emit(DisplayEvent::MatchStateChanged {
            state: MatchState::Running,
            field: 0,
        })
        .await;

    // Assert
    wait_synced(&h.engine, "Field 1", DisplayMode::InMatch).await;
    settle().await;
    assert_eq!(
        h.display.commands(),
        vec![(DisplayMode::InMatch, Some(0))]
    );
    assert!(h.scenes.commands().is_empty());

    h.engine.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent_and_final() {
    // Arrange
    let h = harness("Logo", showing(DisplayMode::Logo), SyncDirections::BOTH);
    h.engine.start().await.unwrap();
    wait_until("both clients to connect", || async {
        h.scenes.is_connected() && h.display.is_connected()
    })
    .await;

    // Act
    h.engine.stop().await;
    h.engine.stop().await;

    // Assert
    assert_eq!(*h.engine.status().borrow(), EngineStatus::Stopped);
    assert!(!h.scenes.is_connected());
    assert!(!h.display.is_connected());
    tokio_test::assert_err!(h.engine.start().await);
    assert!(h.engine.sync_state().await.is_some());
}
