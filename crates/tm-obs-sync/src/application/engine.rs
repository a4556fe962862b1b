//! Sync engine: runs the router against two live connections.
//!
//! # Task layout
//!
//! ```text
//!  SceneClient ──► scene supervisor ──┐                 ┌──► scene dispatcher ──► SceneClient
//!                                     ├──► inbox ──► actor (owns EventRouter)
//!  DisplayClient ► display supervisor ┘        ▲        └──► display dispatcher ► DisplayClient
//!                                              └───── dispatch failures ─────────┘
//! ```
//!
//! - A **supervisor** per side connects with capped exponential backoff,
//!   queries the fresh state, reports `Connected`, forwards events in order
//!   and reports `Disconnected` when the stream ends.
//! - The **actor** is the only task that touches the [`EventRouter`], so two
//!   events are never decided concurrently.  It never awaits a network call.
//! - A **dispatcher** per side performs the outbound commands with a timeout
//!   and reports failures back to the actor.
//!
//! Shutdown is broadcast on a `watch` channel.  Dispatchers are allowed to
//! drain queued commands for a grace period before being aborted.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tm_obs_core::{
    Command, DisplayEvent, EventRouter, MappingTable, RouteOutcome, SceneId, Side, Snapshot,
    SyncDirections, SyncState,
};

use super::backoff::{Backoff, BackoffPolicy};
use super::clients::{ClientError, DisplayClient, SceneClient, SceneEvent};
use crate::domain::EngineSection;

const INBOX_CAPACITY: usize = 256;
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Timing and failure policy of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Reconnect schedule shared by both supervisors.
    pub reconnect: BackoffPolicy,
    /// Upper bound for a single outbound command.
    pub command_timeout: Duration,
    /// How long `stop()` waits for queued commands.
    pub shutdown_grace: Duration,
    /// Fail the whole engine when one side cannot be reconnected.
    pub exit_on_reconnect_exhaustion: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reconnect: BackoffPolicy::default(),
            command_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(2),
            exit_on_reconnect_exhaustion: false,
        }
    }
}

impl EngineSettings {
    /// Converts the `[engine]` settings section; `max_reconnect_attempts = 0`
    /// means retry forever.
    pub fn from_section(section: &EngineSection) -> Self {
        Self {
            reconnect: BackoffPolicy {
                initial: Duration::from_millis(section.reconnect_initial_ms),
                max: Duration::from_millis(section.reconnect_max_ms),
                max_attempts: (section.max_reconnect_attempts > 0)
                    .then_some(section.max_reconnect_attempts),
            },
            command_timeout: Duration::from_millis(section.command_timeout_ms),
            shutdown_grace: Duration::from_millis(section.shutdown_grace_ms),
            exit_on_reconnect_exhaustion: section.exit_on_reconnect_exhaustion,
        }
    }
}

/// Lifecycle of a [`SyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Idle,
    Running,
    Stopped,
    /// The engine gave up; the string says why.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// `start()` was called after `stop()`.
    #[error("the sync engine has been stopped")]
    Stopped,

    #[error("reconnect attempts to the {side} exhausted")]
    ReconnectExhausted { side: Side },
}

/// Everything the actor reacts to.
#[derive(Debug)]
enum EngineMessage {
    Connected { side: Side, snapshot: Snapshot },
    Disconnected(Side),
    Scene(SceneId),
    Display(DisplayEvent),
    DispatchFailed { command: Command, error: ClientError },
    GaveUp(Side),
    Inspect(oneshot::Sender<SyncState>),
}

enum RunState {
    Idle(EventRouter),
    Running(Running),
    Stopped(Option<SyncState>),
}

struct Running {
    shutdown: watch::Sender<bool>,
    inbox: mpsc::Sender<EngineMessage>,
    supervisors: Vec<JoinHandle<()>>,
    actor: JoinHandle<EventRouter>,
    dispatchers: Vec<JoinHandle<()>>,
}

/// Keeps a scene switcher and a tournament display mirrored.
pub struct SyncEngine {
    settings: EngineSettings,
    scenes: Arc<dyn SceneClient>,
    display: Arc<dyn DisplayClient>,
    status: Arc<watch::Sender<EngineStatus>>,
    run: Mutex<RunState>,
}

impl SyncEngine {
    pub fn new(
        table: MappingTable,
        directions: SyncDirections,
        settings: EngineSettings,
        scenes: Arc<dyn SceneClient>,
        display: Arc<dyn DisplayClient>,
    ) -> Self {
        let (status, _) = watch::channel(EngineStatus::Idle);
        Self {
            settings,
            scenes,
            display,
            status: Arc::new(status),
            run: Mutex::new(RunState::Idle(EventRouter::new(table, directions))),
        }
    }

    /// Spawns the supervisors, the actor and the dispatchers.
    ///
    /// Calling `start()` on a running engine does nothing.
    ///
    /// # Errors
    ///
    /// [`EngineError::Stopped`] once the engine has been stopped.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut run = self.run.lock().await;
        let router = match std::mem::replace(&mut *run, RunState::Stopped(None)) {
            RunState::Idle(router) => router,
            RunState::Running(running) => {
                *run = RunState::Running(running);
                return Ok(());
            }
            RunState::Stopped(state) => {
                *run = RunState::Stopped(state);
                return Err(EngineError::Stopped);
            }
        };

        let directions = router.directions();
        info!(
            "starting sync engine: {} field scene(s), {} direct mapping(s), OBS->TM {}, TM->OBS {}",
            router.table().field_count(),
            router.table().direct_count(),
            on_off(directions.obs_to_tm),
            on_off(directions.tm_to_obs),
        );
        if !directions.obs_to_tm && !directions.tm_to_obs {
            warn!("both sync directions are disabled; changes will only be observed");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (scene_tx, scene_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (display_tx, display_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

        let targets = Targets {
            scenes: Arc::clone(&self.scenes),
            display: Arc::clone(&self.display),
        };
        let timeout = self.settings.command_timeout;
        let dispatchers = vec![
            tokio::spawn(run_dispatcher(targets.clone(), scene_rx, inbox_tx.clone(), timeout)),
            tokio::spawn(run_dispatcher(targets, display_rx, inbox_tx.clone(), timeout)),
        ];

        let actor = Actor {
            router,
            scenes_up: false,
            display_up: false,
            synced_once: false,
            scene_queue: scene_tx,
            display_queue: display_tx,
            status: Arc::clone(&self.status),
            exit_on_exhaustion: self.settings.exit_on_reconnect_exhaustion,
        };
        let actor = tokio::spawn(actor.run(inbox_rx, shutdown_rx.clone()));

        let supervisors = vec![
            tokio::spawn(supervise_scenes(
                Arc::clone(&self.scenes),
                inbox_tx.clone(),
                shutdown_rx.clone(),
                self.settings.reconnect,
            )),
            tokio::spawn(supervise_display(
                Arc::clone(&self.display),
                inbox_tx.clone(),
                shutdown_rx,
                self.settings.reconnect,
            )),
        ];

        self.status.send_replace(EngineStatus::Running);
        *run = RunState::Running(Running {
            shutdown: shutdown_tx,
            inbox: inbox_tx,
            supervisors,
            actor,
            dispatchers,
        });
        Ok(())
    }

    /// Stops every task and closes both clients.  Safe to call repeatedly.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let running = match std::mem::replace(&mut *run, RunState::Stopped(None)) {
            RunState::Running(running) => running,
            RunState::Idle(router) => {
                *run = RunState::Stopped(Some(router.state().clone()));
                self.mark_stopped();
                return;
            }
            RunState::Stopped(state) => {
                *run = RunState::Stopped(state);
                return;
            }
        };

        info!("stopping sync engine");
        running.shutdown.send_replace(true);

        for supervisor in running.supervisors {
            let _ = supervisor.await;
        }
        drop(running.inbox);

        let final_state = match running.actor.await {
            Ok(router) => Some(router.state().clone()),
            Err(e) => {
                error!("engine actor ended abnormally: {e}");
                None
            }
        };

        // The actor is gone, so the command queues are closed: dispatchers
        // finish what is queued and exit.
        let aborts: Vec<_> = running.dispatchers.iter().map(|d| d.abort_handle()).collect();
        let drain = async {
            for dispatcher in running.dispatchers {
                let _ = dispatcher.await;
            }
        };
        if tokio::time::timeout(self.settings.shutdown_grace, drain).await.is_err() {
            warn!(
                "queued commands did not finish within {:?}; abandoning them",
                self.settings.shutdown_grace
            );
            for abort in aborts {
                abort.abort();
            }
        }

        self.scenes.close().await;
        self.display.close().await;

        *run = RunState::Stopped(final_state);
        self.mark_stopped();
        info!("sync engine stopped");
    }

    /// Subscribes to lifecycle changes.
    pub fn status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    /// A copy of the router's current [`SyncState`].
    ///
    /// After `stop()` this is the state at the moment the engine stopped;
    /// `None` when it could not be recovered.
    pub async fn sync_state(&self) -> Option<SyncState> {
        let inbox = {
            let run = self.run.lock().await;
            match &*run {
                RunState::Idle(router) => return Some(router.state().clone()),
                RunState::Stopped(state) => return state.clone(),
                RunState::Running(running) => running.inbox.clone(),
            }
        };
        let (reply, response) = oneshot::channel();
        inbox.send(EngineMessage::Inspect(reply)).await.ok()?;
        response.await.ok()
    }

    fn mark_stopped(&self) {
        self.status.send_if_modified(|status| {
            if matches!(status, EngineStatus::Failed(_) | EngineStatus::Stopped) {
                false
            } else {
                *status = EngineStatus::Stopped;
                true
            }
        });
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

struct Actor {
    router: EventRouter,
    scenes_up: bool,
    display_up: bool,
    synced_once: bool,
    scene_queue: mpsc::Sender<Command>,
    display_queue: mpsc::Sender<Command>,
    status: Arc<watch::Sender<EngineStatus>>,
    exit_on_exhaustion: bool,
}

impl Actor {
    async fn run(
        mut self,
        mut inbox: mpsc::Receiver<EngineMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> EventRouter {
        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                message = inbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            if self.handle(message).is_break() {
                break;
            }
        }
        self.router
    }

    fn handle(&mut self, message: EngineMessage) -> ControlFlow<()> {
        match message {
            EngineMessage::Connected { side, snapshot } => self.on_connected(side, snapshot),
            EngineMessage::Disconnected(side) => {
                self.set_connected(side, false);
                warn!("{side} disconnected; mirroring onto it is suspended");
            }
            EngineMessage::Scene(scene) => {
                let outcome = self.router.on_scene_changed(scene);
                self.execute(outcome);
            }
            EngineMessage::Display(event) => {
                let outcome = self.router.on_display_event(event);
                self.execute(outcome);
            }
            EngineMessage::DispatchFailed { command, error } => {
                warn!("failed to {command}: {error}");
                self.router.dispatch_failed(&command);
            }
            EngineMessage::GaveUp(side) => {
                let reason = EngineError::ReconnectExhausted { side }.to_string();
                if self.exit_on_exhaustion {
                    error!("{reason}; stopping");
                    self.status.send_replace(EngineStatus::Failed(reason));
                    return ControlFlow::Break(());
                }
                error!("{reason}; mirroring onto it stays suspended");
            }
            EngineMessage::Inspect(reply) => {
                let _ = reply.send(self.router.state().clone());
            }
        }
        ControlFlow::Continue(())
    }

    fn on_connected(&mut self, side: Side, snapshot: Snapshot) {
        self.set_connected(side, true);
        if !(self.scenes_up && self.display_up) {
            self.router.absorb(&snapshot);
            return;
        }

        let directions = self.router.directions();
        let authority = if !self.synced_once {
            if directions.obs_to_tm {
                Side::Scenes
            } else {
                Side::Display
            }
        } else if directions.mirrors_from(side.opposite()) {
            side.opposite()
        } else {
            side
        };
        self.synced_once = true;

        info!("both sides connected; reconciling from the {authority}");
        let outcome = self.router.reconcile(snapshot, authority);
        self.execute(outcome);
    }

    fn execute(&mut self, outcome: RouteOutcome) {
        let command = match outcome {
            RouteOutcome::Dispatch(command) => command,
            other => {
                debug!("nothing to dispatch ({other:?})");
                return;
            }
        };

        let target = command.target();
        if !self.is_connected(target) {
            debug!("{target} is disconnected; dropping {command}");
            self.router.dispatch_failed(&command);
            return;
        }

        let queue = match target {
            Side::Scenes => &self.scene_queue,
            Side::Display => &self.display_queue,
        };
        if let Err(e) = queue.try_send(command) {
            let command = match e {
                TrySendError::Full(command) | TrySendError::Closed(command) => command,
            };
            warn!("command queue for the {target} is unavailable; dropping {command}");
            self.router.dispatch_failed(&command);
        }
    }

    fn is_connected(&self, side: Side) -> bool {
        match side {
            Side::Scenes => self.scenes_up,
            Side::Display => self.display_up,
        }
    }

    fn set_connected(&mut self, side: Side, up: bool) {
        match side {
            Side::Scenes => self.scenes_up = up,
            Side::Display => self.display_up = up,
        }
    }
}

// ── Supervisors ───────────────────────────────────────────────────────────────

enum Connect<T> {
    Ready(T),
    Shutdown,
    Exhausted,
}

/// Retries `attempt` on the backoff schedule until it succeeds, the schedule
/// runs out or shutdown is signalled.
async fn connect_with_backoff<T, F, Fut>(
    side: Side,
    backoff: &mut Backoff,
    shutdown: &mut watch::Receiver<bool>,
    mut attempt: F,
) -> Connect<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    loop {
        if *shutdown.borrow() {
            return Connect::Shutdown;
        }
        let result = tokio::select! {
            _ = shutdown.changed() => return Connect::Shutdown,
            result = attempt() => result,
        };
        match result {
            Ok(value) => {
                backoff.reset();
                return Connect::Ready(value);
            }
            Err(e) => match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        "connecting to the {side} failed: {e}; retry {} in {delay:?}",
                        backoff.attempts()
                    );
                    tokio::select! {
                        _ = shutdown.changed() => return Connect::Shutdown,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    error!(
                        "connecting to the {side} failed: {e}; giving up after {} retries",
                        backoff.attempts()
                    );
                    return Connect::Exhausted;
                }
            },
        }
    }
}

async fn supervise_scenes(
    client: Arc<dyn SceneClient>,
    inbox: mpsc::Sender<EngineMessage>,
    mut shutdown: watch::Receiver<bool>,
    policy: BackoffPolicy,
) {
    let mut backoff = Backoff::new(policy);
    let client = &client;
    loop {
        let connected = connect_with_backoff(Side::Scenes, &mut backoff, &mut shutdown, || async move {
            let events = client.subscribe().await?;
            let scene = client.current_scene().await?;
            Ok::<_, ClientError>((events, scene))
        })
        .await;
        let (mut events, scene) = match connected {
            Connect::Ready(connected) => connected,
            Connect::Shutdown => return,
            Connect::Exhausted => {
                let _ = inbox.send(EngineMessage::GaveUp(Side::Scenes)).await;
                return;
            }
        };

        info!("scene switcher connected; program scene is '{scene}'");
        let snapshot = Snapshot {
            scene: Some(scene),
            display: None,
        };
        let message = EngineMessage::Connected {
            side: Side::Scenes,
            snapshot,
        };
        if inbox.send(message).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                event = events.recv() => match event {
                    Some(SceneEvent::SceneChanged(scene)) => {
                        if inbox.send(EngineMessage::Scene(scene)).await.is_err() {
                            return;
                        }
                    }
                    None => break,
                },
            }
        }

        warn!("scene switcher connection lost");
        if inbox.send(EngineMessage::Disconnected(Side::Scenes)).await.is_err() {
            return;
        }
    }
}

async fn supervise_display(
    client: Arc<dyn DisplayClient>,
    inbox: mpsc::Sender<EngineMessage>,
    mut shutdown: watch::Receiver<bool>,
    policy: BackoffPolicy,
) {
    let mut backoff = Backoff::new(policy);
    let client = &client;
    loop {
        let connected = connect_with_backoff(Side::Display, &mut backoff, &mut shutdown, || async move {
            let events = client.subscribe().await?;
            let state = client.current_state().await?;
            Ok::<_, ClientError>((events, state))
        })
        .await;
        let (mut events, state) = match connected {
            Connect::Ready(connected) => connected,
            Connect::Shutdown => return,
            Connect::Exhausted => {
                let _ = inbox.send(EngineMessage::GaveUp(Side::Display)).await;
                return;
            }
        };

        info!(
            "tournament display connected; showing {} (field {:?}, match {})",
            state.mode, state.field, state.match_state
        );
        let snapshot = Snapshot {
            scene: None,
            display: Some(state),
        };
        let message = EngineMessage::Connected {
            side: Side::Display,
            snapshot,
        };
        if inbox.send(message).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                event = events.recv() => match event {
                    Some(event) => {
                        if inbox.send(EngineMessage::Display(event)).await.is_err() {
                            return;
                        }
                    }
                    None => break,
                },
            }
        }

        warn!("tournament display connection lost");
        if inbox.send(EngineMessage::Disconnected(Side::Display)).await.is_err() {
            return;
        }
    }
}

// ── Dispatchers ───────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Targets {
    scenes: Arc<dyn SceneClient>,
    display: Arc<dyn DisplayClient>,
}

async fn run_dispatcher(
    targets: Targets,
    mut queue: mpsc::Receiver<Command>,
    inbox: mpsc::Sender<EngineMessage>,
    timeout: Duration,
) {
    while let Some(command) = queue.recv().await {
        let attempt = async {
            match &command {
                Command::SetScene(scene) => targets.scenes.set_scene(scene).await,
                Command::SetDisplay { mode, field } => {
                    targets.display.set_display(*mode, *field).await
                }
            }
        };
        let result = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        };
        match result {
            Ok(()) => debug!("applied: {command}"),
            Err(error) => {
                let _ = inbox.send(EngineMessage::DispatchFailed { command, error }).await;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
