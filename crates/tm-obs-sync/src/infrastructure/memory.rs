//! In-memory [`SceneClient`] and [`DisplayClient`] for tests and dry runs.
//!
//! Both clients behave like the real applications as far as the engine can
//! tell: a successful command changes the current value and, like OBS and
//! Tournament Manager do, reports the change back on the event stream.
//! Tests drive the "operator" side with `emit`, cut the connection with
//! `disconnect`, and inspect what the engine sent with `commands`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use tm_obs_core::{DisplayEvent, DisplayMode, DisplaySnapshot, FieldIndex, MatchState, SceneId};

use crate::application::{ClientError, DisplayClient, SceneClient, SceneEvent};

const EVENT_BUFFER: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn refused() -> ClientError {
    ClientError::Connect {
        url: "memory://".to_string(),
        reason: "connection refused".to_string(),
    }
}

// ── Scene switcher ────────────────────────────────────────────────────────────

struct SceneInner {
    current: SceneId,
    events: Option<mpsc::Sender<SceneEvent>>,
    commands: Vec<SceneId>,
    failing_connects: u32,
    reject_commands: bool,
    connects: u32,
}

/// A scene switcher that lives in memory.
pub struct MemorySceneClient {
    inner: Mutex<SceneInner>,
}

impl MemorySceneClient {
    pub fn new(initial: impl Into<SceneId>) -> Self {
        Self {
            inner: Mutex::new(SceneInner {
                current: initial.into(),
                events: None,
                commands: Vec::new(),
                failing_connects: 0,
                reject_commands: false,
                connects: 0,
            }),
        }
    }

    /// The operator switches scenes.  Returns `false` while disconnected.
    pub async fn emit(&self, scene: impl Into<SceneId>) -> bool {
        let scene = scene.into();
        let events = {
            let mut inner = lock(&self.inner);
            inner.current = scene.clone();
            inner.events.clone()
        };
        match events {
            Some(events) => events.send(SceneEvent::SceneChanged(scene)).await.is_ok(),
            None => false,
        }
    }

    /// Drops the connection; the engine sees its event stream end.
    pub fn disconnect(&self) {
        lock(&self.inner).events = None;
    }

    /// Makes the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        lock(&self.inner).failing_connects = n;
    }

    pub fn reject_commands(&self, reject: bool) {
        lock(&self.inner).reject_commands = reject;
    }

    /// Scenes the engine asked for, in order.
    pub fn commands(&self) -> Vec<SceneId> {
        lock(&self.inner).commands.clone()
    }

    pub fn current(&self) -> SceneId {
        lock(&self.inner).current.clone()
    }

    /// Successful connections so far.
    pub fn connect_count(&self) -> u32 {
        lock(&self.inner).connects
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner).events.is_some()
    }
}

#[async_trait]
impl SceneClient for MemorySceneClient {
    async fn subscribe(&self) -> Result<mpsc::Receiver<SceneEvent>, ClientError> {
        let mut inner = lock(&self.inner);
        if inner.failing_connects > 0 {
            inner.failing_connects -= 1;
            return Err(refused());
        }
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        inner.events = Some(tx);
        inner.connects += 1;
        Ok(rx)
    }

    async fn set_scene(&self, scene: &SceneId) -> Result<(), ClientError> {
        let mut inner = lock(&self.inner);
        let events = inner.events.clone().ok_or(ClientError::NotConnected)?;
        inner.commands.push(scene.clone());
        if inner.reject_commands {
            return Err(ClientError::Rejected(format!("no source named '{scene}'")));
        }
        inner.current = scene.clone();
        let _ = events.try_send(SceneEvent::SceneChanged(scene.clone()));
        Ok(())
    }

    async fn current_scene(&self) -> Result<SceneId, ClientError> {
        let inner = lock(&self.inner);
        if inner.events.is_none() {
            return Err(ClientError::NotConnected);
        }
        Ok(inner.current.clone())
    }

    async fn close(&self) {
        self.disconnect();
    }
}

// ── Tournament display ────────────────────────────────────────────────────────

struct DisplayInner {
    current: DisplaySnapshot,
    events: Option<mpsc::Sender<DisplayEvent>>,
    commands: Vec<(DisplayMode, Option<FieldIndex>)>,
    failing_connects: u32,
    reject_commands: bool,
    connects: u32,
}

/// A tournament display that lives in memory.
pub struct MemoryDisplayClient {
    inner: Mutex<DisplayInner>,
}

impl MemoryDisplayClient {
    pub fn new(mode: DisplayMode) -> Self {
        Self::with_state(DisplaySnapshot {
            mode,
            field: None,
            match_state: MatchState::Idle,
        })
    }

    pub fn with_state(current: DisplaySnapshot) -> Self {
        Self {
            inner: Mutex::new(DisplayInner {
                current,
                events: None,
                commands: Vec::new(),
                failing_connects: 0,
                reject_commands: false,
                connects: 0,
            }),
        }
    }

    /// The tournament staff changes something.  Returns `false` while disconnected.
    pub async fn emit(&self, event: DisplayEvent) -> bool {
        let events = {
            let mut inner = lock(&self.inner);
            apply(&mut inner.current, event);
            inner.events.clone()
        };
        match events {
            Some(events) => events.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Changes the state silently, as if it happened while disconnected.
    pub fn set_offline_state(&self, state: DisplaySnapshot) {
        lock(&self.inner).current = state;
    }

    pub fn disconnect(&self) {
        lock(&self.inner).events = None;
    }

    pub fn fail_next_connects(&self, n: u32) {
        lock(&self.inner).failing_connects = n;
    }

    pub fn reject_commands(&self, reject: bool) {
        lock(&self.inner).reject_commands = reject;
    }

    /// Display changes the engine asked for, in order.
    pub fn commands(&self) -> Vec<(DisplayMode, Option<FieldIndex>)> {
        lock(&self.inner).commands.clone()
    }

    pub fn current(&self) -> DisplaySnapshot {
        lock(&self.inner).current
    }

    pub fn connect_count(&self) -> u32 {
        lock(&self.inner).connects
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner).events.is_some()
    }
}

fn apply(current: &mut DisplaySnapshot, event: DisplayEvent) {
    match event {
        DisplayEvent::DisplayChanged { mode, field } => {
            current.mode = mode;
            if field.is_some() {
                current.field = field;
            }
        }
        DisplayEvent::MatchStateChanged { state, field } => {
            current.match_state = state;
            current.field = Some(field);
        }
    }
}

#[async_trait]
impl DisplayClient for MemoryDisplayClient {
    async fn subscribe(&self) -> Result<mpsc::Receiver<DisplayEvent>, ClientError> {
        let mut inner = lock(&self.inner);
        if inner.failing_connects > 0 {
            inner.failing_connects -= 1;
            return Err(refused());
        }
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        inner.events = Some(tx);
        inner.connects += 1;
        Ok(rx)
    }

    async fn set_display(
        &self,
        mode: DisplayMode,
        field: Option<FieldIndex>,
    ) -> Result<(), ClientError> {
        let mut inner = lock(&self.inner);
        let events = inner.events.clone().ok_or(ClientError::NotConnected)?;
        inner.commands.push((mode, field));
        if inner.reject_commands {
            return Err(ClientError::Rejected("display is locked".to_string()));
        }
        let event = DisplayEvent::DisplayChanged { mode, field };
        apply(&mut inner.current, event);
        let _ = events.try_send(event);
        Ok(())
    }

    async fn current_state(&self) -> Result<DisplaySnapshot, ClientError> {
        let inner = lock(&self.inner);
        if inner.events.is_none() {
            return Err(ClientError::NotConnected);
        }
        Ok(inner.current)
    }

    async fn close(&self) {
        self.disconnect();
    }
}
