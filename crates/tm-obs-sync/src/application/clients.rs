//! Collaborator traits for the two synchronized applications.
//!
//! The engine never talks to OBS or Tournament Manager directly; it talks to a
//! [`SceneClient`] and a [`DisplayClient`].  Production implementations speak
//! WebSocket (see `infrastructure::obs` and `infrastructure::tm`); tests use
//! the in-memory clients in `infrastructure::memory` or `mockall` mocks.
//!
//! # Event streams
//!
//! `subscribe()` (re)connects and returns an `mpsc::Receiver`.  The receiver
//! yields events in the order the application emitted them and ends (returns
//! `None`) when the connection is lost.  Calling `subscribe()` again starts a
//! fresh connection with a fresh stream.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use tm_obs_core::{DisplayEvent, DisplayMode, DisplaySnapshot, FieldIndex, SceneId};

/// Errors reported by a collaborator client.
///
/// Values are plain strings rather than wrapped sources so the error can be
/// cloned into engine messages and compared in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The connection could not be established.
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The application refused our credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The application sent something we could not understand.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The application understood the command but refused it.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// No answer arrived in time.
    #[error("request timed out")]
    Timeout,

    /// A command was issued while no connection is open.
    #[error("not connected")]
    NotConnected,

    /// The connection dropped while a request was outstanding.
    #[error("connection lost")]
    ConnectionLost,
}

/// An event reported by the scene switcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    /// The program scene changed.
    SceneChanged(SceneId),
}

/// The video-production scene switcher.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SceneClient: Send + Sync {
    /// Connects (dropping any previous connection) and returns the event stream.
    async fn subscribe(&self) -> Result<mpsc::Receiver<SceneEvent>, ClientError>;

    /// Switches the program scene.
    async fn set_scene(&self, scene: &SceneId) -> Result<(), ClientError>;

    /// Queries the current program scene.
    async fn current_scene(&self) -> Result<SceneId, ClientError>;

    /// Closes the connection, ending the event stream.
    async fn close(&self);
}

/// The tournament audience display.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DisplayClient: Send + Sync {
    /// Connects (dropping any previous connection) and returns the event stream.
    async fn subscribe(&self) -> Result<mpsc::Receiver<DisplayEvent>, ClientError>;

    /// Switches the audience display.
    async fn set_display(
        &self,
        mode: DisplayMode,
        field: Option<FieldIndex>,
    ) -> Result<(), ClientError>;

    /// Queries the current display mode, field and match state.
    async fn current_state(&self) -> Result<DisplaySnapshot, ClientError>;

    /// Closes the connection, ending the event stream.
    async fn close(&self);
}
