//! Tournament Manager fieldset socket implementation of [`DisplayClient`].
//!
//! One socket per fieldset at `ws://host:port/api/fieldsets/<title>`.  It
//! pushes display and match events and answers `setScreen` / `getState`
//! commands with a `response` carrying the command's id.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tm_obs_core::{DisplayEvent, DisplayMode, DisplaySnapshot, FieldIndex};

use super::rpc::PendingRequests;
use super::socket::{self, SocketWriter, WsSource};
use crate::application::{ClientError, DisplayClient};
use crate::domain::messages::{TmCommand, TmFieldsetState, TmInbound, TmRequest};
use crate::domain::TmSettings;

const EVENT_BUFFER: usize = 64;

/// Where to reach the fieldset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmClientConfig {
    pub url: String,
    /// Bounds the connect and every command.
    pub request_timeout: Duration,
}

impl TmClientConfig {
    pub fn from_settings(settings: &TmSettings, request_timeout: Duration) -> Self {
        Self {
            url: fieldset_url(&settings.host, settings.port, &settings.fieldset_title),
            request_timeout,
        }
    }
}

/// `ws://host:port/api/fieldsets/<percent-encoded title>`.
pub fn fieldset_url(host: &str, port: u16, fieldset_title: &str) -> String {
    format!(
        "ws://{host}:{port}/api/fieldsets/{}",
        encode_path_segment(fieldset_title)
    )
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}

/// Body of a `response` message.
#[derive(Debug)]
struct TmReply {
    ok: bool,
    error: Option<String>,
    state: Option<TmFieldsetState>,
}

/// Talks to one Tournament Manager fieldset.
pub struct TmDisplayClient {
    config: TmClientConfig,
    writer: Arc<SocketWriter>,
    pending: Arc<PendingRequests<TmReply>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TmDisplayClient {
    pub fn new(config: TmClientConfig) -> Self {
        Self {
            config,
            writer: Arc::new(SocketWriter::new()),
            pending: Arc::new(PendingRequests::new()),
            reader: Mutex::new(None),
        }
    }

    async fn request(&self, command: TmCommand) -> Result<TmReply, ClientError> {
        let (id, response) = self.pending.register();
        let request = TmRequest { id, command };
        if let Err(e) = self.writer.send_json(&request).await {
            self.pending.cancel(id);
            return Err(e);
        }
        let reply = self
            .pending
            .wait(id, response, self.config.request_timeout)
            .await?;
        if !reply.ok {
            return Err(ClientError::Rejected(
                reply
                    .error
                    .unwrap_or_else(|| "fieldset refused the command".to_string()),
            ));
        }
        Ok(reply)
    }

    fn reader_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DisplayClient for TmDisplayClient {
    async fn subscribe(&self) -> Result<mpsc::Receiver<DisplayEvent>, ClientError> {
        self.close().await;

        let stream = socket::open(&self.config.url, self.config.request_timeout).await?;
        let (sink, source) = stream.split();
        self.writer.attach(sink).await;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_events(
            source,
            tx,
            Arc::clone(&self.pending),
            Arc::clone(&self.writer),
        ));
        *self.reader_slot() = Some(reader);

        info!("connected to fieldset at {}", self.config.url);
        Ok(rx)
    }

    async fn set_display(
        &self,
        mode: DisplayMode,
        field: Option<FieldIndex>,
    ) -> Result<(), ClientError> {
        self.request(TmCommand::SetScreen {
            display: mode,
            field_id: field,
        })
        .await?;
        Ok(())
    }

    async fn current_state(&self) -> Result<DisplaySnapshot, ClientError> {
        let reply = self.request(TmCommand::GetState).await?;
        reply
            .state
            .map(|state| state.to_snapshot())
            .ok_or_else(|| ClientError::Protocol("getState response without state".into()))
    }

    async fn close(&self) {
        let reader = self.reader_slot().take();
        if let Some(reader) = reader {
            reader.abort();
        }
        self.writer.detach().await;
        self.pending.fail_all();
    }
}

async fn read_events(
    mut source: WsSource,
    events: mpsc::Sender<DisplayEvent>,
    pending: Arc<PendingRequests<TmReply>>,
    writer: Arc<SocketWriter>,
) {
    while let Some(text) = socket::next_text(&mut source).await {
        let message: TmInbound = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("undecodable fieldset message: {e}");
                continue;
            }
        };
        match message {
            TmInbound::Response {
                id,
                ok,
                error,
                state,
            } => {
                if !pending.complete(id, TmReply { ok, error, state }) {
                    debug!("fieldset answered command {id} after its caller gave up");
                }
            }
            TmInbound::Unknown => debug!("ignoring fieldset message: {text}"),
            other => {
                if let Some(event) = other.to_display_event() {
                    debug!("fieldset event: {event:?}");
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    debug!("fieldset event stream ended");
    writer.detach().await;
    pending.fail_all();
}

// ── Tests ─────────────────────────────────────────────────────────────────────
