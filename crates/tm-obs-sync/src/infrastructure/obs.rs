//! obs-websocket v5 implementation of [`SceneClient`].
//!
//! # Connection handshake
//!
//! ```text
//! OBS                               bridge
//!  │── Hello {authentication?} ───────►│
//!  │◄──────── Identify {auth, subs} ───│   auth = base64(sha256(secret + challenge)),
//!  │── Identified ────────────────────►│   secret = base64(sha256(password + salt))
//!  │── Event / RequestResponse ───────►│   (reader task from here on)
//! ```
//!
//! After the handshake the socket is split: a reader task turns
//! `CurrentProgramSceneChanged` events into [`SceneEvent`]s and hands request
//! responses to the waiting callers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tm_obs_core::SceneId;

use super::rpc::PendingRequests;
use super::socket::{self, SocketWriter, WsSource, WsStream};
use crate::application::{ClientError, SceneClient, SceneEvent};
use crate::domain::messages::{
    obs_op, obs_program_scene_name, ObsEvent, ObsFrame, ObsHello, ObsIdentify, ObsRequest,
    ObsRequestResponse, OBS_EVENT_SUBSCRIPTION_SCENES, OBS_REQUEST_GET_PROGRAM_SCENE,
    OBS_REQUEST_SET_PROGRAM_SCENE, OBS_RPC_VERSION,
};
use crate::domain::ObsSettings;

const EVENT_BUFFER: usize = 64;

/// Where and how to reach OBS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsClientConfig {
    pub url: String,
    pub password: Option<String>,
    /// Bounds the connect, the handshake and every request.
    pub request_timeout: Duration,
}

impl ObsClientConfig {
    pub fn from_settings(settings: &ObsSettings, request_timeout: Duration) -> Self {
        Self {
            url: format!("ws://{}:{}", settings.host, settings.port),
            password: settings.password.clone().filter(|p| !p.is_empty()),
            request_timeout,
        }
    }
}

/// Talks to OBS Studio through obs-websocket.
pub struct ObsSceneClient {
    config: ObsClientConfig,
    writer: Arc<SocketWriter>,
    pending: Arc<PendingRequests<ObsRequestResponse>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ObsSceneClient {
    pub fn new(config: ObsClientConfig) -> Self {
        Self {
            config,
            writer: Arc::new(SocketWriter::new()),
            pending: Arc::new(PendingRequests::new()),
            reader: Mutex::new(None),
        }
    }

    /// Sends one request and returns its `responseData`.
    async fn request(
        &self,
        request_type: &str,
        request_data: Option<serde_json::Value>,
    ) -> Result<Option<serde_json::Value>, ClientError> {
        let (id, response) = self.pending.register();
        let request = ObsRequest {
            request_type: request_type.to_string(),
            request_id: id.to_string(),
            request_data,
        };
        let frame = ObsFrame::new(obs_op::REQUEST, &request)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        if let Err(e) = self.writer.send_json(&frame).await {
            self.pending.cancel(id);
            return Err(e);
        }

        let response = self
            .pending
            .wait(id, response, self.config.request_timeout)
            .await?;
        let status = response.request_status;
        if !status.result {
            let reason = status
                .comment
                .unwrap_or_else(|| format!("{request_type} failed with code {}", status.code));
            return Err(ClientError::Rejected(reason));
        }
        Ok(response.response_data)
    }

    fn reader_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SceneClient for ObsSceneClient {
    async fn subscribe(&self) -> Result<mpsc::Receiver<SceneEvent>, ClientError> {
        self.close().await;

        let mut stream = socket::open(&self.config.url, self.config.request_timeout).await?;
        tokio::time::timeout(
            self.config.request_timeout,
            identify(&mut stream, self.config.password.as_deref()),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;

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

        info!("identified with OBS at {}", self.config.url);
        Ok(rx)
    }

    async fn set_scene(&self, scene: &SceneId) -> Result<(), ClientError> {
        self.request(
            OBS_REQUEST_SET_PROGRAM_SCENE,
            Some(json!({ "sceneName": scene.as_str() })),
        )
        .await?;
        Ok(())
    }

    async fn current_scene(&self) -> Result<SceneId, ClientError> {
        let data = self
            .request(OBS_REQUEST_GET_PROGRAM_SCENE, None)
            .await?
            .unwrap_or_default();
        obs_program_scene_name(&data)
            .map(SceneId::from)
            .ok_or_else(|| ClientError::Protocol("program scene response without a scene name".into()))
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

/// Runs the Hello / Identify / Identified exchange on a fresh socket.
async fn identify(stream: &mut WsStream, password: Option<&str>) -> Result<(), ClientError> {
    let text = socket::next_text(stream)
        .await
        .ok_or_else(|| ClientError::Protocol("connection closed before Hello".into()))?;
    let frame: ObsFrame =
        serde_json::from_str(&text).map_err(|e| ClientError::Protocol(e.to_string()))?;
    if frame.op != obs_op::HELLO {
        return Err(ClientError::Protocol(format!(
            "expected Hello, got op {}",
            frame.op
        )));
    }
    let hello: ObsHello = frame
        .payload()
        .map_err(|e| ClientError::Protocol(e.to_string()))?;
    debug!(
        "OBS hello: obs-websocket {}, rpc {}",
        hello.obs_web_socket_version.as_deref().unwrap_or("?"),
        hello.rpc_version
    );

    let authentication = match (&hello.authentication, password) {
        (None, _) => None,
        (Some(challenge), Some(password)) => Some(auth_response(
            password,
            &challenge.salt,
            &challenge.challenge,
        )),
        (Some(_), None) => {
            return Err(ClientError::Auth(
                "OBS requires a password but none is configured".into(),
            ))
        }
    };
    let identify = ObsIdentify {
        rpc_version: OBS_RPC_VERSION,
        authentication,
        event_subscriptions: OBS_EVENT_SUBSCRIPTION_SCENES,
    };
    let frame = ObsFrame::new(obs_op::IDENTIFY, &identify)
        .map_err(|e| ClientError::Protocol(e.to_string()))?;
    socket::send_json_on(stream, &frame).await?;

    loop {
        let text = socket::next_text(stream).await.ok_or_else(|| {
            ClientError::Auth("OBS closed the connection during identification".into())
        })?;
        let frame: ObsFrame =
            serde_json::from_str(&text).map_err(|e| ClientError::Protocol(e.to_string()))?;
        if frame.op == obs_op::IDENTIFIED {
            return Ok(());
        }
        debug!("ignoring OBS op {} during identification", frame.op);
    }
}

/// Reader task: events to `events`, responses to `pending`.
async fn read_events(
    mut source: WsSource,
    events: mpsc::Sender<SceneEvent>,
    pending: Arc<PendingRequests<ObsRequestResponse>>,
    writer: Arc<SocketWriter>,
) {
    while let Some(text) = socket::next_text(&mut source).await {
        let frame: ObsFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("undecodable OBS frame: {e}");
                continue;
            }
        };
        match frame.op {
            obs_op::EVENT => match frame.payload::<ObsEvent>() {
                Ok(event) => {
                    if let Some(scene) = event.program_scene() {
                        debug!("OBS program scene changed to '{scene}'");
                        let event = SceneEvent::SceneChanged(SceneId::from(scene));
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => warn!("undecodable OBS event: {e}"),
            },
            obs_op::REQUEST_RESPONSE => match frame.payload::<ObsRequestResponse>() {
                Ok(response) => match response.request_id.parse::<u64>() {
                    Ok(id) => {
                        if !pending.complete(id, response) {
                            debug!("OBS answered request {id} after its caller gave up");
                        }
                    }
                    Err(_) => debug!("ignoring response to foreign request"),
                },
                Err(e) => warn!("undecodable OBS response: {e}"),
            },
            other => debug!("ignoring OBS op {other}"),
        }
    }

    debug!("OBS event stream ended");
    writer.detach().await;
    pending.fail_all();
}

/// obs-websocket authentication string for `password`.
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = base64_encode(&Sha256::digest(format!("{password}{salt}").as_bytes()));
    base64_encode(&Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

/// Standard (RFC 4648 §4) base64 with `=` padding.
pub fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut result = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied().unwrap_or(0);
        let b2 = chunk.get(2).copied().unwrap_or(0);

        result.push(ALPHABET[(b0 >> 2) as usize] as char);
        result.push(ALPHABET[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
        result.push(if chunk.len() > 1 {
            ALPHABET[(((b1 & 0x0F) << 2) | (b2 >> 6)) as usize] as char
        } else {
            '='
        });
        result.push(if chunk.len() > 2 {
            ALPHABET[(b2 & 0x3F) as usize] as char
        } else {
            '='
        });
    }
    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────
