//! JSON message types for the two WebSocket protocols the bridge speaks.
//!
//! # obs-websocket v5
//!
//! Every frame is `{"op": <opcode>, "d": {...}}`.  The bridge uses:
//!
//! ```text
//! OBS → bridge   op 0 Hello            {rpcVersion, authentication?{challenge, salt}}
//! bridge → OBS   op 1 Identify         {rpcVersion, authentication?, eventSubscriptions}
//! OBS → bridge   op 2 Identified       {negotiatedRpcVersion}
//! OBS → bridge   op 5 Event            {eventType, eventData}
//! bridge → OBS   op 6 Request          {requestType, requestId, requestData?}
//! OBS → bridge   op 7 RequestResponse  {requestType, requestId, requestStatus, responseData?}
//! ```
//!
//! # Tournament Manager fieldset socket
//!
//! Inbound objects carry a `"type"` discriminant, outbound commands a `"cmd"`
//! discriminant plus a numeric `"id"` that the matching `response` echoes.
//!
//! ```json
//! {"type":"audienceDisplayChanged","display":"RANKINGS"}
//! {"type":"matchStarted","fieldId":1}
//! {"id":7,"cmd":"setScreen","display":"IN_MATCH","fieldId":1}
//! {"type":"response","id":7,"ok":true}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tm_obs_core::{DisplayEvent, DisplayMode, DisplaySnapshot, FieldIndex, MatchState};

// ── obs-websocket ─────────────────────────────────────────────────────────────

/// obs-websocket opcodes used by the bridge.
pub mod obs_op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

/// RPC version the bridge negotiates.
pub const OBS_RPC_VERSION: u32 = 1;

/// `eventSubscriptions` bit for scene events.
pub const OBS_EVENT_SUBSCRIPTION_SCENES: u32 = 1 << 2;

pub const OBS_EVENT_PROGRAM_SCENE_CHANGED: &str = "CurrentProgramSceneChanged";
pub const OBS_REQUEST_SET_PROGRAM_SCENE: &str = "SetCurrentProgramScene";
pub const OBS_REQUEST_GET_PROGRAM_SCENE: &str = "GetCurrentProgramScene";

/// Outer envelope of every obs-websocket frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsFrame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

impl ObsFrame {
    /// Wraps a payload in an envelope.
    pub fn new(op: u8, payload: &impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            op,
            d: serde_json::to_value(payload)?,
        })
    }

    /// Decodes the payload as `T`.
    pub fn payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.d)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsHello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    /// Present when the server requires a password.
    #[serde(default)]
    pub authentication: Option<ObsAuthChallenge>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObsAuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsIdentify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsRequest {
    pub request_type: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsRequestStatus {
    pub result: bool,
    pub code: u32,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsRequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: ObsRequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsEvent {
    pub event_type: String,
    #[serde(default)]
    pub event_data: Value,
}

impl ObsEvent {
    /// The new program scene, if this is a program scene change.
    pub fn program_scene(&self) -> Option<&str> {
        if self.event_type != OBS_EVENT_PROGRAM_SCENE_CHANGED {
            return None;
        }
        self.event_data.get("sceneName").and_then(Value::as_str)
    }
}

/// Reads the scene name out of a `GetCurrentProgramScene` response.
///
/// Newer servers send `currentProgramSceneName`; older ones only `sceneName`.
pub fn obs_program_scene_name(response_data: &Value) -> Option<&str> {
    response_data
        .get("currentProgramSceneName")
        .or_else(|| response_data.get("sceneName"))
        .and_then(Value::as_str)
}

// ── Tournament Manager fieldset ───────────────────────────────────────────────

/// Messages the fieldset socket pushes to the bridge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TmInbound {
    AudienceDisplayChanged {
        display: DisplayMode,
        #[serde(rename = "fieldId", default)]
        field_id: Option<FieldIndex>,
    },
    MatchStarted {
        #[serde(rename = "fieldId")]
        field_id: FieldIndex,
    },
    MatchResumed {
        #[serde(rename = "fieldId")]
        field_id: FieldIndex,
    },
    MatchPaused {
        #[serde(rename = "fieldId")]
        field_id: FieldIndex,
    },
    MatchStopped {
        #[serde(rename = "fieldId")]
        field_id: FieldIndex,
    },
    FieldMatchAssigned {
        #[serde(rename = "fieldId")]
        field_id: FieldIndex,
    },
    FieldActivated {
        #[serde(rename = "fieldId")]
        field_id: FieldIndex,
    },
    /// Answer to a [`TmRequest`] with the same `id`.
    Response {
        id: u64,
        ok: bool,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        state: Option<TmFieldsetState>,
    },
    #[serde(other)]
    Unknown,
}

impl TmInbound {
    /// The display event this message stands for, if any.
    pub fn to_display_event(&self) -> Option<DisplayEvent> {
        let event = match *self {
            TmInbound::AudienceDisplayChanged { display, field_id } => {
                DisplayEvent::DisplayChanged {
                    mode: display,
                    field: field_id,
                }
            }
            TmInbound::MatchStarted { field_id }
            | TmInbound::MatchResumed { field_id }
            | TmInbound::MatchPaused { field_id } => DisplayEvent::MatchStateChanged {
                state: MatchState::Running,
                field: field_id,
            },
            TmInbound::MatchStopped { field_id }
            | TmInbound::FieldMatchAssigned { field_id }
            | TmInbound::FieldActivated { field_id } => DisplayEvent::MatchStateChanged {
                state: MatchState::Idle,
                field: field_id,
            },
            TmInbound::Response { .. } | TmInbound::Unknown => return None,
        };
        Some(event)
    }
}

/// Current fieldset state as carried by a `getState` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TmFieldsetState {
    pub display: DisplayMode,
    #[serde(rename = "fieldId", default)]
    pub field_id: Option<FieldIndex>,
    /// Raw match state such as `"DISABLED"`, `"AUTONOMOUS"` or `"PAUSED"`.
    #[serde(rename = "matchState", default)]
    pub match_state: String,
}

impl TmFieldsetState {
    pub fn to_snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            mode: self.display,
            field: self.field_id,
            match_state: tm_match_state(&self.match_state),
        }
    }
}

/// Anything other than a disabled or idle field counts as a running match.
pub fn tm_match_state(raw: &str) -> MatchState {
    let raw = raw.trim();
    let idle = raw.is_empty()
        || ["DISABLED", "IDLE", "STOPPED", "NONE"]
            .iter()
            .any(|name| raw.eq_ignore_ascii_case(name));
    if idle {
        MatchState::Idle
    } else {
        MatchState::Running
    }
}

/// Commands the bridge sends to the fieldset socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum TmCommand {
    SetScreen {
        display: DisplayMode,
        #[serde(rename = "fieldId", skip_serializing_if = "Option::is_none")]
        field_id: Option<FieldIndex>,
    },
    GetState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TmRequest {
    pub id: u64,
    #[serde(flatten)]
    pub command: TmCommand,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
