//! Wire format of the recorder's control protocol (version 1).
//!
//! Every frame is `{"op": <u8>, "d": {...}}`. The client waits for `Hello`,
//! answers with `Identify` (carrying an auth string when challenged), waits
//! for `Identified`, then exchanges `Request`/`RequestResponse` pairs matched
//! by `requestId`. `Event` frames can arrive at any time and are ignored.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reelcast_common::error::{ReelError, ReelResult};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub const RPC_VERSION: u32 = 1;

pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

/// Request type names used by the remote backend.
pub mod request {
    pub const SET_VIDEO_SETTINGS: &str = "SetVideoSettings";
    pub const GET_SCENE_LIST: &str = "GetSceneList";
    pub const CREATE_SCENE: &str = "CreateScene";
    pub const SET_CURRENT_PROGRAM_SCENE: &str = "SetCurrentProgramScene";
    pub const GET_SCENE_ITEM_LIST: &str = "GetSceneItemList";
    pub const REMOVE_INPUT: &str = "RemoveInput";
    pub const CREATE_INPUT: &str = "CreateInput";
    pub const START_RECORD: &str = "StartRecord";
    pub const STOP_RECORD: &str = "StopRecord";
    pub const GET_RECORD_STATUS: &str = "GetRecordStatus";
    pub const GET_RECORD_DIRECTORY: &str = "GetRecordDirectory";
}

/// Status code the recorder uses for "no such resource".
pub const RESOURCE_NOT_FOUND: u16 = 600;

#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

/// Authentication challenge sent in `Hello`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// Response data on success, a protocol error carrying code and comment otherwise.
    pub fn into_result(self) -> ReelResult<Value> {
        if self.request_status.result {
            return Ok(self.response_data.unwrap_or(Value::Null));
        }
        Err(ReelError::protocol(format!(
            "{} failed with code {}: {}",
            self.request_type,
            self.request_status.code,
            self.request_status
                .comment
                .as_deref()
                .unwrap_or("no comment")
        )))
    }
}

/// A decoded server frame.
#[derive(Debug, Clone)]
pub enum ServerFrame {
    Hello(Hello),
    Identified { negotiated_rpc_version: u32 },
    Event,
    RequestResponse(RequestResponse),
    Unknown(u8),
}

pub fn parse_frame(text: &str) -> ReelResult<ServerFrame> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| ReelError::protocol(format!("malformed frame: {e}")))?;
    let frame = match envelope.op {
        op::HELLO => ServerFrame::Hello(decode(envelope.d, "Hello")?),
        op::IDENTIFIED => ServerFrame::Identified {
            negotiated_rpc_version: envelope
                .d
                .get("negotiatedRpcVersion")
                .and_then(Value::as_u64)
                .unwrap_or(RPC_VERSION as u64) as u32,
        },
        op::EVENT => ServerFrame::Event,
        op::REQUEST_RESPONSE => ServerFrame::RequestResponse(decode(envelope.d, "RequestResponse")?),
        other => ServerFrame::Unknown(other),
    };
    Ok(frame)
}

fn decode<T: serde::de::DeserializeOwned>(data: Value, what: &str) -> ReelResult<T> {
    serde_json::from_value(data).map_err(|e| ReelError::protocol(format!("malformed {what}: {e}")))
}

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`.
pub fn auth_response(password: &str, challenge: &AuthChallenge) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{}", challenge.salt)));
    BASE64.encode(Sha256::digest(format!("{secret}{}", challenge.challenge)))
}

pub fn identify_frame(authentication: Option<String>) -> Value {
    let mut d = json!({ "rpcVersion": RPC_VERSION });
    if let Some(auth) = authentication {
        d["authentication"] = Value::String(auth);
    }
    json!({ "op": op::IDENTIFY, "d": d })
}

pub fn request_frame(request_type: &str, request_id: &str, data: Option<Value>) -> Value {
    let mut d = json!({ "requestType": request_type, "requestId": request_id });
    if let Some(data) = data {
        d["requestData"] = data;
    }
    json!({ "op": op::REQUEST, "d": d })
}
