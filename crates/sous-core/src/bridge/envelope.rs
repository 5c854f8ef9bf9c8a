//! Wire envelopes exchanged with the native host.
//!
//! Every message on the channel is a JSON string. Outbound messages are
//! always requests; inbound messages are either responses to a blocking
//! request or requests pushed by the native side. Anything without the
//! `intended` marker belongs to somebody else and is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Blocking,
    Unblocking,
}

/// Web -> native request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEnvelope {
    pub intended: bool,
    pub action: Action,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl OutboundEnvelope {
    pub fn blocking(id: impl Into<String>, kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            intended: true,
            action: Action::Request,
            mode: Mode::Blocking,
            id: Some(id.into()),
            kind: kind.into(),
            payload,
        }
    }

    pub fn unblocking(kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            intended: true,
            action: Action::Request,
            mode: Mode::Unblocking,
            id: None,
            kind: kind.into(),
            payload,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A validated native -> web message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a blocking request sent earlier.
    Response {
        id: String,
        ok: bool,
        result: Option<Value>,
        error: Option<String>,
    },
    /// Event pushed by the native host.
    Request { kind: String, payload: Option<Value> },
}

/// Why a message was not turned into an [`Inbound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotJson,
    /// Missing the `intended` marker, `action` or `mode`.
    Foreign,
    /// Carries the marker but matches no known shape.
    Malformed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Inbound(Inbound),
    Ignored(IgnoreReason),
}

/// Loose view of an envelope before validation. Every field is optional so
/// that foreign messages deserialize and can be classified instead of
/// failing outright.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    intended: Option<bool>,
    #[serde(default)]
    action: Option<Action>,
    #[serde(default)]
    mode: Option<Mode>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Classify a raw channel message.
pub fn decode(raw: &str) -> Decoded {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return Decoded::Ignored(IgnoreReason::NotJson),
    };
    if !value.is_object() {
        return Decoded::Ignored(IgnoreReason::Foreign);
    }

    // Unknown action/mode strings make the typed parse fail; such a message
    // still counts as foreign unless it carried the marker.
    let marked = value.get("intended").and_then(Value::as_bool) == Some(true);
    let raw: RawEnvelope = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(_) if marked => return Decoded::Ignored(IgnoreReason::Malformed),
        Err(_) => return Decoded::Ignored(IgnoreReason::Foreign),
    };

    let (action, mode) = match (raw.intended, raw.action, raw.mode) {
        (Some(true), Some(action), Some(mode)) => (action, mode),
        _ => return Decoded::Ignored(IgnoreReason::Foreign),
    };

    match (action, mode) {
        (Action::Response, Mode::Blocking) => {
            let (Some(id), Some(ok)) = (raw.id, raw.ok) else {
                return Decoded::Ignored(IgnoreReason::Malformed);
            };
            let error = raw.error.map(|e| match e {
                Value::String(s) => s,
                other => other.to_string(),
            });
            Decoded::Inbound(Inbound::Response {
                id,
                ok,
                result: raw.result,
                error,
            })
        }
        (Action::Request, Mode::Unblocking) => match raw.kind {
            Some(kind) if !kind.is_empty() => Decoded::Inbound(Inbound::Request {
                kind,
                payload: raw.payload,
            }),
            _ => Decoded::Ignored(IgnoreReason::Malformed),
        },
        _ => Decoded::Ignored(IgnoreReason::Malformed),
    }
}
