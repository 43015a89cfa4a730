//! Decoding of `status-updated` payloads into [`SessionSnapshot`]s.
//!
//! Decoding is pure and synchronous. It is deliberately lenient about shape
//! (unknown fields are ignored, the legacy `garden` block may be missing or
//! malformed) but strict about meaning: a `currentState` the client does not
//! understand fails the whole decode instead of being guessed.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::focus_state::FocusState;
use crate::snapshot::{
    AppTime, AppUsage, Category, Garden, Legacy, SessionSnapshot, SessionSummary, Tree,
};

/// Why a payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    /// The event carried no payload at all.
    #[error("payload is empty")]
    Empty,
    /// The payload is neither an object nor a string containing one.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    /// The payload is not valid JSON or a field has the wrong type.
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// A required field is missing.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// The server reported a focus state this client does not know.
    #[error("unknown focus state `{0}`")]
    UnknownState(String),
}

/// A payload that failed to decode, with the raw text for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode status payload: {kind}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub raw_payload: String,
}

impl DecodeError {
    fn new(kind: DecodeErrorKind, raw_payload: impl Into<String>) -> Self {
        Self {
            kind,
            raw_payload: raw_payload.into(),
        }
    }
}

/// Decodes the arguments of a `status-updated` event.
///
/// Only the first argument is considered, matching how the server emits the
/// event.
pub fn decode_status_args(args: &[Value]) -> Result<SessionSnapshot, DecodeError> {
    let Some(first) = args.first() else {
        return Err(DecodeError::new(DecodeErrorKind::Empty, ""));
    };
    decode_status(first)
}

/// Decodes a single payload value.
///
/// The value may be the status object itself or a JSON string containing it.
pub fn decode_status(payload: &Value) -> Result<SessionSnapshot, DecodeError> {
    match payload {
        Value::Object(_) => decode_object(payload, || payload.to_string()),
        Value::String(text) => decode_status_str(text),
        Value::Null => Err(DecodeError::new(DecodeErrorKind::Empty, "null")),
        other => Err(DecodeError::new(
            DecodeErrorKind::NotAnObject(json_type_name(other)),
            other.to_string(),
        )),
    }
}

/// Decodes a payload from its JSON text.
///
/// Text that is itself a JSON string is unwrapped and decoded.
pub fn decode_status_str(text: &str) -> Result<SessionSnapshot, DecodeError> {
    if text.trim().is_empty() {
        return Err(DecodeError::new(DecodeErrorKind::Empty, text));
    }
    let value: Value = serde_json::from_str(text)
        .map_err(|err| DecodeError::new(DecodeErrorKind::Malformed(err.to_string()), text))?;
    match &value {
        Value::Object(_) => decode_object(&value, || text.to_string()),
        Value::String(inner) => decode_status_str(inner),
        other => Err(DecodeError::new(
            DecodeErrorKind::NotAnObject(json_type_name(other)),
            text,
        )),
    }
}

/// Decodes a payload from raw bytes.
pub fn decode_status_slice(bytes: &[u8]) -> Result<SessionSnapshot, DecodeError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => decode_status_str(text),
        Err(err) => Err(DecodeError::new(
            DecodeErrorKind::Malformed(err.to_string()),
            String::from_utf8_lossy(bytes),
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStatus {
    current_state: Option<String>,
    session_summary: Option<WireSummary>,
    #[serde(default)]
    app_usage: Option<WireAppUsage>,
    #[serde(default)]
    garden: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSummary {
    total_focus_time: u64,
    total_distraction_time: u64,
    #[serde(default)]
    longest_focus_streak: u64,
    #[serde(default)]
    last_updated: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct WireAppUsage {
    #[serde(default)]
    focus: WireCategory,
    #[serde(default)]
    distraction: WireCategory,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCategory {
    #[serde(default)]
    total_time: u64,
    #[serde(default)]
    apps: Vec<WireApp>,
}

#[derive(Debug, Deserialize)]
struct WireApp {
    name: String,
    #[serde(default)]
    time: u64,
}

#[derive(Debug, Deserialize)]
struct WireGarden {
    #[serde(default)]
    tree: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTree {
    level: Option<u32>,
    health: Option<f64>,
    progress_to_next_level: Option<f64>,
}

fn decode_object(
    value: &Value,
    raw: impl Fn() -> String,
) -> Result<SessionSnapshot, DecodeError> {
    let wire = WireStatus::deserialize(value)
        .map_err(|err| DecodeError::new(DecodeErrorKind::Malformed(err.to_string()), raw()))?;

    let Some(state) = wire.current_state else {
        return Err(DecodeError::new(
            DecodeErrorKind::MissingField("currentState"),
            raw(),
        ));
    };
    let state: FocusState = state
        .parse()
        .map_err(|_| DecodeError::new(DecodeErrorKind::UnknownState(state.clone()), raw()))?;

    let Some(summary) = wire.session_summary else {
        return Err(DecodeError::new(
            DecodeErrorKind::MissingField("sessionSummary"),
            raw(),
        ));
    };

    let app_usage = wire.app_usage.unwrap_or_default();

    Ok(SessionSnapshot {
        state,
        summary: SessionSummary {
            focus_secs: summary.total_focus_time,
            distraction_secs: summary.total_distraction_time,
            longest_streak_secs: summary.longest_focus_streak,
            last_updated: decode_timestamp(summary.last_updated),
        },
        app_usage: AppUsage {
            focus: category(app_usage.focus),
            distraction: category(app_usage.distraction),
        },
        garden: decode_garden(wire.garden),
    })
}

fn category(wire: WireCategory) -> Category {
    Category {
        total_secs: wire.total_time,
        apps: wire
            .apps
            .into_iter()
            .map(|app| AppTime {
                name: app.name,
                secs: app.time,
            })
            .collect(),
    }
}

fn decode_timestamp(value: Option<Value>) -> Option<DateTime<Utc>> {
    let value = value.filter(|v| !v.is_null())?;
    match DateTime::<Utc>::deserialize(&value) {
        Ok(timestamp) => Some(timestamp),
        Err(e) => {
            tracing::debug!(error = %e, %value, "ignoring unreadable lastUpdated");
            None
        }
    }
}

fn decode_garden(value: Option<Value>) -> Legacy<Garden> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Legacy::Absent;
    };
    match WireGarden::deserialize(&value) {
        Ok(garden) => Legacy::Present(Garden {
            tree: decode_tree(garden.tree),
        }),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unreadable garden block");
            Legacy::Absent
        }
    }
}

fn decode_tree(value: Option<Value>) -> Legacy<Tree> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Legacy::Absent;
    };
    match WireTree::deserialize(&value) {
        Ok(tree) => Legacy::Present(Tree {
            level: tree.level,
            health: tree.health,
            progress_to_next_level: tree.progress_to_next_level,
        }),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unreadable tree block");
            Legacy::Absent
        }
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
