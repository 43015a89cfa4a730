//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only the subset the state server uses is supported: text packets on the
//! default namespace, no binary attachments and no acknowledgements. Each
//! WebSocket text frame carries one Engine.IO packet; Engine.IO `message`
//! packets wrap one Socket.IO packet.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use trickle_core::AppName;

use crate::credentials::Token;

/// Event the server pushes with a fresh session snapshot.
pub const STATUS_UPDATED: &str = "status-updated";

/// Engine.IO pong, the reply to every server ping.
pub const PONG: &str = "3";

/// Socket.IO disconnect from the default namespace.
pub const DISCONNECT: &str = "41";

/// A message the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// The foreground application changed.
    AppUpdate { app_name: AppName },
    /// Ask the server to push a `status-updated` event.
    RequestStatus,
}

impl OutboundMessage {
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::AppUpdate { .. } => "update-app",
            Self::RequestStatus => "get-status",
        }
    }

    pub fn payload(&self) -> Option<Value> {
        match self {
            Self::AppUpdate { app_name } => Some(json!({ "appName": app_name.as_str() })),
            Self::RequestStatus => None,
        }
    }

    /// The complete text frame for this message.
    pub fn encode(&self) -> String {
        encode_event(self.event_name(), self.payload())
    }
}

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

const fn default_ping_interval() -> u64 {
    25_000
}

const fn default_ping_timeout() -> u64 {
    20_000
}

impl OpenHandshake {
    /// How long the server may stay silent before the link counts as dead.
    pub const fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// An Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenHandshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Noop,
}

/// A Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connection accepted.
    Connect { sid: Option<String> },
    /// Server-side disconnect of the namespace.
    Disconnect,
    Event { name: String, args: Vec<Value> },
    /// Namespace connection refused, usually by an auth middleware.
    ConnectError { message: String },
    /// Packet types this client does not use (acks, binary).
    Unsupported(char),
    /// A packet addressed to a namespace other than `/`.
    OtherNamespace { namespace: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,

    #[error("unknown {layer} packet type `{kind}`")]
    UnknownType { layer: &'static str, kind: char },

    #[error("invalid packet payload: {0}")]
    InvalidPayload(String),
}

/// Parses one text frame.
pub fn parse_packet(frame: &str) -> Result<Packet, ProtocolError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => serde_json::from_str(rest)
            .map(Packet::Open)
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string())),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => parse_socket_packet(rest).map(Packet::Message),
        '6' => Ok(Packet::Noop),
        other => Err(ProtocolError::UnknownType {
            layer: "engine.io",
            kind: other,
        }),
    }
}

fn parse_socket_packet(text: &str) -> Result<SocketPacket, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let (namespace, body) = split_namespace(chars.as_str());
    if namespace != "/" {
        return Ok(SocketPacket::OtherNamespace {
            namespace: namespace.to_string(),
        });
    }
    let body = strip_ack_id(body);

    match kind {
        '0' => {
            let sid = parse_optional(body)?
                .and_then(|v| v.get("sid").and_then(Value::as_str).map(str::to_string));
            Ok(SocketPacket::Connect { sid })
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => parse_event(body),
        '4' => {
            let message = match parse_optional(body)? {
                Some(Value::Object(map)) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| Value::Object(map.clone()).to_string(), str::to_string),
                Some(Value::String(message)) => message,
                Some(other) => other.to_string(),
                None => "connection refused".to_string(),
            };
            Ok(SocketPacket::ConnectError { message })
        }
        '3' | '5' | '6' => Ok(SocketPacket::Unsupported(kind)),
        other => Err(ProtocolError::UnknownType {
            layer: "socket.io",
            kind: other,
        }),
    }
}

fn parse_event(body: &str) -> Result<SocketPacket, ProtocolError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
    let Value::Array(mut items) = value else {
        return Err(ProtocolError::InvalidPayload(
            "event payload is not an array".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(ProtocolError::InvalidPayload(
            "event payload has no name".to_string(),
        ));
    }
    let Value::String(name) = items.remove(0) else {
        return Err(ProtocolError::InvalidPayload(
            "event name is not a string".to_string(),
        ));
    };
    Ok(SocketPacket::Event { name, args: items })
}

fn parse_optional(body: &str) -> Result<Option<Value>, ProtocolError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}

/// Splits an optional `/namespace,` prefix off a packet body.
///
/// A body without a prefix belongs to the default namespace `/`.
fn split_namespace(text: &str) -> (&str, &str) {
    if text.starts_with('/') {
        text.split_once(',').unwrap_or((text, ""))
    } else {
        ("/", text)
    }
}

fn strip_ack_id(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// Socket.IO CONNECT for the default namespace, carrying the auth payload.
pub fn encode_connect(auth: &Value) -> String {
    format!("40{auth}")
}

pub fn encode_event(name: &str, payload: Option<Value>) -> String {
    let mut items = vec![Value::String(name.to_string())];
    items.extend(payload);
    format!("42{}", Value::Array(items))
}

/// The CONNECT auth payload.
///
/// Carries the token both at the top level and under `auth`, so servers
/// reading either `handshake.auth.token` or `handshake.auth.auth.token`
/// accept it.
pub fn auth_payload(token: &Token) -> Value {
    json!({
        "token": token.expose(),
        "auth": { "token": token.expose() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_app_update() {
        let message = OutboundMessage::AppUpdate {
            app_name: AppName::new("Xcode").unwrap(),
        };
        assert_eq!(message.encode(), r#"42["update-app",{"appName":"Xcode"}]"#);
    }

    #[test]
    fn encodes_status_request_without_payload() {
        assert_eq!(OutboundMessage::RequestStatus.encode(), r#"42["get-status"]"#);
    }

    #[test]
    fn parses_open_handshake() {
        let packet = parse_packet(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let Packet::Open(open) = packet else {
            panic!("expected open, got {packet:?}");
        };
        assert_eq!(open.sid, "abc");
        assert_eq!(open.liveness_window(), Duration::from_secs(30));
    }

    #[test]
    fn parses_control_packets() {
        assert_eq!(parse_packet("2").unwrap(), Packet::Ping);
        assert_eq!(parse_packet("3").unwrap(), Packet::Pong);
        assert_eq!(parse_packet("1").unwrap(), Packet::Close);
        assert_eq!(parse_packet("").unwrap_err(), ProtocolError::Empty);
        assert!(matches!(
            parse_packet("9").unwrap_err(),
            ProtocolError::UnknownType { kind: '9', .. }
        ));
    }

    #[test]
    fn parses_connect_ack() {
        assert_eq!(
            parse_packet(r#"40{"sid":"xyz"}"#).unwrap(),
            Packet::Message(SocketPacket::Connect {
                sid: Some("xyz".to_string())
            })
        );
        assert_eq!(
            parse_packet("40").unwrap(),
            Packet::Message(SocketPacket::Connect { sid: None })
        );
    }

    #[test]
    fn parses_connect_error_message() {
        assert_eq!(
            parse_packet(r#"44{"message":"invalid token"}"#).unwrap(),
            Packet::Message(SocketPacket::ConnectError {
                message: "invalid token".to_string()
            })
        );
        assert_eq!(
            parse_packet(r#"44"expired""#).unwrap(),
            Packet::Message(SocketPacket::ConnectError {
                message: "expired".to_string()
            })
        );
    }

    #[test]
    fn parses_event_with_namespace_and_ack_id() {
        let packet = parse_packet(r#"42/,12["status-updated",{"currentState":"focusing"}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::Event {
                name: "status-updated".to_string(),
                args: vec![json!({"currentState": "focusing"})],
            })
        );
    }

    #[test]
    fn packets_for_other_namespaces_are_not_events() {
        let packet = parse_packet(r#"42/admin,["status-updated",{"currentState":"focusing"}]"#)
            .unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::OtherNamespace {
                namespace: "/admin".to_string()
            })
        );

        assert_eq!(
            parse_packet("40/admin").unwrap(),
            Packet::Message(SocketPacket::OtherNamespace {
                namespace: "/admin".to_string()
            })
        );
    }

    #[test]
    fn event_keeps_string_payloads_as_is() {
        let packet = parse_packet(r#"42["status-updated","{\"currentState\":\"distracted\"}"]"#)
            .unwrap();
        let Packet::Message(SocketPacket::Event { args, .. }) = packet else {
            panic!("expected event");
        };
        assert_eq!(args, vec![json!(r#"{"currentState":"distracted"}"#)]);
    }

    #[test]
    fn rejects_event_without_name() {
        assert!(matches!(
            parse_packet("42[]").unwrap_err(),
            ProtocolError::InvalidPayload(_)
        ));
        assert!(matches!(
            parse_packet("42[5]").unwrap_err(),
            ProtocolError::InvalidPayload(_)
        ));
    }

    #[test]
    fn auth_payload_carries_both_shapes() {
        let token = Token::new("abc123").unwrap();
        let payload = auth_payload(&token);
        assert_eq!(payload["token"], "abc123");
        assert_eq!(payload["auth"]["token"], "abc123");
        assert_eq!(
            encode_connect(&payload),
            r#"40{"auth":{"token":"abc123"},"token":"abc123"}"#
        );
    }
}
