//! Connection lifecycle state and the events the client reports.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Lifecycle of the connection to the state server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected and not trying to be.
    #[default]
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// The socket is open and the server accepted the token.
    Connected,
    /// The connection dropped; a retry is scheduled.
    Reconnecting,
    /// The server rejected the token. Needs a fresh token to leave.
    Failed(String),
}

impl ConnectionState {
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the client is connected or working towards a connection.
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// An inbound event, after the client has applied it to its state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected { reason: String },
    AuthError { reason: String },
    StatusUpdated { args: Vec<Value> },
}

impl ClientEvent {
    pub const fn kind(&self) -> ClientEventKind {
        match self {
            Self::Connected => ClientEventKind::Connected,
            Self::Disconnected { .. } => ClientEventKind::Disconnected,
            Self::AuthError { .. } => ClientEventKind::AuthError,
            Self::StatusUpdated { .. } => ClientEventKind::StatusUpdated,
        }
    }
}

/// The names subscribers can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEventKind {
    Connected,
    Disconnected,
    AuthError,
    StatusUpdated,
}

impl ClientEventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::AuthError => "authError",
            Self::StatusUpdated => "statusUpdated",
        }
    }
}

impl fmt::Display for ClientEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Handler = Box<dyn FnMut(&ClientEvent) + Send>;

/// Handlers registered per event kind, called in registration order.
#[derive(Default)]
pub struct Subscribers {
    handlers: Vec<(ClientEventKind, Handler)>,
}

impl Subscribers {
    pub fn register(
        &mut self,
        kind: ClientEventKind,
        handler: impl FnMut(&ClientEvent) + Send + 'static,
    ) {
        self.handlers.push((kind, Box::new(handler)));
    }

    pub fn notify(&mut self, event: &ClientEvent) {
        let kind = event.kind();
        for (registered, handler) in &mut self.handlers {
            if *registered == kind {
                handler(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
