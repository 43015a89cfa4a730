//! Realtime session sync against the Trickle state server.
//!
//! - [`ConnectionClient`]: connection state machine with backoff and auth
//! - [`StatusPoller`]: periodic `get-status` requests while connected
//! - [`SyncCoordinator`]: owns the aggregator, client and poller on one task
//! - [`WsTransport`]: Socket.IO over WebSocket

pub mod backoff;
pub mod client;
pub mod coordinator;
pub mod credentials;
pub mod feed;
pub mod poller;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod ws;

pub use backoff::ReconnectPolicy;
pub use client::{ClientStats, ConnectionClient};
pub use coordinator::{
    Command, CoordinatorHandle, PublishedState, SyncCoordinator, SyncCounters, SyncSettings,
};
pub use credentials::{CredentialError, FileTokenStore, StaticToken, Token, TokenSource};
pub use feed::read_activations;
pub use poller::StatusPoller;
pub use protocol::OutboundMessage;
pub use state::{ClientEvent, ClientEventKind, ConnectionState};
pub use transport::{ConnectRequest, Link, LinkEvent, LinkEventKind, Transport};
pub use ws::{TransportError, WsTransport};
