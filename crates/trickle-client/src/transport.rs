//! The seam between the connection state machine and the network.
//!
//! A [`Transport`] opens links. Each link runs on its own task and reports
//! what happens on it as [`LinkEvent`]s tagged with the attempt number the
//! client assigned, so events from a link the client already abandoned can
//! be told apart and dropped.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::credentials::Token;
use crate::protocol::OutboundMessage;

pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;

/// Parameters for one connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub attempt: u64,
    pub token: Token,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkEvent {
    pub attempt: u64,
    pub kind: LinkEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEventKind {
    /// The socket is open and the server sent its handshake.
    Opened,
    /// The server accepted the auth payload.
    Accepted,
    /// The server refused the token. The link is finished.
    Rejected { reason: String },
    /// A server event.
    Event { name: String, args: Vec<Value> },
    /// The link ended for any other reason. The link is finished.
    Closed { reason: String },
}

pub trait Transport: Send + 'static {
    /// Starts a connection attempt. Must not block; progress is reported on
    /// `events`.
    fn open(&self, request: ConnectRequest, events: LinkEventSender) -> Link;
}

/// Handle to a running link. Dropping it closes the link.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Link {
    pub const fn new(
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            outbound,
            shutdown: Some(shutdown),
        }
    }

    /// Queues a message. Returns false if the link task is gone.
    pub fn send(&self, message: OutboundMessage) -> bool {
        self.outbound.send(message).is_ok()
    }

    pub fn close(mut self) {
        self.signal_shutdown();
    }

    fn signal_shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.signal_shutdown();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_a_link_signals_shutdown() {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let link = Link::new(outbound_tx, shutdown_tx);

        assert!(link.send(OutboundMessage::RequestStatus));
        assert_eq!(outbound_rx.try_recv().unwrap(), OutboundMessage::RequestStatus);

        drop(link);
        assert!(shutdown_rx.try_recv().is_ok());
    }

    #[test]
    fn send_fails_once_the_task_is_gone() {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _shutdown_rx) = oneshot::channel();
        let link = Link::new(outbound_tx, shutdown_tx);
        drop(outbound_rx);
        assert!(!link.send(OutboundMessage::RequestStatus));
    }
}
