//! The connection state machine.
//!
//! [`ConnectionClient`] owns the current link and decides what every link
//! event means: handshake progress, a rejected token, a dropped connection
//! that needs a retry, or a server event for subscribers. It performs no I/O
//! itself; the [`Transport`] does, and the caller feeds link events back in
//! through [`ConnectionClient::handle`] and drives retries with
//! [`ConnectionClient::retry_at`] / [`ConnectionClient::retry_now`].

use std::mem;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::backoff::ReconnectPolicy;
use crate::credentials::{CredentialError, Token, TokenSource};
use crate::protocol::{self, OutboundMessage};
use crate::state::{ClientEvent, ClientEventKind, ConnectionState, Subscribers};
use crate::transport::{ConnectRequest, Link, LinkEvent, LinkEventKind, LinkEventSender, Transport};

/// Running totals, for status output.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub attempts: u64,
    pub reconnects: u64,
    pub sent: u64,
    pub dropped_sends: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Handshake {
    opened: bool,
    accepted: bool,
}

pub struct ConnectionClient<T> {
    transport: T,
    credentials: Arc<dyn TokenSource>,
    policy: ReconnectPolicy,
    events: LinkEventSender,

    state: ConnectionState,
    handshake: Handshake,
    token: Option<Token>,
    attempt: u64,
    link: Option<Link>,
    retry_at: Option<Instant>,
    consecutive_failures: u32,

    stats: ClientStats,
    subscribers: Subscribers,
}

impl<T: Transport> ConnectionClient<T> {
    /// Link events for every attempt are delivered to `events`.
    pub fn new(
        transport: T,
        credentials: Arc<dyn TokenSource>,
        policy: ReconnectPolicy,
        events: LinkEventSender,
    ) -> Self {
        Self {
            transport,
            credentials,
            policy,
            events,
            state: ConnectionState::Disconnected,
            handshake: Handshake::default(),
            token: None,
            attempt: 0,
            link: None,
            retry_at: None,
            consecutive_failures: 0,
            stats: ClientStats::default(),
            subscribers: Subscribers::default(),
        }
    }

    pub const fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub const fn stats(&self) -> ClientStats {
        self.stats
    }

    /// When the pending retry is due, if one is scheduled.
    pub const fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Registers a handler for one kind of event.
    pub fn on(&mut self, kind: ClientEventKind, handler: impl FnMut(&ClientEvent) + Send + 'static) {
        self.subscribers.register(kind, handler);
    }

    /// Connects with the token from the credential store.
    pub fn connect_stored(&mut self) -> Result<(), CredentialError> {
        let token = self.credentials.load()?;
        self.connect(token);
        Ok(())
    }

    /// Starts connecting with `token`.
    ///
    /// A no-op while connecting or connected. While waiting to reconnect the
    /// pending retry is cancelled and a new attempt starts immediately.
    pub fn connect(&mut self, token: Token) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                tracing::debug!(state = %self.state, "connect ignored");
                return;
            }
            ConnectionState::Reconnecting => self.retry_at = None,
            ConnectionState::Disconnected | ConnectionState::Failed(_) => {}
        }
        self.token = Some(token);
        self.consecutive_failures = 0;
        self.open_link();
    }

    /// Closes the link and cancels any pending retry.
    ///
    /// Returns the `Disconnected` event if the state changed.
    pub fn disconnect(&mut self) -> Option<ClientEvent> {
        self.retry_at = None;
        self.handshake = Handshake::default();
        if let Some(link) = self.link.take() {
            link.close();
        }
        if self.state == ConnectionState::Disconnected {
            return None;
        }
        let previous = mem::replace(&mut self.state, ConnectionState::Disconnected);
        tracing::info!(from = %previous, "disconnected");
        Some(self.emit(ClientEvent::Disconnected {
            reason: "client disconnect".to_string(),
        }))
    }

    /// Sends a message if connected. Otherwise the message is dropped and
    /// counted; nothing is queued for later.
    pub fn send(&mut self, message: OutboundMessage) -> bool {
        let event = message.event_name();
        if let Some(link) = self.link.as_ref().filter(|_| self.state.is_connected()) {
            if link.send(message) {
                self.stats.sent += 1;
                return true;
            }
        }
        self.stats.dropped_sends += 1;
        tracing::debug!(
            event,
            state = %self.state,
            dropped = self.stats.dropped_sends,
            "not connected; dropping message"
        );
        false
    }

    /// Applies a link event. Returns the resulting client event, already
    /// delivered to subscribers, if there is one.
    pub fn handle(&mut self, event: LinkEvent) -> Option<ClientEvent> {
        if event.attempt != self.attempt || self.link.is_none() {
            tracing::trace!(
                attempt = event.attempt,
                current = self.attempt,
                "discarding event from a stale link"
            );
            return None;
        }
        match event.kind {
            LinkEventKind::Opened => {
                self.handshake.opened = true;
                self.promote()
            }
            LinkEventKind::Accepted => {
                self.handshake.accepted = true;
                self.promote()
            }
            LinkEventKind::Rejected { reason } => Some(self.reject(reason)),
            LinkEventKind::Event { name, args } => self.inbound(&name, args),
            LinkEventKind::Closed { reason } => Some(self.lost(reason)),
        }
    }

    /// Starts the scheduled retry. Returns false if none was pending.
    pub fn retry_now(&mut self) -> bool {
        if self.retry_at.take().is_none() || self.state != ConnectionState::Reconnecting {
            return false;
        }
        self.stats.reconnects += 1;
        self.open_link();
        true
    }

    fn open_link(&mut self) {
        let Some(token) = self.token.clone() else {
            tracing::warn!("no token available; staying disconnected");
            self.state = ConnectionState::Disconnected;
            return;
        };
        if let Some(previous) = self.link.take() {
            previous.close();
        }
        self.attempt += 1;
        self.stats.attempts += 1;
        self.handshake = Handshake::default();
        self.state = ConnectionState::Connecting;
        tracing::info!(attempt = self.attempt, "connecting");

        let request = ConnectRequest {
            attempt: self.attempt,
            token,
        };
        self.link = Some(self.transport.open(request, self.events.clone()));
    }

    fn promote(&mut self) -> Option<ClientEvent> {
        let Handshake { opened, accepted } = self.handshake;
        if self.state != ConnectionState::Connecting || !(opened && accepted) {
            return None;
        }
        self.state = ConnectionState::Connected;
        self.consecutive_failures = 0;
        tracing::info!(attempt = self.attempt, "connected");
        Some(self.emit(ClientEvent::Connected))
    }

    fn reject(&mut self, reason: String) -> ClientEvent {
        self.link = None;
        self.retry_at = None;
        self.token = None;
        self.state = ConnectionState::Failed(reason.clone());
        tracing::error!(attempt = self.attempt, reason = %reason, "server rejected the token");
        self.emit(ClientEvent::AuthError { reason })
    }

    fn lost(&mut self, reason: String) -> ClientEvent {
        self.link = None;
        let delay = self.policy.delay(self.consecutive_failures);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.retry_at = Some(Instant::now() + delay);
        self.state = ConnectionState::Reconnecting;
        tracing::warn!(
            attempt = self.attempt,
            reason = %reason,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "connection lost"
        );
        self.emit(ClientEvent::Disconnected { reason })
    }

    fn inbound(&mut self, name: &str, args: Vec<Value>) -> Option<ClientEvent> {
        if name != protocol::STATUS_UPDATED {
            tracing::trace!(event = name, "ignoring server event");
            return None;
        }
        Some(self.emit(ClientEvent::StatusUpdated { args }))
    }

    fn emit(&mut self, event: ClientEvent) -> ClientEvent {
        self.subscribers.notify(&event);
        event
    }
}

impl<T> std::fmt::Debug for ConnectionClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionClient")
            .field("state", &self.state)
            .field("attempt", &self.attempt)
            .field("retry_at", &self.retry_at)
            .field("stats", &self.stats)
            .field("subscribers", &self.subscribers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;
    use trickle_core::AppName;

    use crate::credentials::StaticToken;
    use crate::transport::testing::FakeTransport;

    fn token(raw: &str) -> Token {
        Token::new(raw).unwrap()
    }

    fn client(fake: &FakeTransport) -> ConnectionClient<FakeTransport> {
        let (events, _rx) = mpsc::unbounded_channel();
        ConnectionClient::new(
            fake.clone(),
            Arc::new(StaticToken::new(token("stored"))),
            ReconnectPolicy::default(),
            events,
        )
    }

    fn link_event(attempt: u64, kind: LinkEventKind) -> LinkEvent {
        LinkEvent { attempt, kind }
    }

    fn connected(fake: &FakeTransport) -> ConnectionClient<FakeTransport> {
        let mut client = client(fake);
        client.connect(token("t"));
        client.handle(link_event(1, LinkEventKind::Opened));
        client.handle(link_event(1, LinkEventKind::Accepted));
        assert_eq!(*client.state(), ConnectionState::Connected);
        client
    }

    fn closed(reason: &str) -> LinkEventKind {
        LinkEventKind::Closed {
            reason: reason.to_string(),
        }
    }

    #[tokio::test]
    async fn connect_moves_to_connecting_and_opens_one_link() {
        let fake = FakeTransport::default();
        let mut client = client(&fake);

        client.connect(token("abc"));
        assert_eq!(*client.state(), ConnectionState::Connecting);
        assert_eq!(fake.open_count(), 1);
        assert_eq!(fake.token(1).expose(), "abc");

        client.connect(token("abc"));
        assert_eq!(fake.open_count(), 1, "connect while connecting is a no-op");
    }

    #[tokio::test]
    async fn connect_stored_uses_credential_store() {
        let fake = FakeTransport::default();
        let mut client = client(&fake);
        client.connect_stored().unwrap();
        assert_eq!(fake.token(1).expose(), "stored");
    }

    #[tokio::test]
    async fn needs_both_open_and_accept_to_connect() {
        let fake = FakeTransport::default();
        let mut client = client(&fake);
        client.connect(token("t"));

        assert_eq!(client.handle(link_event(1, LinkEventKind::Opened)), None);
        assert_eq!(*client.state(), ConnectionState::Connecting);

        let event = client.handle(link_event(1, LinkEventKind::Accepted));
        assert_eq!(event, Some(ClientEvent::Connected));
        assert_eq!(*client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn accept_before_open_also_connects() {
        let fake = FakeTransport::default();
        let mut client = client(&fake);
        client.connect(token("t"));

        assert_eq!(client.handle(link_event(1, LinkEventKind::Accepted)), None);
        assert_eq!(
            client.handle(link_event(1, LinkEventKind::Opened)),
            Some(ClientEvent::Connected)
        );
    }

    #[tokio::test]
    async fn rejection_fails_without_retry() {
        let fake = FakeTransport::default();
        let mut client = client(&fake);
        client.connect(token("bad"));

        let event = client.handle(link_event(
            1,
            LinkEventKind::Rejected {
                reason: "invalid token".to_string(),
            },
        ));
        assert_eq!(
            event,
            Some(ClientEvent::AuthError {
                reason: "invalid token".to_string()
            })
        );
        assert_eq!(
            *client.state(),
            ConnectionState::Failed("invalid token".to_string())
        );
        assert_eq!(client.retry_at(), None);
        assert!(!client.retry_now());
        assert_eq!(fake.open_count(), 1);
    }

    #[tokio::test]
    async fn failed_client_reconnects_with_new_token() {
        let fake = FakeTransport::default();
        let mut client = client(&fake);
        client.connect(token("bad"));
        client.handle(link_event(
            1,
            LinkEventKind::Rejected {
                reason: "nope".to_string(),
            },
        ));

        client.connect(token("good"));
        assert_eq!(*client.state(), ConnectionState::Connecting);
        assert_eq!(fake.token(2).expose(), "good");
    }

    #[tokio::test(start_paused = true)]
    async fn drop_schedules_backoff_retry() {
        let fake = FakeTransport::default();
        let mut client = connected(&fake);

        let before = Instant::now();
        let event = client.handle(link_event(1, closed("transport error")));
        assert_eq!(
            event,
            Some(ClientEvent::Disconnected {
                reason: "transport error".to_string()
            })
        );
        assert_eq!(*client.state(), ConnectionState::Reconnecting);
        assert_eq!(client.retry_at(), Some(before + Duration::from_secs(1)));

        assert!(client.retry_now());
        assert_eq!(*client.state(), ConnectionState::Connecting);
        assert_eq!(fake.open_count(), 2);

        // Second consecutive failure waits longer.
        client.handle(link_event(2, closed("refused")));
        assert_eq!(client.retry_at(), Some(before + Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_connect_resets_backoff() {
        let fake = FakeTransport::default();
        let mut client = connected(&fake);

        client.handle(link_event(1, closed("a")));
        client.retry_now();
        client.handle(link_event(2, closed("b")));
        client.retry_now();
        client.handle(link_event(3, LinkEventKind::Opened));
        client.handle(link_event(3, LinkEventKind::Accepted));
        assert!(client.state().is_connected());

        let now = Instant::now();
        client.handle(link_event(3, closed("c")));
        assert_eq!(client.retry_at(), Some(now + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn disconnect_cancels_retry_and_closes_link() {
        let fake = FakeTransport::default();
        let mut client = connected(&fake);

        client.handle(link_event(1, closed("gone")));
        assert!(client.retry_at().is_some());

        assert!(client.disconnect().is_some());
        assert_eq!(*client.state(), ConnectionState::Disconnected);
        assert_eq!(client.retry_at(), None);
        assert!(!client.retry_now());
        assert_eq!(fake.open_count(), 1);

        assert_eq!(client.disconnect(), None, "second disconnect is a no-op");
    }

    #[tokio::test]
    async fn disconnect_closes_the_open_link() {
        let fake = FakeTransport::default();
        let mut client = connected(&fake);
        assert!(!fake.is_closed(1));
        client.disconnect();
        assert!(fake.is_closed(1));
    }

    #[tokio::test]
    async fn connect_while_reconnecting_retries_immediately() {
        let fake = FakeTransport::default();
        let mut client = connected(&fake);
        client.handle(link_event(1, closed("gone")));

        client.connect(token("t"));
        assert_eq!(client.retry_at(), None);
        assert_eq!(*client.state(), ConnectionState::Connecting);
        assert_eq!(fake.open_count(), 2);
    }

    #[tokio::test]
    async fn stale_link_events_are_ignored() {
        let fake = FakeTransport::default();
        let mut client = connected(&fake);
        client.handle(link_event(1, closed("gone")));
        client.retry_now();

        assert_eq!(client.handle(link_event(1, closed("late close"))), None);
        assert_eq!(
            client.handle(link_event(
                1,
                LinkEventKind::Event {
                    name: protocol::STATUS_UPDATED.to_string(),
                    args: vec![json!({})],
                }
            )),
            None
        );
        assert_eq!(*client.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn events_after_disconnect_are_ignored() {
        let fake = FakeTransport::default();
        let mut client = connected(&fake);
        client.disconnect();
        assert_eq!(client.handle(link_event(1, closed("late"))), None);
        assert_eq!(*client.state(), ConnectionState::Disconnected);
        assert_eq!(client.retry_at(), None);
    }

    #[tokio::test]
    async fn send_only_while_connected() {
        let fake = FakeTransport::default();
        let mut client = client(&fake);
        let update = OutboundMessage::AppUpdate {
            app_name: AppName::new("Xcode").unwrap(),
        };

        assert!(!client.send(update.clone()));
        client.connect(token("t"));
        assert!(!client.send(OutboundMessage::RequestStatus));

        client.handle(link_event(1, LinkEventKind::Opened));
        client.handle(link_event(1, LinkEventKind::Accepted));
        assert!(client.send(update.clone()));

        assert_eq!(fake.sent(1), vec![update]);
        let stats = client.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.dropped_sends, 2);
    }

    #[tokio::test]
    async fn status_events_reach_subscribers() {
        let fake = FakeTransport::default();
        let mut client = client(&fake);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        client.on(ClientEventKind::StatusUpdated, move |event| {
            if let ClientEvent::StatusUpdated { args } = event {
                log.lock().unwrap().push(args.clone());
            }
        });
        client.connect(token("t"));
        client.handle(link_event(1, LinkEventKind::Opened));
        client.handle(link_event(1, LinkEventKind::Accepted));

        client.handle(link_event(
            1,
            LinkEventKind::Event {
                name: "something-else".to_string(),
                args: vec![],
            },
        ));
        client.handle(link_event(
            1,
            LinkEventKind::Event {
                name: protocol::STATUS_UPDATED.to_string(),
                args: vec![json!({"currentState": "focusing"})],
            },
        ));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec![json!({"currentState": "focusing"})]]
        );
    }

    #[tokio::test]
    async fn auth_error_reaches_subscribers() {
        let fake = FakeTransport::default();
        let mut client = client(&fake);
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&reasons);
        client.on(ClientEventKind::AuthError, move |event| {
            if let ClientEvent::AuthError { reason } = event {
                log.lock().unwrap().push(reason.clone());
            }
        });
        client.connect(token("t"));
        client.handle(link_event(
            1,
            LinkEventKind::Rejected {
                reason: "expired".to_string(),
            },
        ));
        assert_eq!(*reasons.lock().unwrap(), vec!["expired"]);
    }
}
