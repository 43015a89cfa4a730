//! Ties the aggregator, the connection and the poller together.
//!
//! Everything that mutates session state runs on the coordinator's task:
//! activations from the feed, link events from the transport, backoff and
//! poll timers, and commands from [`CoordinatorHandle`]s. Observers read the
//! result through a `watch` channel of [`PublishedState`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use trickle_core::{
    AppActivated, AppName, SessionSnapshot, UsageAggregator, UsageEntry, decode_status_args,
};

use crate::backoff::ReconnectPolicy;
use crate::client::ConnectionClient;
use crate::credentials::{CredentialError, Token, TokenSource};
use crate::poller::{DEFAULT_POLL_INTERVAL, StatusPoller};
use crate::protocol::OutboundMessage;
use crate::state::{ClientEvent, ClientEventKind, ConnectionState};
use crate::transport::{LinkEvent, Transport};

const COMMAND_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stop,
    Reauthenticate(Token),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncCounters {
    pub activations: u64,
    pub status_requests: u64,
    pub status_updates: u64,
    pub decode_failures: u64,
    pub dropped_sends: u64,
    pub reconnects: u64,
}

/// Everything observers may read, replaced as a whole on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishedState {
    pub connection: ConnectionState,
    /// The server's view of the session. `None` until the first good decode.
    pub snapshot: Option<Arc<SessionSnapshot>>,
    pub net_productivity: Option<i64>,
    /// Local per-app usage, sorted by total descending.
    pub usage: Vec<UsageEntry>,
    pub active_app: Option<AppName>,
    pub counters: SyncCounters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Controls a running coordinator from another task.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<PublishedState>,
}

impl CoordinatorHandle {
    /// Asks the coordinator to stop. Returns false if it already exited.
    pub async fn stop(&self) -> bool {
        self.commands.send(Command::Stop).await.is_ok()
    }

    pub async fn reauthenticate(&self, token: Token) -> bool {
        self.commands
            .send(Command::Reauthenticate(token))
            .await
            .is_ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<PublishedState> {
        self.state.clone()
    }

    pub fn current(&self) -> PublishedState {
        self.state.borrow().clone()
    }
}

pub struct SyncCoordinator<T> {
    client: ConnectionClient<T>,
    aggregator: UsageAggregator,
    poller: StatusPoller,
    link_events: mpsc::UnboundedReceiver<LinkEvent>,
    feed: Option<mpsc::Receiver<AppActivated>>,
    commands: mpsc::Receiver<Command>,
    command_tx: Option<mpsc::Sender<Command>>,
    published: watch::Sender<PublishedState>,
    snapshot: Option<Arc<SessionSnapshot>>,
    counters: SyncCounters,
    lifecycle: Lifecycle,
}

impl<T: Transport> SyncCoordinator<T> {
    pub fn new(transport: T, credentials: Arc<dyn TokenSource>, settings: SyncSettings) -> Self {
        let (link_tx, link_events) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (published, _) = watch::channel(PublishedState::default());
        Self {
            client: ConnectionClient::new(transport, credentials, settings.reconnect, link_tx),
            aggregator: UsageAggregator::new(),
            poller: StatusPoller::new(settings.poll_interval),
            link_events,
            feed: None,
            commands,
            command_tx: Some(command_tx),
            published,
            snapshot: None,
            counters: SyncCounters::default(),
            lifecycle: Lifecycle::Idle,
        }
    }

    /// A handle for stopping and observing the coordinator once it runs.
    ///
    /// Take handles before calling [`SyncCoordinator::run`]; the loop exits
    /// when every handle is gone.
    pub fn handle(&self) -> Option<CoordinatorHandle> {
        self.command_tx.as_ref().map(|commands| CoordinatorHandle {
            commands: commands.clone(),
            state: self.published.subscribe(),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<PublishedState> {
        self.published.subscribe()
    }

    /// Registers a handler on the underlying client.
    pub fn on(&mut self, kind: ClientEventKind, handler: impl FnMut(&ClientEvent) + Send + 'static) {
        self.client.on(kind, handler);
    }

    pub const fn connection_state(&self) -> &ConnectionState {
        self.client.state()
    }

    pub const fn snapshot(&self) -> Option<&Arc<SessionSnapshot>> {
        self.snapshot.as_ref()
    }

    pub const fn aggregator(&self) -> &UsageAggregator {
        &self.aggregator
    }

    pub const fn counters(&self) -> SyncCounters {
        self.counters
    }

    /// Subscribes to `feed` and connects with the stored token.
    pub fn start(&mut self, feed: mpsc::Receiver<AppActivated>) -> Result<(), CredentialError> {
        if self.lifecycle != Lifecycle::Idle {
            tracing::debug!(lifecycle = ?self.lifecycle, "start ignored");
            return Ok(());
        }
        self.feed = Some(feed);
        if let Err(e) = self.client.connect_stored() {
            self.feed = None;
            return Err(e);
        }
        self.lifecycle = Lifecycle::Running;
        self.publish();
        Ok(())
    }

    /// Unsubscribes from the feed, closes the open usage interval and
    /// disconnects. Safe to call more than once.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }
        self.feed = None;
        self.aggregator.close(now);
        if let Some(event) = self.client.disconnect() {
            self.dispatch(event);
        }
        self.poller.stop();
        self.lifecycle = Lifecycle::Stopped;
        tracing::info!(apps = self.aggregator.len(), "sync stopped");
        self.publish();
    }

    /// Connects again with a fresh token, e.g. after the server rejected the
    /// previous one.
    pub fn reauthenticate(&mut self, token: Token) {
        if self.lifecycle == Lifecycle::Stopped {
            tracing::debug!("reauthenticate ignored after stop");
            return;
        }
        self.client.connect(token);
        self.publish();
    }

    pub fn record_activation(&mut self, event: AppActivated) {
        self.counters.activations += 1;
        if self.aggregator.record_activation(&event.app_name, event.at) {
            self.client.send(OutboundMessage::AppUpdate {
                app_name: event.app_name,
            });
        }
        self.publish();
    }

    pub fn handle_link_event(&mut self, event: LinkEvent) {
        if let Some(event) = self.client.handle(event) {
            self.dispatch(event);
        }
        self.publish();
    }

    /// Sends one status request now.
    pub fn request_status(&mut self) {
        self.counters.status_requests += 1;
        self.client.send(OutboundMessage::RequestStatus);
    }

    /// Runs until stopped, returning the final usage report.
    pub async fn run(mut self) -> Vec<UsageEntry> {
        // Only handles keep the command channel open from here on.
        self.command_tx = None;
        loop {
            let retry_at = self.client.retry_at();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Reauthenticate(token)) => self.reauthenticate(token),
                    Some(Command::Stop) | None => {
                        self.drain_feed();
                        self.stop(Utc::now());
                        break;
                    }
                },
                Some(event) = self.link_events.recv() => self.handle_link_event(event),
                activation = next_activation(self.feed.as_mut()) => match activation {
                    Some(event) => self.record_activation(event),
                    None => {
                        tracing::debug!("activation feed closed");
                        self.feed = None;
                    }
                },
                () = sleep_until(retry_at) => {
                    if self.client.retry_now() {
                        self.publish();
                    }
                },
                () = self.poller.tick() => {
                    self.request_status();
                    self.publish();
                },
            }
        }
        self.aggregator.snapshot()
    }

    /// Applies activations that were delivered before a stop was requested.
    fn drain_feed(&mut self) {
        while let Some(event) = self.feed.as_mut().and_then(|feed| feed.try_recv().ok()) {
            self.record_activation(event);
        }
    }

    fn dispatch(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connected => {
                if let Some(app_name) = self.aggregator.active().cloned() {
                    self.client.send(OutboundMessage::AppUpdate { app_name });
                }
            }
            ClientEvent::Disconnected { reason } => {
                tracing::debug!(reason = %reason, state = %self.client.state(), "link down");
            }
            ClientEvent::AuthError { reason } => {
                tracing::warn!(reason = %reason, "authentication failed; a new token is needed");
            }
            ClientEvent::StatusUpdated { args } => self.apply_status(&args),
        }
        if self.poller.follow(self.client.state()) {
            self.request_status();
        }
    }

    fn apply_status(&mut self, args: &[Value]) {
        match decode_status_args(args) {
            Ok(snapshot) => {
                tracing::debug!(
                    state = %snapshot.state,
                    focus_secs = snapshot.summary.focus_secs,
                    distraction_secs = snapshot.summary.distraction_secs,
                    net_productivity = snapshot.net_productivity(),
                    "status updated"
                );
                self.counters.status_updates += 1;
                self.snapshot = Some(Arc::new(snapshot));
            }
            Err(err) => {
                self.counters.decode_failures += 1;
                tracing::warn!(
                    error = %err,
                    raw_payload = %err.raw_payload,
                    failures = self.counters.decode_failures,
                    "keeping previous snapshot"
                );
            }
        }
    }

    fn publish(&self) {
        let stats = self.client.stats();
        let counters = SyncCounters {
            dropped_sends: stats.dropped_sends,
            reconnects: stats.reconnects,
            ..self.counters
        };
        self.published.send_replace(PublishedState {
            connection: self.client.state().clone(),
            snapshot: self.snapshot.clone(),
            net_productivity: self.snapshot.as_ref().map(|s| s.net_productivity()),
            usage: self.aggregator.snapshot(),
            active_app: self.aggregator.active().cloned(),
            counters,
        });
    }
}

impl<T> std::fmt::Debug for SyncCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("client", &self.client)
            .field("lifecycle", &self.lifecycle)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

async fn next_activation(feed: Option<&mut mpsc::Receiver<AppActivated>>) -> Option<AppActivated> {
    match feed {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
