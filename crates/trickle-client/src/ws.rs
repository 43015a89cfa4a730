//! Socket.IO over WebSocket, the transport used against the real server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;
use url::Url;

use crate::credentials::Token;
use crate::protocol::{self, OutboundMessage, Packet, SocketPacket};
use crate::transport::{ConnectRequest, Link, LinkEvent, LinkEventKind, LinkEventSender, Transport};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Used when the server accepted us without an Engine.IO handshake first.
const FALLBACK_LIVENESS: Duration = Duration::from_secs(45);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid server url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported url scheme `{0}` (expected http, https, ws or wss)")]
    UnsupportedScheme(String),
}

/// Opens Socket.IO links to a server.
#[derive(Debug, Clone)]
pub struct WsTransport {
    endpoint: Url,
    handshake_timeout: Duration,
}

impl WsTransport {
    /// `server_url` is the server's base URL, e.g. `http://localhost:3000`.
    pub fn new(server_url: &str, handshake_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            endpoint: socket_endpoint(server_url)?,
            handshake_timeout,
        })
    }

    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Transport for WsTransport {
    fn open(&self, request: ConnectRequest, events: LinkEventSender) -> Link {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = LinkTask {
            endpoint: self.endpoint.clone(),
            handshake_timeout: self.handshake_timeout,
            attempt: request.attempt,
            token: request.token,
            events,
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };
        tokio::spawn(task.run());
        Link::new(outbound_tx, shutdown_tx)
    }
}

/// Maps a server base URL to its Socket.IO WebSocket endpoint.
pub fn socket_endpoint(server_url: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(server_url).map_err(|source| TransportError::InvalidUrl {
        url: server_url.to_string(),
        source,
    })?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(TransportError::UnsupportedScheme(other.to_string())),
    };
    if url.set_scheme(scheme).is_err() {
        return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.path() == "/" || url.path().is_empty() {
        url.set_path("/socket.io/");
    }
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

fn build_request(endpoint: &Url, token: &Token) -> Result<Request, WsError> {
    let mut url = endpoint.clone();
    url.query_pairs_mut().append_pair("token", token.expose());
    let mut request = url.as_str().into_client_request()?;
    let bearer =
        HeaderValue::from_str(&token.bearer()).map_err(|e| WsError::HttpFormat(e.into()))?;
    request.headers_mut().insert(header::AUTHORIZATION, bearer);
    Ok(request)
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

enum Ended {
    ByClient,
    Rejected(String),
    Closed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingOpen,
    AwaitingAccept,
    Ready,
}

struct LinkTask {
    endpoint: Url,
    handshake_timeout: Duration,
    attempt: u64,
    token: Token,
    events: LinkEventSender,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    shutdown: oneshot::Receiver<()>,
}

impl LinkTask {
    async fn run(mut self) {
        let ended = self.session().await;
        let kind = match ended {
            Ended::ByClient => {
                tracing::debug!(attempt = self.attempt, "link closed by client");
                return;
            }
            Ended::Rejected(reason) => LinkEventKind::Rejected { reason },
            Ended::Closed(reason) => LinkEventKind::Closed { reason },
        };
        self.emit(kind);
    }

    fn emit(&self, kind: LinkEventKind) {
        let _ = self.events.send(LinkEvent {
            attempt: self.attempt,
            kind,
        });
    }

    async fn session(&mut self) -> Ended {
        let request = match build_request(&self.endpoint, &self.token) {
            Ok(request) => request,
            Err(e) => return Ended::Closed(format!("invalid connect request: {e}")),
        };

        tracing::debug!(attempt = self.attempt, endpoint = %self.endpoint, "opening websocket");
        let connect = tokio::time::timeout(self.handshake_timeout, connect_async(request));
        let mut ws = tokio::select! {
            _ = &mut self.shutdown => return Ended::ByClient,
            result = connect => match result {
                Err(_) => return Ended::Closed("connect timed out".to_string()),
                Ok(Err(WsError::Http(response))) if is_auth_failure(response.status()) => {
                    return Ended::Rejected(format!(
                        "server refused the token (HTTP {})",
                        response.status().as_u16()
                    ));
                }
                Ok(Err(e)) => return Ended::Closed(e.to_string()),
                Ok(Ok((ws, _response))) => ws,
            },
        };

        let mut phase = Phase::AwaitingOpen;
        let mut liveness = FALLBACK_LIVENESS;
        let mut deadline = Instant::now() + self.handshake_timeout;

        loop {
            tokio::select! {
                _ = &mut self.shutdown => {
                    if phase == Phase::Ready {
                        let _ = ws.send(Message::text(protocol::DISCONNECT)).await;
                    }
                    let _ = ws.close(None).await;
                    return Ended::ByClient;
                }
                () = tokio::time::sleep_until(deadline) => {
                    let reason = if phase == Phase::Ready {
                        "ping timeout"
                    } else {
                        "handshake timed out"
                    };
                    return Ended::Closed(reason.to_string());
                }
                Some(message) = self.outbound.recv(), if phase == Phase::Ready => {
                    if let Err(e) = ws.send(Message::text(message.encode())).await {
                        return Ended::Closed(format!("send failed: {e}"));
                    }
                }
                frame = ws.next() => {
                    let text = match frame {
                        None => return Ended::Closed("connection closed".to_string()),
                        Some(Err(e)) => return Ended::Closed(e.to_string()),
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty())
                                .unwrap_or_else(|| "server closed the connection".to_string());
                            return Ended::Closed(reason);
                        }
                        Some(Ok(_)) => continue,
                    };
                    if phase == Phase::Ready {
                        deadline = Instant::now() + liveness;
                    }

                    let packet = match protocol::parse_packet(&text) {
                        Ok(packet) => packet,
                        Err(e) => {
                            tracing::debug!(attempt = self.attempt, error = %e, "ignoring unparseable frame");
                            continue;
                        }
                    };
                    match packet {
                        Packet::Open(handshake) => {
                            if phase != Phase::AwaitingOpen {
                                continue;
                            }
                            liveness = handshake.liveness_window();
                            tracing::debug!(attempt = self.attempt, sid = %handshake.sid, "engine.io session open");
                            self.emit(LinkEventKind::Opened);
                            let connect = protocol::encode_connect(&protocol::auth_payload(&self.token));
                            if let Err(e) = ws.send(Message::text(connect)).await {
                                return Ended::Closed(format!("send failed: {e}"));
                            }
                            phase = Phase::AwaitingAccept;
                        }
                        Packet::Ping => {
                            if let Err(e) = ws.send(Message::text(protocol::PONG)).await {
                                return Ended::Closed(format!("send failed: {e}"));
                            }
                        }
                        Packet::Close => {
                            return Ended::Closed("server closed the session".to_string());
                        }
                        Packet::Message(SocketPacket::Connect { .. }) => {
                            if phase == Phase::AwaitingOpen {
                                self.emit(LinkEventKind::Opened);
                            }
                            if phase != Phase::Ready {
                                phase = Phase::Ready;
                                deadline = Instant::now() + liveness;
                                self.emit(LinkEventKind::Accepted);
                            }
                        }
                        Packet::Message(SocketPacket::ConnectError { message }) => {
                            return Ended::Rejected(message);
                        }
                        Packet::Message(SocketPacket::Disconnect) => {
                            return Ended::Closed("server disconnected the client".to_string());
                        }
                        Packet::Message(SocketPacket::Event { name, args }) => {
                            self.emit(LinkEventKind::Event { name, args });
                        }
                        Packet::Message(SocketPacket::OtherNamespace { namespace }) => {
                            tracing::trace!(attempt = self.attempt, %namespace, "dropping packet for another namespace");
                        }
                        Packet::Pong | Packet::Noop | Packet::Message(SocketPacket::Unsupported(_)) => {}
                    }
                }
            }
        }
    }
}
