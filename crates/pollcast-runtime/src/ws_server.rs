use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pollcast_core::{DeliveryGateway, Snapshot, Subscriber};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::cli::{DEFAULT_MAX_CONNECTIONS, DEFAULT_PING_INTERVAL, DEFAULT_PING_TIMEOUT};
use crate::protocol::{ClientEvent, ServerEvent};

// ---------------------------------------------------------------------------
// WsServer
// ---------------------------------------------------------------------------

/// WebSocket server for the push delivery channel.
///
/// Each accepted connection becomes one hub subscriber: it receives the
/// full history on connect, a `message-update` after every append, and may
/// post with `new-message` frames.
pub struct WsServer {
    addr: SocketAddr,
    gateway: Arc<DeliveryGateway>,
    cancel: CancellationToken,
    max_connections: usize,
    heartbeat: Heartbeat,
}

/// Server-initiated liveness check. A client that sends nothing (not even a
/// Pong) for `timeout` is disconnected and unsubscribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PING_INTERVAL,
            timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

impl WsServer {
    pub fn new(addr: SocketAddr, gateway: Arc<DeliveryGateway>, cancel: CancellationToken) -> Self {
        Self {
            addr,
            gateway,
            cancel,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            heartbeat: Heartbeat::default(),
        }
    }

    /// Set the ping interval and the silence after which a client is dropped.
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        self.heartbeat = Heartbeat {
            interval,
            timeout: timeout.max(interval),
        };
        self
    }

    /// Set the maximum number of concurrent WebSocket connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Bind to the configured address and return the actual local address.
    /// Useful when binding to port 0 to get an OS-assigned ephemeral port.
    pub async fn bind(&self) -> std::io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, max_connections = self.max_connections, "ws server bound");
        Ok((listener, local_addr))
    }

    /// Run the accept loop on a pre-bound listener until the cancellation
    /// token fires.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_connections));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let permit = match semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    tracing::warn!(
                                        peer = %peer,
                                        max = self.max_connections,
                                        "ws: connection limit reached, rejecting"
                                    );
                                    drop(stream);
                                    continue;
                                }
                            };
                            tracing::debug!(peer = %peer, "ws: TCP connection accepted");
                            let gateway = Arc::clone(&self.gateway);
                            let cancel = self.cancel.clone();
                            let heartbeat = self.heartbeat;
                            tokio::spawn(async move {
                                let _permit = permit;
                                let handshake = tokio::time::timeout(
                                    heartbeat.timeout,
                                    tokio_tungstenite::accept_async(stream),
                                );
                                match handshake.await {
                                    Ok(Ok(ws_stream)) => {
                                        if let Err(e) = handle_ws_client(ws_stream, gateway, cancel, heartbeat, peer).await {
                                            tracing::debug!(peer = %peer, error = %e, "ws client handler finished with error");
                                        }
                                    }
                                    Ok(Err(e)) => {
                                        tracing::debug!(peer = %peer, error = %e, "ws handshake failed");
                                    }
                                    Err(_) => {
                                        tracing::debug!(peer = %peer, "ws handshake timed out");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "ws: TCP accept failed");
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("ws server: cancellation requested, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-client handler
// ---------------------------------------------------------------------------

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn handle_ws_client(
    ws_stream: WebSocketStream<TcpStream>,
    gateway: Arc<DeliveryGateway>,
    cancel: CancellationToken,
    heartbeat: Heartbeat,
    peer: SocketAddr,
) -> Result<(), BoxError> {
    let subscriber = gateway.on_connect().await;
    let id = subscriber.id();
    tracing::info!(peer = %peer, subscriber = id, "client connected via websocket");

    let result = pump(ws_stream, &gateway, subscriber, &cancel, heartbeat).await;

    gateway.on_disconnect(id).await;
    tracing::info!(peer = %peer, subscriber = id, "client disconnected");
    result
}

async fn pump(
    ws_stream: WebSocketStream<TcpStream>,
    gateway: &DeliveryGateway,
    mut subscriber: Subscriber,
    cancel: &CancellationToken,
    heartbeat: Heartbeat,
) -> Result<(), BoxError> {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut initial_sent = false;

    let mut ping = tokio::time::interval_at(Instant::now() + heartbeat.interval, heartbeat.interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            // --- incoming WebSocket message ---
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "ws read error, dropping client");
                        return Err(e.into());
                    }
                    None => {
                        tracing::debug!("ws client disconnected (stream ended)");
                        return Ok(());
                    }
                };
                last_seen = Instant::now();

                let text = match msg {
                    Message::Text(t) => t,
                    Message::Close(_) => {
                        tracing::debug!("ws client sent close frame");
                        return Ok(());
                    }
                    Message::Ping(data) => {
                        ws_tx.send(Message::Pong(data)).await?;
                        continue;
                    }
                    _ => continue,
                };

                if let Some(reply) = handle_client_frame(gateway, &text).await {
                    ws_tx.send(Message::Text(reply.to_json()?)).await?;
                }
            }

            // --- delivery from the hub ---
            delivery = subscriber.recv() => {
                let Some(snapshot) = delivery else {
                    // The hub gave up on this client (queue full).
                    tracing::debug!(subscriber = subscriber.id(), "ws subscriber dropped by hub, closing");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                };
                let event = delivery_event(snapshot, initial_sent);
                initial_sent = true;
                ws_tx.send(Message::Text(event.to_json()?)).await?;
            }

            // --- heartbeat ---
            _ = ping.tick() => {
                if last_seen.elapsed() >= heartbeat.timeout {
                    tracing::debug!(
                        subscriber = subscriber.id(),
                        silent_ms = last_seen.elapsed().as_millis() as u64,
                        "ws client missed heartbeat, dropping"
                    );
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                }
                ws_tx.send(Message::Ping(Vec::new())).await?;
            }

            // --- cancellation ---
            _ = cancel.cancelled() => {
                tracing::debug!("ws client handler: cancellation requested");
                let _ = ws_tx.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}

/// The first delivery on a connection is the history; the rest are updates.
fn delivery_event(snapshot: Snapshot, initial_sent: bool) -> ServerEvent {
    if initial_sent {
        ServerEvent::MessageUpdate(snapshot)
    } else {
        ServerEvent::InitialMessages(snapshot)
    }
}

/// Apply one client text frame. Returns an error event to send back, if any.
/// Successful posts need no reply: the broadcast reaches the sender too.
async fn handle_client_frame(gateway: &DeliveryGateway, text: &str) -> Option<ServerEvent> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(ev) => ev,
        Err(e) => return Some(ServerEvent::Error(format!("parse error: {e}"))),
    };

    match event {
        ClientEvent::NewMessage(body) => match gateway.on_message(&body).await {
            Ok(message) => {
                tracing::info!(text = %message.text, timestamp = %message.timestamp, "new message via websocket");
                None
            }
            Err(e) => Some(ServerEvent::Error(e.to_string())),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
