//! Model Relay
//!
//! The long-lived WebSocket endpoint that authenticates bearer tokens,
//! forwards chat messages to the configured provider, and streams tokens
//! back to the client.
//!
//! # Connection State Machine
//!
//! ```text
//! Connected ──AUTH ok──▶ Authenticated ──chat──▶ Streaming
//!     │                        ▲                     │
//!     │ AUTH bad / chat        └──────[END]──────────┘ (Idle)
//!     ▼                                              │
//!   Closed ◀──────────── LOGOUT / disconnect ────────┘
//! ```
//!
//! Each connection owns its conversation memory; handlers share nothing
//! but the auth service. An unauthenticated connection never reaches the
//! provider (fail closed). `LOGOUT` clears memory and closes; a provider
//! failure is surfaced as an `[ERROR]` frame and the connection stays
//! open for retry.

pub mod protocol;

use std::sync::Arc;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn, Instrument};

use crate::auth::{AuthService, UserView};
use crate::backend::{ProviderClient, StreamToken};
use crate::conversation::Conversation;
use crate::errors::RelayError;
use crate::security::{GatewayLimits, InputValidator};
use self::protocol::{ClientFrame, AUTH_OK, END_OF_TURN};

/// Unique identifier for a relay connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a new random connection ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn-{}", uuid::Uuid::new_v4()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection bookkeeping held by the server.
struct ConnectionState {
    /// Handle to abort the connection task on shutdown.
    abort_handle: tokio::task::AbortHandle,
}

/// Authentication state of one connection.
enum ConnState {
    /// Socket open, handshake not yet completed.
    Connected,
    /// Handshake completed for this user.
    Authenticated(UserView),
}

/// The WebSocket relay server.
pub struct RelayServer {
    auth: Arc<AuthService>,
    provider: Arc<dyn ProviderClient>,
    limits: GatewayLimits,
    connections: Arc<DashMap<ConnectionId, ConnectionState>>,
}

impl RelayServer {
    /// Create a relay server.
    #[must_use]
    pub fn new(
        auth: Arc<AuthService>,
        provider: Arc<dyn ProviderClient>,
        limits: GatewayLimits,
    ) -> Self {
        Self {
            auth,
            provider,
            limits,
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Number of active connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Bind the relay listener. Exposed separately from [`Self::run`] so
    /// callers (and tests) can bind port 0 and read the assigned address.
    pub async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Relay listening");
        Ok(listener)
    }

    /// Run the accept loop until `shutdown` is notified.
    pub async fn run(&self, listener: TcpListener, shutdown: Arc<Notify>) -> anyhow::Result<()> {
        if !self.provider.health_check().await {
            warn!(provider = self.provider.name(), "Provider health check failed at startup");
        }

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("Shutdown requested, stopping accept loop");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };

                    if self.connections.len() >= self.limits.max_connections {
                        warn!(peer = %peer, "Connection limit reached, rejecting");
                        drop(stream);
                        continue;
                    }

                    let conn_id = ConnectionId::new();
                    info!(
                        conn_id = %conn_id,
                        peer = %peer,
                        active_connections = self.connections.len() + 1,
                        "New connection accepted"
                    );

                    let auth = Arc::clone(&self.auth);
                    let provider = Arc::clone(&self.provider);
                    let limits = self.limits.clone();
                    let connections = Arc::clone(&self.connections);
                    let conn_id_task = conn_id.clone();

                    let task = tokio::spawn(
                        async move {
                            if let Err(e) =
                                handle_connection(stream, auth, provider, &limits).await
                            {
                                debug!(error = %e, "Connection ended with error");
                            }
                            connections.remove(&conn_id_task);
                        }
                        .instrument(tracing::info_span!("connection", %conn_id)),
                    );

                    self.connections.insert(
                        conn_id,
                        ConnectionState {
                            abort_handle: task.abort_handle(),
                        },
                    );
                }
            }
        }

        // Abort remaining handlers; their conversation memory goes with them.
        let ids: Vec<ConnectionId> = self.connections.iter().map(|r| r.key().clone()).collect();
        for conn_id in ids {
            if let Some((_, state)) = self.connections.remove(&conn_id) {
                info!(conn_id = %conn_id, "Aborting connection");
                state.abort_handle.abort();
            }
        }

        info!("Relay shut down");
        Ok(())
    }
}

/// Handle a single client connection through its whole lifecycle.
async fn handle_connection(
    stream: TcpStream,
    auth: Arc<AuthService>,
    provider: Arc<dyn ProviderClient>,
    limits: &GatewayLimits,
) -> anyhow::Result<()> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(limits.max_frame_bytes),
        max_frame_size: Some(limits.max_frame_bytes),
        ..WebSocketConfig::default()
    };
    let ws_stream =
        tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let validator = InputValidator::new(limits.clone());
    let mut state = ConnState::Connected;
    let mut conversation = Conversation::with_limits(
        limits.max_conversation_turns,
        limits.max_conversation_bytes,
    );

    info!("Connection handler started");

    'conn: while let Some(incoming) = ws_rx.next().await {
        let message = match incoming {
            Ok(message) => message,
            Err(e) => {
                // Transport-level break: memory is discarded with the handler.
                debug!(error = %e, "Read error");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => {
                debug!("Client closed connection");
                break;
            }
            Message::Ping(payload) => {
                ws_tx.send(Message::Pong(payload)).await?;
                continue;
            }
            Message::Pong(_) => continue,
            other => {
                warn!(frame = ?other, "Non-text frame rejected");
                let err = RelayError::Protocol("text frames only".to_string());
                ws_tx.send(Message::Text(err.to_frame())).await?;
                continue;
            }
        };

        match ClientFrame::classify(&text) {
            ClientFrame::Logout => {
                // The only persistence-clearing operation: in-memory turns
                // for this connection, not the auth session.
                conversation.clear();
                info!("Logout control frame, clearing memory and closing");
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }

            ClientFrame::Auth(token) => match state {
                ConnState::Connected => match auth.validate(token) {
                    Ok(user) => {
                        info!(username = %user.username, "Connection authenticated");
                        state = ConnState::Authenticated(user);
                        ws_tx.send(Message::Text(AUTH_OK.to_string())).await?;
                    }
                    Err(_) => {
                        warn!("Handshake with invalid token, closing");
                        let err = RelayError::Unauthenticated;
                        ws_tx.send(Message::Text(err.to_frame())).await?;
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                },
                ConnState::Authenticated(_) => {
                    let err = RelayError::Protocol("already authenticated".to_string());
                    ws_tx.send(Message::Text(err.to_frame())).await?;
                }
            },

            ClientFrame::Chat(content) => {
                let ConnState::Authenticated(ref user) = state else {
                    // Fail closed: nothing reaches the provider without a
                    // valid handshake.
                    warn!("Chat before handshake, closing");
                    let err = RelayError::Unauthenticated;
                    ws_tx.send(Message::Text(err.to_frame())).await?;
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };

                let validation = validator.validate_chat_message(content);
                if let Some(reason) = validation.error_message() {
                    let err = RelayError::Protocol(reason.to_string());
                    ws_tx.send(Message::Text(err.to_frame())).await?;
                    continue;
                }

                debug!(username = %user.username, len = content.len(), "Chat message");
                conversation.push_user(content);

                let mut rx = match provider.generate(conversation.turns()).await {
                    Ok(rx) => rx,
                    Err(e) => {
                        warn!(error = %e, "Provider request failed");
                        let err = RelayError::Provider(e.to_string());
                        ws_tx.send(Message::Text(err.to_frame())).await?;
                        continue;
                    }
                };

                conversation.begin_assistant();
                let timeout = limits.provider_timeout();

                // Streaming state: deliver tokens in generation order while
                // staying responsive to LOGOUT and disconnects.
                loop {
                    tokio::select! {
                        token = tokio::time::timeout(timeout, rx.recv()) => match token {
                            Err(_) => {
                                warn!(after = ?timeout, "Provider token wait timed out");
                                conversation.cancel_assistant();
                                let err = RelayError::ProviderTimeout;
                                ws_tx.send(Message::Text(err.to_frame())).await?;
                                break;
                            }
                            Ok(None) => {
                                warn!("Provider stream ended without completion");
                                conversation.cancel_assistant();
                                let err = RelayError::Provider(
                                    "stream ended unexpectedly".to_string(),
                                );
                                ws_tx.send(Message::Text(err.to_frame())).await?;
                                break;
                            }
                            Ok(Some(StreamToken::Token(token))) => {
                                conversation.append_streaming(&token);
                                ws_tx.send(Message::Text(token)).await?;
                            }
                            Ok(Some(StreamToken::Complete { message })) => {
                                conversation.complete_assistant(Some(message));
                                ws_tx.send(Message::Text(END_OF_TURN.to_string())).await?;
                                break;
                            }
                            Ok(Some(StreamToken::Error(e))) => {
                                warn!(error = %e, "Provider error mid-stream");
                                conversation.cancel_assistant();
                                let err = RelayError::Provider(e);
                                ws_tx.send(Message::Text(err.to_frame())).await?;
                                break;
                            }
                        },

                        interrupt = ws_rx.next() => match interrupt {
                            Some(Ok(Message::Text(text)))
                                if ClientFrame::classify(&text) == ClientFrame::Logout =>
                            {
                                // Cancels the in-flight stream; partial output
                                // already sent is not retracted.
                                info!("Logout during streaming");
                                conversation.clear();
                                let _ = ws_tx.send(Message::Close(None)).await;
                                break 'conn;
                            }
                            Some(Ok(Message::Text(_))) => {
                                let err = RelayError::Protocol(
                                    "a response is still streaming".to_string(),
                                );
                                ws_tx.send(Message::Text(err.to_frame())).await?;
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                ws_tx.send(Message::Pong(payload)).await?;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client went away during streaming");
                                break 'conn;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                debug!(error = %e, "Read error during streaming");
                                break 'conn;
                            }
                        },
                    }
                }
                // Dropping the receiver cancels anything still in flight.
                drop(rx);
            }
        }
    }

    info!("Connection handler finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_format() {
        let id = ConnectionId::new();
        let formatted = format!("{id}");
        assert!(formatted.starts_with("conn-"), "should carry conn- prefix");
        // conn- (5 chars) + UUID (36 chars)
        assert_eq!(formatted.len(), 41);
    }

    #[test]
    fn test_connection_id_uniqueness() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }
}
