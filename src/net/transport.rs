//! WebSocket transport: accepts connections, feeds inbound frames to the
//! command router, and drains each connection's outbound queue.
//!
//! A connection gets two tasks: a reader that parses JSON text frames and
//! dispatches commands, and a writer that forwards queued frames to the
//! socket. Write failures and slow peers are isolated to their own
//! connection and never touch shared state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::net::commands::{self, SharedSession};
use crate::net::protocol::{ClientMessage, ServerMessage};
use crate::net::session::{ConnId, Outbound, RaceSession, OUTBOUND_QUEUE};

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// WebSocket server owning the shared session.
pub struct WsServer {
    config: ServerConfig,
    session: SharedSession,
}

impl WsServer {
    pub fn new(config: ServerConfig) -> Self {
        let session = Arc::new(RwLock::new(RaceSession::new(config.horse_count)));
        Self { config, session }
    }

    /// Handle to the shared session (used by tests and tooling).
    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    /// Accept connections forever.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(addr).await?;
        info!("WebSocket server listening on {}", addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            let session = self.session.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, session).await {
                    debug!("Connection from {} ended: {}", peer, e);
                }
            });
        }
    }
}

/// Serve a single client socket until it closes.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    session: SharedSession,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let conn: ConnId = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    debug!("Connection accepted from {} (conn_id: {})", peer, conn);

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE);

    // Writer task: drains this connection's queue. A failed write only
    // ends this task; the broadcaster keeps skipping the dead queue.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Register and push the initial snapshot before any command can land.
    {
        let mut guard = session.write().await;
        guard.register_connection(conn, tx);
        guard.send_to(
            conn,
            &ServerMessage::State {
                payload: guard.public_state(),
            },
        );
    }

    while let Some(frame) = ws_rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Read error on conn {}: {}", conn, e);
                break;
            }
        };
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => commands::dispatch(&session, conn, message).await,
                Err(e) => {
                    // Well-formed JSON we don't recognize gets a notice;
                    // anything else is dropped. The connection stays open.
                    if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
                        session.read().await.send_to(
                            conn,
                            &ServerMessage::Notice {
                                message: "Unknown message type".to_string(),
                            },
                        );
                    } else {
                        debug!("Dropping malformed message on conn {}: {}", conn, e);
                    }
                }
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
        }
    }

    // Ordinary disconnect: the player record persists for reattachment.
    {
        let mut guard = session.write().await;
        guard.disconnect(conn);
        guard.broadcast_state();
    }
    writer.abort();
    debug!("Connection closed (conn_id: {})", conn);
    Ok(())
}
