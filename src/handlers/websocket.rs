use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use warp::ws::{Message, WebSocket};

use crate::config::RelayConfig;
use crate::core::connection::Connection;
use crate::core::registry::{RegistrationGuard, SharedRegistry};

/// Per-connection delivery settings
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Outbound frames buffered before sends start to wait
    pub send_buffer: usize,
    /// How long a close frame may take to flush at shutdown
    pub close_timeout: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            send_buffer: config.send_buffer,
            close_timeout: config.send_timeout,
        }
    }
}

// Why a handler stopped waiting on its client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    StreamEnded,
    TransportError,
    ServerShutdown,
}

// Handle an upgraded WebSocket connection until it closes
pub async fn handle_ws_client(
    ws: WebSocket,
    registry: SharedRegistry,
    settings: ConnectionSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Message>(settings.send_buffer.max(1));

    // Forward queued frames to the socket. Ends once every sender is gone,
    // the socket fails, or a close frame has been written.
    let mut writer = tokio::task::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = message.is_close();
            if let Err(e) = ws_tx.send(message).await {
                debug!("Failed to write WebSocket frame: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    if *shutdown.borrow() {
        debug!("Rejecting connection, relay is shutting down");
        let _ = tx.send(Message::close()).await;
        return;
    }

    let connection = Arc::new(Connection::new(tx));
    let guard = RegistrationGuard::register(registry, connection.clone());
    info!("Client connected: {}", guard.id());

    let reason = loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(msg)) if msg.is_close() => break CloseReason::ClientClosed,
                Some(Ok(msg)) => {
                    // Clients have nothing to say to the relay
                    debug!(
                        "Ignoring {} byte frame from client {}",
                        msg.as_bytes().len(),
                        guard.id()
                    );
                }
                Some(Err(e)) => {
                    warn!("WebSocket error from client {}: {}", guard.id(), e);
                    break CloseReason::TransportError;
                }
                None => break CloseReason::StreamEnded,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break CloseReason::ServerShutdown;
                }
            }
        }
    };

    if reason == CloseReason::ServerShutdown {
        if let Err(e) = connection
            .sender
            .send_timeout(Message::close(), settings.close_timeout)
            .await
        {
            debug!("Could not queue close frame for client {}: {}", guard.id(), e);
        }
        if tokio::time::timeout(settings.close_timeout, &mut writer).await.is_err() {
            debug!("Close frame for client {} did not flush in time", guard.id());
        }
    }

    info!(
        "Client disconnected: {} ({:?} after {:?})",
        guard.id(),
        reason,
        connection.connection_duration()
    );
    drop(guard);
}
