use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::protocol::{ClientEvent, ServerEvent};

const RECONNECT_DELAY_SECS: u64 = 3;

/// Internal message type for the write channel
enum WriteMessage {
    Data(String),
    Close,
}

/// Socket client for the Ripple gateway.
///
/// Owns the reconnect loop and the authenticated handshake; incoming
/// events are handed to the embedder through the channel passed to
/// [`SocketClient::connect`].
pub struct SocketClient {
    server_url: String,
    token: String,
    /// std Mutex so `send` works from non-async callers
    write_tx: Arc<StdMutex<Option<mpsc::UnboundedSender<WriteMessage>>>>,
    connected: Arc<TokioMutex<bool>>,
    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,
}

impl SocketClient {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            server_url: server_url.into(),
            token: token.into(),
            write_tx: Arc::new(StdMutex::new(None)),
            connected: Arc::new(TokioMutex::new(false)),
            shutdown_tx,
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.lock().await
    }

    /// Connect to the gateway, delivering every server event to `events`.
    /// Reconnects with a fixed delay until `disconnect` is called.
    pub async fn connect(&self, events: mpsc::UnboundedSender<ServerEvent>) {
        let server_url = self.server_url.clone();
        let token = self.token.clone();
        let write_tx = self.write_tx.clone();
        let connected = self.connected.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!("Shutdown signal received, stopping reconnection");
                    break;
                }

                info!(url = %server_url, "Connecting to Ripple gateway");

                match connect_async(&server_url).await {
                    Ok((ws_stream, _)) => {
                        let (mut ws_write, mut ws_read) = ws_stream.split();

                        // Handshake: present the credential and wait for the verdict
                        let connect_event = ClientEvent::Connect {
                            token: token.clone(),
                        };
                        let Ok(connect_json) = serde_json::to_string(&connect_event) else {
                            error!("Failed to serialize connect event");
                            break;
                        };
                        if ws_write
                            .send(Message::Text(connect_json.into()))
                            .await
                            .is_err()
                        {
                            error!("Failed to send connect event");
                            tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
                            continue;
                        }

                        match ws_read.next().await {
                            Some(Ok(Message::Text(response))) => {
                                match serde_json::from_str::<ServerEvent>(&response) {
                                    Ok(ServerEvent::AuthOk { user_id }) => {
                                        info!("Authenticated with gateway as {}", user_id);
                                    }
                                    Ok(ServerEvent::Error { message }) => {
                                        error!("Authentication rejected: {}", message);
                                        tokio::time::sleep(std::time::Duration::from_secs(
                                            RECONNECT_DELAY_SECS,
                                        ))
                                        .await;
                                        continue;
                                    }
                                    _ => {
                                        warn!("Unexpected response during handshake");
                                    }
                                }
                            }
                            _ => {
                                warn!("Connection closed during handshake");
                                tokio::time::sleep(std::time::Duration::from_secs(
                                    RECONNECT_DELAY_SECS,
                                ))
                                .await;
                                continue;
                            }
                        }

                        *connected.lock().await = true;

                        // Channel for outgoing events
                        let (tx, mut rx) = mpsc::unbounded_channel::<WriteMessage>();
                        {
                            let mut guard = write_tx.lock().unwrap();
                            *guard = Some(tx);
                        }

                        let mut should_reconnect = true;
                        loop {
                            tokio::select! {
                                _ = shutdown_rx.recv() => {
                                    info!("Shutdown signal received, closing connection gracefully");
                                    let _ = ws_write.send(Message::Close(None)).await;
                                    should_reconnect = false;
                                    break;
                                }
                                Some(msg) = rx.recv() => {
                                    match msg {
                                        WriteMessage::Data(data) => {
                                            if ws_write.send(Message::Text(data.into())).await.is_err() {
                                                error!("Failed to send event to gateway");
                                                break;
                                            }
                                        }
                                        WriteMessage::Close => {
                                            let _ = ws_write.send(Message::Close(None)).await;
                                            should_reconnect = false;
                                            break;
                                        }
                                    }
                                }
                                msg = ws_read.next() => {
                                    match msg {
                                        Some(Ok(Message::Text(text))) => {
                                            match serde_json::from_str::<ServerEvent>(&text) {
                                                Ok(event) => {
                                                    if events.send(event).is_err() {
                                                        // Embedder hung up; no point staying connected
                                                        should_reconnect = false;
                                                        break;
                                                    }
                                                }
                                                Err(e) => {
                                                    debug!(error = %e, "Ignoring unparseable frame");
                                                }
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | None => {
                                            info!("Gateway closed connection");
                                            break;
                                        }
                                        Some(Err(e)) => {
                                            error!(error = %e, "WebSocket error");
                                            break;
                                        }
                                        _ => {}
                                    }
                                }
                            }
                        }

                        // Cleanup
                        {
                            let mut guard = write_tx.lock().unwrap();
                            *guard = None;
                        }
                        *connected.lock().await = false;
                        info!("Disconnected from gateway");

                        if !should_reconnect {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, url = %server_url, "Failed to connect to gateway");
                    }
                }

                debug!("Reconnecting in {} seconds", RECONNECT_DELAY_SECS);
                tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
            }
        });
    }

    /// Gracefully disconnect and stop reconnecting.
    pub fn disconnect(&self) {
        info!("Initiating graceful disconnect");
        let _ = self.shutdown_tx.send(());
        if let Ok(guard) = self.write_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(WriteMessage::Close);
            }
        }
    }

    /// Send an event to the gateway.
    pub fn send(&self, event: ClientEvent) -> Result<(), String> {
        let json = serde_json::to_string(&event).map_err(|e| e.to_string())?;
        debug!(len = json.len(), "Sending event to gateway");

        let guard = self
            .write_tx
            .lock()
            .map_err(|e| format!("Lock poisoned: {}", e))?;

        if let Some(tx) = guard.as_ref() {
            tx.send(WriteMessage::Data(json))
                .map_err(|e| format!("Failed to send to gateway: {}", e))?;
            Ok(())
        } else {
            warn!("Cannot send event: not connected to gateway");
            Err("Not connected to gateway".to_string())
        }
    }
}
