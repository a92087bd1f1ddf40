//! WebSocket connection handler.

use crate::bridge::EventBusBridge;
use crate::ports::identity::Identity;
use crate::ports::socket::{BridgeSocket, ChannelSocket, OutboundFrame, TransportEvent};
use axum::extract::ws::{Message, WebSocket};
use axum::http::{header, HeaderMap};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// WebSocket connection handler
pub struct WebSocketHandler {
    bridge: EventBusBridge,
    identity: Option<Arc<dyn Identity>>,
    send_queue: usize,
}

impl WebSocketHandler {
    pub fn new(
        bridge: EventBusBridge,
        identity: Option<Arc<dyn Identity>>,
        send_queue: usize,
    ) -> Self {
        Self {
            bridge,
            identity,
            send_queue,
        }
    }

    /// Handle a WebSocket connection until either side closes it.
    pub async fn handle(self, socket: WebSocket) {
        let (mut sink, mut stream) = socket.split();
        let (channel, mut outbound) = ChannelSocket::new(self.identity, self.send_queue);
        let socket_id = channel.id();
        let (events_tx, events_rx) = mpsc::channel::<TransportEvent>(self.send_queue);

        info!(socket_id = %socket_id, "New WebSocket connection");

        let session = self
            .bridge
            .spawn_socket(Arc::clone(&channel) as Arc<dyn BridgeSocket>, events_rx);

        // Writer task: drain the outbound queue into the socket, then close
        let writer = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                loop {
                    let frame = tokio::select! {
                        biased;
                        frame = outbound.recv() => frame,
                        _ = channel.closed() => Some(OutboundFrame::Close),
                    };
                    match frame {
                        Some(OutboundFrame::Text(text)) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                debug!(socket_id = %socket_id, error = %e, "WebSocket write failed");
                                break;
                            }
                        }
                        Some(OutboundFrame::Close) => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                        None => break,
                    }
                }
            })
        };

        // Reader: feed frames to the session in order
        loop {
            let next = tokio::select! {
                _ = channel.closed() => break,
                next = stream.next() => next,
            };

            let event = match next {
                Some(Ok(Message::Text(text))) => TransportEvent::Frame(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => TransportEvent::Frame(data),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    debug!(socket_id = %socket_id, "WebSocket close received");
                    break;
                }
                Some(Err(e)) => {
                    warn!(socket_id = %socket_id, error = %e, "WebSocket error");
                    TransportEvent::Error(e.to_string())
                }
            };

            let failed = matches!(event, TransportEvent::Error(_));
            if events_tx.send(event).await.is_err() || failed {
                break;
            }
        }

        // Dropping the sender is the close notification
        drop(events_tx);
        if let Err(e) = session.await {
            error!(socket_id = %socket_id, error = %e, "Bridge session task failed");
        }
        channel.close();
        if writer.await.is_err() {
            debug!(socket_id = %socket_id, "Writer task aborted");
        }

        info!(socket_id = %socket_id, "WebSocket connection closed");
    }
}
