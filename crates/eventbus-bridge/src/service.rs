//! Bridge service - HTTP listener hosting the WebSocket route and health check.

use crate::bridge::EventBusBridge;
use crate::domain::config::ServiceConfig;
use crate::domain::error::BridgeError;
use crate::ports::identity::IdentityProvider;
use crate::ws::{bearer_token, WebSocketHandler};
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    bridge: EventBusBridge,
    identities: Arc<dyn IdentityProvider>,
    config: Arc<ServiceConfig>,
}

/// HTTP front end for an [`EventBusBridge`].
pub struct BridgeService {
    config: ServiceConfig,
    bridge: EventBusBridge,
    identities: Arc<dyn IdentityProvider>,
}

impl BridgeService {
    pub fn new(
        config: ServiceConfig,
        bridge: EventBusBridge,
        identities: Arc<dyn IdentityProvider>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self {
            config,
            bridge,
            identities,
        })
    }

    /// Router with the WebSocket route and `/health`.
    pub fn router(&self) -> Router {
        let state = AppState {
            bridge: self.bridge.clone(),
            identities: Arc::clone(&self.identities),
            config: Arc::new(self.config.clone()),
        };

        Router::new()
            .route(&self.config.path, get(ws_upgrade))
            .route("/health", get(health_check))
            .with_state(state)
    }

    /// Bind and serve in the background.
    pub async fn start(&self) -> Result<ServiceHandle, BridgeError> {
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Bind(format!("{addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BridgeError::Bind(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let router = self.router();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(addr = %local_addr, path = %self.config.path, "Bridge service listening");

        Ok(ServiceHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }
}

/// Handle to a running [`BridgeService`].
pub struct ServiceHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServiceHandle {
    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the server to finish.
    pub async fn shutdown(mut self) -> Result<(), BridgeError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.wait().await
    }

    /// Wait for the server to stop.
    pub async fn wait(self) -> Result<(), BridgeError> {
        match self.task.await {
            Ok(Ok(())) => {
                info!("Bridge service stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Bridge service failed");
                Err(BridgeError::Server(e.to_string()))
            }
            Err(e) => Err(BridgeError::Server(e.to_string())),
        }
    }
}

/// Upgrade to WebSocket, resolving the caller's identity from a bearer
/// header or, for browsers, a `token` query parameter.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = bearer_token(&headers).or_else(|| params.get("token").cloned());
    let identity = state.identities.resolve(token.as_deref());
    let handler = WebSocketHandler::new(state.bridge.clone(), identity, state.config.send_queue);

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handler.handle(socket))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "eventbus-bridge",
        "version": env!("CARGO_PKG_VERSION"),
        "liveSockets": state.bridge.live_sockets(),
    }))
}
