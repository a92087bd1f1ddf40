//! # WebSocket Transport
//!
//! Real WebSocket clients (`tokio-tungstenite`) against the axum service bound
//! on an ephemeral port.

#[cfg(test)]
mod tests {
    use super::super::harness::WAIT;
    use eventbus_bridge::{
        BridgeOptions, BridgeService, EventBusBridge, IdentityEntry, PermittedOptions,
        ServiceConfig, ServiceHandle, TokenIdentityProvider,
    };
    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use shared_bus::{DeliveryOptions, EventBus, InMemoryEventBus};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start(options: BridgeOptions) -> (Arc<InMemoryEventBus>, EventBusBridge, ServiceHandle) {
        let bus = Arc::new(InMemoryEventBus::new());
        let bridge = EventBusBridge::new(bus.clone(), options).unwrap();
        let config = ServiceConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            ..ServiceConfig::default()
        };
        let identities = Arc::new(TokenIdentityProvider::new([IdentityEntry {
            token: "secret".to_string(),
            name: "ops-bot".to_string(),
            roles: vec!["ops".to_string()],
            permissions: vec![],
        }]));
        let service = BridgeService::new(config, bridge.clone(), identities).unwrap();
        let handle = service.start().await.unwrap();
        (bus, bridge, handle)
    }

    async fn connect(handle: &ServiceHandle, query: &str) -> Ws {
        let url = format!("ws://{}/eventbus{query}", handle.local_addr());
        let (ws, _) = connect_async(url).await.unwrap();
        ws
    }

    async fn send(ws: &mut Ws, frame: Value) {
        ws.send(Message::Text(frame.to_string())).await.unwrap();
    }

    async fn next(ws: &mut Ws) -> Value {
        loop {
            let message = tokio::time::timeout(WAIT, ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            match message {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_register_and_receive_over_websocket() {
        let options = BridgeOptions::default()
            .add_inbound_permitted(PermittedOptions::new().address("ticker"))
            .add_outbound_permitted(PermittedOptions::new().address("ticker"));
        let (bus, bridge, handle) = start(options).await;
        let mut ws = connect(&handle, "").await;

        send(&mut ws, json!({"type": "register", "address": "ticker"})).await;
        wait_for(|| bus.consumer_count("ticker") == 1).await;

        bus.publish("ticker", json!({"p": 101}), DeliveryOptions::default())
            .await;
        assert_eq!(
            next(&mut ws).await,
            json!({"type": "rec", "address": "ticker", "body": {"p": 101}})
        );

        // Binary frames carry the same envelopes
        ws.send(Message::Binary(b"{\"type\":\"bogus\",\"address\":\"x\"}".to_vec()))
            .await
            .unwrap();
        assert_eq!(next(&mut ws).await, json!({"type": "err", "body": "invalid_type"}));

        ws.close(None).await.unwrap();
        wait_for(|| bus.consumer_count("ticker") == 0).await;
        wait_for(|| bridge.live_sockets() == 0).await;
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_token_resolves_identity() {
        let options = BridgeOptions::default()
            .add_inbound_permitted(PermittedOptions::new().address("ops").required_role("ops"));
        let (bus, _bridge, handle) = start(options).await;
        let mut ops = bus.consume("ops");

        let mut anonymous = connect(&handle, "").await;
        send(&mut anonymous, json!({"type": "send", "address": "ops", "body": 1})).await;
        assert_eq!(next(&mut anonymous).await["body"], json!("no_session"));

        let mut stranger = connect(&handle, "?token=guess").await;
        send(&mut stranger, json!({"type": "send", "address": "ops", "body": 2})).await;
        assert_eq!(next(&mut stranger).await["body"], json!("not_logged_in"));

        let mut bot = connect(&handle, "?token=secret").await;
        send(&mut bot, json!({"type": "send", "address": "ops", "body": 3})).await;
        let message = tokio::time::timeout(WAIT, ops.recv()).await.unwrap().unwrap();
        assert_eq!(message.body, json!(3));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_bus, bridge, handle) = start(BridgeOptions::default()).await;
        let _ws = connect(&handle, "").await;
        wait_for(|| bridge.live_sockets() == 1).await;

        let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        tokio::time::timeout(WAIT, stream.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"status\":\"healthy\""));
        assert!(response.contains("\"liveSockets\":1"));
    }
}
