//! # Bridge Flows
//!
//! End-to-end scenarios: clients on in-memory sockets, the bridge, and
//! services living directly on the shared bus.
//!
//! ## Covered
//!
//! 1. **Default deny**: empty rule lists refuse every inbound action
//! 2. **Rule matching**: literal, regex and structural rules
//! 3. **Limits**: handler slots and address length
//! 4. **Reply trust**: request/reply through the bridge in both directions
//! 5. **Liveness**: idle sockets are closed, pinging ones are kept
//! 6. **Isolation**: one socket's teardown leaves the others untouched

#[cfg(test)]
mod tests {
    use super::super::harness::{Node, WAIT};
    use eventbus_bridge::{
        BridgeEvent, BridgeEventType, BridgeOptions, FnHook, Identity, PermittedOptions,
        StaticIdentity, MAX_REPLY_ADDRESS_LENGTH,
    };
    use serde_json::json;
    use shared_bus::{DeliveryOptions, EventBus, FailureType};
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn inbound(rule: PermittedOptions) -> BridgeOptions {
        BridgeOptions::default().add_inbound_permitted(rule)
    }

    fn both(address: &str) -> BridgeOptions {
        BridgeOptions::default()
            .add_inbound_permitted(PermittedOptions::new().address(address))
            .add_outbound_permitted(PermittedOptions::new().address(address))
    }

    // =============================================================================
    // DEFAULT DENY
    // =============================================================================

    #[tokio::test]
    async fn test_empty_rules_deny_every_action() {
        let node = Node::new(BridgeOptions::default());
        let mut client = node.connect(None);

        for frame in [
            json!({"type": "send", "address": "a", "body": {}}),
            json!({"type": "publish", "address": "a", "body": {}}),
            json!({"type": "register", "address": "a"}),
            json!({"type": "unregister", "address": "a"}),
        ] {
            client.send(frame).await;
            client.expect_error("access_denied").await;
        }
        assert_eq!(node.bus.total_consumers(), 0);
        client.close().await;
    }

    #[tokio::test]
    async fn test_end_to_end_news_scenario() {
        let node = Node::new(inbound(
            PermittedOptions::new().address("news.uk").matching(json!({})),
        ));
        let mut desk = node.bus.consume("news.uk");
        let mut client = node.connect(None);

        client
            .send(json!({"type": "send", "address": "news.uk", "body": {"headline": "x"}}))
            .await;
        let message = tokio::time::timeout(WAIT, desk.recv()).await.unwrap().unwrap();
        assert_eq!(message.address, "news.uk");
        assert_eq!(message.body, json!({"headline": "x"}));
        assert!(message.reply_address.is_none());

        client
            .send(json!({"type": "send", "address": "news.us", "body": {}}))
            .await;
        client.expect_error("access_denied").await;
        client.close().await;
    }

    // =============================================================================
    // RULE MATCHING
    // =============================================================================

    #[tokio::test]
    async fn test_structural_rule_without_address() {
        let node = Node::new(inbound(PermittedOptions::new().matching(json!({"a": {"b": 1}}))));
        let mut sink = node.bus.consume("anywhere");
        let mut client = node.connect(None);

        client
            .send(json!({"type": "send", "address": "anywhere", "body": {"a": {"b": 2}}}))
            .await;
        client.expect_error("access_denied").await;

        client
            .send(json!({"type": "send", "address": "anywhere", "body": 5}))
            .await;
        client.expect_error("access_denied").await;

        client
            .send(json!({"type": "send", "address": "anywhere", "body": {"a": {"b": 1, "c": 2}}}))
            .await;
        let message = tokio::time::timeout(WAIT, sink.recv()).await.unwrap().unwrap();
        assert_eq!(message.body["a"]["c"], json!(2));
        client.close().await;
    }

    #[tokio::test]
    async fn test_regex_rule_is_full_match() {
        let node = Node::new(inbound(PermittedOptions::new().address_regex("news\\.[a-z]+")));
        let mut sink = node.bus.consume("news.fr");
        let mut client = node.connect(None);

        client
            .send(json!({"type": "publish", "address": "xnews.fr", "body": 1}))
            .await;
        client.expect_error("access_denied").await;
        client
            .send(json!({"type": "publish", "address": "news.fr.extra", "body": 1}))
            .await;
        client.expect_error("access_denied").await;

        client
            .send(json!({"type": "publish", "address": "news.fr", "body": 1}))
            .await;
        assert!(tokio::time::timeout(WAIT, sink.recv()).await.unwrap().is_some());
        client.close().await;
    }

    #[tokio::test]
    async fn test_first_matching_rule_decides() {
        // The role-free catch-all comes second, so "admin" still needs the role.
        let options = BridgeOptions::default()
            .add_inbound_permitted(PermittedOptions::new().address("admin").required_role("ops"))
            .add_inbound_permitted(PermittedOptions::new().address_regex(".*"));
        let node = Node::new(options);
        let identity: Arc<dyn Identity> = Arc::new(StaticIdentity::authenticated("eve"));
        let mut client = node.connect(Some(identity));

        client
            .send(json!({"type": "send", "address": "admin", "body": {}}))
            .await;
        client.expect_error("access_denied").await;

        let mut sink = node.bus.consume("public");
        client
            .send(json!({"type": "send", "address": "public", "body": {}}))
            .await;
        assert!(tokio::time::timeout(WAIT, sink.recv()).await.unwrap().is_some());
        client.close().await;
    }

    #[tokio::test]
    async fn test_role_rule_gates_pushes_not_registration() {
        let options = BridgeOptions::default()
            .add_inbound_permitted(PermittedOptions::new().address("feed").required_role("admin"))
            .add_outbound_permitted(PermittedOptions::new().address("feed").required_role("admin"));
        let node = Node::new(options);

        let mut guest = node.connect(None);
        guest.register("feed").await;
        node.consumers("feed", 1).await;
        guest.expect_silence().await;

        let admin: Arc<dyn Identity> =
            Arc::new(StaticIdentity::authenticated("root").with_role("admin"));
        let mut admin = node.connect(Some(admin));
        admin.register("feed").await;
        node.consumers("feed", 2).await;

        node.bus
            .publish("feed", json!({"alert": 1}), DeliveryOptions::default())
            .await;
        assert_eq!(admin.next().await["body"], json!({"alert": 1}));
        guest.expect_silence().await;
        assert_eq!(node.bridge.stats().pushes_filtered, 1);

        guest.close().await;
        admin.close().await;
    }

    #[tokio::test]
    async fn test_permission_gates_outbound_push() {
        let options = BridgeOptions::default()
            .add_inbound_permitted(PermittedOptions::new().address("audit"))
            .add_outbound_permitted(
                PermittedOptions::new()
                    .address("audit")
                    .required_permission("audit:read"),
            );
        let node = Node::new(options);

        let reader: Arc<dyn Identity> =
            Arc::new(StaticIdentity::authenticated("ann").with_permission("audit:read"));
        let mut allowed = node.connect(Some(reader));
        let outsider: Arc<dyn Identity> = Arc::new(StaticIdentity::authenticated("bo"));
        let mut denied = node.connect(Some(outsider));
        allowed.register("audit").await;
        denied.register("audit").await;
        node.consumers("audit", 2).await;

        node.bus
            .publish("audit", json!({"event": "login"}), DeliveryOptions::default())
            .await;
        assert_eq!(allowed.next().await["body"], json!({"event": "login"}));
        // Filtered pushes are invisible to the client
        denied.expect_silence().await;

        assert_eq!(node.bridge.stats().pushes_filtered, 1);
        allowed.close().await;
        denied.close().await;
    }

    // =============================================================================
    // LIMITS
    // =============================================================================

    #[tokio::test]
    async fn test_handler_limit() {
        let addresses = ["h0", "h1", "h2", "h3"];
        let options = BridgeOptions::default()
            .add_inbound_permitted(PermittedOptions::new().address_regex("h[0-9]"))
            .with_max_handlers_per_socket(3);
        let node = Node::new(options);
        let mut client = node.connect(None);

        for address in &addresses[..3] {
            client.register(address).await;
        }
        for address in &addresses[..3] {
            node.consumers(address, 1).await;
        }

        client.register(addresses[3]).await;
        client.expect_error("max_handlers_reached").await;
        assert_eq!(node.bus.consumer_count(addresses[3]), 0);

        // Freeing one slot makes room again
        client
            .send(json!({"type": "unregister", "address": "h0"}))
            .await;
        node.consumers("h0", 0).await;
        client.register(addresses[3]).await;
        node.consumers(addresses[3], 1).await;
        client.close().await;
    }

    #[tokio::test]
    async fn test_unregister_unknown_address_is_noop() {
        let options = inbound(PermittedOptions::new().address_regex("[a-z]")).with_max_handlers_per_socket(1);
        let node = Node::new(options);
        let mut client = node.connect(None);

        client
            .send(json!({"type": "unregister", "address": "x"}))
            .await;
        client
            .send(json!({"type": "unregister", "address": "x"}))
            .await;
        client.register("a").await;
        node.consumers("a", 1).await;
        client.expect_silence().await;
        client.close().await;
    }

    #[tokio::test]
    async fn test_reply_address_length_boundary() {
        let node = Node::new(inbound(PermittedOptions::new().address("svc")));
        let mut service = node.bus.consume("svc");
        let mut client = node.connect(None);

        let too_long = "r".repeat(MAX_REPLY_ADDRESS_LENGTH + 1);
        client
            .send(json!({"type": "send", "address": "svc", "body": 1, "replyAddress": too_long}))
            .await;
        client.expect_error("invalid_reply_address").await;
        assert!(service.try_recv().unwrap().is_none());

        let exact = "r".repeat(MAX_REPLY_ADDRESS_LENGTH);
        client
            .send(json!({"type": "send", "address": "svc", "body": 2, "replyAddress": exact}))
            .await;
        let request = tokio::time::timeout(WAIT, service.recv()).await.unwrap().unwrap();
        assert_eq!(request.body, json!(2));

        // The limit is in characters, not bytes
        let accented = "é".repeat(MAX_REPLY_ADDRESS_LENGTH);
        client
            .send(json!({"type": "send", "address": "svc", "body": 3, "replyAddress": accented}))
            .await;
        let request = tokio::time::timeout(WAIT, service.recv()).await.unwrap().unwrap();
        assert_eq!(request.body, json!(3));

        let accented = "é".repeat(MAX_REPLY_ADDRESS_LENGTH + 1);
        client
            .send(json!({"type": "send", "address": "svc", "body": 4, "replyAddress": accented}))
            .await;
        client.expect_error("invalid_reply_address").await;
        client.close().await;
    }

    #[tokio::test]
    async fn test_max_address_length_counts_characters() {
        let node = Node::new(
            inbound(PermittedOptions::new().address_regex("é+")).with_max_address_length(4),
        );
        let mut client = node.connect(None);

        client.register("éééé").await;
        node.consumers("éééé", 1).await;

        client.register("ééééé").await;
        client.expect_error("max_address_length_reached").await;
        assert_eq!(node.bus.consumer_count("ééééé"), 0);
        client.close().await;
    }

    // =============================================================================
    // REPLY TRUST
    // =============================================================================

    #[tokio::test]
    async fn test_client_requests_service() {
        let node = Node::new(inbound(PermittedOptions::new().address("quote")));
        let mut service = node.bus.consume("quote");
        let bus = node.bus.clone();
        tokio::spawn(async move {
            while let Some(request) = service.recv().await {
                let symbol = request.body["symbol"].clone();
                bus.reply(&request, json!({"symbol": symbol, "price": 42}))
                    .await;
            }
        });

        let mut client = node.connect(None);
        client
            .send(json!({
                "type": "send",
                "address": "quote",
                "body": {"symbol": "ACME"},
                "replyAddress": "my-quote"
            }))
            .await;
        assert_eq!(
            client.next().await,
            json!({"type": "rec", "address": "my-quote", "body": {"symbol": "ACME", "price": 42}})
        );
        client.close().await;
    }

    #[tokio::test]
    async fn test_service_failure_reaches_client() {
        let node = Node::new(inbound(PermittedOptions::new().address("quote")));
        let mut service = node.bus.consume("quote");
        let bus = node.bus.clone();
        tokio::spawn(async move {
            if let Some(request) = service.recv().await {
                if let Some(reply_address) = &request.reply_address {
                    bus.fail(reply_address, 404, "unknown symbol");
                }
            }
        });

        let mut client = node.connect(None);
        client
            .send(json!({"type": "send", "address": "quote", "body": {}, "replyAddress": "q"}))
            .await;
        assert_eq!(
            client.next().await,
            json!({
                "address": "q",
                "failureCode": 404,
                "failureType": FailureType::RecipientFailure.as_str(),
                "message": "unknown symbol"
            })
        );
        client.close().await;
    }

    #[tokio::test]
    async fn test_trust_is_single_use() {
        let node = Node::new(both("jobs"));
        let mut worker = node.connect(None);
        worker.register("jobs").await;
        node.consumers("jobs", 1).await;

        let bus = node.bus.clone();
        let pending = tokio::spawn(async move {
            bus.request("jobs", json!({"n": 3}), DeliveryOptions::default())
                .await
        });

        let job = worker.next().await;
        let reply_address = job["replyAddress"].as_str().unwrap().to_string();
        worker
            .send(json!({"type": "send", "address": reply_address, "body": {"square": 9}}))
            .await;
        let reply = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap().unwrap();
        assert_eq!(reply.body, json!({"square": 9}));

        worker
            .send(json!({"type": "send", "address": reply_address, "body": {}}))
            .await;
        worker.expect_error("access_denied").await;
        worker.close().await;
    }

    #[tokio::test]
    async fn test_reply_and_request_conversation() {
        let node = Node::new(inbound(PermittedOptions::new().address("wizard")));
        let mut service = node.bus.consume("wizard");
        let bus = node.bus.clone();
        tokio::spawn(async move {
            let Some(first) = service.recv().await else { return };
            // Ask the client a question and wait for its answer
            let answer = bus
                .reply_and_request(&first, json!("name?"), DeliveryOptions::default())
                .await;
            if let Ok(answer) = answer {
                bus.reply(&answer, json!(format!("hello {}", answer.body.as_str().unwrap_or(""))))
                    .await;
            }
        });

        let mut client = node.connect(None);
        client
            .send(json!({"type": "send", "address": "wizard", "body": "start", "replyAddress": "c1"}))
            .await;
        let question = client.next().await;
        assert_eq!(question["address"], json!("c1"));
        assert_eq!(question["body"], json!("name?"));

        let next_hop = question["replyAddress"].as_str().unwrap().to_string();
        client
            .send(json!({"type": "send", "address": next_hop, "body": "ada", "replyAddress": "c2"}))
            .await;
        let greeting = client.next().await;
        assert_eq!(greeting["address"], json!("c2"));
        assert_eq!(greeting["body"], json!("hello ada"));
        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trust_expires_after_reply_timeout() {
        let options = both("jobs").with_reply_timeout(Duration::from_millis(200));
        let node = Node::new(options);
        let mut worker = node.connect(None);
        worker.register("jobs").await;
        node.consumers("jobs", 1).await;

        let bus = node.bus.clone();
        tokio::spawn(async move {
            let options = DeliveryOptions::with_timeout(Duration::from_secs(60));
            let _ = bus.request("jobs", json!({}), options).await;
        });
        let job = worker.next().await;
        let reply_address = job["replyAddress"].as_str().unwrap().to_string();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!node.bridge.reply_trust().contains(&reply_address));
        worker
            .send(json!({"type": "send", "address": reply_address, "body": {}}))
            .await;
        worker.expect_error("access_denied").await;
        worker.close().await;
    }

    // =============================================================================
    // LIVENESS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_pinging_socket_survives() {
        let timeout = Duration::from_millis(1000);
        let node = Node::new(both("a").with_ping_timeout(timeout));
        let mut client = node.connect(None);

        for _ in 0..10 {
            client.ping().await;
            tokio::time::sleep(timeout / 2).await;
        }
        assert!(!client.is_closed());
        assert_eq!(node.bridge.live_sockets(), 1);
        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_socket_closed_within_two_periods() {
        let timeout = Duration::from_millis(1000);
        let node = Node::new(both("a").with_ping_timeout(timeout));
        let mut client = node.connect(None);
        client.register("a").await;
        node.consumers("a", 1).await;

        tokio::time::sleep(timeout * 9 / 10).await;
        assert!(!client.is_closed());

        tokio::time::sleep(timeout * 11 / 10).await;
        assert!(client.is_closed());
        node.consumers("a", 0).await;
        assert_eq!(node.bridge.live_sockets(), 0);
    }

    // =============================================================================
    // ISOLATION
    // =============================================================================

    #[tokio::test]
    async fn test_closing_one_socket_keeps_others() {
        let node = Node::new(both("chat"));
        let leaving = node.connect(None);
        let mut staying = node.connect(None);
        leaving.register("chat").await;
        staying.register("chat").await;
        node.consumers("chat", 2).await;

        leaving.close().await;
        node.consumers("chat", 1).await;

        node.bus
            .publish("chat", json!("still here?"), DeliveryOptions::default())
            .await;
        assert_eq!(staying.next().await["body"], json!("still here?"));
        assert_eq!(node.bridge.live_sockets(), 1);
        staying.close().await;
    }

    #[tokio::test]
    async fn test_hook_sees_every_socket() {
        let opened = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = Arc::clone(&opened);
        let hook = Arc::new(FnHook(move |event: &BridgeEvent| {
            if event.kind == BridgeEventType::SocketCreated {
                log.lock().push(event.socket_id);
            }
            true
        }));
        let node = Node::with_hook(both("a"), hook);

        let first = node.connect(None);
        let second = node.connect(None);
        first.ping().await;
        second.ping().await;
        first.close().await;
        second.close().await;

        let opened = opened.lock();
        assert_eq!(opened.len(), 2);
        assert_ne!(opened[0], opened[1]);
        assert_eq!(node.bridge.stats().sockets_closed, 2);
    }
}
