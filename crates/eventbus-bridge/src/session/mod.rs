//! Socket session.
//!
//! One actor per socket. Frames are decoded and dispatched strictly in order
//! on the actor; capability checks and bus requests run on their own tasks
//! and report back through the session event channel, so per-socket state
//! (registrations, handler slots, last ping) is only touched here.

pub mod liveness;
pub mod registry;

use crate::bridge::BridgeContext;
use crate::domain::envelope::{self, ClientFrame, InboundEnvelope};
use crate::domain::error::{AuthError, ErrorCode};
use crate::domain::socket_id::SocketId;
use crate::hooks::BridgeEventType;
use crate::permission::{Direction, Match};
use crate::ports::socket::{BridgeSocket, TransportEvent};
use liveness::LivenessMonitor;
use registry::{RegisterError, Registration, RegistrationTable};
use serde_json::{json, Value};
use shared_bus::{BusMessage, DeliveryOptions, Headers, MessageConsumer};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Longest reply address a client may give: a bus correlation address.
pub const MAX_REPLY_ADDRESS_LENGTH: usize = shared_bus::CORRELATION_ADDRESS_LENGTH;

const SESSION_EVENT_CAPACITY: usize = 64;

/// Results posted back to the session by its own tasks.
enum SessionEvent {
    /// Capability check finished for a deferred action
    Authorised {
        envelope: InboundEnvelope,
        outcome: Result<bool, AuthError>,
    },
    /// A reply this socket was waiting for arrived, failed or timed out
    ReplySettled,
}

pub(crate) struct SocketSession {
    ctx: Arc<BridgeContext>,
    socket: Arc<dyn BridgeSocket>,
    id: SocketId,
    registrations: RegistrationTable,
    liveness: LivenessMonitor,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
}

impl SocketSession {
    pub fn new(ctx: Arc<BridgeContext>, socket: Arc<dyn BridgeSocket>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        Self {
            id: socket.id(),
            registrations: RegistrationTable::new(ctx.options.max_handlers_per_socket),
            liveness: LivenessMonitor::start(ctx.options.ping_timeout),
            ctx,
            socket,
            events_tx,
            events_rx,
        }
    }

    pub async fn run(mut self, mut transport: mpsc::Receiver<TransportEvent>) {
        if !self
            .ctx
            .call_hook(BridgeEventType::SocketCreated, self.id, None)
            .await
        {
            info!(socket_id = %self.id, "Socket refused by hook");
            self.socket.close();
            return;
        }

        self.ctx.stats.sockets_opened.fetch_add(1, Ordering::Relaxed);
        self.ctx.stats.live_sockets.fetch_add(1, Ordering::Relaxed);
        info!(
            socket_id = %self.id,
            identity = self.socket.identity().is_some(),
            "Socket opened"
        );

        loop {
            tokio::select! {
                event = transport.recv() => match event {
                    Some(TransportEvent::Frame(bytes)) => self.on_frame(&bytes).await,
                    Some(TransportEvent::Error(reason)) => {
                        warn!(socket_id = %self.id, error = %reason, "Transport error, closing socket");
                        break;
                    }
                    None => {
                        debug!(socket_id = %self.id, "Transport closed");
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => self.on_session_event(event).await,
                now = self.liveness.tick() => {
                    if self.liveness.is_expired(now) && self.on_idle().await {
                        break;
                    }
                }
            }
        }

        self.close().await;
    }

    /// Returns true if the socket was closed.
    async fn on_idle(&mut self) -> bool {
        if !self
            .ctx
            .call_hook(BridgeEventType::SocketIdle, self.id, None)
            .await
        {
            self.send_error(ErrorCode::Rejected);
            return false;
        }
        info!(socket_id = %self.id, "No ping within timeout, closing socket");
        self.socket.close();
        true
    }

    async fn on_frame(&mut self, bytes: &[u8]) {
        self.ctx.stats.frames_received.fetch_add(1, Ordering::Relaxed);

        let envelope = match envelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(code) => {
                debug!(socket_id = %self.id, code = %code, "Malformed frame");
                self.send_error(code);
                return;
            }
        };

        match envelope.frame {
            ClientFrame::Ping => {
                self.liveness.record_ping();
                self.ctx
                    .call_hook(BridgeEventType::SocketPing, self.id, Some(&envelope.raw))
                    .await;
            }
            ClientFrame::Send { .. } | ClientFrame::Publish { .. } => {
                self.on_send_or_publish(envelope).await;
            }
            ClientFrame::Register { .. } => self.on_register(envelope).await,
            ClientFrame::Unregister { .. } => self.on_unregister(envelope).await,
        }
    }

    async fn on_send_or_publish(&mut self, envelope: InboundEnvelope) {
        let (kind, address, body, reply_address) = match &envelope.frame {
            ClientFrame::Send {
                address,
                body,
                reply_address,
                ..
            } => (BridgeEventType::Send, address, body, reply_address.as_deref()),
            ClientFrame::Publish { address, body, .. } => {
                (BridgeEventType::Publish, address, body, None)
            }
            _ => return,
        };

        if !self.ctx.call_hook(kind, self.id, Some(&envelope.raw)).await {
            self.send_error(ErrorCode::Rejected);
            return;
        }

        if reply_address.is_some_and(|r| r.chars().count() > MAX_REPLY_ADDRESS_LENGTH) {
            debug!(socket_id = %self.id, address = %address, "Reply address too long");
            self.send_error(ErrorCode::InvalidReplyAddress);
            return;
        }

        let verdict = self.ctx.matcher.check_inbound(address, Some(body));
        self.authorise(verdict, envelope).await;
    }

    async fn on_register(&mut self, envelope: InboundEnvelope) {
        let ClientFrame::Register { address } = &envelope.frame else {
            return;
        };

        if !self
            .ctx
            .call_hook(BridgeEventType::Register, self.id, Some(&envelope.raw))
            .await
        {
            self.send_error(ErrorCode::Rejected);
            return;
        }

        let length = address.chars().count();
        if length > self.ctx.options.max_address_length {
            warn!(
                socket_id = %self.id,
                length,
                max = self.ctx.options.max_address_length,
                "Register refused: address too long"
            );
            self.send_error(ErrorCode::MaxAddressLengthReached);
            return;
        }

        if !self.registrations.has_capacity() {
            warn!(socket_id = %self.id, address = %address, "Register refused: handler limit reached");
            self.send_error(ErrorCode::MaxHandlersReached);
            return;
        }

        if self.may_listen(address) {
            self.perform(envelope).await;
        }
    }

    async fn on_unregister(&mut self, envelope: InboundEnvelope) {
        let ClientFrame::Unregister { address } = &envelope.frame else {
            return;
        };

        if !self
            .ctx
            .call_hook(BridgeEventType::Unregister, self.id, Some(&envelope.raw))
            .await
        {
            self.send_error(ErrorCode::Rejected);
            return;
        }

        if self.may_listen(address) {
            self.perform(envelope).await;
        }
    }

    /// Listen check for register/unregister: may the client receive from
    /// this address at all. Capabilities named by the rule are enforced per
    /// pushed message, not here.
    fn may_listen(&self, address: &str) -> bool {
        if self
            .ctx
            .matcher
            .evaluate(Direction::Inbound, address, None)
            .is_accepted()
        {
            return true;
        }
        debug!(socket_id = %self.id, address = %address, "Listen denied: no matching rule");
        self.send_error(ErrorCode::AccessDenied);
        false
    }

    /// Apply a rule verdict: deny, perform now, or defer to the identity
    /// oracle and perform once it answers.
    async fn authorise(&mut self, verdict: Match, envelope: InboundEnvelope) {
        let requirement = match verdict {
            Match::Rejected => {
                debug!(
                    socket_id = %self.id,
                    kind = envelope.frame.kind(),
                    address = envelope.frame.address().unwrap_or_default(),
                    "Inbound action denied: no matching rule"
                );
                self.send_error(ErrorCode::AccessDenied);
                return;
            }
            Match::Accepted(requirement) if requirement.is_empty() => {
                self.perform(envelope).await;
                return;
            }
            Match::Accepted(requirement) => requirement,
        };

        let Some(identity) = self.socket.identity() else {
            debug!(socket_id = %self.id, "Capability required but socket has no identity");
            self.send_error(ErrorCode::NoSession);
            return;
        };
        if !identity.is_authenticated() {
            debug!(socket_id = %self.id, "Capability required but caller not logged in");
            self.send_error(ErrorCode::NotLoggedIn);
            return;
        }

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = requirement.check(identity.as_ref()).await;
            // Session may be gone already; nothing left to answer then.
            let _ = events
                .send(SessionEvent::Authorised { envelope, outcome })
                .await;
        });
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Authorised {
                envelope,
                outcome: Ok(true),
            } => self.perform(envelope).await,
            SessionEvent::Authorised {
                envelope,
                outcome: Ok(false),
            } => {
                debug!(
                    socket_id = %self.id,
                    address = envelope.frame.address().unwrap_or_default(),
                    "Inbound action denied by capability check"
                );
                self.send_error(ErrorCode::AccessDenied);
            }
            SessionEvent::Authorised {
                envelope,
                outcome: Err(e),
            } => {
                error!(
                    socket_id = %self.id,
                    address = envelope.frame.address().unwrap_or_default(),
                    error = %e,
                    "Authorization check failed"
                );
                self.send_error(ErrorCode::AuthError);
            }
            SessionEvent::ReplySettled => self.registrations.release_slot(),
        }
    }

    async fn perform(&mut self, envelope: InboundEnvelope) {
        let InboundEnvelope { frame, raw } = envelope;
        match frame {
            ClientFrame::Send {
                address,
                body,
                headers,
                reply_address: None,
            } => {
                let options = DeliveryOptions::default().headers(headers);
                if !self.ctx.bus.send(&address, body, options).await {
                    debug!(socket_id = %self.id, address = %address, "Send not delivered");
                }
            }
            ClientFrame::Send {
                address,
                body,
                headers,
                reply_address: Some(reply_address),
            } => self.send_with_reply(address, body, headers, reply_address),
            ClientFrame::Publish {
                address,
                body,
                headers,
            } => {
                let options = DeliveryOptions::default().headers(headers);
                let receivers = self.ctx.bus.publish(&address, body, options).await;
                debug!(socket_id = %self.id, address = %address, receivers, "Published");
            }
            ClientFrame::Register { address } => self.register(address, raw).await,
            ClientFrame::Unregister { address } => {
                if self.registrations.unregister(&address) {
                    debug!(socket_id = %self.id, address = %address, "Unregistered");
                }
            }
            ClientFrame::Ping => {}
        }
    }

    /// Request on the bus, holding a handler slot until the reply settles.
    fn send_with_reply(&mut self, address: String, body: Value, headers: Headers, reply_address: String) {
        if !self.registrations.reserve_slot() {
            warn!(socket_id = %self.id, address = %address, "Send refused: handler limit reached");
            self.send_error(ErrorCode::MaxHandlersReached);
            return;
        }

        let ctx = Arc::clone(&self.ctx);
        let socket = Arc::clone(&self.socket);
        let events = self.events_tx.clone();
        let socket_id = self.id;
        let request = tokio::spawn(async move {
            let options = DeliveryOptions {
                timeout: ctx.options.reply_timeout,
                headers,
            };
            match ctx.bus.request(&address, body, options).await {
                Ok(reply) => {
                    ctx.grant_reply_trust(reply.reply_address.as_deref());
                    let doc = envelope::delivery(&reply_address, &reply);
                    if ctx
                        .call_hook(BridgeEventType::Receive, socket.id(), Some(&doc))
                        .await
                        && socket.write(doc.to_string())
                    {
                        ctx.stats.messages_delivered.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(failure) => {
                    debug!(
                        socket_id = %socket.id(),
                        address = %address,
                        failure = %failure,
                        "Request failed"
                    );
                    socket.write(envelope::reply_failure(&reply_address, &failure));
                }
            }
        });

        // Settle the slot however the request task ends, panics included
        tokio::spawn(async move {
            if let Err(e) = request.await {
                error!(socket_id = %socket_id, error = %e, "Reply task failed");
            }
            let _ = events.send(SessionEvent::ReplySettled).await;
        });
    }

    async fn register(&mut self, address: String, raw: Value) {
        if let Err(e) = self.registrations.check(&address) {
            self.refuse_registration(&address, e);
            return;
        }

        let consumer = self.ctx.bus.consume(&address);
        let handle = consumer.handle();
        let forwarder = tokio::spawn(forward(
            Arc::clone(&self.ctx),
            Arc::clone(&self.socket),
            consumer,
        ))
        .abort_handle();

        if let Err(e) = self
            .registrations
            .register(address.clone(), Registration::new(handle, forwarder))
        {
            self.refuse_registration(&address, e);
            return;
        }

        debug!(
            socket_id = %self.id,
            address = %address,
            handlers = self.registrations.handler_count(),
            "Registered"
        );
        self.ctx
            .call_hook(BridgeEventType::Registered, self.id, Some(&raw))
            .await;
    }

    fn refuse_registration(&self, address: &str, reason: RegisterError) {
        let code = match reason {
            RegisterError::AlreadyRegistered => ErrorCode::AddressAlreadyRegistered,
            RegisterError::Full => ErrorCode::MaxHandlersReached,
        };
        warn!(socket_id = %self.id, address = %address, reason = %reason, "Register refused");
        self.send_error(code);
    }

    fn send_error(&self, code: ErrorCode) {
        self.ctx.stats.errors_sent.fetch_add(1, Ordering::Relaxed);
        self.socket.write(envelope::error(code));
    }

    /// Revoke registrations and release the socket.
    async fn close(mut self) {
        self.socket.close();

        for (address, registration) in self.registrations.close_all() {
            registration.cancel();
            let raw = json!({"type": "unregister", "address": address});
            self.ctx
                .call_hook(BridgeEventType::Unregister, self.id, Some(&raw))
                .await;
        }

        self.ctx
            .call_hook(BridgeEventType::SocketClosed, self.id, None)
            .await;
        self.ctx.stats.sockets_closed.fetch_add(1, Ordering::Relaxed);
        self.ctx.stats.live_sockets.fetch_sub(1, Ordering::Relaxed);
        info!(socket_id = %self.id, "Socket closed");
    }
}

/// Relay messages from one bus consumer to the client.
async fn forward(ctx: Arc<BridgeContext>, socket: Arc<dyn BridgeSocket>, mut consumer: MessageConsumer) {
    let socket_id = socket.id();
    while let Some(message) = consumer.recv().await {
        let trusted = ctx.trust.consume(&message.address);
        if !trusted && !outbound_permitted(&ctx, socket.as_ref(), &message).await {
            ctx.stats.pushes_filtered.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        ctx.grant_reply_trust(message.reply_address.as_deref());
        let doc = envelope::delivery(&message.address, &message);
        if !ctx
            .call_hook(BridgeEventType::Receive, socket_id, Some(&doc))
            .await
        {
            continue;
        }
        if socket.write(doc.to_string()) {
            ctx.stats.messages_delivered.fetch_add(1, Ordering::Relaxed);
        }
    }
    debug!(socket_id = %socket_id, address = %consumer.address(), "Forwarding stopped");
}

/// Outbound rules for a push. Denials are only logged; the client has no
/// request to pin an error on.
async fn outbound_permitted(
    ctx: &BridgeContext,
    socket: &dyn BridgeSocket,
    message: &BusMessage,
) -> bool {
    let requirement =
        match ctx
            .matcher
            .evaluate(Direction::Outbound, &message.address, Some(&message.body))
        {
            Match::Rejected => {
                debug!(
                    socket_id = %socket.id(),
                    address = %message.address,
                    "Outbound message filtered: no matching rule"
                );
                return false;
            }
            Match::Accepted(requirement) => requirement,
        };

    if requirement.is_empty() {
        return true;
    }

    let Some(identity) = socket.identity().filter(|i| i.is_authenticated()) else {
        debug!(
            socket_id = %socket.id(),
            address = %message.address,
            "Outbound message filtered: caller not logged in"
        );
        return false;
    };

    match requirement.check(identity.as_ref()).await {
        Ok(true) => true,
        Ok(false) => {
            debug!(
                socket_id = %socket.id(),
                address = %message.address,
                "Outbound message filtered: capability denied"
            );
            false
        }
        Err(e) => {
            error!(
                socket_id = %socket.id(),
                address = %message.address,
                error = %e,
                "Authorization check failed for outbound message"
            );
            false
        }
    }
}
