//! Main broker implementation
//!
//! The router is transport-agnostic: it accepts node connections from any
//! [`IpcServer`] implementation. Each accepted connection becomes a
//! [`Session`] (the reply address). Requests are dispatched to the
//! connection registry on their own tasks under a bounded ceiling;
//! platform events coming back out of the gateway are fanned out to every
//! matching subscriber.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_gateway::loopback::{LoopbackFactory, LoopbackWorld};
//! use tether_router::{Router, RouterConfig};
//! use tether_transport::UnixSocketServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let factory = Arc::new(LoopbackFactory::new(LoopbackWorld::new("bot")));
//!     let router = Router::new(RouterConfig::default(), factory);
//!     let server = UnixSocketServer::bind("/tmp/tether-broker.sock").unwrap();
//!     router.serve_on(server).await.unwrap();
//! }
//! ```

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use tether_core::{
    ActionReply, ChatMessage, ConfirmOutcome, ConfirmReply, ConnectStatus, CredentialIdentity,
    Credentials, CredentialsAck, EventEnvelope, ListOutcome, ListReply, Message, PlatformEvent,
    SendOutcome, SendReply, TriggerFilter, CONFIRM_TIMEOUT_MS, LOGIN_TIMEOUT_MS,
    REQUEST_TIMEOUT_MS,
};
use tether_gateway::{ChatClientFactory, Connection, ConnectionRegistry, GatewayEvent};
use tether_transport::{IpcEvent, IpcReceiver, IpcSender, IpcServer};

use crate::error::Result;
use crate::matcher;
use crate::session::{Session, SessionId};
use crate::subscription::SubscriptionTable;

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Broker name, for logs
    pub name: String,
    /// Ceiling for simple request round trips
    pub request_timeout: Duration,
    /// Slack added on top of an operation's own inner ceiling (login,
    /// confirmation) before the outer guard gives up
    pub ceiling_headroom: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "Tether Broker".to_string(),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            ceiling_headroom: Duration::from_secs(5),
        }
    }
}

/// The broker
pub struct Router {
    config: RouterConfig,
    /// Platform connections, one per credential identity
    registry: Arc<ConnectionRegistry>,
    /// Active node sessions
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
    /// Trigger registrations
    subscriptions: Arc<SubscriptionTable>,
    /// Running flag
    running: Arc<RwLock<bool>>,
}

impl Router {
    /// Build the broker around a platform driver factory and start the
    /// event fan-out pump.
    pub fn new(config: RouterConfig, factory: Arc<dyn ChatClientFactory>) -> Self {
        let (fanout_tx, fanout_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(ConnectionRegistry::new(factory, fanout_tx));
        let router = Self {
            config,
            registry,
            sessions: Arc::new(DashMap::new()),
            subscriptions: Arc::new(SubscriptionTable::new()),
            running: Arc::new(RwLock::new(false)),
        };
        tokio::spawn(fanout_pump(
            fanout_rx,
            router.registry.clone(),
            router.sessions.clone(),
            router.subscriptions.clone(),
        ));
        router
    }

    /// Accept node connections from any [`IpcServer`] until stopped.
    pub async fn serve_on<S>(&self, mut server: S) -> Result<()>
    where
        S: IpcServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        info!("{} accepting connections", self.config.name);
        *self.running.write() = true;

        while *self.running.read() {
            match server.accept().await {
                Ok((sender, receiver, peer)) => {
                    self.handle_connection(Arc::new(sender), receiver, peer);
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Stop the accept loop
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Wire one accepted node connection into a session and its read loop.
    fn handle_connection(
        &self,
        sender: Arc<dyn IpcSender>,
        mut receiver: impl IpcReceiver + 'static,
        peer: String,
    ) {
        let session = Arc::new(Session::new(sender, peer));
        info!("session {} connected ({})", session.id, session.peer);
        self.sessions.insert(session.id.clone(), session.clone());

        let ctx = RequestContext {
            config: self.config.clone(),
            registry: self.registry.clone(),
            sessions: self.sessions.clone(),
            subscriptions: self.subscriptions.clone(),
        };

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match event {
                    IpcEvent::Frame(line) => match tether_core::decode(&line) {
                        Ok(message) => {
                            session.touch();
                            dispatch(&ctx, &session, message);
                        }
                        Err(e) => {
                            warn!("undecodable frame from session {}: {}", session.id, e);
                        }
                    },
                    IpcEvent::Error(e) => {
                        warn!("transport error on session {}: {}", session.id, e);
                    }
                    IpcEvent::Disconnected { reason } => {
                        debug!("session {} disconnected: {:?}", session.id, reason);
                        break;
                    }
                }
            }

            // Reply-address cleanup: the session and every subscriber it
            // registered go away together.
            info!("removing session {}", session.id);
            ctx.sessions.remove(&session.id);
            ctx.subscriptions.remove_session(&session.id);
        });
    }
}

/// Everything a request handler task needs.
#[derive(Clone)]
struct RequestContext {
    config: RouterConfig,
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
    subscriptions: Arc<SubscriptionTable>,
}

/// Route one inbound frame. Replying requests run on their own task so a
/// slow login cannot stall the session's read loop.
fn dispatch(ctx: &RequestContext, session: &Arc<Session>, message: Message) {
    let ctx = ctx.clone();
    let session = session.clone();
    match message {
        Message::Credentials(req) => {
            tokio::spawn(async move {
                // A credentials request may legitimately ride out the whole
                // login ceiling; the outer guard only adds headroom.
                let ceiling =
                    Duration::from_millis(LOGIN_TIMEOUT_MS) + ctx.config.ceiling_headroom;
                let status = tokio::time::timeout(
                    ceiling,
                    handle_credentials(&ctx, req.credentials()),
                )
                .await
                .unwrap_or_else(|_| {
                    warn!("credentials request timed out");
                    ConnectStatus::Error
                });
                let reply = Message::CredentialsAck(CredentialsAck {
                    seq: req.seq,
                    status,
                });
                send_reply(&session, reply).await;
            });
        }
        Message::ListGuilds(req) => {
            spawn_list(ctx, session, req.seq, req.credentials, ListKind::Guilds);
        }
        Message::ListChannels(req) => {
            spawn_list(
                ctx,
                session,
                req.seq,
                req.credentials,
                ListKind::Channels(req.guild_ids),
            );
        }
        Message::ListRoles(req) => {
            spawn_list(
                ctx,
                session,
                req.seq,
                req.credentials,
                ListKind::Roles(req.guild_ids),
            );
        }
        Message::RegisterTrigger(req) => {
            if !req.credentials.is_complete() {
                warn!("register-trigger with incomplete credentials, ignoring");
                return;
            }
            let identity = CredentialIdentity::derive(&req.credentials);
            ctx.subscriptions
                .register(req.subscriber_id, session.id.clone(), identity, req.filter);
            // Make sure the connection behind this trigger is coming up;
            // the subscriber fires only once it is.
            tokio::spawn(async move {
                let report = ctx.registry.connect(&req.credentials).await;
                if report.status == ConnectStatus::Error {
                    warn!(
                        "connection {} for registered trigger failed: {}",
                        report.identity,
                        report.error.as_deref().unwrap_or("unknown error")
                    );
                }
            });
        }
        Message::UnregisterTrigger(req) => {
            ctx.subscriptions.unregister(&req.subscriber_id, &session.id);
        }
        Message::SendMessage(req) => {
            tokio::spawn(async move {
                let ceiling = ctx.config.request_timeout;
                let outcome = tokio::time::timeout(ceiling, async {
                    match resolve(&ctx, &req.credentials) {
                        Some(conn) => conn.send_message(&req.channel_id, &req.message).await,
                        None => SendOutcome::failure(
                            "bot instance not found for the provided credentials",
                        ),
                    }
                })
                .await
                .unwrap_or_else(|_| SendOutcome::failure("request timed out"));
                send_reply(
                    &session,
                    Message::SendReply(SendReply {
                        seq: req.seq,
                        outcome,
                    }),
                )
                .await;
            });
        }
        Message::PerformAction(req) => {
            tokio::spawn(async move {
                let ceiling = ctx.config.request_timeout;
                let outcome = tokio::time::timeout(ceiling, async {
                    match resolve(&ctx, &req.credentials) {
                        Some(conn) => conn.perform_action(req.action).await,
                        None => tether_core::ActionOutcome::failure(
                            "bot instance not found for the provided credentials",
                        ),
                    }
                })
                .await
                .unwrap_or_else(|_| tether_core::ActionOutcome::failure("request timed out"));
                send_reply(
                    &session,
                    Message::ActionReply(ActionReply {
                        seq: req.seq,
                        outcome,
                    }),
                )
                .await;
            });
        }
        Message::SendConfirmation(req) => {
            tokio::spawn(async move {
                // The prompt's own deadline governs here; the ceiling only
                // guards against a wedged driver.
                let ceiling = Duration::from_millis(req.timeout_ms.unwrap_or(CONFIRM_TIMEOUT_MS))
                    + ctx.config.ceiling_headroom;
                let outcome = tokio::time::timeout(ceiling, async {
                    match resolve(&ctx, &req.credentials) {
                        Some(conn) => {
                            conn.send_confirmation(&req.channel_id, &req.message, req.timeout_ms)
                                .await
                        }
                        None => ConfirmOutcome::failure(
                            "bot instance not found for the provided credentials",
                        ),
                    }
                })
                .await
                .unwrap_or_else(|_| ConfirmOutcome::failure("request timed out"));
                send_reply(
                    &session,
                    Message::ConfirmReply(ConfirmReply {
                        seq: req.seq,
                        outcome,
                    }),
                )
                .await;
            });
        }
        other => {
            warn!(
                "unexpected frame from session {}: {:?}",
                session.id,
                other
            );
        }
    }
}

enum ListKind {
    Guilds,
    Channels(Vec<String>),
    Roles(Vec<String>),
}

fn spawn_list(
    ctx: RequestContext,
    session: Arc<Session>,
    seq: u64,
    credentials: Credentials,
    kind: ListKind,
) {
    tokio::spawn(async move {
        let ceiling = ctx.config.request_timeout;
        let result = tokio::time::timeout(ceiling, handle_list(&ctx, &credentials, kind))
            .await
            .unwrap_or_else(|_| ListOutcome::failure("request timed out"));
        send_reply(&session, Message::ListReply(ListReply { seq, result })).await;
    });
}

/// `credentials` handler: validate, connect, reply with the status string
/// alone. Error detail stays in the broker log.
async fn handle_credentials(ctx: &RequestContext, credentials: Credentials) -> ConnectStatus {
    if !credentials.is_complete() {
        warn!("credentials request missing token or client id");
        return ConnectStatus::Missing;
    }
    let report = ctx.registry.connect(&credentials).await;
    if report.status == ConnectStatus::Error {
        error!(
            "credentials error for {}: {}",
            report.identity,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    report.status
}

/// List handlers connect on demand; every failure becomes an `{error}`
/// payload, never a dropped reply.
async fn handle_list(
    ctx: &RequestContext,
    credentials: &Credentials,
    kind: ListKind,
) -> ListOutcome {
    if !credentials.is_complete() {
        return ListOutcome::failure("missing credentials");
    }
    let conn = match ctx.registry.resolve_ready(credentials).await {
        Ok(conn) => conn,
        Err(e) => {
            let identity = CredentialIdentity::derive(credentials);
            warn!("list request could not resolve {}: {}", identity, e);
            return ListOutcome::failure(format!("bot {} is not available: {}", identity, e));
        }
    };
    let items = match kind {
        ListKind::Guilds => conn.fetch_guilds().await,
        ListKind::Channels(guild_ids) => conn.fetch_channels(&guild_ids).await,
        ListKind::Roles(guild_ids) => conn.fetch_roles(&guild_ids).await,
    };
    ListOutcome::Items(items)
}

/// Pure lookup for the send/action/confirmation family: these require an
/// existing connection and do not connect on demand.
fn resolve(ctx: &RequestContext, credentials: &Credentials) -> Option<Arc<Connection>> {
    let identity = CredentialIdentity::derive(credentials);
    ctx.registry.get(&identity)
}

async fn send_reply(session: &Session, reply: Message) {
    if let Err(e) = session.send_frame(&reply).await {
        warn!("could not reply to session {}: {}", session.id, e);
    }
}

/// Event fan-out pump: one task per router, consuming everything every
/// connection emits and delivering it to matching subscribers.
async fn fanout_pump(
    mut events: mpsc::UnboundedReceiver<GatewayEvent>,
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
    subscriptions: Arc<SubscriptionTable>,
) {
    while let Some(event) = events.recv().await {
        publish(&registry, &sessions, &subscriptions, event).await;
    }
    debug!("event fan-out pump ended");
}

/// Deliver one platform event to every matching subscriber. Broadcast
/// with filters, not a queue: no buffering, no retry, a momentarily
/// disconnected subscriber misses it.
async fn publish(
    registry: &ConnectionRegistry,
    sessions: &DashMap<SessionId, Arc<Session>>,
    subscriptions: &SubscriptionTable,
    event: GatewayEvent,
) {
    match event.event {
        PlatformEvent::Message { message, .. } => {
            publish_message(registry, sessions, subscriptions, &event.identity, message).await;
        }
        lifecycle => {
            let kind = match lifecycle.lifecycle_kind() {
                Some(kind) => kind,
                None => return,
            };
            let guild_id = lifecycle.guild_id().map(str::to_string);
            for subscriber in subscriptions.for_identity(&event.identity) {
                let TriggerFilter::Lifecycle(filter) = &subscriber.filter else {
                    continue;
                };
                if filter.event != kind {
                    continue;
                }
                // Empty guild list means all guilds.
                if !filter.guild_ids.is_empty() {
                    let in_guild = guild_id
                        .as_ref()
                        .map(|g| filter.guild_ids.contains(g))
                        .unwrap_or(false);
                    if !in_guild {
                        continue;
                    }
                }
                deliver(
                    sessions,
                    &subscriber.session_id,
                    EventEnvelope {
                        subscriber_id: subscriber.id.clone(),
                        event: lifecycle.clone(),
                    },
                )
                .await;
            }
        }
    }
}

async fn publish_message(
    registry: &ConnectionRegistry,
    sessions: &DashMap<SessionId, Arc<Session>>,
    subscriptions: &SubscriptionTable,
    identity: &CredentialIdentity,
    message: ChatMessage,
) {
    let conn = registry.get(identity);
    let bot_user_id = conn.as_ref().and_then(|c| c.bot_user_id());
    // The reference is fetched at most once per inbound message, however
    // many subscribers end up wanting it.
    let mut reference: Option<Option<ChatMessage>> = None;

    for subscriber in subscriptions.for_identity(identity) {
        let TriggerFilter::Message(filter) = &subscriber.filter else {
            continue;
        };
        if !filter.guild_ids.is_empty() {
            let in_guild = message
                .guild_id
                .as_ref()
                .map(|g| filter.guild_ids.contains(g))
                .unwrap_or(false);
            if !in_guild {
                continue;
            }
        }
        if !matcher::matches(&message, filter, bot_user_id.as_deref()) {
            continue;
        }
        if reference.is_none() && message.reply_to.is_some() {
            reference = Some(match &conn {
                Some(conn) => conn.fetch_reference(&message).await,
                None => None,
            });
        }
        debug!(
            "message {} fires subscriber {}",
            message.id, subscriber.id
        );
        deliver(
            sessions,
            &subscriber.session_id,
            EventEnvelope {
                subscriber_id: subscriber.id.clone(),
                event: PlatformEvent::Message {
                    message: message.clone(),
                    reference: reference.clone().flatten(),
                },
            },
        )
        .await;
    }
}

async fn deliver(
    sessions: &DashMap<SessionId, Arc<Session>>,
    session_id: &SessionId,
    envelope: EventEnvelope,
) {
    let Some(session) = sessions.get(session_id).map(|s| s.clone()) else {
        debug!("subscriber session {} is gone, dropping event", session_id);
        return;
    };
    if let Err(e) = session.send_frame(&Message::Event(envelope)).await {
        warn!("event delivery to session {} failed: {}", session_id, e);
    }
}
