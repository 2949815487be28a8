//! One persistent platform connection per credential identity
//!
//! Owns the state machine (`Idle → Connecting → Ready`, `Connecting/Ready →
//! Error`, `Error → Connecting` on retry), the cached guild list, the
//! normalized action operations, and the pending confirmation prompts. A
//! pump task per connection consumes the driver's event stream: it settles
//! logins, resolves prompts, and forwards platform events to the router
//! fan-out channel.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use tether_core::{
    ActionOutcome, ActionSpec, ChatMessage, ConfirmOutcome, CredentialIdentity, Credentials,
    MessageSpec, NamedRef, PlatformEvent, SendOutcome, CONFIRM_TIMEOUT_MS, LOGIN_TIMEOUT_MS,
};

use crate::client::{ChatClient, ClientEvent, EVERYONE_ROLE_NAME};
use crate::error::{GatewayError, Result};
use crate::message::prepare;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Connecting,
    Ready,
    Error,
}

/// A platform event leaving one connection, tagged with its origin
/// identity for the router fan-out.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub identity: CredentialIdentity,
    pub event: PlatformEvent,
}

pub struct Connection {
    identity: CredentialIdentity,
    credentials: Credentials,
    client: Arc<dyn ChatClient>,
    state_tx: watch::Sender<ConnState>,
    state_rx: watch::Receiver<ConnState>,
    last_error: Mutex<Option<String>>,
    bot_user_id: Mutex<Option<String>>,
    guild_cache: Mutex<Option<Vec<NamedRef>>>,
    /// Serializes login attempts so concurrent connects converge on one.
    login_lock: tokio::sync::Mutex<()>,
    /// Confirmation prompts awaiting their single interaction, keyed by
    /// prompt message id. First resolution wins.
    pending_prompts: DashMap<String, oneshot::Sender<bool>>,
}

impl Connection {
    /// Create the connection and start its event pump.
    pub fn spawn(
        identity: CredentialIdentity,
        credentials: Credentials,
        client: Arc<dyn ChatClient>,
        events: mpsc::UnboundedReceiver<ClientEvent>,
        fanout: mpsc::UnboundedSender<GatewayEvent>,
    ) -> Arc<Self> {
        let (state_tx, state_rx) = watch::channel(ConnState::Idle);
        let conn = Arc::new(Self {
            identity,
            credentials,
            client,
            state_tx,
            state_rx,
            last_error: Mutex::new(None),
            bot_user_id: Mutex::new(None),
            guild_cache: Mutex::new(None),
            login_lock: tokio::sync::Mutex::new(()),
            pending_prompts: DashMap::new(),
        });
        // The pump must not keep the connection alive: once the registry
        // drops its entry, the connection (and its client) go away and the
        // pump winds down with them.
        tokio::spawn(pump(Arc::downgrade(&conn), events, fanout));
        conn
    }

    pub fn identity(&self) -> &CredentialIdentity {
        &self.identity
    }

    pub fn state(&self) -> ConnState {
        *self.state_rx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnState::Ready
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Clear a previous failure so the next `login` retries on this same
    /// object. `Error → Connecting` is a deliberate policy: other tables
    /// already reference this identity.
    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    /// The bot's own user id once Ready; used for self-suppression and
    /// mention matching.
    pub fn bot_user_id(&self) -> Option<String> {
        self.bot_user_id.lock().clone()
    }

    fn set_state(&self, state: ConnState) {
        self.state_tx.send_replace(state);
    }

    fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("connection {}: {}", self.identity, message);
        *self.last_error.lock() = Some(message);
    }

    /// Wait up to `ceiling` for an in-flight login to leave `Connecting`.
    /// Returns the state observed when it settles (or `Connecting` if the
    /// ceiling expires first).
    pub async fn wait_settled(&self, ceiling: Duration) -> ConnState {
        let mut rx = self.state_rx.clone();
        let settled = tokio::time::timeout(ceiling, async {
            loop {
                let state = *rx.borrow_and_update();
                if state != ConnState::Connecting {
                    return state;
                }
                if rx.changed().await.is_err() {
                    return ConnState::Error;
                }
            }
        })
        .await;
        settled.unwrap_or(ConnState::Connecting)
    }

    /// Initiate login and wait for it to settle, bounded by the login
    /// ceiling. A no-op when already Ready. On ceiling expiry the state is
    /// forced to Error and the half-initialized client is torn down so a
    /// retry starts clean.
    pub async fn login(&self) -> Result<()> {
        let _guard = self.login_lock.lock().await;
        if self.is_ready() {
            debug!("connection {} already ready", self.identity);
            return Ok(());
        }

        self.clear_error();
        self.set_state(ConnState::Connecting);

        if let Err(e) = self.client.login(&self.credentials.token).await {
            self.record_error(e.to_string());
            self.set_state(ConnState::Error);
            return Err(GatewayError::LoginRejected(e.to_string()));
        }

        let mut rx = self.state_rx.clone();
        let waited = tokio::time::timeout(Duration::from_millis(LOGIN_TIMEOUT_MS), async {
            loop {
                match *rx.borrow_and_update() {
                    ConnState::Ready => return Ok(()),
                    ConnState::Error => {
                        let reason = self
                            .last_error()
                            .unwrap_or_else(|| "unknown login error".to_string());
                        return Err(GatewayError::LoginRejected(reason));
                    }
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err(GatewayError::Platform("event stream closed".to_string()));
                }
            }
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_elapsed) => {
                self.record_error("login timed out waiting for ready state");
                self.set_state(ConnState::Error);
                self.client.shutdown().await;
                Err(GatewayError::Timeout)
            }
        }
    }

    /// Tear the session down and reset caches. The error record survives
    /// for diagnostics.
    pub async fn shutdown(&self) {
        self.client.shutdown().await;
        self.set_state(ConnState::Idle);
        *self.guild_cache.lock() = None;
        *self.bot_user_id.lock() = None;
    }

    // ------------------------------------------------------------------
    // Fetch operations: empty results when not Ready, never errors.
    // ------------------------------------------------------------------

    pub async fn fetch_guilds(&self) -> Vec<NamedRef> {
        if !self.is_ready() {
            warn!("connection {} not ready, cannot fetch guilds", self.identity);
            return Vec::new();
        }
        if let Some(cached) = self.guild_cache.lock().clone() {
            return cached;
        }
        match self.client.guilds().await {
            Ok(guilds) => {
                *self.guild_cache.lock() = Some(guilds.clone());
                guilds
            }
            Err(e) => {
                self.record_error(format!("failed to fetch guilds: {}", e));
                Vec::new()
            }
        }
    }

    pub async fn fetch_channels(&self, guild_ids: &[String]) -> Vec<NamedRef> {
        if !self.is_ready() {
            warn!(
                "connection {} not ready, cannot fetch channels",
                self.identity
            );
            return Vec::new();
        }
        let mut results = Vec::new();
        for guild_id in guild_ids {
            match self.client.channels(guild_id).await {
                Ok(channels) => results.extend(channels),
                Err(e) => warn!(
                    "connection {}: skipping guild {}: {}",
                    self.identity, guild_id, e
                ),
            }
        }
        results
    }

    pub async fn fetch_roles(&self, guild_ids: &[String]) -> Vec<NamedRef> {
        if !self.is_ready() {
            warn!("connection {} not ready, cannot fetch roles", self.identity);
            return Vec::new();
        }
        let mut results = Vec::new();
        for guild_id in guild_ids {
            match self.client.roles(guild_id).await {
                Ok(roles) => results.extend(
                    roles
                        .into_iter()
                        .filter(|role| role.name != EVERYONE_ROLE_NAME)
                        .map(|role| NamedRef::new(role.name, role.id)),
                ),
                Err(e) => warn!(
                    "connection {}: skipping guild {}: {}",
                    self.identity, guild_id, e
                ),
            }
        }
        results
    }

    /// Fetch the message another message replies to, for payload
    /// enrichment. Failures are logged, not propagated.
    pub async fn fetch_reference(&self, message: &ChatMessage) -> Option<ChatMessage> {
        let reply_to = message.reply_to.as_deref()?;
        match self
            .client
            .fetch_message(&message.channel_id, reply_to)
            .await
        {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!(
                    "connection {}: could not fetch reference {} of message {}: {}",
                    self.identity, reply_to, message.id, e
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Action operations: uniform outcome values, nothing propagates.
    // ------------------------------------------------------------------

    pub async fn send_message(&self, channel_id: &str, spec: &MessageSpec) -> SendOutcome {
        if !self.is_ready() {
            return SendOutcome::failure(format!("bot {} is not ready", self.identity));
        }
        let prepared = prepare(spec);
        match self.client.send_message(channel_id, &prepared).await {
            Ok(message_id) => SendOutcome::sent(channel_id, message_id),
            Err(e) => SendOutcome::failure(e.to_string()),
        }
    }

    pub async fn perform_action(&self, action: ActionSpec) -> ActionOutcome {
        if !self.is_ready() {
            return ActionOutcome::failure(format!("bot {} is not ready", self.identity));
        }
        let kind = action.kind();
        match action {
            ActionSpec::PurgeMessages { channel_id, count } => {
                let clamped = count.clamp(1, 100) as u8;
                match self.client.bulk_delete(&channel_id, clamped).await {
                    Ok(()) => ActionOutcome::done(kind),
                    Err(e) => ActionOutcome::failure(e.to_string()),
                }
            }
            ActionSpec::AddRole {
                guild_id,
                user_id,
                role_ids,
            } => {
                self.change_roles(kind, &guild_id, &user_id, role_ids.into_ids(), true)
                    .await
            }
            ActionSpec::RemoveRole {
                guild_id,
                user_id,
                role_ids,
            } => {
                self.change_roles(kind, &guild_id, &user_id, role_ids.into_ids(), false)
                    .await
            }
        }
    }

    /// Grant or revoke roles on one member. Unknown role ids are skipped
    /// with a warning; an already-granted (or already-absent) role is left
    /// alone; an unknown guild or user fails the whole action.
    async fn change_roles(
        &self,
        kind: &str,
        guild_id: &str,
        user_id: &str,
        role_ids: Vec<String>,
        grant: bool,
    ) -> ActionOutcome {
        for role_id in role_ids {
            match self.client.role_exists(guild_id, &role_id).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        "role {} not found in guild {}, skipping",
                        role_id, guild_id
                    );
                    continue;
                }
                Err(e) => return ActionOutcome::failure(e.to_string()),
            }
            let has = match self.client.member_has_role(guild_id, user_id, &role_id).await {
                Ok(has) => has,
                Err(e) => return ActionOutcome::failure(e.to_string()),
            };
            if has == grant {
                continue;
            }
            if let Err(e) = self
                .client
                .modify_role(guild_id, user_id, &role_id, grant)
                .await
            {
                warn!(
                    "failed to {} role {} for user {} in guild {}: {}",
                    kind, role_id, user_id, guild_id, e
                );
            }
        }
        ActionOutcome::done(kind)
    }

    /// Send a confirmation prompt and wait for its single interaction.
    /// Resolves exactly once (affirm, deny, or timeout) and deletes the
    /// prompt message in every outcome before returning.
    pub async fn send_confirmation(
        &self,
        channel_id: &str,
        spec: &MessageSpec,
        timeout_ms: Option<u64>,
    ) -> ConfirmOutcome {
        if !self.is_ready() {
            return ConfirmOutcome::failure(format!("bot {} is not ready", self.identity));
        }

        let mut prepared = prepare(spec);
        prepared.confirm_buttons = true;

        let message_id = match self.client.send_message(channel_id, &prepared).await {
            Ok(id) => id,
            Err(e) => return ConfirmOutcome::failure(e.to_string()),
        };

        let (tx, rx) = oneshot::channel();
        self.pending_prompts.insert(message_id.clone(), tx);

        let ceiling = Duration::from_millis(timeout_ms.unwrap_or(CONFIRM_TIMEOUT_MS));
        let outcome = match tokio::time::timeout(ceiling, rx).await {
            Ok(Ok(affirm)) => ConfirmOutcome::resolved(affirm),
            Ok(Err(_)) => ConfirmOutcome::failure("confirmation collector closed"),
            Err(_elapsed) => {
                // Tear the listener down so a late press cannot fire.
                self.pending_prompts.remove(&message_id);
                info!("confirmation timed out for prompt {}", message_id);
                ConfirmOutcome::failure("confirmation timed out")
            }
        };

        if let Err(e) = self.client.delete_message(channel_id, &message_id).await {
            warn!("could not delete confirmation prompt {}: {}", message_id, e);
        }

        outcome
    }
}

/// Per-connection event pump: settles login state, resolves confirmation
/// prompts, forwards platform events to the router fan-out.
async fn pump(
    conn: std::sync::Weak<Connection>,
    mut events: mpsc::UnboundedReceiver<ClientEvent>,
    fanout: mpsc::UnboundedSender<GatewayEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(conn) = conn.upgrade() else {
            break;
        };
        match event {
            ClientEvent::Ready { bot_user_id } => {
                info!("connection {} ready as {}", conn.identity, bot_user_id);
                *conn.bot_user_id.lock() = Some(bot_user_id);
                conn.clear_error();
                conn.set_state(ConnState::Ready);
            }
            ClientEvent::Errored { message } => {
                conn.record_error(message);
                conn.set_state(ConnState::Error);
            }
            ClientEvent::Dropped { reason } => {
                conn.record_error(format!(
                    "connection dropped: {}",
                    reason.as_deref().unwrap_or("unknown reason")
                ));
                conn.set_state(ConnState::Error);
            }
            ClientEvent::ButtonPressed { message_id, affirm } => {
                if let Some((_, tx)) = conn.pending_prompts.remove(&message_id) {
                    let _ = tx.send(affirm);
                } else {
                    debug!("interaction on unknown or settled prompt {}", message_id);
                }
            }
            ClientEvent::MessageCreated(message) => {
                if !conn.is_ready() {
                    continue;
                }
                // The platform can echo our own traffic back; drop it here
                // so no subscriber ever sees it.
                if conn.bot_user_id().as_deref() == Some(message.author.id.as_str()) {
                    continue;
                }
                forward(
                    &fanout,
                    &conn,
                    PlatformEvent::Message {
                        message,
                        reference: None,
                    },
                );
            }
            ClientEvent::MemberJoined { guild, user } => {
                if conn.is_ready() {
                    forward(&fanout, &conn, PlatformEvent::MemberJoined { guild, user });
                }
            }
            ClientEvent::MemberLeft { guild, user } => {
                if conn.is_ready() {
                    forward(&fanout, &conn, PlatformEvent::MemberLeft { guild, user });
                }
            }
            ClientEvent::RoleCreated { guild, role } => {
                if conn.is_ready() {
                    forward(&fanout, &conn, PlatformEvent::RoleCreated { guild, role });
                }
            }
            ClientEvent::RoleDeleted { guild, role } => {
                if conn.is_ready() {
                    forward(&fanout, &conn, PlatformEvent::RoleDeleted { guild, role });
                }
            }
            ClientEvent::RoleUpdated { guild, old, new } => {
                // Updates with no observable change are noise.
                if conn.is_ready() && old != new {
                    forward(&fanout, &conn, PlatformEvent::RoleUpdated { guild, old, new });
                }
            }
        }
    }
    debug!("connection event pump ended");
}

fn forward(fanout: &mpsc::UnboundedSender<GatewayEvent>, conn: &Connection, event: PlatformEvent) {
    let _ = fanout.send(GatewayEvent {
        identity: conn.identity.clone(),
        event,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatClientFactory;
    use crate::loopback::{GuildFixture, LoopbackFactory, LoopbackHandle, LoopbackWorld};
    use tether_core::{ChatRole, ChatUser, GuildRef, RoleIdList};

    fn world() -> LoopbackWorld {
        LoopbackWorld::new("bot-user").with_guild(
            GuildFixture::new("g1", "Guild One")
                .with_channel("c1", "general")
                .with_role("r1", "mods")
                .with_member("u1", &["r1"]),
        )
    }

    struct Rig {
        conn: Arc<Connection>,
        handle: LoopbackHandle,
        events: mpsc::UnboundedReceiver<GatewayEvent>,
    }

    fn rig(factory: LoopbackFactory) -> Rig {
        let credentials = Credentials::new("A", "T");
        let (client, client_events) = factory.create(&credentials).unwrap();
        let handle = factory.handle("A").unwrap();
        let (fanout, events) = mpsc::unbounded_channel();
        let conn = Connection::spawn(
            CredentialIdentity::derive(&credentials),
            credentials,
            client,
            client_events,
            fanout,
        );
        Rig {
            conn,
            handle,
            events,
        }
    }

    async fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> T {
        for _ in 0..200 {
            if let Some(value) = probe() {
                return value;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn fetches_are_empty_until_ready() {
        let r = rig(LoopbackFactory::new(world()));
        assert_eq!(r.conn.state(), ConnState::Idle);
        assert!(r.conn.fetch_guilds().await.is_empty());
        assert!(r.conn.fetch_channels(&["g1".into()]).await.is_empty());
        assert!(r.conn.fetch_roles(&["g1".into()]).await.is_empty());
    }

    #[tokio::test]
    async fn login_reaches_ready_and_fetches_work() {
        let r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();
        assert!(r.conn.is_ready());
        assert_eq!(r.conn.bot_user_id().as_deref(), Some("bot-user"));

        let guilds = r.conn.fetch_guilds().await;
        assert_eq!(guilds.len(), 1);
        assert_eq!(guilds[0].value, "g1");

        // Twice in a row: same answer, served from the cache.
        assert_eq!(r.conn.fetch_guilds().await, guilds);

        let channels = r.conn.fetch_channels(&["g1".into()]).await;
        assert_eq!(channels[0].value, "c1");
    }

    #[tokio::test]
    async fn fetch_roles_excludes_the_everyone_role() {
        let r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();
        let roles = r.conn.fetch_roles(&["g1".into()]).await;
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].value, "r1");
    }

    #[tokio::test]
    async fn session_drop_moves_ready_to_error_and_login_recovers() {
        let mut r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();

        r.handle.drop_session("gateway hiccup");
        wait_for(|| (r.conn.state() == ConnState::Error).then_some(())).await;
        assert!(r.conn.last_error().unwrap().contains("gateway hiccup"));

        r.conn.login().await.unwrap();
        assert!(r.conn.is_ready());

        // Events received while Errored were not forwarded.
        assert!(r.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn purge_count_is_clamped_to_the_platform_window() {
        let r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();

        let outcome = r
            .conn
            .perform_action(ActionSpec::PurgeMessages {
                channel_id: "c1".into(),
                count: 500,
            })
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.action.as_deref(), Some("purge-messages"));
        assert_eq!(r.handle.purges(), vec![("c1".to_string(), 100)]);
    }

    #[tokio::test]
    async fn unknown_role_ids_are_skipped_not_fatal() {
        let r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();

        let outcome = r
            .conn
            .perform_action(ActionSpec::AddRole {
                guild_id: "g1".into(),
                user_id: "u1".into(),
                role_ids: RoleIdList::Joined("ghost,r1".into()),
            })
            .await;
        assert!(outcome.success);
        // r1 was already held, ghost does not exist: membership unchanged.
        assert_eq!(
            r.handle.member_roles("g1", "u1"),
            ["r1".to_string()].into_iter().collect()
        );

        let outcome = r
            .conn
            .perform_action(ActionSpec::RemoveRole {
                guild_id: "g1".into(),
                user_id: "u1".into(),
                role_ids: RoleIdList::Many(vec!["r1".into()]),
            })
            .await;
        assert!(outcome.success);
        assert!(r.handle.member_roles("g1", "u1").is_empty());
    }

    #[tokio::test]
    async fn action_on_unknown_user_fails_as_a_value() {
        let r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();

        let outcome = r
            .conn
            .perform_action(ActionSpec::AddRole {
                guild_id: "g1".into(),
                user_id: "nobody".into(),
                role_ids: RoleIdList::Many(vec!["r1".into()]),
            })
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("nobody"));
    }

    #[tokio::test]
    async fn confirmation_resolves_on_affirm_and_deletes_the_prompt() {
        let r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();

        let conn = r.conn.clone();
        let task = tokio::spawn(async move {
            conn.send_confirmation("c1", &MessageSpec::text("deploy?"), Some(5_000))
                .await
        });

        let sent = wait_for(|| r.handle.last_sent()).await;
        assert!(sent.message.confirm_buttons);

        r.handle.press_button(&sent.message_id, true);
        let outcome = task.await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::resolved(true));
        assert_eq!(r.handle.deleted(), vec![sent.message_id]);
    }

    #[tokio::test]
    async fn only_the_first_interaction_counts() {
        let r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();

        let conn = r.conn.clone();
        let task = tokio::spawn(async move {
            conn.send_confirmation("c1", &MessageSpec::text("sure?"), Some(5_000))
                .await
        });

        let sent = wait_for(|| r.handle.last_sent()).await;
        r.handle.press_button(&sent.message_id, false);
        r.handle.press_button(&sent.message_id, true);

        let outcome = task.await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::resolved(false));
        assert_eq!(r.handle.deleted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_timeout_resolves_null_and_still_deletes() {
        let r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();

        let conn = r.conn.clone();
        let task = tokio::spawn(async move {
            conn.send_confirmation("c1", &MessageSpec::text("still there?"), Some(500))
                .await
        });

        let outcome = task.await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.confirmed, None);
        assert_eq!(outcome.error.as_deref(), Some("confirmation timed out"));

        let sent = r.handle.last_sent().unwrap();
        assert_eq!(r.handle.deleted(), vec![sent.message_id.clone()]);

        // A late press after the deadline resolves nothing a second time.
        r.handle.press_button(&sent.message_id, true);
        tokio::task::yield_now().await;
        assert_eq!(r.handle.deleted().len(), 1);
    }

    #[tokio::test]
    async fn own_messages_are_never_forwarded() {
        let mut r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();

        r.handle.receive_message(ChatMessage {
            id: "m1".into(),
            channel_id: "c1".into(),
            content: "self echo".into(),
            author: ChatUser {
                id: "bot-user".into(),
                name: "loopback-bot".into(),
                bot: true,
                system: false,
            },
            ..Default::default()
        });
        r.handle.receive_message(ChatMessage {
            id: "m2".into(),
            channel_id: "c1".into(),
            content: "hello".into(),
            author: ChatUser {
                id: "u1".into(),
                name: "alice".into(),
                ..Default::default()
            },
            ..Default::default()
        });

        let event = wait_for(|| r.events.try_recv().ok()).await;
        match event.event {
            PlatformEvent::Message { message, .. } => assert_eq!(message.id, "m2"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unchanged_role_updates_are_suppressed() {
        let mut r = rig(LoopbackFactory::new(world()));
        r.conn.login().await.unwrap();

        let guild = GuildRef {
            id: "g1".into(),
            name: "Guild One".into(),
        };
        let role = ChatRole {
            id: "r1".into(),
            name: "mods".into(),
            ..Default::default()
        };
        r.handle.emit(ClientEvent::RoleUpdated {
            guild: guild.clone(),
            old: role.clone(),
            new: role.clone(),
        });

        let renamed = ChatRole {
            name: "admins".into(),
            ..role.clone()
        };
        r.handle.emit(ClientEvent::RoleUpdated {
            guild,
            old: role,
            new: renamed,
        });

        let event = wait_for(|| r.events.try_recv().ok()).await;
        match event.event {
            PlatformEvent::RoleUpdated { new, .. } => assert_eq!(new.name, "admins"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
