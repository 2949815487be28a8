//! Scripted in-memory platform driver
//!
//! Implements [`ChatClient`] against a fixture world instead of a real
//! chat platform: logins settle instantly (or fail, or hang, per token),
//! sent messages land in an inspectable outbox, and tests inject inbound
//! platform events through a [`LoopbackHandle`]. Used by the test suites
//! and by the `tetherd` daemon for local development.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use async_trait::async_trait;
use tether_core::{ChatMessage, ChatRole, ChatUser, Credentials, GuildRef, NamedRef};

use crate::client::{ChatClient, ChatClientFactory, ClientEvent, EVERYONE_ROLE_NAME};
use crate::error::{GatewayError, Result};
use crate::message::PreparedMessage;

/// One guild in the fixture world.
#[derive(Debug, Clone)]
pub struct GuildFixture {
    pub guild: GuildRef,
    pub channels: Vec<NamedRef>,
    pub roles: Vec<ChatRole>,
    /// user id → role ids held
    pub members: HashMap<String, HashSet<String>>,
}

impl GuildFixture {
    /// A guild always carries the implicit everyone role, mirroring the
    /// platform (its id is the guild id).
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            guild: GuildRef {
                id: id.clone(),
                name: name.into(),
            },
            channels: Vec::new(),
            roles: vec![ChatRole {
                id,
                name: EVERYONE_ROLE_NAME.to_string(),
                ..Default::default()
            }],
            members: HashMap::new(),
        }
    }

    pub fn with_channel(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.channels.push(NamedRef::new(name, id));
        self
    }

    pub fn with_role(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.roles.push(ChatRole {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        });
        self
    }

    pub fn with_member(mut self, user_id: impl Into<String>, role_ids: &[&str]) -> Self {
        self.members.insert(
            user_id.into(),
            role_ids.iter().map(|r| r.to_string()).collect(),
        );
        self
    }
}

/// The whole fixture world one factory serves.
#[derive(Debug, Clone, Default)]
pub struct LoopbackWorld {
    pub bot_user_id: String,
    pub guilds: Vec<GuildFixture>,
}

impl LoopbackWorld {
    pub fn new(bot_user_id: impl Into<String>) -> Self {
        Self {
            bot_user_id: bot_user_id.into(),
            guilds: Vec::new(),
        }
    }

    pub fn with_guild(mut self, guild: GuildFixture) -> Self {
        self.guilds.push(guild);
        self
    }

    fn find_guild(&self, guild_id: &str) -> Option<&GuildFixture> {
        self.guilds.iter().find(|g| g.guild.id == guild_id)
    }

    fn has_channel(&self, channel_id: &str) -> bool {
        self.guilds
            .iter()
            .any(|g| g.channels.iter().any(|c| c.value == channel_id))
    }
}

/// A message captured by the outbox.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel_id: String,
    pub message_id: String,
    pub message: PreparedMessage,
}

pub struct LoopbackClient {
    world: Arc<LoopbackWorld>,
    rejected_tokens: Arc<Mutex<HashSet<String>>>,
    silent_tokens: Arc<HashSet<String>>,
    logged_in: Mutex<bool>,
    events: mpsc::UnboundedSender<ClientEvent>,
    members: Mutex<HashMap<(String, String), HashSet<String>>>,
    outbox: Mutex<Vec<SentMessage>>,
    deleted: Mutex<Vec<String>>,
    purges: Mutex<Vec<(String, u8)>>,
    store: Mutex<HashMap<String, ChatMessage>>,
}

#[async_trait]
impl ChatClient for LoopbackClient {
    async fn login(&self, token: &str) -> Result<()> {
        if self.silent_tokens.contains(token) {
            // Never settles; exercises the login ceiling.
            return Ok(());
        }
        if self.rejected_tokens.lock().contains(token) {
            let _ = self.events.send(ClientEvent::Errored {
                message: "invalid token supplied".to_string(),
            });
            return Ok(());
        }
        *self.logged_in.lock() = true;
        let _ = self.events.send(ClientEvent::Ready {
            bot_user_id: self.world.bot_user_id.clone(),
        });
        Ok(())
    }

    async fn shutdown(&self) {
        *self.logged_in.lock() = false;
    }

    async fn guilds(&self) -> Result<Vec<NamedRef>> {
        self.ensure_logged_in()?;
        Ok(self
            .world
            .guilds
            .iter()
            .map(|g| NamedRef::new(g.guild.name.clone(), g.guild.id.clone()))
            .collect())
    }

    async fn channels(&self, guild_id: &str) -> Result<Vec<NamedRef>> {
        self.ensure_logged_in()?;
        self.world
            .find_guild(guild_id)
            .map(|g| g.channels.clone())
            .ok_or_else(|| GatewayError::UnknownGuild(guild_id.to_string()))
    }

    async fn roles(&self, guild_id: &str) -> Result<Vec<ChatRole>> {
        self.ensure_logged_in()?;
        self.world
            .find_guild(guild_id)
            .map(|g| g.roles.clone())
            .ok_or_else(|| GatewayError::UnknownGuild(guild_id.to_string()))
    }

    async fn send_message(&self, channel_id: &str, message: &PreparedMessage) -> Result<String> {
        self.ensure_logged_in()?;
        if !self.world.has_channel(channel_id) {
            return Err(GatewayError::UnknownChannel(channel_id.to_string()));
        }
        let message_id = format!("m-{}", Uuid::new_v4());
        self.outbox.lock().push(SentMessage {
            channel_id: channel_id.to_string(),
            message_id: message_id.clone(),
            message: message.clone(),
        });
        self.store.lock().insert(
            message_id.clone(),
            ChatMessage {
                id: message_id.clone(),
                channel_id: channel_id.to_string(),
                content: message.content.clone(),
                author: ChatUser {
                    id: self.world.bot_user_id.clone(),
                    name: "loopback-bot".to_string(),
                    bot: true,
                    system: false,
                },
                ..Default::default()
            },
        );
        Ok(message_id)
    }

    async fn delete_message(&self, _channel_id: &str, message_id: &str) -> Result<()> {
        self.deleted.lock().push(message_id.to_string());
        self.store.lock().remove(message_id);
        Ok(())
    }

    async fn bulk_delete(&self, channel_id: &str, count: u8) -> Result<()> {
        self.ensure_logged_in()?;
        if !self.world.has_channel(channel_id) {
            return Err(GatewayError::UnknownChannel(channel_id.to_string()));
        }
        self.purges.lock().push((channel_id.to_string(), count));
        Ok(())
    }

    async fn role_exists(&self, guild_id: &str, role_id: &str) -> Result<bool> {
        let guild = self
            .world
            .find_guild(guild_id)
            .ok_or_else(|| GatewayError::UnknownGuild(guild_id.to_string()))?;
        Ok(guild.roles.iter().any(|r| r.id == role_id))
    }

    async fn member_has_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<bool> {
        let members = self.members.lock();
        members
            .get(&(guild_id.to_string(), user_id.to_string()))
            .map(|roles| roles.contains(role_id))
            .ok_or_else(|| GatewayError::UnknownUser(user_id.to_string()))
    }

    async fn modify_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        grant: bool,
    ) -> Result<()> {
        let mut members = self.members.lock();
        let roles = members
            .get_mut(&(guild_id.to_string(), user_id.to_string()))
            .ok_or_else(|| GatewayError::UnknownUser(user_id.to_string()))?;
        if grant {
            roles.insert(role_id.to_string());
        } else {
            roles.remove(role_id);
        }
        Ok(())
    }

    async fn fetch_message(&self, _channel_id: &str, message_id: &str) -> Result<ChatMessage> {
        self.store
            .lock()
            .get(message_id)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownMessage(message_id.to_string()))
    }
}

impl LoopbackClient {
    fn ensure_logged_in(&self) -> Result<()> {
        if *self.logged_in.lock() {
            Ok(())
        } else {
            Err(GatewayError::NotReady)
        }
    }
}

/// Test-side handle to one loopback client: inject platform events,
/// inspect what the bot did.
#[derive(Clone)]
pub struct LoopbackHandle {
    client: Arc<LoopbackClient>,
}

impl LoopbackHandle {
    /// Inject a raw driver event.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.client.events.send(event);
    }

    /// Inbound platform message, as if another user typed it.
    pub fn receive_message(&self, message: ChatMessage) {
        self.emit(ClientEvent::MessageCreated(message));
    }

    /// A user pressed a confirmation control.
    pub fn press_button(&self, message_id: &str, affirm: bool) {
        self.emit(ClientEvent::ButtonPressed {
            message_id: message_id.to_string(),
            affirm,
        });
    }

    /// Drop the live session, as if the platform hung up.
    pub fn drop_session(&self, reason: &str) {
        self.emit(ClientEvent::Dropped {
            reason: Some(reason.to_string()),
        });
    }

    /// Make a message fetchable, e.g. the target of a reply.
    pub fn seed_message(&self, message: ChatMessage) {
        self.client
            .store
            .lock()
            .insert(message.id.clone(), message);
    }

    pub fn outbox(&self) -> Vec<SentMessage> {
        self.client.outbox.lock().clone()
    }

    pub fn last_sent(&self) -> Option<SentMessage> {
        self.client.outbox.lock().last().cloned()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.client.deleted.lock().clone()
    }

    pub fn purges(&self) -> Vec<(String, u8)> {
        self.client.purges.lock().clone()
    }

    pub fn member_roles(&self, guild_id: &str, user_id: &str) -> HashSet<String> {
        self.client
            .members
            .lock()
            .get(&(guild_id.to_string(), user_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

/// Factory handing out loopback clients over a shared fixture world.
pub struct LoopbackFactory {
    world: Arc<LoopbackWorld>,
    rejected_tokens: Arc<Mutex<HashSet<String>>>,
    silent_tokens: Arc<HashSet<String>>,
    handles: DashMap<String, LoopbackHandle>,
    created: AtomicUsize,
}

impl LoopbackFactory {
    pub fn new(world: LoopbackWorld) -> Self {
        Self {
            world: Arc::new(world),
            rejected_tokens: Arc::new(Mutex::new(HashSet::new())),
            silent_tokens: Arc::new(HashSet::new()),
            handles: DashMap::new(),
            created: AtomicUsize::new(0),
        }
    }

    /// Logins with this token settle to an error.
    pub fn reject_token(self, token: impl Into<String>) -> Self {
        self.rejected_tokens.lock().insert(token.into());
        self
    }

    /// Logins with this token never settle; for ceiling tests.
    pub fn silent_token(mut self, token: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.silent_tokens).insert(token.into());
        self
    }

    /// Let a previously rejected token log in, e.g. to test the
    /// error-then-retry path.
    pub fn pardon_token(&self, token: &str) {
        self.rejected_tokens.lock().remove(token);
    }

    /// Handle to the client created for `client_id`, if any.
    pub fn handle(&self, client_id: &str) -> Option<LoopbackHandle> {
        self.handles.get(client_id).map(|h| h.clone())
    }

    /// How many client sessions have been constructed.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl ChatClientFactory for LoopbackFactory {
    fn create(
        &self,
        credentials: &Credentials,
    ) -> Result<(Arc<dyn ChatClient>, mpsc::UnboundedReceiver<ClientEvent>)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let members = self
            .world
            .guilds
            .iter()
            .flat_map(|g| {
                g.members.iter().map(|(user, roles)| {
                    ((g.guild.id.clone(), user.clone()), roles.clone())
                })
            })
            .collect();
        let client = Arc::new(LoopbackClient {
            world: self.world.clone(),
            rejected_tokens: self.rejected_tokens.clone(),
            silent_tokens: self.silent_tokens.clone(),
            logged_in: Mutex::new(false),
            events: event_tx,
            members: Mutex::new(members),
            outbox: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            purges: Mutex::new(Vec::new()),
            store: Mutex::new(HashMap::new()),
        });
        self.created.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(
            credentials.client_id.clone(),
            LoopbackHandle {
                client: client.clone(),
            },
        );
        Ok((client, event_rx))
    }
}
