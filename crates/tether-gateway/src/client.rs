//! Platform client seam
//!
//! The chat-platform client library is a black box behind [`ChatClient`]:
//! it logs in, caches guild/channel/role collections, sends and deletes
//! messages, mutates member roles, and pushes everything that happens on
//! the platform into an event stream. Real drivers live out of tree; the
//! in-repo [`loopback`](crate::loopback) driver implements the same trait
//! for tests and local development.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use tether_core::{ChatMessage, ChatRole, ChatUser, Credentials, GuildRef, NamedRef};

use crate::error::Result;
use crate::message::PreparedMessage;

/// Name of the implicit all-members role the platform puts in every guild.
/// Never returned by role listings.
pub const EVERYONE_ROLE_NAME: &str = "@everyone";

/// Everything the platform can tell us, normalized at the driver boundary.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Login settled successfully; the session is live.
    Ready { bot_user_id: String },
    /// The session dropped after being live.
    Dropped { reason: Option<String> },
    /// The client hit an error (failed login, gateway fault).
    Errored { message: String },
    MessageCreated(ChatMessage),
    MemberJoined { guild: GuildRef, user: ChatUser },
    MemberLeft { guild: GuildRef, user: ChatUser },
    RoleCreated { guild: GuildRef, role: ChatRole },
    RoleDeleted { guild: GuildRef, role: ChatRole },
    RoleUpdated { guild: GuildRef, old: ChatRole, new: ChatRole },
    /// A user pressed one of the confirmation controls on a prompt.
    ButtonPressed { message_id: String, affirm: bool },
}

/// One platform session. `login` only initiates; the outcome arrives as a
/// `Ready` or `Errored` event on the stream handed out at creation.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Initiate the asynchronous login. An immediate rejection (malformed
    /// token) may surface here; everything else arrives on the stream.
    async fn login(&self, token: &str) -> Result<()>;

    /// Tear the session down. Safe to call in any state.
    async fn shutdown(&self);

    /// Guilds the bot is in, from the client's cache.
    async fn guilds(&self) -> Result<Vec<NamedRef>>;

    /// Text channels of one guild.
    async fn channels(&self, guild_id: &str) -> Result<Vec<NamedRef>>;

    /// All roles of one guild, including the implicit everyone role.
    async fn roles(&self, guild_id: &str) -> Result<Vec<ChatRole>>;

    /// Send a prepared message; returns the new message id.
    async fn send_message(&self, channel_id: &str, message: &PreparedMessage) -> Result<String>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()>;

    /// Bulk-delete the most recent `count` messages in a channel.
    async fn bulk_delete(&self, channel_id: &str, count: u8) -> Result<()>;

    async fn role_exists(&self, guild_id: &str, role_id: &str) -> Result<bool>;

    async fn member_has_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<bool>;

    /// Grant (`grant = true`) or revoke a role on a member.
    async fn modify_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        grant: bool,
    ) -> Result<()>;

    /// Fetch one message, used to enrich replies with their reference.
    async fn fetch_message(&self, channel_id: &str, message_id: &str) -> Result<ChatMessage>;
}

/// Creates one client session per credential set. Construction is cheap
/// and synchronous; no platform traffic happens before `login`.
pub trait ChatClientFactory: Send + Sync {
    fn create(
        &self,
        credentials: &Credentials,
    ) -> Result<(Arc<dyn ChatClient>, mpsc::UnboundedReceiver<ClientEvent>)>;
}
