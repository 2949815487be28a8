//! Protocol types and message definitions
//!
//! Every frame on the broker socket is one [`Message`]. Requests that expect
//! a reply carry a `seq` which the reply echoes; trigger registration and
//! removal are fire-and-forget. Event frames flow broker → node only.

use serde::{Deserialize, Serialize};

/// Bot credentials as supplied by a node process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub token: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            token: token.into(),
        }
    }

    /// Both identity fields present. Requests with incomplete credentials
    /// are rejected before the registry is touched.
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.token.is_empty()
    }
}

/// A name/id pair as returned by the list operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub name: String,
    pub value: String,
}

impl NamedRef {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// Platform entities (serialized into event payloads)
// ============================================================================

/// A platform user, as much of it as the matcher and subscribers need.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub system: bool,
}

/// A guild role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRole {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub mentionable: bool,
}

/// A guild reference carried on lifecycle events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRef {
    pub id: String,
    pub name: String,
}

/// An inbound platform message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub content: String,
    pub author: ChatUser,
    /// Role ids the author holds in the message's guild.
    #[serde(default)]
    pub author_role_ids: Vec<String>,
    /// User ids mentioned in the message body.
    #[serde(default)]
    pub mentioned_user_ids: Vec<String>,
    /// Id of the message this one replies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Creation time, unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

// ============================================================================
// Trigger filters
// ============================================================================

/// How the message body is tested against the filter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    Equals,
    StartsWith,
    EndsWith,
    Contains,
    Regex,
    MatchAll,
    BotMentioned,
}

/// Filter parameters for a message trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilter {
    #[serde(default)]
    pub guild_ids: Vec<String>,
    #[serde(default)]
    pub channel_ids: Vec<String>,
    #[serde(default)]
    pub role_ids: Vec<String>,
    pub pattern: MatchKind,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub require_reply: bool,
    /// Fire on messages authored by other bots. Messages from this bot
    /// itself are always suppressed.
    #[serde(default)]
    pub allow_other_bots: bool,
}

impl MessageFilter {
    /// A filter matching every non-bot message, useful as a test baseline.
    pub fn match_all() -> Self {
        Self {
            guild_ids: Vec::new(),
            channel_ids: Vec::new(),
            role_ids: Vec::new(),
            pattern: MatchKind::MatchAll,
            value: String::new(),
            case_sensitive: false,
            require_reply: false,
            allow_other_bots: false,
        }
    }
}

/// Guild lifecycle event families a subscriber can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleKind {
    MemberJoined,
    MemberLeft,
    RoleCreated,
    RoleDeleted,
    RoleUpdated,
}

/// Filter parameters for a lifecycle trigger. An empty `guild_ids` list
/// means all guilds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleFilter {
    pub event: LifecycleKind,
    #[serde(default)]
    pub guild_ids: Vec<String>,
}

/// What a subscriber wants to be woken for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TriggerFilter {
    Message(MessageFilter),
    Lifecycle(LifecycleFilter),
}

// ============================================================================
// Outbound message construction
// ============================================================================

fn default_true() -> bool {
    true
}

/// One embed field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFieldSpec {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Rich embed body. Image-bearing fields accept plain URLs or inline
/// `data:` URLs; inline data is decoded and re-attached by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    /// RFC 3339 timestamp; invalid values are dropped with a warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedFieldSpec>,
}

/// An attachment: either a URL the platform fetches itself, or inline
/// base64 data re-uploaded under `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Everything a node can say about an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSpec {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mention_role_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mention_user_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default = "default_true")]
    pub fail_if_reply_target_missing: bool,
}

impl Default for MessageSpec {
    fn default() -> Self {
        Self {
            content: String::new(),
            mention_role_ids: Vec::new(),
            mention_user_ids: Vec::new(),
            embed: None,
            files: Vec::new(),
            reply_to: None,
            fail_if_reply_target_missing: true,
        }
    }
}

impl MessageSpec {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Role ids for role actions: a list, or the comma-joined form some
/// callers produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleIdList {
    Many(Vec<String>),
    Joined(String),
}

impl RoleIdList {
    /// Normalize into individual non-empty ids.
    pub fn into_ids(self) -> Vec<String> {
        match self {
            RoleIdList::Many(ids) => ids.into_iter().filter(|id| !id.is_empty()).collect(),
            RoleIdList::Joined(joined) => joined
                .split(',')
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }
}

/// Moderation actions a node can request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ActionSpec {
    /// Bulk-delete the last `count` messages in a channel. `count` is
    /// clamped to the platform's 1..=100 window.
    PurgeMessages { channel_id: String, count: u32 },
    AddRole {
        guild_id: String,
        user_id: String,
        role_ids: RoleIdList,
    },
    RemoveRole {
        guild_id: String,
        user_id: String,
        role_ids: RoleIdList,
    },
}

impl ActionSpec {
    /// Wire tag of this action, echoed in the reply.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionSpec::PurgeMessages { .. } => "purge-messages",
            ActionSpec::AddRole { .. } => "add-role",
            ActionSpec::RemoveRole { .. } => "remove-role",
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a `credentials` request. Callers branch on this string alone;
/// error detail stays in the broker log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectStatus {
    Ready,
    Already,
    Error,
    Missing,
}

/// A list reply: the items, or an error object. The shape itself is the
/// success/failure discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListOutcome {
    Items(Vec<NamedRef>),
    Failure { error: String },
}

impl ListOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        ListOutcome::Failure {
            error: error.into(),
        }
    }
}

/// Result of `send-message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn sent(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            channel_id: Some(channel_id.into()),
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            channel_id: None,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Result of `perform-action`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn done(action: &str) -> Self {
        Self {
            success: true,
            action: Some(action.to_string()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            action: None,
            error: Some(error.into()),
        }
    }
}

/// Result of `send-confirmation`. `confirmed` is always present on the
/// wire: `true`, `false`, or `null` (no interaction before the deadline).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOutcome {
    pub success: bool,
    pub confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConfirmOutcome {
    pub fn resolved(confirmed: bool) -> Self {
        Self {
            success: true,
            confirmed: Some(confirmed),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            confirmed: None,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// A platform event after normalization at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlatformEvent {
    Message {
        message: ChatMessage,
        /// The replied-to message, fetched at most once per inbound
        /// message when any matching subscriber wants it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<ChatMessage>,
    },
    MemberJoined {
        guild: GuildRef,
        user: ChatUser,
    },
    MemberLeft {
        guild: GuildRef,
        user: ChatUser,
    },
    RoleCreated {
        guild: GuildRef,
        role: ChatRole,
    },
    RoleDeleted {
        guild: GuildRef,
        role: ChatRole,
    },
    RoleUpdated {
        guild: GuildRef,
        old: ChatRole,
        new: ChatRole,
    },
}

impl PlatformEvent {
    /// The lifecycle family this event belongs to, if it is one.
    pub fn lifecycle_kind(&self) -> Option<LifecycleKind> {
        match self {
            PlatformEvent::Message { .. } => None,
            PlatformEvent::MemberJoined { .. } => Some(LifecycleKind::MemberJoined),
            PlatformEvent::MemberLeft { .. } => Some(LifecycleKind::MemberLeft),
            PlatformEvent::RoleCreated { .. } => Some(LifecycleKind::RoleCreated),
            PlatformEvent::RoleDeleted { .. } => Some(LifecycleKind::RoleDeleted),
            PlatformEvent::RoleUpdated { .. } => Some(LifecycleKind::RoleUpdated),
        }
    }

    /// The guild the event happened in, when known.
    pub fn guild_id(&self) -> Option<&str> {
        match self {
            PlatformEvent::Message { message, .. } => message.guild_id.as_deref(),
            PlatformEvent::MemberJoined { guild, .. }
            | PlatformEvent::MemberLeft { guild, .. }
            | PlatformEvent::RoleCreated { guild, .. }
            | PlatformEvent::RoleDeleted { guild, .. }
            | PlatformEvent::RoleUpdated { guild, .. } => Some(&guild.id),
        }
    }
}

/// An event as delivered to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub subscriber_id: String,
    #[serde(flatten)]
    pub event: PlatformEvent,
}

// ============================================================================
// Wire frames
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsRequest {
    pub seq: u64,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub token: String,
}

impl CredentialsRequest {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.client_id.clone(), self.token.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListGuildsRequest {
    pub seq: u64,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListScopedRequest {
    pub seq: u64,
    pub credentials: Credentials,
    #[serde(default)]
    pub guild_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTriggerRequest {
    pub subscriber_id: String,
    pub credentials: Credentials,
    pub filter: TriggerFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterTriggerRequest {
    pub subscriber_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub seq: u64,
    pub credentials: Credentials,
    pub channel_id: String,
    pub message: MessageSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformActionRequest {
    pub seq: u64,
    pub credentials: Credentials,
    #[serde(flatten)]
    pub action: ActionSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendConfirmationRequest {
    pub seq: u64,
    pub credentials: Credentials,
    pub channel_id: String,
    pub message: MessageSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsAck {
    pub seq: u64,
    pub status: ConnectStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListReply {
    pub seq: u64,
    pub result: ListOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReply {
    pub seq: u64,
    #[serde(flatten)]
    pub outcome: SendOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReply {
    pub seq: u64,
    #[serde(flatten)]
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmReply {
    pub seq: u64,
    #[serde(flatten)]
    pub outcome: ConfirmOutcome,
}

/// One frame on the broker socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    // node → broker
    #[serde(rename = "credentials")]
    Credentials(CredentialsRequest),
    #[serde(rename = "list:guilds")]
    ListGuilds(ListGuildsRequest),
    #[serde(rename = "list:channels")]
    ListChannels(ListScopedRequest),
    #[serde(rename = "list:roles")]
    ListRoles(ListScopedRequest),
    #[serde(rename = "register-trigger")]
    RegisterTrigger(RegisterTriggerRequest),
    #[serde(rename = "unregister-trigger")]
    UnregisterTrigger(UnregisterTriggerRequest),
    #[serde(rename = "send-message")]
    SendMessage(SendMessageRequest),
    #[serde(rename = "perform-action")]
    PerformAction(PerformActionRequest),
    #[serde(rename = "send-confirmation")]
    SendConfirmation(SendConfirmationRequest),

    // broker → node
    #[serde(rename = "credentials-ack")]
    CredentialsAck(CredentialsAck),
    #[serde(rename = "list-reply")]
    ListReply(ListReply),
    #[serde(rename = "send-reply")]
    SendReply(SendReply),
    #[serde(rename = "action-reply")]
    ActionReply(ActionReply),
    #[serde(rename = "confirm-reply")]
    ConfirmReply(ConfirmReply),
    #[serde(rename = "event")]
    Event(EventEnvelope),
}

impl Message {
    /// Correlation id of a reply frame, if this is one.
    pub fn reply_seq(&self) -> Option<u64> {
        match self {
            Message::CredentialsAck(r) => Some(r.seq),
            Message::ListReply(r) => Some(r.seq),
            Message::SendReply(r) => Some(r.seq),
            Message::ActionReply(r) => Some(r.seq),
            Message::ConfirmReply(r) => Some(r.seq),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_status_is_a_bare_string_on_the_wire() {
        let ack = Message::CredentialsAck(CredentialsAck {
            seq: 7,
            status: ConnectStatus::Already,
        });
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["type"], "credentials-ack");
        assert_eq!(json["status"], "already");
    }

    #[test]
    fn list_outcome_discriminates_array_from_error_object() {
        let ok: ListOutcome = serde_json::from_str(r#"[{"name":"general","value":"c1"}]"#).unwrap();
        assert_eq!(ok, ListOutcome::Items(vec![NamedRef::new("general", "c1")]));

        let err: ListOutcome = serde_json::from_str(r#"{"error":"bot not ready"}"#).unwrap();
        assert_eq!(err, ListOutcome::failure("bot not ready"));
    }

    #[test]
    fn confirm_outcome_keeps_null_confirmed_on_the_wire() {
        let reply = Message::ConfirmReply(ConfirmReply {
            seq: 1,
            outcome: ConfirmOutcome::failure("confirmation timed out"),
        });
        let json = serde_json::to_value(&reply).unwrap();
        assert!(json["confirmed"].is_null());
        assert_eq!(json["success"], false);
    }

    #[test]
    fn role_id_list_accepts_both_forms() {
        assert_eq!(
            RoleIdList::Joined("r1, r2,,r3".into()).into_ids(),
            vec!["r1", "r2", "r3"]
        );
        assert_eq!(
            RoleIdList::Many(vec!["r1".into(), String::new()]).into_ids(),
            vec!["r1"]
        );
    }

    #[test]
    fn filter_tags_match_the_wire_vocabulary() {
        let filter = TriggerFilter::Message(MessageFilter {
            pattern: MatchKind::StartsWith,
            value: "!ping".into(),
            ..MessageFilter::match_all()
        });
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["pattern"], "starts-with");

        let lifecycle = TriggerFilter::Lifecycle(LifecycleFilter {
            event: LifecycleKind::MemberJoined,
            guild_ids: vec![],
        });
        let json = serde_json::to_value(&lifecycle).unwrap();
        assert_eq!(json["event"], "member-joined");
    }

    #[test]
    fn missing_credential_fields_deserialize_as_incomplete() {
        let req: CredentialsRequest = serde_json::from_str(r#"{"seq":1,"client_id":"A"}"#).unwrap();
        assert!(!req.credentials().is_complete());
    }

    #[test]
    fn event_envelope_flattens_the_event_payload() {
        let envelope = EventEnvelope {
            subscriber_id: "node-1".into(),
            event: PlatformEvent::MemberLeft {
                guild: GuildRef {
                    id: "g1".into(),
                    name: "Guild".into(),
                },
                user: ChatUser {
                    id: "u1".into(),
                    name: "alice".into(),
                    ..Default::default()
                },
            },
        };
        let json = serde_json::to_value(Message::Event(envelope)).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["kind"], "member-left");
        assert_eq!(json["subscriber_id"], "node-1");
    }
}
