//! The platform update model.
//!
//! An [`Update`] is one event delivered by the messaging platform. Exactly one
//! [`UpdateKind`] variant is populated; the variant's snake_case tag doubles as
//! the media-type routing key used by channel fallback.
//!
//! # Wire shape
//!
//! ```text
//! { "update_id": 10001, "message": { "message_id": 1, "chat": {...}, ... } }
//!   └── update_id        └── tag ──┘ └── payload ─────────────────────────┘
//! ```
//!
//! Decoding is the ingestion layer's responsibility; the serde derives only
//! make the model directly usable by it. Payload structs carry the fields the
//! dispatch engine routes on and keep the rest opaque.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat_type::ChatType;

// ============================================================================
// Shared payload types
// ============================================================================

/// A platform user or bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: i64,
    /// Whether this user is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Public username, without the leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A chat (private, group, supergroup or channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Unique chat identifier.
    pub id: i64,
    /// The chat type.
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    /// Title for groups, supergroups and channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Public username, without the leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Service payload sent when a user is shared through a request button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserShared {
    /// Identifier of the request button that produced this payload.
    pub request_id: i64,
    /// The shared user.
    pub user_id: i64,
}

/// Service payload sent when a chat is shared through a request button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatShared {
    /// Identifier of the request button that produced this payload.
    pub request_id: i64,
    /// The shared chat.
    pub chat_id: i64,
}

/// A message, edited message or channel post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier inside the chat.
    pub message_id: i64,
    /// Sender; absent for channel posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    /// Unix time the message was sent.
    #[serde(default)]
    pub date: i64,
    /// The chat the message belongs to.
    pub chat: Chat,
    /// Text of a text message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Caption of a media message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// "User shared" service payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_shared: Option<UserShared>,
    /// "Chat shared" service payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_shared: Option<ChatShared>,
}

impl Message {
    /// Returns the non-empty text of this message, falling back to the caption.
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.caption.as_deref().filter(|c| !c.is_empty()))
    }
}

/// A press on an inline keyboard button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Query identifier.
    pub id: String,
    /// The user who pressed the button.
    pub from: User,
    /// The message carrying the button, if still available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// Inline message identifier for buttons on inline messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_message_id: Option<String>,
    /// Data attached to the button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// An incoming inline query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineQuery {
    /// Query identifier.
    pub id: String,
    /// Sender.
    pub from: User,
    /// Query text.
    #[serde(default)]
    pub query: String,
    /// Pagination offset.
    #[serde(default)]
    pub offset: String,
}

/// An inline result chosen by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChosenInlineResult {
    /// Identifier of the chosen result.
    pub result_id: String,
    /// The user who chose the result.
    pub from: User,
    /// The query used to obtain the result.
    #[serde(default)]
    pub query: String,
    /// Identifier of the sent inline message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_message_id: Option<String>,
}

/// A shipping query for an invoice with flexible price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingQuery {
    /// Query identifier.
    pub id: String,
    /// The user who sent the query.
    pub from: User,
    /// Bot-specified invoice payload.
    #[serde(default)]
    pub invoice_payload: String,
    /// Shipping address, kept opaque.
    #[serde(default)]
    pub shipping_address: Value,
}

/// A pre-checkout query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreCheckoutQuery {
    /// Query identifier.
    pub id: String,
    /// The user who sent the query.
    pub from: User,
    /// Three-letter currency code.
    #[serde(default)]
    pub currency: String,
    /// Total price in the smallest currency unit.
    #[serde(default)]
    pub total_amount: i64,
    /// Bot-specified invoice payload.
    #[serde(default)]
    pub invoice_payload: String,
    /// Order info, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_info: Option<Value>,
}

/// One answer option of a poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    /// Option text.
    pub text: String,
    /// Number of users that voted for this option.
    #[serde(default)]
    pub voter_count: i64,
}

/// A poll state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    /// Poll identifier.
    pub id: String,
    /// Poll question.
    #[serde(default)]
    pub question: String,
    /// Answer options.
    #[serde(default)]
    pub options: Vec<PollOption>,
    /// Total number of users that voted.
    #[serde(default)]
    pub total_voter_count: i64,
    /// Whether the poll is closed.
    #[serde(default)]
    pub is_closed: bool,
    /// Poll kind tag, `regular` or `quiz`.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A user's answer in a non-anonymous poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollAnswer {
    /// Poll identifier.
    pub poll_id: String,
    /// The user that changed the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// The chat that changed the answer, for anonymous voters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_chat: Option<Chat>,
    /// Chosen option indices; empty if the vote was retracted.
    #[serde(default)]
    pub option_ids: Vec<i64>,
}

/// A change of a chat member's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMemberUpdated {
    /// The chat the member belongs to.
    pub chat: Chat,
    /// Performer of the action.
    pub from: User,
    /// Unix time of the change.
    #[serde(default)]
    pub date: i64,
    /// Previous member state, kept opaque.
    #[serde(default)]
    pub old_chat_member: Value,
    /// New member state, kept opaque.
    #[serde(default)]
    pub new_chat_member: Value,
}

/// A request to join a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatJoinRequest {
    /// The chat to join.
    pub chat: Chat,
    /// The user requesting to join.
    pub from: User,
    /// Unix time of the request.
    #[serde(default)]
    pub date: i64,
    /// Bio of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

// ============================================================================
// Update
// ============================================================================

/// The populated variant of an [`Update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// New incoming message.
    Message(Message),
    /// New version of a known message.
    EditedMessage(Message),
    /// New channel post.
    ChannelPost(Message),
    /// New version of a known channel post.
    EditedChannelPost(Message),
    /// Inline keyboard button press.
    CallbackQuery(CallbackQuery),
    /// Inline query.
    InlineQuery(InlineQuery),
    /// Chosen inline result.
    ChosenInlineResult(ChosenInlineResult),
    /// Shipping query.
    ShippingQuery(ShippingQuery),
    /// Pre-checkout query.
    PreCheckoutQuery(PreCheckoutQuery),
    /// New poll state.
    Poll(Poll),
    /// Changed poll answer.
    PollAnswer(PollAnswer),
    /// The bot's own membership status changed.
    MyChatMember(ChatMemberUpdated),
    /// A member's status changed.
    ChatMember(ChatMemberUpdated),
    /// Join request.
    ChatJoinRequest(ChatJoinRequest),
}

impl UpdateKind {
    /// Every update-type tag, in declaration order.
    pub const ALL_TAGS: [&'static str; 14] = [
        "message",
        "edited_message",
        "channel_post",
        "edited_channel_post",
        "callback_query",
        "inline_query",
        "chosen_inline_result",
        "shipping_query",
        "pre_checkout_query",
        "poll",
        "poll_answer",
        "my_chat_member",
        "chat_member",
        "chat_join_request",
    ];

    /// Returns the snake_case tag of this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::EditedMessage(_) => "edited_message",
            Self::ChannelPost(_) => "channel_post",
            Self::EditedChannelPost(_) => "edited_channel_post",
            Self::CallbackQuery(_) => "callback_query",
            Self::InlineQuery(_) => "inline_query",
            Self::ChosenInlineResult(_) => "chosen_inline_result",
            Self::ShippingQuery(_) => "shipping_query",
            Self::PreCheckoutQuery(_) => "pre_checkout_query",
            Self::Poll(_) => "poll",
            Self::PollAnswer(_) => "poll_answer",
            Self::MyChatMember(_) => "my_chat_member",
            Self::ChatMember(_) => "chat_member",
            Self::ChatJoinRequest(_) => "chat_join_request",
        }
    }
}

/// One platform event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonically increasing sequence id, used by ingestion for acknowledgement.
    pub update_id: i64,
    /// The populated variant.
    #[serde(flatten)]
    pub kind: UpdateKind,
}

impl Update {
    /// Creates a new update.
    pub fn new(update_id: i64, kind: UpdateKind) -> Self {
        Self { update_id, kind }
    }

    /// Returns the update-type tag, the media-type routing key.
    pub fn type_tag(&self) -> &'static str {
        self.kind.tag()
    }

    /// Returns the message of message-like variants.
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => Some(m),
            _ => None,
        }
    }

    /// Returns a mutable reference to the message of message-like variants.
    pub fn message_mut(&mut self) -> Option<&mut Message> {
        match &mut self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => Some(m),
            _ => None,
        }
    }

    /// Resolves the acting user from the variant-specific "from" field.
    pub fn sender(&self) -> Option<&User> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => m.from.as_ref(),
            UpdateKind::CallbackQuery(q) => Some(&q.from),
            UpdateKind::InlineQuery(q) => Some(&q.from),
            UpdateKind::ChosenInlineResult(r) => Some(&r.from),
            UpdateKind::ShippingQuery(q) => Some(&q.from),
            UpdateKind::PreCheckoutQuery(q) => Some(&q.from),
            UpdateKind::Poll(_) => None,
            UpdateKind::PollAnswer(a) => a.user.as_ref(),
            UpdateKind::MyChatMember(c) | UpdateKind::ChatMember(c) => Some(&c.from),
            UpdateKind::ChatJoinRequest(r) => Some(&r.from),
        }
    }

    /// Resolves the chat this update belongs to, if any.
    pub fn chat(&self) -> Option<&Chat> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => Some(&m.chat),
            UpdateKind::CallbackQuery(q) => q.message.as_ref().map(|m| &m.chat),
            UpdateKind::PollAnswer(a) => a.voter_chat.as_ref(),
            UpdateKind::MyChatMember(c) | UpdateKind::ChatMember(c) => Some(&c.chat),
            UpdateKind::ChatJoinRequest(r) => Some(&r.chat),
            UpdateKind::InlineQuery(_)
            | UpdateKind::ChosenInlineResult(_)
            | UpdateKind::ShippingQuery(_)
            | UpdateKind::PreCheckoutQuery(_)
            | UpdateKind::Poll(_) => None,
        }
    }

    /// Returns the non-empty text (or caption) of message-like variants.
    pub fn text(&self) -> Option<&str> {
        self.message().and_then(Message::text_or_caption)
    }

    /// Returns the callback data of a callback query.
    pub fn callback_data(&self) -> Option<&str> {
        match &self.kind {
            UpdateKind::CallbackQuery(q) => q.data.as_deref(),
            _ => None,
        }
    }

    /// Returns the "user shared" service payload of a message.
    pub fn user_shared(&self) -> Option<&UserShared> {
        self.message().and_then(|m| m.user_shared.as_ref())
    }

    /// Returns the "chat shared" service payload of a message.
    pub fn chat_shared(&self) -> Option<&ChatShared> {
        self.message().and_then(|m| m.chat_shared.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_message_update() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 10001,
            "message": {
                "message_id": 7,
                "from": { "id": 42, "first_name": "Ada" },
                "chat": { "id": -100, "type": "supergroup", "title": "Lab" },
                "text": "hello"
            }
        }))
        .unwrap();

        assert_eq!(update.update_id, 10001);
        assert_eq!(update.type_tag(), "message");
        assert_eq!(update.sender().map(|u| u.id), Some(42));
        assert_eq!(update.chat().map(|c| c.chat_type), Some(ChatType::Supergroup));
        assert_eq!(update.text(), Some("hello"));
    }

    #[test]
    fn test_callback_query_accessors() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb1",
                "from": { "id": 5 },
                "data": "vote:yes"
            }
        }))
        .unwrap();

        assert_eq!(update.type_tag(), "callback_query");
        assert_eq!(update.callback_data(), Some("vote:yes"));
        assert!(update.chat().is_none());
        assert!(update.text().is_none());
    }

    #[test]
    fn test_empty_text_falls_back_to_caption() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 3,
            "channel_post": {
                "message_id": 1,
                "chat": { "id": -200, "type": "channel", "username": "news" },
                "text": "",
                "caption": "photo caption"
            }
        }))
        .unwrap();

        assert!(update.sender().is_none());
        assert_eq!(update.text(), Some("photo caption"));
    }

    #[test]
    fn test_service_payloads() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 4,
            "message": {
                "message_id": 9,
                "from": { "id": 1 },
                "chat": { "id": 1, "type": "private" },
                "user_shared": { "request_id": 42, "user_id": 77 }
            }
        }))
        .unwrap();

        assert_eq!(update.user_shared().map(|s| s.request_id), Some(42));
        assert!(update.chat_shared().is_none());
    }

    #[test]
    fn test_tags_cover_all_variants() {
        let mut tags = UpdateKind::ALL_TAGS.to_vec();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), UpdateKind::ALL_TAGS.len());
    }
}
