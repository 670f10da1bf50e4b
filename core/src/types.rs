/// Shared data model: users, friend requests, conversations, messages
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Presence status persisted on the user record (best-effort bookkeeping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Stored user record. Account CRUD lives in the external HTTP layer;
/// the core only reads display fields and mutates `friends`/`status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub about: Option<String>,
    /// Friend identities. Symmetric relation, sole writer is the
    /// friend request engine.
    pub friends: Vec<String>,
    pub status: PresenceStatus,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            avatar: None,
            about: None,
            friends: Vec::new(),
            status: PresenceStatus::Offline,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            user_id: self.user_id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Display projection of a user (what conversation views resolve).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
}

/// A pending friend request. Exists while Pending, deleted on accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub request_id: String,
    pub sender: String,
    pub receipt: String,
    pub created_at: DateTime<Utc>,
}

/// Message payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Media,
    Document,
    Link,
}

/// One message in a conversation log. Immutable once appended;
/// `seq` is the store-assigned append order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: Option<String>,
    pub file: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub seq: u64,
}

/// A direct conversation between exactly two distinct participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Canonical ID: "dm:{min_id}:{max_id}"
    pub conversation_id: String,
    pub participants: [String; 2],
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn other_participant(&self, user_id: &str) -> &str {
        if self.participants[0] == user_id {
            &self.participants[1]
        } else {
            &self.participants[0]
        }
    }
}

/// Conversation with participant metadata resolved for display,
/// plus a preview of the last message for list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub conversation_id: String,
    pub participants: Vec<UserSummary>,
    pub last_preview: Option<String>,
    pub last_timestamp: Option<DateTime<Utc>>,
}
