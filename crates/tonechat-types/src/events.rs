use serde::{Deserialize, Serialize};

use crate::api::MessagePayload;
use crate::models::UserId;

/// Events pushed from the server to live connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// A message was persisted in a conversation the connection listens to
    #[serde(rename = "message")]
    Message(MessagePayload),

    /// Cross-conversation notice of a new message, sent to inbox groups
    #[serde(rename = "inbox:new")]
    InboxNew { message: MessagePayload },

    /// The receiver's total unread count changed; `from` names the sender
    /// whose thread caused the change
    #[serde(rename = "inbox:unread")]
    InboxUnread { total: i64, from: UserId },

    /// A participant is typing
    #[serde(rename = "typing")]
    Typing { from: UserId, to: UserId },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    /// Listen to a user's inbox
    JoinUser { user_id: UserId },

    LeaveUser { user_id: UserId },

    /// Listen to the conversation between `me` and `peer`
    JoinConversation { me: UserId, peer: UserId },

    LeaveConversation { me: UserId, peer: UserId },

    /// Indicate typing in the conversation with `peer`
    Typing { me: UserId, peer: UserId },
}
