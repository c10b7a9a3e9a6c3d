use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageId, SentimentLabel, UserId};

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AliasRequest {
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub alias: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(alias = "userId")]
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
}

/// A persisted message as shown to clients, enriched with both aliases.
/// Used for the REST response and every real-time message event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub sentiment_label: SentimentLabel,
    pub sentiment_score: f64,
    pub created_at: DateTime<Utc>,
    pub sender_alias: String,
    pub receiver_alias: String,
}

impl MessagePayload {
    pub fn new(message: &Message, sender_alias: String, receiver_alias: String) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            text: message.text.clone(),
            sentiment_label: message.sentiment_label.unwrap_or(SentimentLabel::Neutral),
            sentiment_score: message.sentiment_score.unwrap_or(0.0),
            created_at: message.created_at,
            sender_alias,
            receiver_alias,
        }
    }
}

// -- Inbox --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadEntry {
    pub peer_id: UserId,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}
