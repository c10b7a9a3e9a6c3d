use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type MessageId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub alias: String,
    pub created_at: DateTime<Utc>,
}

/// The closed sentiment vocabulary used across the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Map an arbitrary upstream label onto the closed vocabulary.
    ///
    /// The raw token is upper-cased first. Anything unrecognized is `Neutral`,
    /// so this is total, and idempotent on its own output.
    pub fn normalize(raw: &str) -> Self {
        match raw.to_uppercase().as_str() {
            "LABEL_0" | "NEG" | "NEGATIVE" => Self::Negative,
            "LABEL_1" | "NEU" | "NEUTRAL" => Self::Neutral,
            "LABEL_2" | "POS" | "POSITIVE" => Self::Positive,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
            Self::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classification result: normalized label plus the raw upstream score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f64,
}

impl Sentiment {
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.0,
        }
    }
}

/// Lifecycle of a message's classification.
///
/// `Failed` is never written today: a classification failure aborts the send
/// before anything is persisted. It stays in the schema for a future
/// classify-later flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageStatus {
    Pending,
    Ready,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "READY" => Ok(Self::Ready),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown message status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub sentiment_label: Option<SentimentLabel>,
    pub sentiment_score: Option<f64>,
    pub status: MessageStatus,
    pub error: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// A message as it exists before classification: no sentiment, unread,
    /// and without a persistence-assigned id yet.
    pub fn pending(sender_id: UserId, receiver_id: UserId, text: String, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            sender_id,
            receiver_id,
            text,
            sentiment_label: None,
            sentiment_score: None,
            status: MessageStatus::Pending,
            error: None,
            is_read: false,
            read_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a classification result and mark the message ready.
    pub fn classified(mut self, sentiment: Sentiment) -> Self {
        self.sentiment_label = Some(sentiment.label);
        self.sentiment_score = Some(sentiment.score);
        self.status = MessageStatus::Ready;
        self
    }
}
