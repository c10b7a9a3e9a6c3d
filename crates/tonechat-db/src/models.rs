//! Database row types — these map directly to SQLite rows.
//! Distinct from tonechat-types models to keep the DB layer independent.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use tonechat_types::models::{Message, MessageStatus, SentimentLabel, User};

pub struct UserRow {
    pub id: i64,
    pub alias: String,
    pub created_at: String,
}

impl UserRow {
    pub fn to_user(&self) -> Result<User> {
        Ok(User {
            id: self.id,
            alias: self.alias.clone(),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub text: String,
    pub sentiment_label: Option<String>,
    pub sentiment_score: Option<f64>,
    pub status: String,
    pub error: Option<String>,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Joined from users; `None` if the user row is gone
    pub sender_alias: Option<String>,
    pub receiver_alias: Option<String>,
}

impl MessageRow {
    pub fn to_message(&self) -> Result<Message> {
        Ok(Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            text: self.text.clone(),
            sentiment_label: self.sentiment_label.as_deref().map(SentimentLabel::normalize),
            sentiment_score: self.sentiment_score,
            status: self
                .status
                .parse::<MessageStatus>()
                .map_err(|e| anyhow!("message {}: {}", self.id, e))?,
            error: self.error.clone(),
            is_read: self.is_read,
            read_at: self.read_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone. Parse as naive UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| anyhow!("corrupt timestamp '{}': {}", raw, e))
}
