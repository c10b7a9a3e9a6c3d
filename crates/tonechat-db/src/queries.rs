use crate::Database;
use crate::models::{MessageRow, UserRow, format_timestamp};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tonechat_types::models::Message;

const MESSAGE_COLUMNS: &str = "m.id, m.sender_id, m.receiver_id, m.text, m.sentiment_label, m.sentiment_score,
         m.status, m.error, m.is_read, m.read_at, m.created_at, m.updated_at, s.alias, r.alias";

impl Database {
    // -- Users --

    pub fn create_user(&self, alias: &str, now: DateTime<Utc>) -> Result<UserRow> {
        self.with_conn(|conn| insert_user(conn, alias, now))
    }

    /// Alias login: the existing user for `alias`, or a freshly created one.
    /// Lookup and insert happen under one lock so two concurrent logins with
    /// the same alias resolve to the same row.
    pub fn get_or_create_user(&self, alias: &str, now: DateTime<Utc>) -> Result<UserRow> {
        self.with_conn(|conn| match query_user_by_alias(conn, alias)? {
            Some(user) => Ok(user),
            None => insert_user(conn, alias, now),
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, alias, created_at FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_alias(&self, alias: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_alias(conn, alias))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, alias, created_at FROM users ORDER BY id")?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Persist a message in a single transaction. Returns the assigned id.
    pub fn insert_message(&self, message: &Message) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages
                    (sender_id, receiver_id, text, sentiment_label, sentiment_score,
                     status, error, is_read, read_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    message.sender_id,
                    message.receiver_id,
                    message.text,
                    message.sentiment_label.map(|l| l.as_str()),
                    message.sentiment_score,
                    message.status.as_str(),
                    message.error,
                    message.is_read,
                    message.read_at.map(format_timestamp),
                    format_timestamp(message.created_at),
                    format_timestamp(message.updated_at),
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
    }

    /// Messages sent or received by `user_id` (all messages if `None`),
    /// newest first.
    pub fn get_messages_for_participant(&self, user_id: Option<i64>, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| match user_id {
            Some(uid) => query_messages(
                conn,
                "WHERE m.sender_id = ?1 OR m.receiver_id = ?1 ORDER BY m.id DESC LIMIT ?2",
                rusqlite::params![uid, limit],
            ),
            None => query_messages(conn, "ORDER BY m.id DESC LIMIT ?1", rusqlite::params![limit]),
        })
    }

    /// Both directions of the conversation between `a` and `b`, oldest first.
    pub fn get_thread(&self, a: i64, b: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                "WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
                    OR (m.sender_id = ?2 AND m.receiver_id = ?1)
                 ORDER BY m.id ASC LIMIT ?3",
                rusqlite::params![a, b, limit],
            )
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut rows = query_messages(conn, "WHERE m.id = ?1", [id])?;
            Ok(rows.pop())
        })
    }

    /// Mark every unread message from `sender_id` to `receiver_id` as read,
    /// then count what the receiver still has unread across all senders.
    /// Both happen in one transaction. Returns `(rows_updated, total_unread)`.
    pub fn mark_thread_read(&self, receiver_id: i64, sender_id: i64, now: DateTime<Utc>) -> Result<(usize, i64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE messages SET is_read = 1, read_at = ?3
                 WHERE receiver_id = ?1 AND sender_id = ?2 AND is_read = 0",
                rusqlite::params![receiver_id, sender_id, format_timestamp(now)],
            )?;
            let total = query_unread_total(&tx, receiver_id)?;
            tx.commit()?;
            Ok((updated, total))
        })
    }

    pub fn count_unread(&self, receiver_id: i64, sender_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE receiver_id = ?1 AND sender_id = ?2 AND is_read = 0",
                [receiver_id, sender_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn count_unread_total(&self, receiver_id: i64) -> Result<i64> {
        self.with_conn(|conn| query_unread_total(conn, receiver_id))
    }

    /// Unread counts for `receiver_id`, one `(sender_id, count)` per sender.
    pub fn unread_by_sender(&self, receiver_id: i64) -> Result<Vec<(i64, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, COUNT(*) FROM messages
                 WHERE receiver_id = ?1 AND is_read = 0
                 GROUP BY sender_id
                 ORDER BY sender_id",
            )?;
            let rows = stmt
                .query_map([receiver_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_messages(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(count)
        })
    }

    /// Administrative reset. Returns the number of rows removed.
    pub fn delete_all_messages(&self) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM messages", [])?))
    }
}

fn insert_user(conn: &Connection, alias: &str, now: DateTime<Utc>) -> Result<UserRow> {
    let created_at = format_timestamp(now);
    conn.execute(
        "INSERT INTO users (alias, created_at) VALUES (?1, ?2)",
        (alias, &created_at),
    )
    .map_err(|e| anyhow!("Failed to create user '{}': {}", alias, e))?;

    Ok(UserRow {
        id: conn.last_insert_rowid(),
        alias: alias.to_string(),
        created_at,
    })
}

fn query_user_by_alias(conn: &Connection, alias: &str) -> Result<Option<UserRow>> {
    conn.query_row(
        "SELECT id, alias, created_at FROM users WHERE alias = ?1",
        [alias],
        user_from_row,
    )
    .optional()
}

fn query_unread_total(conn: &Connection, receiver_id: i64) -> Result<i64> {
    let total = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE receiver_id = ?1 AND is_read = 0",
        [receiver_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

fn query_messages<P: rusqlite::Params>(conn: &Connection, tail: &str, params: P) -> Result<Vec<MessageRow>> {
    // JOIN users twice to fetch both aliases in a single query
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS}
         FROM messages m
         LEFT JOIN users s ON m.sender_id = s.id
         LEFT JOIN users r ON m.receiver_id = r.id
         {tail}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        alias: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        sentiment_label: row.get(4)?,
        sentiment_score: row.get(5)?,
        status: row.get(6)?,
        error: row.get(7)?,
        is_read: row.get(8)?,
        read_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        sender_alias: row.get(12)?,
        receiver_alias: row.get(13)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
