use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            alias       TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id       INTEGER NOT NULL REFERENCES users(id),
            receiver_id     INTEGER NOT NULL REFERENCES users(id),
            text            TEXT NOT NULL,
            sentiment_label TEXT,
            sentiment_score REAL,
            status          TEXT NOT NULL DEFAULT 'PENDING',
            error           TEXT,
            is_read         INTEGER NOT NULL DEFAULT 0,
            read_at         TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_sender
            ON messages(sender_id, id);

        CREATE INDEX IF NOT EXISTS idx_messages_receiver
            ON messages(receiver_id, id);

        -- Unread lookups: receiver's unread rows grouped by sender
        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(receiver_id, is_read, sender_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
