use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            role        TEXT NOT NULL
                        CHECK (role IN ('visitor', 'driver', 'owner', 'admin')),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS profiles (
            user_id         TEXT PRIMARY KEY REFERENCES users(id),
            follower_count  INTEGER NOT NULL DEFAULT 0,
            following_count INTEGER NOT NULL DEFAULT 0,
            friend_count    INTEGER NOT NULL DEFAULT 0
        );

        -- user_lo/user_hi are the pair's ids in sorted order: one record per
        -- unordered pair, enforced by a single unique index instead of
        -- querying both (initiator, recipient) orders.
        CREATE TABLE IF NOT EXISTS connections (
            id              TEXT PRIMARY KEY,
            user_lo         TEXT NOT NULL REFERENCES users(id),
            user_hi         TEXT NOT NULL REFERENCES users(id),
            initiator_id    TEXT NOT NULL REFERENCES users(id),
            recipient_id    TEXT NOT NULL REFERENCES users(id),
            status          TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'accepted', 'rejected', 'blocked')),
            connection_type TEXT NOT NULL DEFAULT 'friend'
                            CHECK (connection_type IN ('friend', 'follow', 'colleague', 'community')),
            is_following    INTEGER NOT NULL DEFAULT 0,
            blocked_reason  TEXT,
            requested_at    TEXT,
            accepted_at     TEXT,
            blocked_at      TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_lo, user_hi)
        );

        CREATE INDEX IF NOT EXISTS idx_connections_recipient
            ON connections(recipient_id, status);

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            sender_id           TEXT NOT NULL REFERENCES users(id),
            receiver_id         TEXT NOT NULL REFERENCES users(id),
            body                TEXT NOT NULL,
            kind                TEXT NOT NULL DEFAULT 'text'
                                CHECK (kind IN ('text', 'image', 'document')),
            is_read             INTEGER NOT NULL DEFAULT 0,
            read_at             TEXT,
            deleted_by_sender   INTEGER NOT NULL DEFAULT 0,
            deleted_by_receiver INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_sender
            ON messages(sender_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_receiver
            ON messages(receiver_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(receiver_id, is_read);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
