use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, messages, notifications)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                full_name   TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'user',
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS messages (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id    INTEGER NOT NULL REFERENCES users(id),
                receiver_id  INTEGER NOT NULL REFERENCES users(id),
                message      TEXT,
                file_path    TEXT,
                file_name    TEXT,
                file_type    TEXT,
                file_size    INTEGER,
                is_read      INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_messages_pair
                ON messages(sender_id, receiver_id, created_at);

            CREATE INDEX IF NOT EXISTS idx_messages_unread
                ON messages(receiver_id, is_read);

            CREATE INDEX IF NOT EXISTS idx_messages_file
                ON messages(file_path);

            CREATE TABLE IF NOT EXISTS notifications (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER REFERENCES users(id),
                target_role  TEXT,
                category     TEXT NOT NULL,
                title        TEXT NOT NULL,
                message      TEXT NOT NULL,
                url          TEXT,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS notification_reads (
                notification_id  INTEGER NOT NULL REFERENCES notifications(id) ON DELETE CASCADE,
                user_id          INTEGER NOT NULL REFERENCES users(id),
                read_at          TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (notification_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
