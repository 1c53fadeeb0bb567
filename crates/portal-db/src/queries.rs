use crate::models::{
    AttachmentRow, ContactRow, MessageRow, NewMessage, NewNotification, NotificationRow, UserRow,
};
use crate::Database;
use anyhow::Result;
use portal_types::models::DEFAULT_ROLE;
use rusqlite::Connection;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, message, file_path, file_name, \
                               file_type, file_size, is_read, created_at";

/// Notifications addressed to user ?1 directly, to their role ?2, or to everyone.
const NOTIFICATION_TARGET: &str = "(n.user_id = ?1 OR n.target_role = ?2 \
                                   OR (n.user_id IS NULL AND n.target_role IS NULL))";

const NOTIFICATION_LIMIT: u32 = 50;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        full_name: &str,
        role: &str,
        password_hash: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, full_name, role, password) VALUES (?1, ?2, ?3, ?4)",
                (username, full_name, role, password_hash),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    // -- Messages --

    pub fn insert_message(&self, new: &NewMessage<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            let attachment = new.attachment.as_ref();
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, message, file_path, file_name, file_type, file_size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    new.sender_id,
                    new.receiver_id,
                    new.body,
                    attachment.map(|a| a.file_path),
                    attachment.map(|a| a.file_name),
                    attachment.map(|a| a.file_type),
                    attachment.map(|a| a.file_size),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Marks everything `peer_id` sent to `viewer_id` as read, then returns the
    /// conversation after `last_message_id` in (created_at, id) order.
    ///
    /// Fetching is treated as reading. Returns the number of rows newly marked.
    pub fn fetch_conversation(
        &self,
        viewer_id: i64,
        peer_id: i64,
        last_message_id: i64,
    ) -> Result<(usize, Vec<MessageRow>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let marked = tx.execute(
                "UPDATE messages SET is_read = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                (peer_id, viewer_id),
            )?;
            let rows = query_conversation(&tx, viewer_id, peer_id, last_message_id)?;
            tx.commit()?;
            Ok((marked, rows))
        })
    }

    pub fn unread_count(&self, viewer_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE receiver_id = ?1 AND is_read = 0",
                [viewer_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Contact list for `viewer_id`.
    ///
    /// Privileged viewers see every other user. Default-role viewers see
    /// privileged users plus anyone they already share messages with.
    pub fn list_contacts(
        &self,
        viewer_id: i64,
        viewer_privileged: bool,
        search: Option<&str>,
    ) -> Result<Vec<ContactRow>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.full_name, u.role,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.sender_id = u.id AND m.receiver_id = ?1 AND m.is_read = 0) AS unread_count,
                        (SELECT MAX(m.created_at) FROM messages m
                          WHERE (m.sender_id = u.id AND m.receiver_id = ?1)
                             OR (m.sender_id = ?1 AND m.receiver_id = u.id)) AS last_message_at
                 FROM users u
                 WHERE u.id != ?1
                   AND (?2 = 1
                        OR u.role != ?4
                        OR EXISTS (SELECT 1 FROM messages m
                                    WHERE (m.sender_id = u.id AND m.receiver_id = ?1)
                                       OR (m.sender_id = ?1 AND m.receiver_id = u.id)))
                   AND (?3 IS NULL
                        OR u.full_name LIKE ?3 ESCAPE '\\'
                        OR u.username LIKE ?3 ESCAPE '\\'
                        OR u.role LIKE ?3 ESCAPE '\\')
                 ORDER BY last_message_at IS NULL, last_message_at DESC, u.full_name ASC",
            )?;

            let rows = stmt
                .query_map(
                    rusqlite::params![viewer_id, viewer_privileged, pattern, DEFAULT_ROLE],
                    |row| {
                        Ok(ContactRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            full_name: row.get(2)?,
                            role: row.get(3)?,
                            unread_count: row.get(4)?,
                            last_message_at: row.get(5)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Looks up the message carrying stored file `file_path`, provided
    /// `viewer_id` is its sender or receiver.
    pub fn find_attachment(&self, file_path: &str, viewer_id: i64) -> Result<Option<AttachmentRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, sender_id, file_name, file_type FROM messages
                 WHERE file_path = ?1 AND (sender_id = ?2 OR receiver_id = ?2)
                 ORDER BY id DESC LIMIT 1",
                rusqlite::params![file_path, viewer_id],
                |row| {
                    Ok(AttachmentRow {
                        message_id: row.get(0)?,
                        sender_id: row.get(1)?,
                        file_name: row.get(2)?,
                        file_type: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, new: &NewNotification<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (user_id, target_role, category, title, message, url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    new.user_id,
                    new.target_role,
                    new.category,
                    new.title,
                    new.message,
                    new.url,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Notifications visible to the user that they have not dismissed, newest first.
    pub fn unread_notifications(&self, user_id: i64, role: &str) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT n.id, n.category, n.title, n.message, n.url, n.created_at
                 FROM notifications n
                 WHERE {NOTIFICATION_TARGET}
                   AND NOT EXISTS (SELECT 1 FROM notification_reads r
                                    WHERE r.notification_id = n.id AND r.user_id = ?1)
                 ORDER BY n.created_at DESC, n.id DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, role, NOTIFICATION_LIMIT], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        category: row.get(1)?,
                        title: row.get(2)?,
                        message: row.get(3)?,
                        url: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Records a read receipt. Idempotent; returns false when nothing changed
    /// (already read, or not addressed to this user).
    pub fn mark_notification_read(&self, user_id: i64, role: &str, notification_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let sql = format!(
                "INSERT OR IGNORE INTO notification_reads (notification_id, user_id)
                 SELECT n.id, ?1 FROM notifications n
                 WHERE n.id = ?3 AND {NOTIFICATION_TARGET}"
            );
            let inserted = conn.execute(&sql, rusqlite::params![user_id, role, notification_id])?;
            Ok(inserted > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: i64, role: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let sql = format!(
                "INSERT OR IGNORE INTO notification_reads (notification_id, user_id)
                 SELECT n.id, ?1 FROM notifications n
                 WHERE {NOTIFICATION_TARGET}"
            );
            let inserted = conn.execute(&sql, rusqlite::params![user_id, role])?;
            Ok(inserted)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: &dyn rusqlite::ToSql) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, full_name, role, password, created_at FROM users WHERE {predicate}"
    );
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            full_name: row.get(2)?,
            role: row.get(3)?,
            password: row.get(4)?,
            created_at: row.get(5)?,
        })
    })
    .optional()
}

fn query_conversation(
    conn: &Connection,
    viewer_id: i64,
    peer_id: i64,
    last_message_id: i64,
) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE ((sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1))
           AND id > ?3
         ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(rusqlite::params![viewer_id, peer_id, last_message_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                message: row.get(3)?,
                file_path: row.get(4)?,
                file_name: row.get(5)?,
                file_type: row.get(6)?,
                file_size: row.get(7)?,
                is_read: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// `%term%` with LIKE wildcards in the term escaped.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
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
