//! Row → wire model conversions.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use portal_db::models::{ContactRow, MessageRow, NotificationRow};
use portal_types::models::{ChatMessage, Contact, Notification};

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone; those
/// are UTC. RFC 3339 is accepted too.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .ok()
}

fn timestamp_or_default(raw: &str, what: &str, id: i64) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt created_at '{}' on {} {}", raw, what, id);
        DateTime::default()
    })
}

pub fn message_from_row(row: MessageRow) -> ChatMessage {
    ChatMessage {
        created_at: timestamp_or_default(&row.created_at, "message", row.id),
        id: row.id,
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        message: row.message,
        file_path: row.file_path,
        file_name: row.file_name,
        file_type: row.file_type,
        file_size: row.file_size,
        is_read: row.is_read,
    }
}

pub fn contact_from_row(row: ContactRow) -> Contact {
    let last_message_at = row.last_message_at.as_deref().and_then(|raw| {
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            warn!("Corrupt last message time '{}' for contact {}", raw, row.id);
        }
        parsed
    });

    Contact {
        id: row.id,
        username: row.username,
        full_name: row.full_name,
        role: row.role,
        unread_count: row.unread_count,
        last_message_at,
    }
}

pub fn notification_from_row(row: NotificationRow) -> Notification {
    Notification {
        created_at: timestamp_or_default(&row.created_at, "notification", row.id),
        id: row.id,
        category: row.category,
        title: row.title,
        message: row.message,
        url: row.url,
    }
}
