use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role assigned to accounts that hold no staff privileges.
pub const DEFAULT_ROLE: &str = "user";

/// Any role other than the default one is privileged (admin, staff, coordinators).
pub fn is_privileged(role: &str) -> bool {
    role != DEFAULT_ROLE
}

/// A direct message between two users.
///
/// `message` is `None` when the row only carries an attachment. `file_path`
/// holds the generated on-disk name; `file_name` is the uploader's original
/// name and is only ever used for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub message: Option<String>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Another user as seen from the viewer's contact list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: String,
    /// Unread messages sent by this contact to the viewer.
    pub unread_count: i64,
    /// Most recent message exchanged in either direction.
    pub last_message_at: Option<DateTime<Utc>>,
}

/// An announcement or system event addressed to a user, a role, or everyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub category: String,
    pub title: String,
    pub message: String,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}
