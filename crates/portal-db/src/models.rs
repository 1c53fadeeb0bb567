/// Database row types mapped directly from SQLite rows.
/// Distinct from portal-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: String,
    pub password: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub message: Option<String>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub is_read: bool,
    pub created_at: String,
}

pub struct ContactRow {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: String,
    pub unread_count: i64,
    pub last_message_at: Option<String>,
}

/// Enough of a message row to serve its attachment.
pub struct AttachmentRow {
    pub message_id: i64,
    pub sender_id: i64,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

pub struct NotificationRow {
    pub id: i64,
    pub category: String,
    pub title: String,
    pub message: String,
    pub url: Option<String>,
    pub created_at: String,
}

// -- Inserts --

pub struct NewMessage<'a> {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub body: Option<&'a str>,
    pub attachment: Option<NewAttachment<'a>>,
}

pub struct NewAttachment<'a> {
    /// Generated on-disk name, never the uploader's name.
    pub file_path: &'a str,
    pub file_name: &'a str,
    pub file_type: &'a str,
    pub file_size: i64,
}

pub struct NewNotification<'a> {
    pub user_id: Option<i64>,
    pub target_role: Option<&'a str>,
    pub category: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub url: Option<&'a str>,
}
