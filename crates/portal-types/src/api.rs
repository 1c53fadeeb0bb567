use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, Contact, Notification};

// -- JWT Claims --

/// Bearer token claims shared by the REST middleware and the polling client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub role: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub role: String,
    pub token: String,
}

// -- Chat --

/// The `action` field posted to the chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    SendMessage,
    UploadFile,
    GetMessages,
    GetContacts,
    GetUnreadCount,
}

impl ChatAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendMessage => "send_message",
            Self::UploadFile => "upload_file",
            Self::GetMessages => "get_messages",
            Self::GetContacts => "get_contacts",
            Self::GetUnreadCount => "get_unread_count",
        }
    }
}

impl fmt::Display for ChatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action '{}'", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for ChatAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send_message" => Ok(Self::SendMessage),
            "upload_file" => Ok(Self::UploadFile),
            "get_messages" => Ok(Self::GetMessages),
            "get_contacts" => Ok(Self::GetContacts),
            "get_unread_count" => Ok(Self::GetUnreadCount),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// `{success, error?}` body used by every mutation and by all failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub success: bool,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactsResponse {
    pub success: bool,
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub success: bool,
    pub count: i64,
}

/// Returned by document uploads (receipts, ID scans) that are not tied to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFileResponse {
    pub success: bool,
    pub file: String,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsResponse {
    pub success: bool,
    pub notifications: Vec<Notification>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadRequest {
    pub notification_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkAllReadRequest {
    #[serde(rename = "type")]
    pub kind: String,
}

impl MarkAllReadRequest {
    pub fn all() -> Self {
        Self { kind: "all".into() }
    }
}

/// Announcement posted by a privileged user. Leaving both `user_id` and
/// `target_role` empty addresses everyone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    pub category: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub target_role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationResponse {
    pub success: bool,
    pub id: i64,
}
