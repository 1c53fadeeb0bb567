use std::future::Future;

use bytes::Bytes;

use portal_types::models::{ChatMessage, Contact, Notification};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered `{success:false, error}`.
    #[error("{0}")]
    Server(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A file picked by the user for a chat attachment.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// The chat endpoint as seen by the poller and driver.
pub trait ChatTransport: Send + Sync + 'static {
    fn send_message(
        &self,
        receiver_id: i64,
        body: &str,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn upload_file(
        &self,
        receiver_id: i64,
        file: OutgoingFile,
        caption: Option<&str>,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Messages between the caller and `peer_id` with id above `since`.
    /// Fetching marks the peer's messages to the caller as read.
    fn get_messages(
        &self,
        peer_id: i64,
        since: i64,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, ClientError>> + Send;

    fn get_contacts(
        &self,
        search: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Contact>, ClientError>> + Send;

    fn unread_count(&self) -> impl Future<Output = Result<i64, ClientError>> + Send;
}

pub trait NotificationTransport: Send + Sync + 'static {
    fn check(&self) -> impl Future<Output = Result<Vec<Notification>, ClientError>> + Send;

    fn mark_read(&self, notification_id: i64) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn mark_all_read(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}
