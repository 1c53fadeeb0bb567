use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use portal_types::api::{
    ActionResponse, ChatAction, ContactsResponse, LoginRequest, LoginResponse, MarkAllReadRequest,
    MarkReadRequest, MessagesResponse, NotificationsResponse, UnreadCountResponse,
};
use portal_types::models::{ChatMessage, Contact, Notification};

use crate::transport::{ChatTransport, ClientError, NotificationTransport, OutgoingFile};

/// Talks to the portal server over HTTP with a bearer token.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Exchanges credentials for a token and returns a transport using it.
    pub async fn login(base_url: &str, username: &str, password: &str) -> Result<(Self, LoginResponse), ClientError> {
        let transport = Self::new(base_url, String::new());
        let resp = transport
            .client
            .post(transport.url("/auth/login"))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let login: LoginResponse = decode(resp).await?;
        debug!("Logged in as {} ({})", login.username, login.role);
        Ok((Self::new(base_url, login.token.clone()), login))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn chat<T: DeserializeOwned>(&self, action: ChatAction, form: Form) -> Result<T, ClientError> {
        let resp = self
            .client
            .post(self.url("/chat"))
            .bearer_auth(&self.token)
            .multipart(form.text("action", action.as_str()))
            .send()
            .await?;
        decode(resp).await
    }

    async fn notifications<T: DeserializeOwned>(
        &self,
        action: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, ClientError> {
        let resp = self
            .client
            .post(self.url("/notifications"))
            .query(&[("action", action)])
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }
}

/// Non-2xx bodies are expected to be `{success:false, error}`; anything else
/// is reported by status alone.
async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    let body = resp.bytes().await?;

    if !status.is_success() {
        return Err(match serde_json::from_slice::<ActionResponse>(&body) {
            Ok(ActionResponse {
                error: Some(error), ..
            }) => ClientError::Server(error),
            _ => ClientError::Status(status.as_u16()),
        });
    }
    Ok(serde_json::from_slice(&body)?)
}

impl ChatTransport for HttpTransport {
    async fn send_message(&self, receiver_id: i64, body: &str) -> Result<(), ClientError> {
        let form = Form::new()
            .text("receiver_id", receiver_id.to_string())
            .text("message", body.to_string());
        let _: ActionResponse = self.chat(ChatAction::SendMessage, form).await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        receiver_id: i64,
        file: OutgoingFile,
        caption: Option<&str>,
    ) -> Result<(), ClientError> {
        let len = file.data.len() as u64;
        let part = Part::stream_with_length(reqwest::Body::from(file.data), len)
            .file_name(file.file_name)
            .mime_str(&file.content_type)?;

        let mut form = Form::new()
            .text("receiver_id", receiver_id.to_string())
            .part("file", part);
        if let Some(caption) = caption {
            form = form.text("message", caption.to_string());
        }
        let _: ActionResponse = self.chat(ChatAction::UploadFile, form).await?;
        Ok(())
    }

    async fn get_messages(&self, peer_id: i64, since: i64) -> Result<Vec<ChatMessage>, ClientError> {
        let form = Form::new()
            .text("user_id", peer_id.to_string())
            .text("last_message_id", since.to_string());
        let resp: MessagesResponse = self.chat(ChatAction::GetMessages, form).await?;
        Ok(resp.messages)
    }

    async fn get_contacts(&self, search: Option<&str>) -> Result<Vec<Contact>, ClientError> {
        let mut form = Form::new();
        if let Some(search) = search {
            form = form.text("search", search.to_string());
        }
        let resp: ContactsResponse = self.chat(ChatAction::GetContacts, form).await?;
        Ok(resp.contacts)
    }

    async fn unread_count(&self) -> Result<i64, ClientError> {
        let resp: UnreadCountResponse = self.chat(ChatAction::GetUnreadCount, Form::new()).await?;
        Ok(resp.count)
    }
}

impl NotificationTransport for HttpTransport {
    async fn check(&self) -> Result<Vec<Notification>, ClientError> {
        let resp = self
            .client
            .get(self.url("/notifications"))
            .query(&[("action", "check")])
            .bearer_auth(&self.token)
            .send()
            .await?;
        let resp: NotificationsResponse = decode(resp).await?;
        Ok(resp.notifications)
    }

    async fn mark_read(&self, notification_id: i64) -> Result<(), ClientError> {
        let _: ActionResponse = self
            .notifications("mark_read", &MarkReadRequest { notification_id })
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ClientError> {
        let _: ActionResponse = self
            .notifications("mark_all_read", &MarkAllReadRequest::all())
            .await?;
        Ok(())
    }
}
