use axum::{
    Extension, Json,
    extract::{Multipart, State},
    response::{IntoResponse, Response},
};
use tracing::{debug, info};

use portal_db::models::{NewAttachment, NewMessage};
use portal_types::api::{
    ActionResponse, ChatAction, Claims, ContactsResponse, MessagesResponse, UnreadCountResponse,
};
use portal_types::models::is_privileged;

use crate::auth::AppState;
use crate::convert;
use crate::error::ApiError;
use crate::form::MultipartForm;
use crate::run_db;
use crate::uploads::{self, UploadError, UploadKind};

/// POST /chat, dispatched on the `action` field.
pub async fn chat_action(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut form = MultipartForm::read(multipart, UploadKind::ChatAttachment).await?;

    let action: ChatAction = form
        .text("action")
        .unwrap_or_default()
        .parse()
        .map_err(|_| ApiError::validation("Invalid action"))?;

    let response = match action {
        ChatAction::SendMessage => send_message(&state, &claims, &form).await?.into_response(),
        ChatAction::UploadFile => upload_file(&state, &claims, &mut form).await?.into_response(),
        ChatAction::GetMessages => get_messages(&state, &claims, &form).await?.into_response(),
        ChatAction::GetContacts => get_contacts(&state, &claims, &form).await?.into_response(),
        ChatAction::GetUnreadCount => get_unread_count(&state, &claims).await?.into_response(),
    };

    Ok(response)
}

/// The receiver must be an existing user.
async fn receiver_id(state: &AppState, form: &MultipartForm) -> Result<i64, ApiError> {
    let id = form.id("receiver_id");
    if id <= 0 {
        return Err(ApiError::validation("Invalid receiver"));
    }
    run_db(state, move |db| db.get_user_by_id(id))
        .await?
        .ok_or_else(|| ApiError::validation("Invalid receiver"))?;
    Ok(id)
}

async fn send_message(
    state: &AppState,
    claims: &Claims,
    form: &MultipartForm,
) -> Result<Json<ActionResponse>, ApiError> {
    let receiver_id = receiver_id(state, form).await?;
    let body = form.text("message").unwrap_or_default().trim().to_string();
    if body.is_empty() {
        return Err(ApiError::validation("Message cannot be empty"));
    }

    let sender_id = claims.sub;
    let id = run_db(state, move |db| {
        db.insert_message(&NewMessage {
            sender_id,
            receiver_id,
            body: Some(body.as_str()),
            attachment: None,
        })
    })
    .await?;

    debug!("Message {} sent {} -> {}", id, sender_id, receiver_id);
    Ok(Json(ActionResponse::ok()))
}

/// Validates and stores the attachment, then records the message. The file
/// is removed again if the record cannot be saved.
async fn upload_file(
    state: &AppState,
    claims: &Claims,
    form: &mut MultipartForm,
) -> Result<Json<ActionResponse>, ApiError> {
    let receiver_id = receiver_id(state, form).await?;
    let file = form.take_file().ok_or(UploadError::Missing)?;

    let kind = UploadKind::ChatAttachment;
    let ext = kind.policy().validate(&file, state.uploads.match_rule)?;

    let dir = state.uploads.directory(kind, Some(claims.sub));
    let staged = uploads::write(&dir, ext.as_deref(), &file.data).await?;

    let sender_id = claims.sub;
    let caption = form
        .text("message")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let stored_name = staged.name().to_string();
    let original_name = file.original_name.clone();
    let mime = file.mime();
    let size = file.size() as i64;

    let id = run_db(state, move |db| {
        db.insert_message(&NewMessage {
            sender_id,
            receiver_id,
            body: caption.as_deref(),
            attachment: Some(NewAttachment {
                file_path: &stored_name,
                file_name: &original_name,
                file_type: &mime,
                file_size: size,
            }),
        })
    })
    .await?;

    let stored_name = staged.commit();
    info!(
        "Attachment {} ({} bytes) on message {} from {} to {}",
        stored_name, size, id, sender_id, receiver_id
    );

    Ok(Json(ActionResponse::ok()))
}

async fn get_messages(
    state: &AppState,
    claims: &Claims,
    form: &MultipartForm,
) -> Result<Json<MessagesResponse>, ApiError> {
    let peer_id = match form.id("user_id") {
        0 => form.id("peer_id"),
        id => id,
    };
    if peer_id <= 0 {
        return Err(ApiError::validation("Invalid user"));
    }
    let last_message_id = form.id("last_message_id").max(0);

    let viewer_id = claims.sub;
    let (marked, rows) =
        run_db(state, move |db| db.fetch_conversation(viewer_id, peer_id, last_message_id)).await?;

    if marked > 0 {
        debug!("Marked {} messages from {} to {} as read", marked, peer_id, viewer_id);
    }

    Ok(Json(MessagesResponse {
        success: true,
        messages: rows.into_iter().map(convert::message_from_row).collect(),
    }))
}

async fn get_contacts(
    state: &AppState,
    claims: &Claims,
    form: &MultipartForm,
) -> Result<Json<ContactsResponse>, ApiError> {
    let viewer_id = claims.sub;
    let privileged = is_privileged(&claims.role);
    let search = form.text("search").map(str::to_string);

    let rows = run_db(state, move |db| {
        db.list_contacts(viewer_id, privileged, search.as_deref())
    })
    .await?;

    Ok(Json(ContactsResponse {
        success: true,
        contacts: rows.into_iter().map(convert::contact_from_row).collect(),
    }))
}

async fn get_unread_count(
    state: &AppState,
    claims: &Claims,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let viewer_id = claims.sub;
    let count = run_db(state, move |db| db.unread_count(viewer_id)).await?;
    Ok(Json(UnreadCountResponse { success: true, count }))
}
