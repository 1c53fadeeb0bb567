use axum::{
    Extension,
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use portal_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_db;
use crate::uploads::{OCTET_STREAM, UploadKind};

/// Shown in place of images that are missing or are not images.
pub const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="120" viewBox="0 0 120 120"><rect width="120" height="120" rx="8" fill="#f1f1f1"/><path d="M30 84l18-24 14 18 10-12 18 18z" fill="#c8c8c8"/><circle cx="78" cy="42" r="8" fill="#c8c8c8"/></svg>"##;

#[derive(Debug, Deserialize)]
pub struct AttachmentQuery {
    pub download: Option<String>,
    pub image: Option<String>,
    pub file: Option<String>,
}

struct Attachment {
    file: tokio::fs::File,
    len: u64,
    display_name: String,
    mime: String,
}

impl Attachment {
    fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    fn into_response(self, disposition: &str) -> Response {
        let disposition = format!(
            "{}; filename=\"{}\"",
            disposition,
            sanitize_header_filename(&self.display_name)
        );
        (
            [
                (header::CONTENT_TYPE, self.mime),
                (header::CONTENT_LENGTH, self.len.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            Body::from_stream(ReaderStream::new(self.file)),
        )
            .into_response()
    }
}

/// GET /chat?download=1&file=… or GET /chat?image=1&file=…
///
/// Only the sender or receiver of the message carrying the file may read it.
/// Downloads of unknown files are 404; image requests fall back to a placeholder.
pub async fn serve_attachment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AttachmentQuery>,
) -> Result<Response, ApiError> {
    let as_image = query.image.as_deref() == Some("1");
    let as_download = query.download.as_deref() == Some("1");
    if !as_image && !as_download {
        return Err(ApiError::validation("Invalid request"));
    }

    let name = query.file.unwrap_or_default();
    let found = locate(&state, claims.sub, &name).await?;

    match found {
        Some(attachment) if as_image => {
            if attachment.is_image() {
                Ok(attachment.into_response("inline"))
            } else {
                Ok(placeholder())
            }
        }
        Some(attachment) => Ok(attachment.into_response("attachment")),
        None if as_image => Ok(placeholder()),
        None => Err(ApiError::NotFound),
    }
}

fn placeholder() -> Response {
    ([(header::CONTENT_TYPE, "image/svg+xml")], PLACEHOLDER_SVG).into_response()
}

/// Stored names are generated by the upload pipeline and never contain
/// separators; anything else is refused before touching the filesystem.
fn is_safe_stored_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && !name.contains(['/', '\\', '\0'])
}

fn sanitize_header_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

async fn locate(state: &AppState, viewer_id: i64, name: &str) -> Result<Option<Attachment>, ApiError> {
    if !is_safe_stored_name(name) {
        debug!("Refusing attachment name {:?}", name);
        return Ok(None);
    }

    let lookup = name.to_string();
    let Some(row) = run_db(state, move |db| db.find_attachment(&lookup, viewer_id)).await? else {
        return Ok(None);
    };

    let path = state
        .uploads
        .directory(UploadKind::ChatAttachment, Some(row.sender_id))
        .join(name);

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!("Attachment for message {} missing at {}: {}", row.message_id, path.display(), e);
            return Ok(None);
        }
    };
    let len = match file.metadata().await {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return Ok(None),
        Err(e) => {
            warn!("Failed to stat {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    Ok(Some(Attachment {
        file,
        len,
        display_name: row.file_name.unwrap_or_else(|| name.to_string()),
        mime: row.file_type.unwrap_or_else(|| OCTET_STREAM.to_string()),
    }))
}
