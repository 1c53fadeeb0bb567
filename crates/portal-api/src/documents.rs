use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use tracing::info;

use portal_types::api::{Claims, StoredFileResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::form::MultipartForm;
use crate::uploads::{self, UploadError, UploadKind};

/// POST /uploads/{purpose}: donation receipts and registration ID scans.
///
/// These land in a shared per-feature directory and are referenced later by
/// the returned generated name, so the file is kept as soon as it is written.
pub async fn upload_document(
    State(state): State<AppState>,
    Path(purpose): Path<String>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<StoredFileResponse>), ApiError> {
    let kind = UploadKind::from_purpose(&purpose).ok_or(ApiError::NotFound)?;

    let mut form = MultipartForm::read(multipart, kind).await?;
    let file = form.take_file().ok_or(UploadError::Missing)?;
    let ext = kind.policy().validate(&file, state.uploads.match_rule)?;

    let dir = state.uploads.directory(kind, None);
    let staged = uploads::write(&dir, ext.as_deref(), &file.data).await?;
    let stored = staged.commit();

    info!(
        "{} uploaded {:?} document {} ({} bytes)",
        claims.username,
        kind,
        stored,
        file.size()
    );

    Ok((
        StatusCode::CREATED,
        Json(StoredFileResponse {
            success: true,
            file: stored,
        }),
    ))
}
