use std::collections::HashMap;

use axum::{
    extract::{Multipart, multipart::MultipartError},
    http::StatusCode,
};
use tracing::debug;

use crate::error::ApiError;
use crate::uploads::{self, IncomingFile, UploadError, UploadKind};

/// Text fields of a multipart form plus its optional `file` part.
pub struct MultipartForm {
    fields: HashMap<String, String>,
    file: Option<IncomingFile>,
}

impl MultipartForm {
    /// `kind` only selects the size named in the error when the body exceeds
    /// the request limit.
    pub async fn read(mut multipart: Multipart, kind: UploadKind) -> Result<Self, ApiError> {
        let on_error = |e: MultipartError| multipart_error(e, kind);
        let mut fields = HashMap::new();
        let mut file = None;

        while let Some(field) = multipart.next_field().await.map_err(on_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(uploads::OCTET_STREAM)
                    .to_string();
                let data = field.bytes().await.map_err(on_error)?;
                file = Some(IncomingFile {
                    original_name,
                    content_type,
                    data,
                });
            } else {
                let value = field.text().await.map_err(on_error)?;
                fields.insert(name, value);
            }
        }

        Ok(Self { fields, file })
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Integer field; missing or malformed values read as 0.
    pub fn id(&self, name: &str) -> i64 {
        self.text(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn take_file(&mut self) -> Option<IncomingFile> {
        self.file.take()
    }
}

fn multipart_error(e: MultipartError, kind: UploadKind) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let max_mb = kind.policy().max_mb();
        return UploadError::TooLarge { max_mb }.into();
    }
    debug!("Malformed multipart body: {}", e);
    ApiError::validation("Invalid form data")
}
