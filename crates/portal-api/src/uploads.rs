use std::path::{Path, PathBuf};
use std::str::FromStr;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Browsers fall back to this when they cannot sniff a type.
pub const OCTET_STREAM: &str = "application/octet-stream";

const MB: u64 = 1024 * 1024;

/// Attempts at finding an unused generated name before giving up.
const NAME_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file uploaded")]
    Missing,

    #[error("File too large (max {max_mb}MB)")]
    TooLarge { max_mb: u64 },

    #[error("File type not allowed")]
    TypeNotAllowed,

    #[error("Failed to save file")]
    Save(#[source] std::io::Error),
}

/// How the declared MIME type and the file extension are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchRule {
    /// Accept when either the MIME type or the extension is allowed.
    Either,
    /// Both must be allowed, except that `application/octet-stream` is
    /// accepted together with an allowed extension.
    #[default]
    Strict,
}

impl FromStr for MatchRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "either" => Ok(Self::Either),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown upload match rule '{}'", other)),
        }
    }
}

/// Which feature an upload belongs to. Each has its own policy and directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    ChatAttachment,
    Receipt,
    IdDocument,
}

impl UploadKind {
    /// Maps the `{purpose}` path segment of document uploads.
    pub fn from_purpose(purpose: &str) -> Option<Self> {
        match purpose {
            "receipt" => Some(Self::Receipt),
            "id_document" => Some(Self::IdDocument),
            _ => None,
        }
    }

    pub fn policy(self) -> &'static UploadPolicy {
        match self {
            Self::ChatAttachment => &CHAT_POLICY,
            Self::Receipt | Self::IdDocument => &DOCUMENT_POLICY,
        }
    }

    fn subdir(self) -> &'static str {
        match self {
            Self::ChatAttachment => "chat",
            Self::Receipt => "receipts",
            Self::IdDocument => "registrations",
        }
    }
}

pub struct UploadPolicy {
    pub max_bytes: u64,
    pub mime_types: &'static [&'static str],
    pub extensions: &'static [&'static str],
}

static CHAT_POLICY: UploadPolicy = UploadPolicy {
    max_bytes: 10 * MB,
    mime_types: &[
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "application/pdf",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "application/vnd.ms-powerpoint",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "text/plain",
        "text/csv",
        "application/zip",
    ],
    extensions: &[
        "jpg", "jpeg", "png", "gif", "webp", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
        "txt", "csv", "zip",
    ],
};

static DOCUMENT_POLICY: UploadPolicy = UploadPolicy {
    max_bytes: 5 * MB,
    mime_types: &["image/jpeg", "image/png", "application/pdf"],
    extensions: &["jpg", "jpeg", "png", "pdf"],
};

impl UploadPolicy {
    pub fn max_mb(&self) -> u64 {
        self.max_bytes / MB
    }

    /// Checks presence, size, then type. Size is checked first so an
    /// oversized file is refused whatever its type. Returns the normalized
    /// extension to use for the stored name.
    pub fn validate(&self, file: &IncomingFile, rule: MatchRule) -> Result<Option<String>, UploadError> {
        if file.original_name.trim().is_empty() && file.data.is_empty() {
            return Err(UploadError::Missing);
        }

        if file.size() > self.max_bytes {
            return Err(UploadError::TooLarge { max_mb: self.max_mb() });
        }

        let mime = file.mime();
        let ext = file.extension();

        let mime_ok = self.mime_types.contains(&mime.as_str());
        let ext_ok = ext
            .as_deref()
            .is_some_and(|e| self.extensions.contains(&e));

        let accepted = match rule {
            MatchRule::Either => mime_ok || ext_ok,
            MatchRule::Strict => ext_ok && (mime_ok || mime == OCTET_STREAM),
        };

        if !accepted {
            debug!(
                "Rejected upload '{}': mime={} ext={:?} rule={:?}",
                file.original_name, mime, ext, rule
            );
            return Err(UploadError::TypeNotAllowed);
        }

        Ok(ext)
    }
}

/// A file received from a multipart form, fully buffered.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl IncomingFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Declared MIME type, lowercased and without parameters.
    pub fn mime(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    /// Lowercased extension of the original name, restricted to ASCII alphanumerics.
    pub fn extension(&self) -> Option<String> {
        let ext = Path::new(&self.original_name).extension()?.to_str()?;
        let ext: String = ext
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        (!ext.is_empty()).then_some(ext)
    }
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub root: PathBuf,
    pub match_rule: MatchRule,
}

impl UploadSettings {
    /// `{root}/{feature}` or `{root}/{feature}/{owner}` for per-user storage.
    pub fn directory(&self, kind: UploadKind, owner: Option<i64>) -> PathBuf {
        let dir = self.root.join(kind.subdir());
        match owner {
            Some(id) => dir.join(id.to_string()),
            None => dir,
        }
    }
}

/// `{unix_ts}_{16 hex chars}[.ext]`
pub fn generate_stored_name(ext: Option<&str>) -> String {
    let token = hex::encode(rand::random::<[u8; 8]>());
    let ts = chrono::Utc::now().timestamp();
    match ext {
        Some(ext) => format!("{}_{}.{}", ts, token, ext),
        None => format!("{}_{}", ts, token),
    }
}

/// Writes `data` under a fresh generated name in `dir`, creating the
/// directory if needed. The returned guard deletes the file when dropped
/// unless [`StagedFile::commit`] was called.
pub async fn write(dir: &Path, ext: Option<&str>, data: &[u8]) -> Result<StagedFile, UploadError> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        warn!("Failed to create upload directory {}: {}", dir.display(), e);
        UploadError::Save(e)
    })?;

    let mut attempt = 0;
    let (name, path, mut file) = loop {
        attempt += 1;
        let name = generate_stored_name(ext);
        let path = dir.join(&name);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => break (name, path, file),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < NAME_ATTEMPTS => {
                debug!("Generated name {} already taken, retrying", name);
            }
            Err(e) => {
                warn!("Failed to create {}: {}", path.display(), e);
                return Err(UploadError::Save(e));
            }
        }
    };

    // From here on the guard owns cleanup, including on a failed write.
    let staged = StagedFile {
        path,
        name,
        committed: false,
    };

    file.write_all(data).await.map_err(UploadError::Save)?;
    file.flush().await.map_err(UploadError::Save)?;

    debug!("Staged upload {} ({} bytes)", staged.path.display(), data.len());
    Ok(staged)
}

/// An uploaded file on disk whose owning record has not been saved yet.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    name: String,
    committed: bool,
}

impl StagedFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the file. Call only after its record has been stored.
    pub fn commit(mut self) -> String {
        self.committed = true;
        std::mem::take(&mut self.name)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // Drop cannot await; a single unlink is short enough to block on.
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("Rolled back upload {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to roll back upload {}: {}", self.path.display(), e),
        }
    }
}
