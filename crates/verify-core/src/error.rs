use std::path::PathBuf;

use shared_types::ArtifactKind;
use thiserror::Error;
use verify_client::ApiError;

use crate::imaging::ImageError;

pub const MSG_NO_VERIFICATION: &str = "請先選擇一個驗證！";
pub const MSG_MISSING_DOCUMENT: &str = "缺少文件";
pub const MSG_MISSING_IMAGE: &str = "缺少影像";
pub const MSG_MISSING_REGION: &str = "請在影像上選擇驗證範圍！";
pub const MSG_NOT_DOCX: &str = "請上傳 DOCX 格式的文件";
pub const MSG_CONVERSION_FAILED: &str = "文件轉換失敗，請稍後再試";
pub const MSG_RENDER_FAILED: &str = "PDF 渲染失敗";
pub const MSG_VERIFY_FAILED: &str = "驗證失敗";
pub const MSG_DOCUMENT_FIELDS: &str = "文件缺少必要欄位";
pub const MSG_IMAGE_REJECTED: &str = "無法在影像中辨識標籤，請調整驗證範圍或更換影像";
pub const MSG_UNREADABLE_IMAGE: &str = "無法讀取影像，請改用 PNG、JPEG、GIF、WebP 或 BMP 格式";

/// Artifact slot mutations and existing-artifact loading
#[derive(Error, Debug)]
pub enum FileError {
    #[error("No image is loaded")]
    NoImage,

    #[error("{0} cannot be stored in a document slot")]
    NotADocument(ArtifactKind),

    #[error("Unreadable image: {0}")]
    Image(#[from] ImageError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl FileError {
    pub fn user_message(&self) -> String {
        match self {
            FileError::NoImage => MSG_MISSING_IMAGE.to_string(),
            FileError::NotADocument(_) => MSG_NOT_DOCX.to_string(),
            FileError::Image(_) => MSG_UNREADABLE_IMAGE.to_string(),
            FileError::Api(e) => e.user_message(),
        }
    }
}

/// Page rendering through the PDF backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Superseded by a newer render or by clearing the document
    #[error("Render cancelled")]
    Cancelled,

    #[error("No document is loaded")]
    NoDocument,

    #[error("Page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },

    #[error("Failed to load PDF: {0}")]
    Load(String),

    #[error("PDF has no pages")]
    EmptyDocument,

    #[error("Rendering failed: {0}")]
    Backend(String),

    #[error("Render task failed: {0}")]
    Task(String),
}

impl RenderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Cancelled)
    }

    pub fn user_message(&self) -> String {
        MSG_RENDER_FAILED.to_string()
    }
}

/// DOCX conversion and document opening
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Not a DOCX file: {0}")]
    NotDocx(String),

    #[error("Conversion failed: {0}")]
    Conversion(#[source] ApiError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl DocumentError {
    pub fn user_message(&self) -> String {
        match self {
            DocumentError::NotDocx(_) => MSG_NOT_DOCX.to_string(),
            DocumentError::Conversion(ApiError::Network(_)) => {
                ApiError::Network(String::new()).user_message()
            }
            DocumentError::Conversion(_) => MSG_CONVERSION_FAILED.to_string(),
            DocumentError::Render(e) => e.user_message(),
        }
    }
}

/// Submission preconditions and backend verdicts
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("No verification selected")]
    NoVerification,

    #[error("Document artifact missing")]
    MissingDocument,

    #[error("Image artifact missing")]
    MissingImage,

    #[error("No crop region selected on the image")]
    MissingRegion,

    #[error("Image size could not be read: {0}")]
    UnreadableImage(#[source] ImageError),

    #[error("Document is missing fields: {}", missing.join(", "))]
    DocumentFields { missing: Vec<String> },

    #[error("Image rejected: {}", detail.as_deref().unwrap_or("no detail"))]
    ImageRejected { detail: Option<String> },

    #[error("Verification failed with status {status}: {}", detail.as_deref().unwrap_or("no detail"))]
    Rejected { status: u16, detail: Option<String> },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SubmitError {
    /// Preconditions are checked before any network call
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SubmitError::NoVerification
                | SubmitError::MissingDocument
                | SubmitError::MissingImage
                | SubmitError::MissingRegion
                | SubmitError::UnreadableImage(_)
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            SubmitError::NoVerification => MSG_NO_VERIFICATION.to_string(),
            SubmitError::MissingDocument => MSG_MISSING_DOCUMENT.to_string(),
            SubmitError::MissingImage => MSG_MISSING_IMAGE.to_string(),
            SubmitError::MissingRegion => MSG_MISSING_REGION.to_string(),
            SubmitError::UnreadableImage(_) => MSG_UNREADABLE_IMAGE.to_string(),
            SubmitError::DocumentFields { missing } if missing.is_empty() => {
                MSG_DOCUMENT_FIELDS.to_string()
            }
            SubmitError::DocumentFields { missing } => {
                format!("{}：{}", MSG_DOCUMENT_FIELDS, missing.join("、"))
            }
            SubmitError::ImageRejected { detail: Some(detail) } => {
                format!("{}（{}）", MSG_IMAGE_REJECTED, detail)
            }
            SubmitError::ImageRejected { detail: None } => MSG_IMAGE_REJECTED.to_string(),
            SubmitError::Rejected { .. } => MSG_VERIFY_FAILED.to_string(),
            SubmitError::Api(e) => e.user_message(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
