//! Backend-facing ports used by the core engines
//!
//! [`crate::ApiClient`] implements both traits over HTTP; tests substitute
//! in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use shared_types::{ArtifactKind, Verification, VerificationId};

use crate::error::ApiError;

/// An in-memory file: name, MIME type and shared bytes
#[derive(Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Payload bytes are never written to logs
impl std::fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePayload")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Multipart body of the upload/verify endpoint
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub document: FilePayload,
    pub image: FilePayload,
    /// Serialized scope, `"[h, w, x, y]"`
    pub ocr_scope: String,
}

/// Body of an upload reply. Every field is optional because failures come
/// from several backend layers with different shapes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UploadBody {
    #[serde(default)]
    pub status: Option<String>,
    /// Which input the backend blames: `"docx"`, `"image"`, ...
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl UploadBody {
    /// Human-readable detail, whether it came as `message` or `detail`
    pub fn detail_text(&self) -> Option<String> {
        if let Some(message) = self.message.as_ref().filter(|m| !m.is_empty()) {
            return Some(message.clone());
        }
        match &self.detail {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Upload reply with its HTTP status. Interpretation is left to the caller
/// because the body's `component` tag matters more than the status code.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReply {
    pub http_status: u16,
    pub body: UploadBody,
}

impl UploadReply {
    pub fn is_http_success(&self) -> bool {
        (200..300).contains(&self.http_status)
    }
}

/// Operations on the verification catalog the core depends on
#[async_trait]
pub trait VerificationApi: Send + Sync {
    async fn fetch_verification(&self, id: &VerificationId) -> Result<Verification, ApiError>;

    async fn fetch_artifact(
        &self,
        id: &VerificationId,
        kind: ArtifactKind,
    ) -> Result<Vec<u8>, ApiError>;

    async fn upload(
        &self,
        id: &VerificationId,
        request: UploadRequest,
    ) -> Result<UploadReply, ApiError>;
}

/// Remote DOCX to PDF conversion
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert_to_pdf(&self, document: &FilePayload) -> Result<Vec<u8>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_payload_debug_omits_bytes() {
        let payload = FilePayload::new("a.png", "image/png", vec![1, 2, 3]);
        assert_eq!(
            format!("{:?}", payload),
            r#"FilePayload { name: "a.png", mime_type: "image/png", len: 3 }"#
        );
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn test_upload_body_document_failure() {
        let body: UploadBody = serde_json::from_str(
            r#"{"status": "error", "component": "docx", "missing_fields": ["品名", "淨重"]}"#,
        )
        .unwrap();
        assert_eq!(body.component.as_deref(), Some("docx"));
        assert_eq!(body.missing_fields, vec!["品名", "淨重"]);
        assert_eq!(body.detail_text(), None);
    }

    #[test]
    fn test_detail_text_sources() {
        let body: UploadBody =
            serde_json::from_str(r#"{"detail": "Label region not found"}"#).unwrap();
        assert_eq!(body.detail_text().as_deref(), Some("Label region not found"));

        let body: UploadBody =
            serde_json::from_str(r#"{"message": "m", "detail": "d"}"#).unwrap();
        assert_eq!(body.detail_text().as_deref(), Some("m"));

        let body: UploadBody = serde_json::from_str(r#"{"detail": [{"loc": ["body"]}]}"#).unwrap();
        assert_eq!(body.detail_text().as_deref(), Some(r#"[{"loc":["body"]}]"#));
    }

    #[test]
    fn test_reply_success_range() {
        let reply = UploadReply {
            http_status: 204,
            body: UploadBody::default(),
        };
        assert!(reply.is_http_success());
        let reply = UploadReply {
            http_status: 422,
            body: UploadBody::default(),
        };
        assert!(!reply.is_http_success());
    }
}
