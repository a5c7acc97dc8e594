//! Verification catalog model
//!
//! These types mirror the JSON records returned by the verification backend.
//! The client never mutates them; they are refreshed from the server.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque verification identifier
///
/// The backend sends numeric ids, but nothing in the client does arithmetic
/// on them, so they are carried as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VerificationId(String);

impl VerificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VerificationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for VerificationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for VerificationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for VerificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        })
    }
}

/// Processing status of a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Completed,
    /// Any status string this client does not know about
    #[serde(other)]
    Unknown,
}

/// The three artifact slots a verification can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Source Word document
    Docx,
    /// Renderable PDF converted from the source document
    Pdf,
    /// Photographed or scanned counterpart
    Image,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Docx, ArtifactKind::Pdf, ArtifactKind::Image];

    /// Path segment used by the per-artifact download endpoint
    pub fn path_segment(&self) -> &'static str {
        match self {
            ArtifactKind::Docx => "docx",
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Image => "image",
        }
    }

    /// MIME type assigned when the payload's own type is unknown
    pub fn default_mime_type(&self) -> &'static str {
        match self {
            ArtifactKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Image => "image/*",
        }
    }

    /// File name used when the backend does not report one
    pub fn default_file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Docx => "document.docx",
            ArtifactKind::Pdf => "document.pdf",
            ArtifactKind::Image => "image.png",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Presence flag and metadata for one stored artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub filename: Option<String>,
    /// Persisted crop scope, only reported for images
    #[serde(default)]
    pub ocr_scope: Option<String>,
}

/// Document vs OCR text for one labelled field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDifference {
    #[serde(default)]
    pub docx: Option<String>,
    #[serde(default)]
    pub ocr: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareResult {
    /// Titles found in the document that the OCR pass could not match
    #[serde(default)]
    pub invalid_titles: Vec<String>,
    #[serde(default)]
    pub differences: BTreeMap<String, FieldDifference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Differences {
    #[serde(default)]
    pub compare_result: Option<CompareResult>,
}

/// A verification record as owned by the backend catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub id: VerificationId,
    #[serde(rename = "verification_name", alias = "name", default)]
    pub name: String,
    #[serde(default)]
    pub status: VerificationStatus,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub docx_info: Option<ArtifactInfo>,
    #[serde(default)]
    pub pdf_info: Option<ArtifactInfo>,
    #[serde(default)]
    pub image_info: Option<ArtifactInfo>,
    #[serde(default)]
    pub differences: Option<Differences>,
}

impl Verification {
    /// Parse `created_at` as RFC 3339, falling back to a naive ISO timestamp in UTC
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&self.created_at) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.created_at, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn artifact_info(&self, kind: ArtifactKind) -> Option<&ArtifactInfo> {
        match kind {
            ArtifactKind::Docx => self.docx_info.as_ref(),
            ArtifactKind::Pdf => self.pdf_info.as_ref(),
            ArtifactKind::Image => self.image_info.as_ref(),
        }
    }

    /// Whether the backend reports a stored payload for `kind`
    pub fn has_artifact(&self, kind: ArtifactKind) -> bool {
        self.artifact_info(kind).is_some_and(|info| info.exists)
    }

    pub fn is_completed(&self) -> bool {
        self.status == VerificationStatus::Completed
    }

    pub fn compare_result(&self) -> Option<&CompareResult> {
        self.differences
            .as_ref()
            .and_then(|d| d.compare_result.as_ref())
    }
}

/// Response of the current-user endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DETAIL_JSON: &str = r#"{
        "id": 12,
        "verification_name": "七七乳",
        "status": "completed",
        "created_at": "2024-11-02T09:15:00",
        "docx_info": { "exists": true, "filename": "label.docx" },
        "pdf_info": { "exists": false },
        "image_info": { "exists": true, "filename": "photo.jpg", "ocr_scope": "[120.00, 340.50, 10.00, 20.00]" },
        "differences": {
            "compare_result": {
                "invalid_titles": ["保存期限"],
                "differences": { "品名": { "docx": "七七乳", "ocr": "七七孔" } }
            }
        }
    }"#;

    #[test]
    fn test_parse_detail_record() {
        let v: Verification = serde_json::from_str(DETAIL_JSON).unwrap();
        assert_eq!(v.id, VerificationId::from(12));
        assert_eq!(v.name, "七七乳");
        assert!(v.is_completed());
        assert!(v.has_artifact(ArtifactKind::Docx));
        assert!(!v.has_artifact(ArtifactKind::Pdf));
        assert!(v.has_artifact(ArtifactKind::Image));

        let image = v.artifact_info(ArtifactKind::Image).unwrap();
        assert_eq!(image.ocr_scope.as_deref(), Some("[120.00, 340.50, 10.00, 20.00]"));

        let compare = v.compare_result().unwrap();
        assert_eq!(compare.invalid_titles, vec!["保存期限".to_string()]);
        assert_eq!(
            compare.differences["品名"],
            FieldDifference {
                docx: Some("七七乳".to_string()),
                ocr: Some("七七孔".to_string()),
            }
        );
    }

    #[test]
    fn test_minimal_list_entry() {
        let v: Verification =
            serde_json::from_str(r#"{"id": "abc", "verification_name": "x"}"#).unwrap();
        assert_eq!(v.id.as_str(), "abc");
        assert_eq!(v.status, VerificationStatus::Pending);
        assert!(!v.has_artifact(ArtifactKind::Docx));
        assert!(v.compare_result().is_none());
        assert!(v.created_at_utc().is_none());
    }

    #[test]
    fn test_unknown_status() {
        let v: Verification =
            serde_json::from_str(r#"{"id": 1, "status": "processing"}"#).unwrap();
        assert_eq!(v.status, VerificationStatus::Unknown);
    }

    #[test]
    fn test_created_at_formats() {
        let mut v: Verification = serde_json::from_str(DETAIL_JSON).unwrap();
        let naive = v.created_at_utc().unwrap();
        assert_eq!(naive.to_rfc3339(), "2024-11-02T09:15:00+00:00");

        v.created_at = "2024-11-02T17:15:00+08:00".to_string();
        assert_eq!(v.created_at_utc(), Some(naive));
    }

    #[test]
    fn test_artifact_kind_defaults() {
        assert_eq!(ArtifactKind::Pdf.path_segment(), "pdf");
        assert_eq!(ArtifactKind::Image.default_file_name(), "image.png");
        assert_eq!(ArtifactKind::Pdf.default_mime_type(), "application/pdf");
        assert_eq!(ArtifactKind::Docx.to_string(), "docx");
    }
}
