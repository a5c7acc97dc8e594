//! Submission of document, image and scope to the verification endpoint
//!
//! Preconditions are checked locally, in order, before anything is sent.
//! Replies are judged by their `component` tag first and the HTTP status
//! second, because the backend reports structural failures on several
//! status codes.

use std::sync::Arc;

use shared_types::{Verification, VerificationId};
use verify_client::{UploadReply, UploadRequest, VerificationApi};

use crate::crop;
use crate::error::SubmitError;
use crate::files::ArtifactSet;
use crate::imaging;

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Verification finished. `detail` is the refreshed record, absent if
    /// the refetch failed; the caller refreshes the catalog either way.
    Completed {
        id: VerificationId,
        scope: String,
        detail: Option<Verification>,
    },
}

pub struct SubmissionEngine {
    api: Arc<dyn VerificationApi>,
}

impl SubmissionEngine {
    pub fn new(api: Arc<dyn VerificationApi>) -> Self {
        Self { api }
    }

    /// Check preconditions and build the multipart request.
    ///
    /// The scope is sent in natural pixel space. If the image geometry is
    /// unknown it is read from the image header here.
    pub async fn prepare(
        &self,
        verification: Option<&VerificationId>,
        artifacts: &ArtifactSet,
    ) -> Result<(VerificationId, UploadRequest), SubmitError> {
        let id = verification.ok_or(SubmitError::NoVerification)?;
        let document = artifacts
            .docx
            .file
            .clone()
            .ok_or(SubmitError::MissingDocument)?;
        let image = artifacts
            .image
            .file
            .clone()
            .ok_or(SubmitError::MissingImage)?;
        let region = artifacts.image.region;
        if region.is_empty() {
            return Err(SubmitError::MissingRegion);
        }

        let (natural, display) = match artifacts.image.geometry {
            Some(geometry) => (geometry.natural, geometry.display),
            None => match imaging::decode_dimensions(image.bytes.clone()).await {
                Ok(size) => (size, size),
                Err(e) => {
                    tracing::warn!("Cannot place region on {}: {}", image.name, e);
                    return Err(SubmitError::UnreadableImage(e));
                }
            },
        };
        if natural.is_empty() {
            return Err(SubmitError::MissingRegion);
        }

        let rect = region.to_pixel_rect(natural, display);
        let request = UploadRequest {
            document,
            image,
            ocr_scope: crop::serialize_pixels(&rect),
        };
        Ok((id.clone(), request))
    }

    pub async fn submit(
        &self,
        verification: Option<&VerificationId>,
        artifacts: &ArtifactSet,
    ) -> Result<SubmitOutcome, SubmitError> {
        let (id, request) = self.prepare(verification, artifacts).await?;
        let scope = request.ocr_scope.clone();
        tracing::debug!(
            "Submitting verification {}: {} + {}, scope {}",
            id,
            request.document.name,
            request.image.name,
            scope
        );

        let reply = self.api.upload(&id, request).await?;
        interpret_reply(&reply)?;
        tracing::info!("Verification {} completed", id);

        let detail = match self.api.fetch_verification(&id).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                tracing::warn!("Verification {} completed but refetch failed: {}", id, e);
                None
            }
        };
        Ok(SubmitOutcome::Completed { id, scope, detail })
    }
}

/// Map an upload reply to success or a typed failure
pub fn interpret_reply(reply: &UploadReply) -> Result<(), SubmitError> {
    let body = &reply.body;
    let status = body.status.as_deref().map(str::to_ascii_lowercase);
    if status.as_deref() == Some("completed") {
        return Ok(());
    }

    match body.component.as_deref() {
        Some("docx") => {
            tracing::warn!("Document rejected, missing {:?}", body.missing_fields);
            Err(SubmitError::DocumentFields {
                missing: body.missing_fields.clone(),
            })
        }
        Some("image") => {
            tracing::warn!("Image rejected: {:?}", body.detail_text());
            Err(SubmitError::ImageRejected {
                detail: body.detail_text(),
            })
        }
        None if reply.is_http_success()
            && !matches!(status.as_deref(), Some("error" | "failed")) =>
        {
            Ok(())
        }
        _ => {
            tracing::warn!(
                "Verification rejected with status {}: {:?}",
                reply.http_status,
                body.detail_text()
            );
            Err(SubmitError::Rejected {
                status: reply.http_status,
                detail: body.detail_text(),
            })
        }
    }
}
