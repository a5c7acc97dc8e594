//! Typed HTTP client for the verification backend and the DOCX converter
//!
//! Every authenticated request goes through [`ApiClient::send_authenticated`],
//! which attaches the bearer credential and turns 401/403 into errors before
//! any caller looks at the body.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shared_types::{ArtifactKind, UserProfile, Verification, VerificationId};

use crate::error::ApiError;
use crate::ports::{
    DocumentConverter, FilePayload, UploadBody, UploadReply, UploadRequest, VerificationApi,
};
use crate::session::Session;

/// Endpoints and transport settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Verification backend, e.g. `http://localhost:8100`
    pub base_url: String,
    /// DOCX to PDF conversion service
    pub converter_url: String,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8100".to_string(),
            converter_url: "http://localhost:8101".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize, Default)]
struct LoginFailure {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

pub struct ApiClient {
    http: Client,
    options: ClientOptions,
    session: Arc<Session>,
}

impl ApiClient {
    pub fn new(options: ClientOptions, session: Arc<Session>) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(options.timeout).build()?;
        Ok(Self {
            http,
            options,
            session,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn endpoint(&self, path: &str) -> String {
        join_url(&self.options.base_url, path)
    }

    /// Attach the credential and short-circuit on 401/403.
    ///
    /// A 401 clears the credential that was sent (and only that one) before
    /// returning, so no caller interprets the 401 body as a payload.
    async fn send_authenticated(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let token = self.session.token().ok_or(ApiError::NotAuthenticated)?;
        let response = request.bearer_auth(&token).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                self.session.invalidate_if_current(&token);
                Err(ApiError::Unauthorized)
            }
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            _ => Ok(response),
        }
    }

    async fn ensure_success(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status { status, body })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        tracing::debug!("GET {}", path);
        let response = self
            .send_authenticated(self.http.get(self.endpoint(path)))
            .await?;
        let response = Self::ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Exchange username/password for a bearer token and store it in the session
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.endpoint("/token"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        if !response.status().is_success() {
            let failure: LoginFailure = response.json().await.unwrap_or_default();
            let reason = failure.error.or(failure.detail).unwrap_or_default();
            tracing::warn!("Login rejected for {}: {}", username, reason);
            return Err(ApiError::LoginRejected(reason));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        self.session.set_token(token.access_token);
        tracing::info!("Logged in as {}", username);
        Ok(())
    }

    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.get_json("/users/me").await
    }

    pub async fn list_verifications(&self) -> Result<Vec<Verification>, ApiError> {
        self.get_json("/verifications").await
    }

    pub async fn get_verification(&self, id: &VerificationId) -> Result<Verification, ApiError> {
        self.get_json(&format!("/verifications/{}", id)).await
    }

    pub async fn create_verification(&self, name: &str) -> Result<(), ApiError> {
        let request = self
            .http
            .post(self.endpoint("/verifications"))
            .query(&[("verification_name", name)]);
        let response = self.send_authenticated(request).await?;
        Self::ensure_success(response).await?;
        tracing::info!("Created verification {:?}", name);
        Ok(())
    }

    pub async fn rename_verification(
        &self,
        id: &VerificationId,
        name: &str,
    ) -> Result<(), ApiError> {
        let request = self
            .http
            .put(self.endpoint(&format!("/verifications/{}/rename", id)))
            .json(&serde_json::json!({ "verification_name": name }));
        let response = self.send_authenticated(request).await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    pub async fn delete_verification(&self, id: &VerificationId) -> Result<(), ApiError> {
        let request = self
            .http
            .delete(self.endpoint(&format!("/verifications/{}", id)));
        let response = self.send_authenticated(request).await?;
        Self::ensure_success(response).await?;
        tracing::info!("Deleted verification {}", id);
        Ok(())
    }

    pub async fn download_artifact(
        &self,
        id: &VerificationId,
        kind: ArtifactKind,
    ) -> Result<Vec<u8>, ApiError> {
        let path = format!("/verifications/{}/{}", id, kind.path_segment());
        tracing::debug!("GET {}", path);
        let response = self
            .send_authenticated(self.http.get(self.endpoint(&path)))
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Submit document, image and scope. Non-2xx replies are returned, not
    /// raised, because their body carries the structured failure.
    pub async fn upload_files(
        &self,
        id: &VerificationId,
        request: UploadRequest,
    ) -> Result<UploadReply, ApiError> {
        let form = multipart::Form::new()
            .part("docx_file", file_part(&request.document)?)
            .part("image_file", file_part(&request.image)?)
            .text("ocr_scope", request.ocr_scope.clone());

        tracing::debug!(
            "POST /verifications/{}/upload (scope {})",
            id,
            request.ocr_scope
        );
        let response = self
            .send_authenticated(
                self.http
                    .post(self.endpoint(&format!("/verifications/{}/upload", id)))
                    .multipart(form),
            )
            .await?;

        let http_status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice::<UploadBody>(&bytes).unwrap_or_else(|_| {
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            UploadBody {
                message: (!text.is_empty()).then_some(text),
                ..UploadBody::default()
            }
        });

        Ok(UploadReply { http_status, body })
    }

    /// Convert a DOCX through the unauthenticated conversion service
    pub async fn convert_docx(&self, document: &FilePayload) -> Result<Vec<u8>, ApiError> {
        let form = multipart::Form::new().part("file", file_part(document)?);
        let url = join_url(&self.options.converter_url, "/doc_to_pdf");

        tracing::debug!("POST {} ({} bytes)", url, document.len());
        let response = self.http.post(url).multipart(form).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn file_part(payload: &FilePayload) -> Result<multipart::Part, ApiError> {
    multipart::Part::bytes(payload.bytes.to_vec())
        .file_name(payload.name.clone())
        .mime_str(&payload.mime_type)
        .map_err(|e| ApiError::InvalidRequest(format!("{}: {}", payload.name, e)))
}

#[async_trait]
impl VerificationApi for ApiClient {
    async fn fetch_verification(&self, id: &VerificationId) -> Result<Verification, ApiError> {
        self.get_verification(id).await
    }

    async fn fetch_artifact(
        &self,
        id: &VerificationId,
        kind: ArtifactKind,
    ) -> Result<Vec<u8>, ApiError> {
        self.download_artifact(id, kind).await
    }

    async fn upload(
        &self,
        id: &VerificationId,
        request: UploadRequest,
    ) -> Result<UploadReply, ApiError> {
        self.upload_files(id, request).await
    }
}

#[async_trait]
impl DocumentConverter for ApiClient {
    async fn convert_to_pdf(&self, document: &FilePayload) -> Result<Vec<u8>, ApiError> {
        self.convert_docx(document).await
    }
}
