use thiserror::Error;

/// Errors produced by calls to the verification backend or the converter
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No credential available for an authenticated call")]
    NotAuthenticated,

    #[error("Credential rejected by server (401)")]
    Unauthorized,

    #[error("Access forbidden (403)")]
    Forbidden,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Login rejected: {0}")]
    LoginRejected(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Whether the caller must send the user back to login
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::NotAuthenticated | ApiError::Unauthorized)
    }

    /// Short localized message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            ApiError::NotAuthenticated | ApiError::Unauthorized => {
                "登入已過期，請重新登入".to_string()
            }
            ApiError::Forbidden => "沒有權限執行此操作".to_string(),
            ApiError::Network(_) => "網路連線失敗，請稍後再試".to_string(),
            ApiError::LoginRejected(msg) if !msg.is_empty() => msg.clone(),
            ApiError::LoginRejected(_) => "登入失敗".to_string(),
            ApiError::Status { .. } | ApiError::Decode(_) | ApiError::InvalidRequest(_) => {
                "發生錯誤，請稍後再試".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}
