//! Client side of the label verification backend
//!
//! - [`Session`]: the one credential every authenticated call reads
//! - [`ApiClient`]: typed HTTP calls with centralized 401 handling
//! - [`VerificationApi`] / [`DocumentConverter`]: ports the core engines use

pub mod client;
pub mod error;
pub mod ports;
pub mod session;

pub use client::{ApiClient, ClientOptions};
pub use error::ApiError;
pub use ports::{
    DocumentConverter, FilePayload, UploadBody, UploadReply, UploadRequest, VerificationApi,
};
pub use session::{AuthEvent, Session};
