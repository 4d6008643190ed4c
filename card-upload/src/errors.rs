use crate::api::models::upload::ErrorResponse;
use crate::metrics::{UploadOutcome, record_upload};
use crate::storage::StorageError;
use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request used a method other than POST
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Missing `shop`/`timestamp`/`hmac`, bad signature or stale timestamp.
    /// Carries no detail about which check failed.
    #[error("Invalid or missing HMAC/shop/timestamp")]
    Unauthenticated,

    /// No non-empty `pdf` file in the multipart body
    #[error("No PDF file uploaded")]
    MissingPayload,

    /// Body could not be read as the expected multipart form
    #[error("Malformed multipart body: {reason}")]
    MalformedPayload { reason: String },

    /// Uploaded file exceeds the configured limit
    #[error("PDF file exceeds the maximum size of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Storage provider rejected the upload or could not be reached
    #[error("Upload to {provider} failed: {source}")]
    Upstream {
        provider: &'static str,
        #[source]
        source: StorageError,
    },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::MissingPayload | Error::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Upstream { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::MethodNotAllowed => "Method Not Allowed".to_string(),
            Error::Unauthenticated => "Invalid or missing HMAC/shop/timestamp".to_string(),
            Error::MissingPayload => "No PDF file uploaded".to_string(),
            Error::MalformedPayload { .. } => "Malformed multipart body".to_string(),
            Error::PayloadTooLarge { .. } => "PDF file too large".to_string(),
            Error::Upstream { .. } => "Upload to storage failed".to_string(),
            Error::Other(_) => "Internal server error".to_string(),
        }
    }

    pub fn outcome(&self) -> UploadOutcome {
        match self {
            Error::MethodNotAllowed => UploadOutcome::MethodNotAllowed,
            Error::Unauthenticated => UploadOutcome::Unauthenticated,
            Error::MissingPayload => UploadOutcome::MissingPayload,
            Error::MalformedPayload { .. } => UploadOutcome::MalformedPayload,
            Error::PayloadTooLarge { .. } => UploadOutcome::PayloadTooLarge,
            Error::Upstream { .. } => UploadOutcome::UpstreamFailure,
            Error::Other(_) => UploadOutcome::InternalError,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details server-side - different log levels based on severity
        match &self {
            Error::Upstream { .. } | Error::Other(_) => {
                tracing::error!("Upload failed: {}", self);
            }
            Error::Unauthenticated => {
                tracing::info!("Rejected unauthenticated upload request");
            }
            Error::MissingPayload | Error::MalformedPayload { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::MethodNotAllowed => {}
        }

        record_upload(self.outcome());

        match self {
            Error::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "POST")]).into_response(),
            _ => {
                let status = self.status_code();
                let body = ErrorResponse {
                    error: self.user_message(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
