use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use imagebatch_core::HttpError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BatchError>;

/// Batch orchestration errors with appropriate HTTP status codes
#[derive(Debug, Error)]
pub enum BatchError {
    /// Malformed batch request (empty, duplicate or blank ids, blank input)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Requested model is not part of the model table
    #[error("Unknown image generation model: {0}")]
    UnknownModel(String),

    /// Model is known but the provider serving it is not configured
    #[error("No provider configured for model '{0}'")]
    ProviderNotConfigured(String),

    /// Job id was never issued, or its results were already delivered
    #[error("Batch job not found: {0}")]
    JobNotFound(String),

    /// Provider API returned an error
    #[error("Provider API error ({status}): {message}")]
    ProviderApiError { status: u16, message: String },

    /// Network or connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Provider answered with a payload we could not interpret
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Artifact could not be persisted
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal server error
    /// If Some(message), it came from a provider and can be shown
    /// If None, it's an internal error and should not leak details
    #[error("Internal server error")]
    InternalError(Option<String>),
}

impl HttpError for BatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnknownModel(_) | Self::ProviderNotConfigured(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::JobNotFound(_) => StatusCode::NOT_FOUND,
            Self::ConnectionError(_) | Self::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            Self::ProviderApiError { status, .. } => match *status {
                400 => StatusCode::BAD_REQUEST,
                401 => StatusCode::UNAUTHORIZED,
                403 => StatusCode::FORBIDDEN,
                429 => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Storage(_) | Self::ConfigError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) | Self::UnknownModel(_) | Self::ProviderNotConfigured(_) => {
                "invalid_request_error"
            }
            Self::JobNotFound(_) => "not_found_error",
            Self::ConnectionError(_) | Self::ProviderApiError { .. } | Self::InvalidResponse(_) => "api_error",
            Self::Storage(_) | Self::ConfigError(_) | Self::InternalError(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::InternalError(Some(provider_msg)) => provider_msg.clone(),
            Self::InternalError(None) | Self::ConfigError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for BatchError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "batch request failed");
        }

        (self.status_code(), Json(self.to_body())).into_response()
    }
}
