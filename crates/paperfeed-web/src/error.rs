//! JSON error envelope for every handler.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use paperfeed_storage::StoreError;
use paperfeed_sync::{HookError, IngestError};
use serde::Serialize;
use tracing::{error, warn};

/// `{ "error": ..., "details"?: ... }`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or wrong trigger secret")]
    Unauthorized,

    #[error("malformed request: {message}")]
    BadRequest { status: StatusCode, message: String },

    #[error("ingest failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("translation hook failed: {0}")]
    Hook(#[from] HookError),

    #[error("translation service not configured")]
    TranslationUnavailable,

    #[error("listing papers failed: {0}")]
    List(#[source] StoreError),

    #[error("updating {field} failed: {source}")]
    Update {
        field: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ApiError {
    pub fn missing_field(field: &str) -> Self {
        Self::BadRequest {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: format!("missing field `{field}`"),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest { status, .. } => *status,
            Self::Hook(HookError::InvalidRecord(_)) => StatusCode::BAD_REQUEST,
            Self::Ingest(_)
            | Self::Hook(_)
            | Self::TranslationUnavailable
            | Self::List(_)
            | Self::Update { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            Self::Unauthorized => ("Unauthorized".to_string(), None),
            Self::BadRequest { message, .. } => {
                ("Invalid request".to_string(), Some(message.clone()))
            }
            // Upstream failures are reported generically.
            Self::Ingest(IngestError::Upstream(_)) => ("Internal Server Error".to_string(), None),
            Self::Ingest(IngestError::Storage(e)) => {
                ("Database unavailable".to_string(), Some(e.to_string()))
            }
            Self::Hook(HookError::InvalidRecord(msg)) => {
                ("Invalid webhook payload".to_string(), Some(msg.clone()))
            }
            Self::Hook(e) => ("Translation failed".to_string(), Some(e.to_string())),
            Self::TranslationUnavailable => {
                ("Translation failed".to_string(), Some(self.to_string()))
            }
            Self::List(e) => ("Failed to fetch papers".to_string(), Some(e.to_string())),
            Self::Update { field, source } => (
                format!("Failed to update {field}"),
                Some(source.to_string()),
            ),
        };
        ErrorBody { error, details }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
