use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use tonechat_sentiment::ClassifyError;

pub type ChatResult<T> = Result<T, ChatError>;

/// Everything a send, read-acknowledgement or history query can fail with.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Bad input, rejected before any side effect
    #[error("{0}")]
    Validation(String),

    /// Unknown sender or receiver, rejected before any side effect
    #[error("{0}")]
    NotFound(String),

    /// The scoring service could not classify the text. Nothing was stored.
    #[error("sentiment service failed: {0}")]
    ClassificationUnavailable(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ClassificationUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Invalid request",
            Self::NotFound(_) => "Not found",
            Self::ClassificationUnavailable(_) => "Sentiment service failed",
            Self::Persistence(_) => "Internal server error",
        }
    }

    fn log(&self) {
        match self {
            Self::Persistence(e) => tracing::error!(error = %e, "Persistence failure"),
            Self::ClassificationUnavailable(detail) => {
                tracing::warn!(detail = %detail, "Sentiment service unavailable")
            }
            _ => tracing::debug!(error = %self, "Client error occurred"),
        }
    }
}

impl From<ClassifyError> for ChatError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::Unavailable(detail) => Self::ClassificationUnavailable(detail),
            ClassifyError::Cancelled => Self::ClassificationUnavailable("classification cancelled".into()),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        // Internal details stay in the logs
        let detail = match &self {
            Self::Persistence(_) => None,
            other => Some(other.to_string()),
        };

        let body = json!({
            "title": self.title(),
            "detail": detail,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
