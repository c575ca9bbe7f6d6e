use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::error;

/// Message fragments that mark a failed direct call as a cross-origin/network
/// failure, eligible for the proxy fallback.
const CORS_MARKERS: &[&str] = &["CORS", "NetworkError", "Failed to fetch", "cross-origin"];

#[derive(Debug, ThisError)]
pub enum BridgeError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid JSON in {context}: {message}")]
    InvalidJson { context: String, message: String },

    #[error("form validation failed")]
    FormInvalid(BTreeMap<String, Vec<String>>),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("request failed: {status} - {body}")]
    UpstreamStatus { status: StatusCode, body: String },

    #[error("request exceeded the time limit of {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("CORS error: {0}")]
    Cors(String),

    #[error("{0}")]
    LocalUnavailable(String),

    #[error("communication error with RM: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for BridgeError {
    fn from(e: figment::Error) -> Self {
        BridgeError::Config(Box::new(e))
    }
}

impl BridgeError {
    pub fn invalid_json(context: impl Into<String>, err: &serde_json::Error) -> Self {
        BridgeError::InvalidJson {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Map a transport error, turning elapsed deadlines into [`BridgeError::Timeout`].
    pub fn from_transport(err: reqwest::Error, limit: Duration) -> Self {
        if err.is_timeout() {
            BridgeError::Timeout(limit)
        } else {
            BridgeError::Reqwest(err)
        }
    }

    /// True for failures of a direct local call that should be retried once
    /// through the server-side proxy.
    pub fn looks_like_cors(&self) -> bool {
        match self {
            BridgeError::Cors(_) => true,
            BridgeError::Reqwest(e) if e.is_connect() => true,
            other => {
                let msg = other.to_string();
                CORS_MARKERS.iter().any(|m| msg.contains(m))
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Validation(_)
            | BridgeError::InvalidJson { .. }
            | BridgeError::FormInvalid(_)
            | BridgeError::UrlParse(_)
            | BridgeError::Json(_) => StatusCode::BAD_REQUEST,
            BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BridgeError::Forbidden(_) => StatusCode::FORBIDDEN,
            BridgeError::UpstreamStatus { status, .. } => *status,
            BridgeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::Cors(_) | BridgeError::Reqwest(_) => StatusCode::BAD_GATEWAY,
            BridgeError::LocalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BridgeError::DatabaseError(_)
            | BridgeError::Csv(_)
            | BridgeError::Config(_)
            | BridgeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = match self {
            BridgeError::FormInvalid(errors) => ApiErrorResponse {
                success: false,
                error: "form validation failed".to_string(),
                status_code: None,
                errors: Some(errors),
            },
            BridgeError::UpstreamStatus { status, ref body } => {
                let msg = format!("request failed: {status} - {body}");
                ApiErrorResponse::new(msg).with_status(status)
            }
            BridgeError::DatabaseError(_)
            | BridgeError::Csv(_)
            | BridgeError::Config(_)
            | BridgeError::Io(_) => {
                error!(error = %self, "internal error");
                ApiErrorResponse::new("An internal server error occurred.".to_string())
            }
            other => ApiErrorResponse::new(other.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

/// Uniform failure envelope returned by every endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ApiErrorResponse {
    pub fn new(error: String) -> Self {
        Self {
            success: false,
            error,
            status_code: None,
            errors: None,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status_code = Some(status.as_u16());
        self
    }
}
