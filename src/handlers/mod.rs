pub mod account;
pub mod catalog;
pub mod compare_json;
pub mod environment;
pub mod proxy;
pub mod test_requests;

use axum::Json;
use serde::Serialize;

use crate::error::BridgeError;

/// `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiSuccess<T> {
    pub success: bool,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<ApiSuccess<T>> {
    Json(ApiSuccess {
        success: true,
        data,
    })
}

/// Trimmed `raw`, or a validation error naming `what` when blank.
pub(crate) fn required<'a>(raw: &'a str, what: &str) -> Result<&'a str, BridgeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(BridgeError::Validation(format!("{what} is required")))
    } else {
        Ok(trimmed)
    }
}
