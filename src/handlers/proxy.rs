use axum::{Json, extract::State};
use serde::Serialize;
use tracing::info;

use super::{ApiSuccess, required, success};
use crate::error::BridgeError;
use crate::router::BridgeState;
use crate::types::requests::{ProxyRequest, RmMethod};

/// POST /api/proxy/forward-rm-request
///
/// Forwards one call to the configured RM with the server's credentials and
/// returns the upstream body untouched.
pub async fn forward(
    State(state): State<BridgeState>,
    Json(req): Json<ProxyRequest>,
) -> Result<Json<ApiSuccess<String>>, BridgeError> {
    let method = RmMethod::parse(&req.method).ok_or_else(|| {
        BridgeError::Validation(format!("unsupported HTTP method: {}", req.method))
    })?;
    let name = required(&req.data_server_name, "DataServer name")?;
    if method == RmMethod::Post && req.json_data.as_deref().is_none_or(|j| j.trim().is_empty()) {
        return Err(BridgeError::Validation(
            "JSON data is required for POST".to_string(),
        ));
    }

    info!(
        method = ?method,
        data_server = name,
        requested_url = req.url.as_deref().unwrap_or("<none>"),
        "proxying request to RM"
    );
    let body = state
        .rm
        .forward(method, name, req.filter.as_deref(), req.json_data.as_deref())
        .await?;
    Ok(success(body))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RmCredentialsResponse {
    pub username: String,
    pub password: String,
    pub tenant_header: String,
    pub tenant: String,
}

/// GET /api/rm-credentials
///
/// Hands the configured RM credentials to local dispatch clients, in clear.
pub async fn rm_credentials(State(state): State<BridgeState>) -> Json<RmCredentialsResponse> {
    let rm = &state.config.rm;
    Json(RmCredentialsResponse {
        username: rm.username.clone(),
        password: rm.password.clone(),
        tenant_header: rm.tenant_header.clone(),
        tenant: rm.tenant_or_default(),
    })
}
