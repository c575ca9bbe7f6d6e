use axum::{
    Json,
    extract::{Query, State},
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{ApiSuccess, required, success};
use crate::error::BridgeError;
use crate::router::BridgeState;
use crate::service::reconciler::{apply_primary_keys, format_json};
use crate::types::requests::{
    DataServerNameQuery, ExecuteGetQuery, ExecutePostRequest, ExecutionMode, PreparePostRequest,
    SendPreparedPostRequest, TermQuery,
};
use crate::types::{DataServerInfo, DataServerSummary};

/// Result of a test request executed by the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub success: bool,
    pub data: String,
    pub used_url: String,
    pub execution_mode: ExecutionMode,
    pub execution_details: String,
}

/// Base URL for `mode`: the configured RM for remote; for local, the URL the
/// client detected, else the server's own detection.
async fn resolve_base_url(
    state: &BridgeState,
    mode: ExecutionMode,
    client_local_url: Option<&str>,
) -> Result<(String, String), BridgeError> {
    match mode {
        ExecutionMode::Remote => {
            let url = state.rm.base_url().to_string();
            let details = format!("remote RM (configured): {url}");
            Ok((url, details))
        }
        ExecutionMode::Local => {
            if let Some(url) = client_local_url.map(str::trim).filter(|u| !u.is_empty()) {
                return Ok((
                    url.to_string(),
                    format!("local RM (detected by the client): {url}"),
                ));
            }
            let env = state.detector.get_or_refresh().await;
            match env.local_url(state.detector.config()) {
                Some(url) => {
                    let details = format!("local RM (detected by the server): {url}");
                    Ok((url, details))
                }
                None => {
                    let ports: Vec<String> = state
                        .detector
                        .config()
                        .ports
                        .iter()
                        .map(u16::to_string)
                        .collect();
                    warn!("local RM requested but none was detected");
                    Err(BridgeError::LocalUnavailable(format!(
                        "local RM not detected, check that RM is running locally on ports {}",
                        ports.join(", ")
                    )))
                }
            }
        }
    }
}

async fn find(state: &BridgeState, name: &str) -> Result<DataServerInfo, BridgeError> {
    state
        .catalog
        .get_by_name(name)
        .await?
        .ok_or_else(|| BridgeError::NotFound(format!("DataServer '{name}' not found")))
}

/// Stored POST example with the primary keys taken from `post_data`.
async fn prepare(
    state: &BridgeState,
    name: &str,
    post_data: &Value,
) -> Result<(DataServerInfo, String), BridgeError> {
    let ds = find(state, name).await?;
    if !ds.has_post_example() {
        return Err(BridgeError::Validation(format!(
            "DataServer '{name}' has no POST example"
        )));
    }
    let prepared = apply_primary_keys(&ds.post_example, post_data, &ds.primary_keys)?;
    Ok((ds, prepared))
}

/// POST /TestRequests/PreparePost
pub async fn prepare_post(
    State(state): State<BridgeState>,
    Json(req): Json<PreparePostRequest>,
) -> Result<Json<ApiSuccess<Value>>, BridgeError> {
    let name = required(&req.data_server_name, "DataServer name")?;
    let (ds, prepared) = prepare(&state, name, &req.post_data).await?;
    let used: Vec<&String> = ds
        .primary_keys
        .iter()
        .filter(|k| req.post_data.get(k.as_str()).is_some())
        .collect();

    Ok(success(json!({
        "preparedJson": prepared,
        "primaryKeysUsed": used,
        "exampleJson": format_json(&ds.post_example),
    })))
}

/// POST /TestRequests/ExecutePost
pub async fn execute_post(
    State(state): State<BridgeState>,
    Json(req): Json<ExecutePostRequest>,
) -> Result<Json<ExecutionResponse>, BridgeError> {
    let name = required(&req.data_server_name, "DataServer name")?;
    let (base_url, details) =
        resolve_base_url(&state, req.execution_mode, req.local_rm_url.as_deref()).await?;
    let (ds, prepared) = prepare(&state, name, &req.post_data).await?;

    info!(data_server = %ds.name, base_url = %base_url, mode = %req.execution_mode, "executing test POST");
    let raw = state.rm.with_base_url(base_url.clone()).post(&ds.name, &prepared).await?;

    Ok(Json(ExecutionResponse {
        success: true,
        data: format_json(&raw),
        used_url: base_url,
        execution_mode: req.execution_mode,
        execution_details: details,
    }))
}

/// GET /TestRequests/ExecuteGet
pub async fn execute_get(
    State(state): State<BridgeState>,
    Query(query): Query<ExecuteGetQuery>,
) -> Result<Json<ExecutionResponse>, BridgeError> {
    let name = required(&query.data_server_name, "DataServer name")?;
    let (base_url, details) =
        resolve_base_url(&state, query.execution_mode, query.local_rm_url.as_deref()).await?;

    info!(data_server = name, base_url = %base_url, mode = %query.execution_mode, "executing test GET");
    let raw = state
        .rm
        .with_base_url(base_url.clone())
        .get(name, query.filter.as_deref())
        .await?;

    Ok(Json(ExecutionResponse {
        success: true,
        data: format_json(&raw),
        used_url: base_url,
        execution_mode: query.execution_mode,
        execution_details: details,
    }))
}

/// POST /TestRequests/SendPreparedPost
pub async fn send_prepared_post(
    State(state): State<BridgeState>,
    Json(req): Json<SendPreparedPostRequest>,
) -> Result<Json<ApiSuccess<String>>, BridgeError> {
    let name = required(&req.data_server_name, "DataServer name")?;
    let raw = state.rm.post(name, &req.json_data).await?;
    Ok(success(format_json(&raw)))
}

/// GET /TestRequests/ListDataServers
pub async fn list_data_servers(
    State(state): State<BridgeState>,
) -> Result<Json<ApiSuccess<Vec<DataServerSummary>>>, BridgeError> {
    let rows = state.catalog.list_all().await?;
    Ok(success(rows.iter().map(DataServerSummary::from).collect()))
}

/// GET /TestRequests/GetDataServerInfo
pub async fn data_server_info(
    State(state): State<BridgeState>,
    Query(query): Query<DataServerNameQuery>,
) -> Result<Json<ApiSuccess<Value>>, BridgeError> {
    let name = required(&query.data_server_name, "DataServer name")?;
    let ds = find(&state, name).await?;
    Ok(success(json!({
        "name": ds.name,
        "routine": ds.routine,
        "description": ds.description,
        "primaryKeys": ds.primary_keys,
        "postExample": ds.post_example,
        "getExample": ds.get_example,
        "requiresFilter": ds.requires_filter,
    })))
}

/// GET /TestRequests/SearchDataServer?term=
pub async fn search_data_server(
    State(state): State<BridgeState>,
    Query(query): Query<TermQuery>,
) -> Result<Json<ApiSuccess<Value>>, BridgeError> {
    let term = required(&query.term, "search term")?;
    let ds = find(&state, term).await?;
    Ok(success(json!({
        "name": ds.name,
        "routine": ds.routine,
        "primaryKeys": ds.primary_keys,
        "postExample": ds.post_example,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRmResponse {
    pub is_local: bool,
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_url: Option<String>,
    pub remote_url: String,
    pub status: &'static str,
}

/// GET /TestRequests/DetectRM
pub async fn detect_rm(State(state): State<BridgeState>) -> Json<ApiSuccess<DetectRmResponse>> {
    let env = state.detector.get_or_refresh().await;
    let port = env.available_rm_ports.first().copied();
    let local_url = env.local_url(state.detector.config());
    success(DetectRmResponse {
        is_local: local_url.is_some(),
        port,
        status: if local_url.is_some() {
            "connected"
        } else {
            "remote_only"
        },
        local_url,
        remote_url: state.detector.remote_url().to_string(),
    })
}
