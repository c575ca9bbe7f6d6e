use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{required, success};
use crate::router::BridgeState;
use crate::service::reconciler::{self, Difference, format_json};
use crate::types::DataServerInfo;
use crate::types::requests::{CompareJsonRequest, DataServerNameQuery};
use crate::BridgeError;

/// Names offered back when a lookup misses.
const AVAILABLE_NAMES_LIMIT: i64 = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareJsonData {
    pub differences: Vec<Difference>,
    pub example_json: String,
    pub corrected_json: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_response: Option<String>,
}

async fn not_found_with_names(state: &BridgeState, name: &str) -> Result<Response, BridgeError> {
    let available = state.catalog.list_names(AVAILABLE_NAMES_LIMIT).await?;
    let body = json!({
        "success": false,
        "error": format!("DataServer '{name}' not found"),
        "availableDataServers": available,
    });
    Ok((StatusCode::NOT_FOUND, Json(body)).into_response())
}

fn post_example_of(ds: &DataServerInfo) -> Result<&str, BridgeError> {
    if ds.has_post_example() {
        Ok(ds.post_example.as_str())
    } else {
        Err(BridgeError::Validation(format!(
            "DataServer '{}' has no POST example",
            ds.name
        )))
    }
}

/// POST /CompareJson/CompareJson
pub async fn compare(
    State(state): State<BridgeState>,
    Json(req): Json<CompareJsonRequest>,
) -> Result<Response, BridgeError> {
    let name = required(&req.data_server_name, "DataServer name")?;
    required(&req.user_json, "user JSON")?;

    let Some(ds) = state.catalog.get_by_name(name).await? else {
        return not_found_with_names(&state, name).await;
    };
    let example = post_example_of(&ds)?;

    let outcome = reconciler::reconcile(example, &req.user_json)?;
    info!(
        data_server = name,
        differences = outcome.differences.len(),
        execute_post = req.execute_post,
        "compared JSON against example"
    );

    let post_response = if req.execute_post {
        let raw = state.rm.post(&ds.name, &outcome.corrected_json).await?;
        Some(format_json(&raw))
    } else {
        None
    };

    Ok(success(CompareJsonData {
        differences: outcome.differences,
        example_json: outcome.example_json,
        corrected_json: outcome.corrected_json,
        post_response,
    })
    .into_response())
}

/// GET /CompareJson/GetDataServerInfo?dataServerName=
pub async fn data_server_info(
    State(state): State<BridgeState>,
    Query(query): Query<DataServerNameQuery>,
) -> Result<Response, BridgeError> {
    let name = required(&query.data_server_name, "DataServer name")?;
    let Some(ds) = state.catalog.get_by_name(name).await? else {
        return not_found_with_names(&state, name).await;
    };

    Ok(success(json!({
        "name": ds.name,
        "routine": ds.routine,
        "primaryKeys": ds.primary_keys,
        "hasPostExample": ds.has_post_example(),
        "postExampleLength": ds.post_example.len(),
        "postExample": ds.post_example,
    }))
    .into_response())
}
