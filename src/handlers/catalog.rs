use axum::{
    Form, Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use super::{ApiSuccess, required, success};
use crate::config::SYSTEM_NAMES;
use crate::error::BridgeError;
use crate::middleware::auth::{CurrentUser, RequireAdmin};
use crate::router::BridgeState;
use crate::service::catalog;
use crate::service::reconciler::unescape_and_format;
use crate::types::requests::TermQuery;
use crate::types::{DataServerInfo, LibraryUpdateForm};

/// Results returned by the name search.
const NAME_SEARCH_LIMIT: i64 = 10;

/// GET /DataServers
pub async fn list(
    State(state): State<BridgeState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<ApiSuccess<Vec<DataServerInfo>>>, BridgeError> {
    Ok(success(state.catalog.list_all().await?))
}

/// GET /DataServers/Details/{id}
pub async fn details(
    State(state): State<BridgeState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiSuccess<DataServerInfo>>, BridgeError> {
    let ds = state
        .catalog
        .get_by_id(id)
        .await?
        .ok_or_else(|| BridgeError::NotFound(format!("DataServer {id} not found")))?;
    Ok(success(ds))
}

/// GET /DataServer/search?term=
pub async fn name_search(
    State(state): State<BridgeState>,
    Query(query): Query<TermQuery>,
) -> Result<Json<ApiSuccess<Vec<Value>>>, BridgeError> {
    let rows = state
        .catalog
        .search_by_name(&query.term, NAME_SEARCH_LIMIT)
        .await?;
    let data = rows
        .into_iter()
        .map(|ds| {
            json!({
                "id": ds.id,
                "name": ds.name,
                "routine": ds.routine,
                "description": ds.description,
            })
        })
        .collect();
    Ok(success(data))
}

/// GET /JsonViewer/Search?term=
pub async fn json_viewer_search(
    State(state): State<BridgeState>,
    Query(query): Query<TermQuery>,
) -> Result<Json<ApiSuccess<Vec<Value>>>, BridgeError> {
    let term = required(&query.term, "search term")?;
    let rows = state.catalog.search_text(term).await?;
    let data = rows
        .into_iter()
        .map(|ds| {
            json!({
                "name": ds.name,
                "routine": ds.routine,
                "description": ds.description,
                "primaryKeys": ds.primary_keys,
                "getExample": unescape_and_format(&ds.get_example),
                "postExample": unescape_and_format(&ds.post_example),
            })
        })
        .collect();
    Ok(success(data))
}

/// GET /SearchDS/SearchByKeywords?term=
pub async fn keyword_search(
    State(state): State<BridgeState>,
    Query(query): Query<TermQuery>,
) -> Result<Json<ApiSuccess<Vec<DataServerInfo>>>, BridgeError> {
    let term = required(&query.term, "search term")?;
    Ok(success(catalog::search_by_keywords(&state.catalog, term).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedCatalog {
    pub groups: BTreeMap<String, Vec<DataServerInfo>>,
    pub system_names: BTreeMap<&'static str, &'static str>,
}

/// GET /SearchDS/GetAllGrouped
pub async fn grouped(
    State(state): State<BridgeState>,
) -> Result<Json<ApiSuccess<GroupedCatalog>>, BridgeError> {
    let rows = state.catalog.list_all().await?;
    Ok(success(GroupedCatalog {
        groups: catalog::group_by_module(rows),
        system_names: SYSTEM_NAMES.iter().copied().collect(),
    }))
}

/// POST /Biblioteca/Atualizar
pub async fn library_update(
    State(state): State<BridgeState>,
    RequireAdmin(user): RequireAdmin,
    Form(form): Form<LibraryUpdateForm>,
) -> Result<Json<Value>, BridgeError> {
    let (ds, created) = catalog::apply_library_update(&state.catalog, &form, &user.username).await?;
    let message = if created {
        "DataServer added to the library"
    } else {
        "library updated"
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "data": ds,
    })))
}

/// GET /Admin/ExportarDataServers
pub async fn export_json(
    State(state): State<BridgeState>,
    RequireAdmin(_user): RequireAdmin,
) -> Result<impl IntoResponse, BridgeError> {
    let rows = state.catalog.list_all().await?;
    let body = serde_json::to_string_pretty(&rows)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"dataservers.json\"",
            ),
        ],
        body,
    ))
}

/// GET /BancoDados/Exportar
pub async fn export_csv(
    State(state): State<BridgeState>,
    RequireAdmin(_user): RequireAdmin,
) -> Result<impl IntoResponse, BridgeError> {
    let rows = state.catalog.list_all().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"dataservers.csv\"",
            ),
        ],
        catalog::export_csv(&rows)?,
    ))
}
