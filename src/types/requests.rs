//! Request bodies and query strings accepted by the HTTP endpoints.
//!
//! Field names are camelCase on the wire; PascalCase aliases are accepted for
//! callers that still send the form-model casing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a test request is sent from the server's point of view.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Local,
    #[default]
    #[serde(other)]
    Remote,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Local => f.write_str("local"),
            ExecutionMode::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RmMethod {
    Get,
    Post,
}

impl RmMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(RmMethod::Get),
            "POST" => Some(RmMethod::Post),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareJsonRequest {
    #[serde(default, alias = "DataServerName")]
    pub data_server_name: String,
    #[serde(default, alias = "UserJson")]
    pub user_json: String,
    #[serde(default, alias = "ExecutePost")]
    pub execute_post: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    #[serde(default = "default_method", alias = "Method")]
    pub method: String,
    #[serde(default, alias = "DataServerName")]
    pub data_server_name: String,
    #[serde(default, alias = "Filter")]
    pub filter: Option<String>,
    #[serde(default, alias = "JsonData")]
    pub json_data: Option<String>,
    /// Informational; the target is always built from the configured base URL.
    #[serde(default, alias = "Url")]
    pub url: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePostRequest {
    #[serde(default, alias = "DataServerName")]
    pub data_server_name: String,
    #[serde(default, alias = "PostData")]
    pub post_data: Value,
    #[serde(default, alias = "ExecutionMode")]
    pub execution_mode: ExecutionMode,
    #[serde(default, alias = "LocalRMUrl", alias = "localRmUrl")]
    pub local_rm_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteGetQuery {
    #[serde(default, alias = "DataServerName")]
    pub data_server_name: String,
    #[serde(default, alias = "Filter")]
    pub filter: Option<String>,
    #[serde(default, alias = "ExecutionMode")]
    pub execution_mode: ExecutionMode,
    #[serde(default, alias = "LocalRMUrl", alias = "localRmUrl")]
    pub local_rm_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparePostRequest {
    #[serde(default, alias = "DataServerName")]
    pub data_server_name: String,
    #[serde(default, alias = "PostData")]
    pub post_data: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPreparedPostRequest {
    #[serde(default, alias = "DataServerName")]
    pub data_server_name: String,
    #[serde(default, alias = "JsonData")]
    pub json_data: String,
}

/// `?term=` style query used by the search endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TermQuery {
    #[serde(default)]
    pub term: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataServerNameQuery {
    #[serde(default, alias = "DataServerName")]
    pub data_server_name: String,
}
