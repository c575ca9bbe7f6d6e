use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalog entry describing one RM DataServer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DataServerInfo {
    pub id: i64,
    pub name: String,
    pub routine: String,
    pub primary_keys: Vec<String>,
    pub description: String,
    pub get_example: String,
    pub post_example: String,
    pub requires_filter: bool,
    pub filter_format: Option<String>,
    pub keywords: Vec<String>,

    pub common_errors: Option<String>,
    pub consumption_tips: Option<String>,
    pub filter_tips: Option<String>,
    pub usage_examples: Option<String>,
    pub notes: Option<String>,
    pub last_documentation_update: Option<DateTime<Utc>>,
    pub documentation_author: Option<String>,
}

impl DataServerInfo {
    pub fn new(name: impl Into<String>, routine: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routine: routine.into(),
            get_example: "{}".to_string(),
            post_example: "{}".to_string(),
            ..Default::default()
        }
    }

    pub fn has_post_example(&self) -> bool {
        !self.post_example.trim().is_empty()
    }

    /// Upper-cased three letter module prefix used when grouping the catalog.
    pub fn group_key(&self) -> String {
        self.name.chars().take(3).collect::<String>().to_uppercase()
    }
}

/// Summary row returned by list endpoints.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataServerSummary {
    pub name: String,
    pub routine: String,
    pub description: String,
}

impl From<&DataServerInfo> for DataServerSummary {
    fn from(ds: &DataServerInfo) -> Self {
        Self {
            name: ds.name.clone(),
            routine: ds.routine.clone(),
            description: ds.description.clone(),
        }
    }
}

/// Library-update form submitted by administrators.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LibraryUpdateForm {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Routine")]
    pub routine: String,
    #[serde(alias = "Description")]
    pub description: Option<String>,
    /// Comma separated.
    #[serde(alias = "Keywords")]
    pub keywords: String,
    /// Comma separated.
    #[serde(alias = "PrimaryKeys")]
    pub primary_keys: String,
    #[serde(alias = "GetExample")]
    pub get_example: Option<String>,
    #[serde(alias = "PostExample")]
    pub post_example: Option<String>,

    #[serde(alias = "CommonErrors")]
    pub common_errors: Option<String>,
    #[serde(alias = "ConsumptionTips")]
    pub consumption_tips: Option<String>,
    #[serde(alias = "FilterTips")]
    pub filter_tips: Option<String>,
    #[serde(alias = "UsageExamples")]
    pub usage_examples: Option<String>,
    #[serde(alias = "Notes")]
    pub notes: Option<String>,
    #[serde(alias = "WantToAddDocumentation")]
    pub want_to_add_documentation: bool,
}

/// Split a comma separated form value into trimmed, non-empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
