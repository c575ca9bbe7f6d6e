use crate::types::{ApplicationUser, DataServerInfo, UserRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row of `data_servers` with its JSON columns already decoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbDataServer {
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

impl From<DbDataServer> for DataServerInfo {
    fn from(d: DbDataServer) -> Self {
        DataServerInfo {
            id: d.id,
            name: d.name,
            routine: d.routine,
            primary_keys: d.primary_keys,
            description: d.description,
            get_example: d.get_example,
            post_example: d.post_example,
            requires_filter: d.requires_filter,
            filter_format: d.filter_format,
            keywords: d.keywords,
            common_errors: d.common_errors,
            consumption_tips: d.consumption_tips,
            filter_tips: d.filter_tips,
            usage_examples: d.usage_examples,
            notes: d.notes,
            last_documentation_update: d.last_documentation_update,
            documentation_author: d.documentation_author,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub base_url: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for ApplicationUser {
    fn from(u: DbUser) -> Self {
        ApplicationUser {
            role: UserRole::resolve(&u.username, u.is_admin),
            id: u.id,
            username: u.username,
            base_url: u.base_url,
            created_at: u.created_at,
        }
    }
}
