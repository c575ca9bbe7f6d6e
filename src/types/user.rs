use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account that is always elevated to administrator.
pub const MASTER_ACCOUNT: &str = "mestre";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    /// Resolve the role of an account at login time.
    pub fn resolve(username: &str, stored_admin: bool) -> Self {
        if stored_admin || username.eq_ignore_ascii_case(MASTER_ACCOUNT) {
            UserRole::Admin
        } else {
            UserRole::User
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::Admin)
    }

    pub fn menu_url(self) -> &'static str {
        match self {
            UserRole::Admin => "/Admin/Menu",
            UserRole::User => "/User/Menu",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationUser {
    pub id: i64,
    pub username: String,
    pub base_url: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// Identity carried in the private session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "Password")]
    pub password: String,
    #[serde(default, alias = "BaseUrl")]
    pub base_url: Option<String>,
    #[serde(default, alias = "RememberMe")]
    pub remember_me: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_account_is_always_admin() {
        assert_eq!(UserRole::resolve("MESTRE", false), UserRole::Admin);
        assert_eq!(UserRole::resolve("ana", true), UserRole::Admin);
        assert_eq!(UserRole::resolve("ana", false), UserRole::User);
    }
}
