use reqwest::StatusCode;
use tracing::{info, warn};

use crate::config::{RmConfig, format_rm_url};
use crate::db::UserStorage;
use crate::error::BridgeError;
use crate::service::rm_client::{RmClient, RmCredentials};
use crate::types::user::{LoginRequest, MASTER_ACCOUNT};
use crate::types::{ApplicationUser, SessionUser};

/// Check the credentials against the user's RM, then create or refresh the
/// local account and resolve its role.
pub async fn login(
    rm: &RmClient,
    users: &UserStorage,
    cfg: &RmConfig,
    req: &LoginRequest,
) -> Result<(ApplicationUser, SessionUser), BridgeError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(BridgeError::Validation(
            "username and password are required".to_string(),
        ));
    }

    let base_url = match req.base_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => format_rm_url(url),
        _ => format_rm_url(cfg.base_url.as_str()),
    };

    let probe = rm.with_base_url(base_url.clone()).with_credentials(RmCredentials {
        username: username.to_string(),
        password: req.password.clone(),
        tenant_header: cfg.tenant_header.clone(),
        tenant: Some(cfg.tenant_or_default()),
    });

    match probe.get(&cfg.login_probe, None).await {
        Ok(body) if body.trim().is_empty() => {
            return Err(BridgeError::Unauthorized(
                "RM authentication failed".to_string(),
            ));
        }
        Ok(_) => info!(username, base_url = %base_url, "RM authentication succeeded"),
        Err(BridgeError::UpstreamStatus { status, .. })
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
        {
            warn!(username, base_url = %base_url, "RM rejected the credentials");
            return Err(BridgeError::Unauthorized(
                "RM authentication failed".to_string(),
            ));
        }
        Err(e) => return Err(e),
    }

    let is_master = username.eq_ignore_ascii_case(MASTER_ACCOUNT);
    let row = users.upsert_login(username, &base_url, is_master).await?;
    let user: ApplicationUser = row.into();
    let session = SessionUser {
        id: user.id,
        username: user.username.clone(),
        role: user.role,
    };
    info!(username = %user.username, role = ?user.role, "user logged in");
    Ok((user, session))
}
