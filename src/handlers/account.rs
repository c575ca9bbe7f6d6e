use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use axum_extra::extract::PrivateCookieJar;
use serde_json::json;
use tracing::info;

use super::{ApiSuccess, success};
use crate::error::BridgeError;
use crate::middleware::auth::{RequireAdmin, clear_session_cookie, session_cookie, session_from_jar};
use crate::router::BridgeState;
use crate::service::accounts;
use crate::types::ApplicationUser;
use crate::types::user::LoginRequest;

/// POST /Account/login
pub async fn login(
    State(state): State<BridgeState>,
    jar: PrivateCookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<Response, BridgeError> {
    let (_user, session) =
        accounts::login(&state.rm, &state.users, &state.config.rm, &req).await?;
    let cookie = session_cookie(
        &session,
        req.remember_me,
        !state.config.basic.insecure_cookie,
    );
    let body = json!({
        "success": true,
        "redirectUrl": session.role.menu_url(),
        "role": session.role,
    });
    Ok((jar.add(cookie), Json(body)).into_response())
}

/// GET /Account/CheckAuthStatus
pub async fn check_auth_status(jar: PrivateCookieJar) -> Response {
    let session = session_from_jar(&jar);
    Json(json!({
        "isAuthenticated": session.is_some(),
        "username": session.as_ref().map(|s| s.username.clone()),
        "isAdmin": session.as_ref().is_some_and(|s| s.role.is_admin()),
    }))
    .into_response()
}

/// POST /Account/Logout
pub async fn logout(jar: PrivateCookieJar) -> Response {
    if let Some(session) = session_from_jar(&jar) {
        info!(username = %session.username, "user logged out");
    }
    (
        jar.remove(clear_session_cookie()),
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Json(json!({ "success": true, "redirectUrl": "/Account/login" })),
    )
        .into_response()
}

/// GET /Admin/Users
pub async fn users(
    State(state): State<BridgeState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<ApiSuccess<Vec<ApplicationUser>>>, BridgeError> {
    let rows = state.users.list_all().await?;
    Ok(success(rows.into_iter().map(Into::into).collect()))
}
