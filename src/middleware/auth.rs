use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use time::Duration;

use crate::error::BridgeError;
use crate::types::SessionUser;

pub const SESSION_COOKIE: &str = "rm_bridge_session";

/// Persistent sessions last this long; others end with the browser.
const REMEMBER_ME_DAYS: i64 = 14;

pub fn session_cookie(user: &SessionUser, remember_me: bool, secure: bool) -> Cookie<'static> {
    let value = serde_json::to_string(user).unwrap_or_default();
    let mut builder = Cookie::build(Cookie::new(SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax);
    if remember_me {
        builder = builder.max_age(Duration::days(REMEMBER_ME_DAYS));
    }
    builder.build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build(Cookie::new(SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Decode the session carried by the private cookie, if any.
pub fn session_from_jar(jar: &PrivateCookieJar) -> Option<SessionUser> {
    jar.get(SESSION_COOKIE)
        .and_then(|c| serde_json::from_str(c.value()).ok())
}

async fn load_session<S>(parts: &mut Parts, state: &S) -> Option<SessionUser>
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    let Ok(jar) = PrivateCookieJar::<Key>::from_request_parts(parts, state).await;
    session_from_jar(&jar)
}

/// Rejects requests without a valid session with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionUser);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = BridgeError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        load_session(parts, state)
            .await
            .map(Self)
            .ok_or_else(|| BridgeError::Unauthorized("login required".to_string()))
    }
}

/// Like [`CurrentUser`], and 403 unless the session role is admin.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub SessionUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = BridgeError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            return Err(BridgeError::Forbidden(
                "administrator access required".to_string(),
            ));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserRole;

    #[test]
    fn remember_me_sets_max_age() {
        let user = SessionUser {
            id: 1,
            username: "ana".into(),
            role: UserRole::User,
        };
        assert!(session_cookie(&user, true, true).max_age().is_some());
        let short = session_cookie(&user, false, false);
        assert!(short.max_age().is_none());
        assert_eq!(short.secure(), Some(false));
        let back: SessionUser = serde_json::from_str(short.value()).unwrap();
        assert_eq!(back, user);
    }
}
