use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::{HeaderValue, Method, request::Parts},
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::config::Config;
use crate::db::{CatalogStorage, SqlitePool, UserStorage};
use crate::error::BridgeError;
use crate::handlers::{account, catalog, compare_json, environment, proxy, test_requests};
use crate::service::detection::EnvironmentDetector;
use crate::service::rm_client::{RmClient, build_http_client};

/// Smallest accepted `basic.cookie_secret`, in bytes.
const COOKIE_SECRET_MIN: usize = 64;

#[derive(Clone)]
pub struct BridgeState {
    pub config: Arc<Config>,
    pub catalog: CatalogStorage,
    pub users: UserStorage,
    pub rm: RmClient,
    pub detector: Arc<EnvironmentDetector>,
    cookie_key: Key,
}

impl BridgeState {
    pub fn new(config: Arc<Config>, pool: SqlitePool) -> Result<Self, BridgeError> {
        let client = build_http_client(&config.rm)?;
        let cookie_key = cookie_key(&config.basic.cookie_secret)?;
        let rm = RmClient::new(client.clone(), &config.rm);
        let detector = Arc::new(EnvironmentDetector::new(
            client,
            config.detection.clone(),
            config.rm.base_url.as_str(),
        ));
        Ok(Self {
            catalog: CatalogStorage::new(pool.clone()),
            users: UserStorage::new(pool),
            rm,
            detector,
            cookie_key,
            config,
        })
    }
}

impl FromRef<BridgeState> for Key {
    fn from_ref(state: &BridgeState) -> Self {
        state.cookie_key.clone()
    }
}

fn cookie_key(secret: &str) -> Result<Key, BridgeError> {
    if secret.is_empty() {
        return Ok(Key::generate());
    }
    if secret.len() < COOKIE_SECRET_MIN {
        return Err(BridgeError::Validation(format!(
            "basic.cookie_secret must be at least {COOKIE_SECRET_MIN} bytes"
        )));
    }
    Ok(Key::from(secret.as_bytes()))
}

/// Origins on loopback or private networks may call with credentials.
pub fn is_hybrid_origin(origin: &str) -> bool {
    let Some(rest) = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    else {
        return false;
    };
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    host == "localhost"
        || host == "127.0.0.1"
        || host.starts_with("192.168.")
        || host.starts_with("10.0.")
        || host.starts_with("172.16.")
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _parts: &Parts| origin.to_str().is_ok_and(is_hybrid_origin),
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn bridge_router(state: BridgeState) -> Router {
    let body_limit = state.config.basic.body_limit_mb * 1024 * 1024;

    Router::new()
        // reconciler
        .route("/CompareJson/CompareJson", post(compare_json::compare))
        .route(
            "/CompareJson/GetDataServerInfo",
            get(compare_json::data_server_info),
        )
        // proxy bridge
        .route("/api/proxy/forward-rm-request", post(proxy::forward))
        .route("/api/rm-credentials", get(proxy::rm_credentials))
        // test harness
        .route("/TestRequests/PreparePost", post(test_requests::prepare_post))
        .route("/TestRequests/ExecutePost", post(test_requests::execute_post))
        .route("/TestRequests/ExecuteGet", get(test_requests::execute_get))
        .route(
            "/TestRequests/SendPreparedPost",
            post(test_requests::send_prepared_post),
        )
        .route(
            "/TestRequests/ListDataServers",
            get(test_requests::list_data_servers),
        )
        .route(
            "/TestRequests/GetDataServerInfo",
            get(test_requests::data_server_info),
        )
        .route(
            "/TestRequests/SearchDataServer",
            get(test_requests::search_data_server),
        )
        .route("/TestRequests/DetectRM", get(test_requests::detect_rm))
        .route("/api/environment/info", get(environment::info))
        .route("/api/environment/redetect", post(environment::redetect))
        // catalog
        .route("/DataServers", get(catalog::list))
        .route("/DataServers/Details/{id}", get(catalog::details))
        .route("/DataServer/search", get(catalog::name_search))
        .route("/JsonViewer/Search", get(catalog::json_viewer_search))
        .route("/SearchDS/SearchByKeywords", get(catalog::keyword_search))
        .route("/SearchDS/GetAllGrouped", get(catalog::grouped))
        .route("/Biblioteca/Atualizar", post(catalog::library_update))
        .route("/Admin/ExportarDataServers", get(catalog::export_json))
        .route("/BancoDados/Exportar", get(catalog::export_csv))
        // accounts
        .route("/Account/login", post(account::login))
        .route("/Account/CheckAuthStatus", get(account::check_auth_status))
        .route("/Account/Logout", post(account::logout))
        .route("/Admin/Users", get(account::users))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_network_origins_are_allowed() {
        assert!(is_hybrid_origin("http://localhost:5173"));
        assert!(is_hybrid_origin("https://192.168.0.12"));
        assert!(is_hybrid_origin("http://10.0.3.4:8080"));
        assert!(!is_hybrid_origin("https://example.com"));
        assert!(!is_hybrid_origin("http://localhost.evil.com"));
        assert!(!is_hybrid_origin("localhost"));
    }

    #[test]
    fn short_cookie_secret_is_rejected() {
        assert!(cookie_key("short").is_err());
        assert!(cookie_key("").is_ok());
        assert!(cookie_key(&"k".repeat(64)).is_ok());
    }
}
