#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, Response},
};
use serde_json::Value;
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::net::TcpListener;
use tower::ServiceExt;

use rm_bridge::config::Config;
use rm_bridge::db::{self, SqlitePool};
use rm_bridge::{BridgeState, bridge_router};

/// A router backed by its own throwaway sqlite file.
pub struct TestApp {
    pub app: Router,
    pub state: BridgeState,
    pub pool: SqlitePool,
    temp_path: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.temp_path);
    }
}

fn temp_db_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "rm-bridge-{tag}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));
    temp_path
}

/// Default config tuned for tests; tweak it before calling [`spawn_app`].
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.basic.insecure_cookie = true;
    cfg.basic.cookie_secret = "s".repeat(64);
    cfg.rm.username = "integration".to_string();
    cfg.rm.password = "secret".to_string();
    cfg.rm.tenant = Some("1".to_string());
    cfg.rm.timeout_secs = 5;
    cfg.detection.probe_timeout_ms = 500;
    cfg
}

pub async fn spawn_app(tag: &str, cfg: Config) -> TestApp {
    let temp_path = temp_db_path(tag);
    let database_url = format!("sqlite:{}", temp_path.display());
    let pool = db::connect(&database_url)
        .await
        .expect("failed to open sqlite");
    db::init_schema(&pool).await.expect("failed to init schema");

    let state = BridgeState::new(Arc::new(cfg), pool.clone()).expect("failed to build state");
    let app = bridge_router(state.clone());
    TestApp {
        app,
        state,
        pool,
        temp_path,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(req).await.expect("request failed")
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (u16, Value) {
        let resp = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("failed to build request"),
            )
            .await;
        split_json(resp).await
    }

    pub async fn get_json(&self, uri: &str) -> (u16, Value) {
        let resp = self
            .send(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("failed to build request"),
            )
            .await;
        split_json(resp).await
    }
}

pub async fn body_string(resp: Response<Body>) -> String {
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    String::from_utf8(body.to_vec()).expect("response body was not utf-8")
}

pub async fn split_json(resp: Response<Body>) -> (u16, Value) {
    let status = resp.status().as_u16();
    let text = body_string(resp).await;
    let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, value)
}

/// One request as seen by the fake ERP.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
}

pub type Seen = Arc<Mutex<Vec<SeenRequest>>>;

/// Serve `router` on an ephemeral loopback port and return the port.
pub async fn serve(router: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind fake server");
    let port = listener.local_addr().expect("no local addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    port
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    listener.local_addr().expect("no local addr").port()
}

/// Fake RM DataServer API. Every request is recorded; `respond` picks the
/// status and body from the request.
pub async fn fake_rm<F>(respond: F) -> (u16, Seen)
where
    F: Fn(&SeenRequest) -> (u16, String) + Clone + Send + Sync + 'static,
{
    let seen: Seen = Arc::default();
    let recorder = seen.clone();
    let router = Router::new().fallback(move |req: Request<Body>| {
        let recorder = recorder.clone();
        let respond = respond.clone();
        async move {
            let (parts, body) = req.into_parts();
            let body = to_bytes(body, usize::MAX).await.unwrap_or_default();
            let seen = SeenRequest {
                method: parts.method.to_string(),
                path: parts.uri.path().to_string(),
                headers: parts.headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            };
            let (status, text) = respond(&seen);
            recorder.lock().expect("poisoned").push(seen);
            Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(text))
                .expect("failed to build fake response")
        }
    });
    let port = serve(router).await;
    (port, seen)
}

pub fn rm_url(port: u16) -> url::Url {
    url::Url::parse(&format!(
        "http://127.0.0.1:{port}{}",
        rm_bridge::config::RM_REST_SUFFIX
    ))
    .expect("valid url")
}
