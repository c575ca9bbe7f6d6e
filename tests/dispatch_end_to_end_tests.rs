mod common;

use serde_json::json;
use std::time::Duration;
use url::Url;

use common::{closed_port, fake_rm, rm_url, serve, spawn_app, test_config};
use rm_bridge::BridgeError;
use rm_bridge::config::DetectionConfig;
use rm_bridge::dispatcher::{DispatchMode, DispatchSource, Dispatcher, HttpTransport};
use rm_bridge::types::DataServerInfo;

/// Bridge server in front of a fake remote ERP. Returns the bridge URL, the
/// remote ERP recorder and the app handle (keeps the sqlite file alive).
async fn bridge(tag: &str) -> (Url, common::Seen, common::TestApp) {
    let (remote, seen) = fake_rm(|_| (200, "\"1;00042\"".to_string())).await;
    let mut cfg = test_config();
    cfg.rm.base_url = rm_url(remote);
    let app = spawn_app(tag, cfg).await;

    let mut ds = DataServerInfo::new("FopFuncData", "FOP0001");
    ds.primary_keys = vec!["CHAPA".into()];
    ds.post_example = r#"{"CHAPA":"00001","NOME":"Maria"}"#.into();
    app.state.catalog.upsert(&ds).await.expect("upsert failed");

    let port = serve(app.app.clone()).await;
    let url = Url::parse(&format!("http://127.0.0.1:{port}")).expect("valid url");
    (url, seen, app)
}

fn dispatcher(server: Url, ports: Vec<u16>) -> Dispatcher<HttpTransport> {
    let transport = HttpTransport::new(reqwest::Client::new(), server, Duration::from_secs(5));
    let detection = DetectionConfig {
        host: "127.0.0.1".to_string(),
        ports,
        probe_timeout_ms: 500,
        ..Default::default()
    };
    Dispatcher::new(transport, detection)
}

#[tokio::test]
async fn server_mode_prepares_and_posts_through_the_bridge() {
    let (server, remote_seen, _app) = bridge("dispatch-server").await;
    let d = dispatcher(server, vec![]);

    let outcome = d
        .dispatch("FopFuncData", &json!({ "CHAPA": "00042" }), DispatchMode::Server)
        .await
        .expect("server dispatch failed");

    assert_eq!(outcome.source, DispatchSource::Server);
    let seen = remote_seen.lock().expect("poisoned");
    assert_eq!(seen.len(), 1);
    let sent: serde_json::Value = serde_json::from_str(&seen[0].body).expect("json body");
    assert_eq!(sent, json!({ "CHAPA": "00042", "NOME": "Maria" }));
}

#[tokio::test]
async fn auto_mode_uses_detected_local_instance() {
    let (server, remote_seen, _app) = bridge("dispatch-local").await;
    let (local, local_seen) = fake_rm(|_| (200, "\"1;00077\"".to_string())).await;
    let d = dispatcher(server, vec![closed_port().await, local]);

    let detected = d.detect().await;
    assert!(detected.is_local_available);

    let outcome = d
        .dispatch("FopFuncData", &json!({ "CHAPA": "00077" }), DispatchMode::Auto)
        .await
        .expect("local dispatch failed");

    assert_eq!(outcome.source, DispatchSource::Local);
    assert_eq!(outcome.data, "\"1;00077\"");
    assert!(remote_seen.lock().expect("poisoned").is_empty());

    let seen = local_seen.lock().expect("poisoned");
    let post = seen.iter().find(|r| r.method == "POST").expect("local POST");
    assert_eq!(post.path, "/rmsrestdataserver/rest/FopFuncData");
    assert_eq!(post.headers["codcoligada"], "1");
}

#[tokio::test]
async fn cors_failure_falls_back_to_the_proxy_once() {
    let (server, remote_seen, _app) = bridge("dispatch-cors").await;
    let (local, _local_seen) = fake_rm(|req| {
        if req.method == "POST" {
            (403, "blocked by CORS policy".to_string())
        } else {
            (200, "[]".to_string())
        }
    })
    .await;
    let d = dispatcher(server, vec![local]);
    d.detect().await;

    let outcome = d
        .dispatch("FopFuncData", &json!({ "CHAPA": "00001" }), DispatchMode::Local)
        .await
        .expect("proxy fallback failed");

    assert_eq!(outcome.source, DispatchSource::Proxy);
    assert_eq!(remote_seen.lock().expect("poisoned").len(), 1);

    let log = d.log_entries();
    assert_eq!(log.len(), 1);
    assert!(log[0].success);
}

#[tokio::test]
async fn local_business_errors_are_not_retried() {
    let (server, remote_seen, _app) = bridge("dispatch-business-error").await;
    let (local, _local_seen) = fake_rm(|req| {
        if req.method == "POST" {
            (
                500,
                r#"{"message":"Chave duplicada","detailedMessage":"CHAPA 00001"}"#.to_string(),
            )
        } else {
            (200, "[]".to_string())
        }
    })
    .await;
    let d = dispatcher(server, vec![local]);
    d.detect().await;

    let err = d
        .dispatch("FopFuncData", &json!({ "CHAPA": "00001" }), DispatchMode::Auto)
        .await
        .expect_err("business error should surface");

    match err {
        BridgeError::UpstreamStatus { body, .. } => {
            assert_eq!(body, "Chave duplicada (CHAPA 00001)");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(remote_seen.lock().expect("poisoned").is_empty());
    assert!(!d.log_entries()[0].success);
}

#[tokio::test]
async fn local_mode_without_detection_fails_fast() {
    let (server, remote_seen, _app) = bridge("dispatch-no-local").await;
    let d = dispatcher(server, vec![closed_port().await]);
    d.detect().await;

    let err = d
        .dispatch("FopFuncData", &json!({}), DispatchMode::Local)
        .await
        .expect_err("no local instance");

    assert!(matches!(err, BridgeError::LocalUnavailable(_)));
    assert!(remote_seen.lock().expect("poisoned").is_empty());
}

#[tokio::test]
async fn local_forbidden_is_not_sent_through_the_proxy() {
    let (server, remote_seen, _app) = bridge("dispatch-forbidden").await;
    let (local, _local_seen) = fake_rm(|req| {
        if req.method == "POST" {
            (
                403,
                r#"{"message":"Usuario sem permissao para a rotina"}"#.to_string(),
            )
        } else {
            (200, "[]".to_string())
        }
    })
    .await;
    let d = dispatcher(server, vec![local]);
    d.detect().await;

    let err = d
        .dispatch("FopFuncData", &json!({ "CHAPA": "00001" }), DispatchMode::Local)
        .await
        .expect_err("permission error should surface");

    match err {
        BridgeError::UpstreamStatus { status, body } => {
            assert_eq!(status.as_u16(), 403);
            assert_eq!(body, "Usuario sem permissao para a rotina");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(remote_seen.lock().expect("poisoned").is_empty());
    let log = d.log_entries();
    assert_eq!(log[0].source, DispatchSource::Local);
    assert!(!log[0].success);
}
