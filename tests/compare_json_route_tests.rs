mod common;

use serde_json::{Value, json};

use common::{spawn_app, test_config};
use rm_bridge::types::DataServerInfo;

async fn app_with_example(tag: &str) -> common::TestApp {
    let app = spawn_app(tag, test_config()).await;
    let mut ds = DataServerInfo::new("FopFuncData", "FOP0001");
    ds.primary_keys = vec!["CODCOLIGADA".into(), "CHAPA".into()];
    ds.post_example = r#"{"CODCOLIGADA":1,"CHAPA":"00001","NOME":"Maria","SALARIO":1500.5}"#.into();
    app.state.catalog.upsert(&ds).await.expect("upsert failed");
    app
}

fn fields_of(data: &Value, kind: &str) -> Vec<String> {
    data["differences"]
        .as_array()
        .expect("differences array")
        .iter()
        .filter(|d| d["type"] == kind)
        .map(|d| d["field"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn compare_reports_missing_mismatched_and_extra_fields() {
    let app = app_with_example("compare-diff").await;

    let (status, body) = app
        .post_json(
            "/CompareJson/CompareJson",
            json!({
                "dataServerName": "FopFuncData",
                "userJson": r#"{"chapa":"00077","nome":42,"OBS":"x","VAZIO":null}"#,
            }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(fields_of(data, "Missing"), vec!["CODCOLIGADA", "SALARIO"]);
    assert_eq!(fields_of(data, "TypeMismatch"), vec!["NOME"]);
    assert_eq!(fields_of(data, "Extra"), vec!["OBS"]);
    assert!(data.get("postResponse").is_none());

    let corrected: serde_json::Map<String, Value> =
        serde_json::from_str(data["correctedJson"].as_str().expect("string"))
            .expect("corrected JSON parses");
    let keys: Vec<&str> = corrected.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["CODCOLIGADA", "CHAPA", "NOME", "SALARIO", "OBS"]);
    assert_eq!(corrected["CHAPA"], "00077");
    assert_eq!(corrected["CODCOLIGADA"], 1);
}

#[tokio::test]
async fn identical_payload_has_no_differences() {
    let app = app_with_example("compare-same").await;

    let (status, body) = app
        .post_json(
            "/CompareJson/CompareJson",
            json!({
                "DataServerName": "FopFuncData",
                "UserJson": r#"{"codcoligada":2,"chapa":"1","nome":"Ana","salario":10}"#,
            }),
        )
        .await;

    assert_eq!(status, 200);
    assert!(body["data"]["differences"].as_array().expect("array").is_empty());
}

#[tokio::test]
async fn malformed_user_json_is_a_bad_request() {
    let app = app_with_example("compare-bad").await;

    let (status, body) = app
        .post_json(
            "/CompareJson/CompareJson",
            json!({ "dataServerName": "FopFuncData", "userJson": "{not json" }),
        )
        .await;

    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().expect("message").contains("user JSON"));
}

#[tokio::test]
async fn unknown_data_server_lists_available_names() {
    let app = app_with_example("compare-missing").await;

    let (status, body) = app
        .post_json(
            "/CompareJson/CompareJson",
            json!({ "dataServerName": "NoSuchServer", "userJson": "{}" }),
        )
        .await;

    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert_eq!(body["availableDataServers"], json!(["FopFuncData"]));
}

#[tokio::test]
async fn data_server_info_describes_the_example() {
    let app = app_with_example("compare-info").await;

    let (status, body) = app
        .get_json("/CompareJson/GetDataServerInfo?dataServerName=FopFuncData")
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["data"]["hasPostExample"], true);
    assert_eq!(body["data"]["primaryKeys"], json!(["CODCOLIGADA", "CHAPA"]));
}
