use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::error::BridgeError;
use crate::service::detection::is_live_status;
use crate::service::rm_client::{RmCredentials, truncate_for_log};

/// The three paths a dispatch can take, plus the liveness probe.
pub trait DispatchTransport: Send + Sync {
    /// True when an RM instance answers at `base_url` within `timeout`.
    fn probe(&self, base_url: &str, timeout: Duration) -> impl Future<Output = bool> + Send;

    /// POST straight to the local RM.
    fn send_local(
        &self,
        local_url: &str,
        name: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<String, BridgeError>> + Send;

    /// POST through the bridge's forwarding endpoint.
    fn send_proxy(
        &self,
        name: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<String, BridgeError>> + Send;

    /// Let the bridge prepare and execute the POST against its configured RM.
    fn send_server(
        &self,
        name: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<String, BridgeError>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsPayload {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    tenant_header: Option<String>,
    #[serde(default, alias = "codColigada")]
    tenant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RmErrorBody {
    message: Option<String>,
    detailed_message: Option<String>,
}

/// Turn a local RM failure into an error. Only CORS-looking bodies become
/// [`BridgeError::Cors`] so the dispatcher can fall back to the proxy; every
/// other status, 403 included, is a business error from that RM.
pub fn classify_local_failure(status: StatusCode, body: &str) -> BridgeError {
    let lowered = body.to_lowercase();
    if lowered.contains("cors") || lowered.contains("cross-origin") {
        return BridgeError::Cors(format!("{status} - {}", truncate_for_log(body)));
    }

    let detail = match serde_json::from_str::<RmErrorBody>(body) {
        Ok(RmErrorBody {
            message: Some(message),
            detailed_message,
        }) => match detailed_message {
            Some(detailed) => format!("{message} ({detailed})"),
            None => message,
        },
        _ => body.to_string(),
    };
    BridgeError::UpstreamStatus {
        status,
        body: detail,
    }
}

fn envelope_data(data: Value) -> String {
    match data {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// [`DispatchTransport`] over HTTP, talking to the local RM directly and to a
/// running bridge server for the proxy and server paths.
pub struct HttpTransport {
    client: reqwest::Client,
    server_url: Url,
    timeout: Duration,
    credentials: OnceCell<RmCredentials>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, server_url: Url, timeout: Duration) -> Self {
        Self {
            client,
            server_url,
            timeout,
            credentials: OnceCell::new(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BridgeError> {
        Ok(self.server_url.join(path)?)
    }

    /// Credentials served by the bridge, fetched once.
    async fn credentials(&self) -> Result<&RmCredentials, BridgeError> {
        self.credentials
            .get_or_try_init(|| async {
                let url = self.endpoint("/api/rm-credentials")?;
                let resp = self
                    .client
                    .get(url)
                    .timeout(self.timeout)
                    .send()
                    .await?
                    .error_for_status()?;
                let payload: CredentialsPayload = resp.json().await?;
                Ok::<_, BridgeError>(RmCredentials {
                    username: payload.username,
                    password: payload.password,
                    tenant_header: payload
                        .tenant_header
                        .unwrap_or_else(|| "CODCOLIGADA".to_string()),
                    tenant: payload.tenant,
                })
            })
            .await
    }

    async fn post_envelope(&self, path: &str, body: Value) -> Result<String, BridgeError> {
        let url = self.endpoint(path)?;
        let resp = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::from_transport(e, self.timeout))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BridgeError::from_transport(e, self.timeout))?;

        let envelope: Option<Envelope> = serde_json::from_str(&text).ok();
        if !status.is_success() {
            let body = envelope
                .and_then(|e| e.error)
                .unwrap_or_else(|| text.chars().take(100).collect());
            return Err(BridgeError::UpstreamStatus { status, body });
        }
        match envelope {
            Some(Envelope {
                success: true,
                data,
                ..
            }) => Ok(envelope_data(data)),
            Some(Envelope { error, .. }) => Err(BridgeError::Validation(
                error.unwrap_or_else(|| "request through the bridge failed".to_string()),
            )),
            None => Ok(text),
        }
    }
}

impl DispatchTransport for HttpTransport {
    async fn probe(&self, base_url: &str, timeout: Duration) -> bool {
        match self.client.get(base_url).timeout(timeout).send().await {
            Ok(resp) => is_live_status(resp.status()),
            Err(e) => {
                debug!(url = base_url, error = %e, "local RM probe failed");
                false
            }
        }
    }

    async fn send_local(
        &self,
        local_url: &str,
        name: &str,
        payload: &Value,
    ) -> Result<String, BridgeError> {
        let creds = self.credentials().await?;
        let url = Url::parse(&format!("{}/{}", local_url.trim_end_matches('/'), name))?;
        info!(url = %url, user = %creds.username, "sending request to local RM");

        let mut req = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(AUTHORIZATION, creds.basic_header())
            .header(ACCEPT, "application/json")
            .json(payload);
        if let Some(tenant) = creds.tenant.as_deref()
            && !creds.tenant_header.is_empty()
        {
            req = req.header(creds.tenant_header.as_str(), tenant);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| BridgeError::from_transport(e, self.timeout))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BridgeError::from_transport(e, self.timeout))?;
        debug!(status = %status, body = %truncate_for_log(&text), "local RM response");

        if !status.is_success() {
            return Err(classify_local_failure(status, &text));
        }
        Ok(text)
    }

    async fn send_proxy(&self, name: &str, payload: &Value) -> Result<String, BridgeError> {
        let body = json!({
            "method": "POST",
            "dataServerName": name,
            "jsonData": payload.to_string(),
            "filter": null,
        });
        self.post_envelope("/api/proxy/forward-rm-request", body)
            .await
    }

    async fn send_server(&self, name: &str, payload: &Value) -> Result<String, BridgeError> {
        let body = json!({
            "dataServerName": name,
            "postData": payload,
            "executionMode": "remote",
        });
        self.post_envelope("/TestRequests/ExecutePost", body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cors_bodies_are_treated_as_cors() {
        let err = classify_local_failure(StatusCode::BAD_REQUEST, "blocked by CORS policy");
        assert!(matches!(err, BridgeError::Cors(_)));

        let err = classify_local_failure(
            StatusCode::FORBIDDEN,
            r#"{"message":"Usuario sem permissao para a rotina"}"#,
        );
        assert!(!err.looks_like_cors());
        match err {
            BridgeError::UpstreamStatus { status, body } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "Usuario sem permissao para a rotina");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rm_error_body_is_composed() {
        let err = classify_local_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"message":"Chave duplicada","detailedMessage":"CHAPA 0001"}"#,
        );
        assert_eq!(
            err.to_string(),
            "request failed: 500 Internal Server Error - Chave duplicada (CHAPA 0001)"
        );
        assert!(!err.looks_like_cors());

        let err = classify_local_failure(StatusCode::BAD_REQUEST, "plain text");
        assert!(err.to_string().ends_with("- plain text"));
    }
}
