use crate::config::RmConfig;
use crate::error::BridgeError;
use crate::types::requests::RmMethod;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Longest response excerpt written to the log.
const LOG_BODY_LIMIT: usize = 500;

/// Credentials attached to every ERP call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RmCredentials {
    pub username: String,
    pub password: String,
    pub tenant_header: String,
    pub tenant: Option<String>,
}

impl RmCredentials {
    pub fn from_config(cfg: &RmConfig) -> Self {
        Self {
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            tenant_header: cfg.tenant_header.clone(),
            tenant: cfg.tenant.clone(),
        }
    }

    pub fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

/// Build the shared outbound client, honouring the optional proxy.
pub fn build_http_client(cfg: &RmConfig) -> Result<reqwest::Client, BridgeError> {
    let mut builder = reqwest::Client::builder();
    if let Some(proxy_url) = cfg.proxy.as_ref() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }
    Ok(builder.build()?)
}

/// Authenticated HTTP bridge to the RM DataServer REST API.
#[derive(Debug, Clone)]
pub struct RmClient {
    client: reqwest::Client,
    base_url: String,
    credentials: RmCredentials,
    timeout: Duration,
}

impl RmClient {
    pub fn new(client: reqwest::Client, cfg: &RmConfig) -> Self {
        Self {
            client,
            base_url: cfg.base_url.as_str().to_string(),
            credentials: RmCredentials::from_config(cfg),
            timeout: cfg.timeout(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &RmCredentials {
        &self.credentials
    }

    /// Same client and credentials, different ERP base URL.
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self.clone()
        }
    }

    pub fn with_credentials(&self, credentials: RmCredentials) -> Self {
        Self {
            credentials,
            ..self.clone()
        }
    }

    /// `{base}/{name}[/{filter}]`
    pub fn build_url(&self, name: &str, filter: Option<&str>) -> Result<Url, BridgeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::Validation(
                "DataServer name is required".to_string(),
            ));
        }
        let mut raw = format!("{}/{}", self.base_url.trim_end_matches('/'), name);
        if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
            raw.push('/');
            raw.push_str(filter.trim_start_matches('/'));
        }
        Ok(Url::parse(&raw)?)
    }

    pub async fn get(&self, name: &str, filter: Option<&str>) -> Result<String, BridgeError> {
        let url = self.build_url(name, filter)?;
        self.send(RmMethod::Get, url, None).await
    }

    /// POST `json` after checking it is well-formed.
    pub async fn post(&self, name: &str, json: &str) -> Result<String, BridgeError> {
        if json.trim().is_empty() {
            return Err(BridgeError::Validation("JSON body is required".to_string()));
        }
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|e| BridgeError::invalid_json("request body", &e))?;
        let url = self.build_url(name, None)?;
        self.send(RmMethod::Post, url, Some(json.to_string())).await
    }

    pub async fn forward(
        &self,
        method: RmMethod,
        name: &str,
        filter: Option<&str>,
        json: Option<&str>,
    ) -> Result<String, BridgeError> {
        match method {
            RmMethod::Get => self.get(name, filter).await,
            RmMethod::Post => self.post(name, json.unwrap_or_default()).await,
        }
    }

    async fn send(
        &self,
        method: RmMethod,
        url: Url,
        body: Option<String>,
    ) -> Result<String, BridgeError> {
        info!(method = ?method, url = %url, "forwarding request to RM");

        let mut req = match method {
            RmMethod::Get => self.client.get(url.clone()),
            RmMethod::Post => self.client.post(url.clone()),
        }
        .timeout(self.timeout)
        .header(AUTHORIZATION, self.credentials.basic_header())
        .header(ACCEPT, "application/json");

        if let Some(tenant) = self.credentials.tenant.as_deref()
            && !self.credentials.tenant_header.is_empty()
        {
            req = req.header(self.credentials.tenant_header.as_str(), tenant);
        }
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").body(body);
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

        if !status.is_success() {
            warn!(
                status = %status,
                url = %url,
                body = %truncate_for_log(&text),
                "RM returned an error status"
            );
            return Err(BridgeError::UpstreamStatus { status, body: text });
        }

        debug!(status = %status, body = %truncate_for_log(&text), "RM response");
        Ok(text)
    }
}

pub fn truncate_for_log(text: &str) -> &str {
    match text.char_indices().nth(LOG_BODY_LIMIT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
