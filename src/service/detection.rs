//! Server-side discovery of RM instances listening on the local host.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::DetectionConfig;

/// 2xx, or 401 from an instance that is up but wants credentials.
pub fn is_live_status(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::UNAUTHORIZED
}

async fn probe_port(client: &reqwest::Client, url: String, timeout: Duration) -> bool {
    match client.get(&url).timeout(timeout).send().await {
        Ok(resp) => is_live_status(resp.status()),
        Err(e) => {
            debug!(url = %url, error = %e, "port probe failed");
            false
        }
    }
}

/// Probe every configured port at once and keep the live ones, in the
/// configured order.
pub async fn detect_available_ports(client: &reqwest::Client, cfg: &DetectionConfig) -> Vec<u16> {
    let probes = cfg
        .ports
        .iter()
        .map(|&port| probe_port(client, cfg.local_url(port), cfg.probe_timeout()));
    let results = join_all(probes).await;

    cfg.ports
        .iter()
        .zip(results)
        .filter_map(|(&port, live)| live.then_some(port))
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    pub is_production: bool,
    #[serde(rename = "isLocalRMAvailable")]
    pub is_local_rm_available: bool,
    #[serde(rename = "availableRMPorts")]
    pub available_rm_ports: Vec<u16>,
    #[serde(rename = "recommendedRMUrl")]
    pub recommended_rm_url: String,
    pub machine_name: String,
    pub environment: String,
    pub detection_time: DateTime<Utc>,
    pub detection_details: String,
}

impl EnvironmentInfo {
    /// Local RM is only recommended outside production.
    pub fn build(cfg: &DetectionConfig, remote_url: &str, available: Vec<u16>) -> Self {
        let environment = if cfg.is_production {
            "Production"
        } else {
            "Development"
        };
        let mut details = vec![
            format!("Environment: {environment}"),
            format!("Tested ports: {}", join_ports(&cfg.ports)),
            format!("Available ports: {}", join_ports(&available)),
        ];

        let is_local_rm_available = !available.is_empty();
        let recommended_rm_url = match available.first() {
            Some(&port) if !cfg.is_production => {
                details.push(format!("Using local RM on port {port}"));
                cfg.local_url(port)
            }
            _ => {
                details.push(format!("Using configured RM URL: {remote_url}"));
                remote_url.to_string()
            }
        };

        Self {
            is_production: cfg.is_production,
            is_local_rm_available,
            available_rm_ports: available,
            recommended_rm_url,
            machine_name: machine_name(),
            environment: environment.to_string(),
            detection_time: Utc::now(),
            detection_details: details.join("; "),
        }
    }

    /// Base URL of the first live local port.
    pub fn local_url(&self, cfg: &DetectionConfig) -> Option<String> {
        self.available_rm_ports.first().map(|&p| cfg.local_url(p))
    }
}

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn machine_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Detection result plus the instant it was taken.
#[derive(Debug, Default)]
pub struct EnvironmentCache {
    entry: Option<(EnvironmentInfo, Instant)>,
}

impl EnvironmentCache {
    pub fn get_fresh(&self, now: Instant, ttl: Duration) -> Option<&EnvironmentInfo> {
        match &self.entry {
            Some((info, at)) if now.saturating_duration_since(*at) < ttl => Some(info),
            _ => None,
        }
    }

    pub fn store(&mut self, info: EnvironmentInfo, now: Instant) {
        self.entry = Some((info, now));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

/// Cached environment detection shared by the handlers.
pub struct EnvironmentDetector {
    client: reqwest::Client,
    cfg: DetectionConfig,
    remote_url: String,
    cache: Mutex<EnvironmentCache>,
}

impl EnvironmentDetector {
    pub fn new(client: reqwest::Client, cfg: DetectionConfig, remote_url: impl Into<String>) -> Self {
        Self {
            client,
            cfg,
            remote_url: remote_url.into(),
            cache: Mutex::new(EnvironmentCache::default()),
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.cfg
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    /// Cached info while it is younger than the TTL, otherwise a new probe
    /// round. The lock is held across detection so concurrent callers share
    /// one round.
    pub async fn get_or_refresh(&self) -> EnvironmentInfo {
        let mut cache = self.cache.lock().await;
        if let Some(info) = cache.get_fresh(Instant::now(), self.cfg.cache_ttl()) {
            return info.clone();
        }
        let info = self.detect().await;
        cache.store(info.clone(), Instant::now());
        info
    }

    /// Drop the cached result and probe again.
    pub async fn redetect(&self) -> EnvironmentInfo {
        let mut cache = self.cache.lock().await;
        cache.invalidate();
        let info = self.detect().await;
        cache.store(info.clone(), Instant::now());
        info
    }

    async fn detect(&self) -> EnvironmentInfo {
        let available = detect_available_ports(&self.client, &self.cfg).await;
        let info = EnvironmentInfo::build(&self.cfg, &self.remote_url, available);
        info!(details = %info.detection_details, "environment detection completed");
        info
    }
}
