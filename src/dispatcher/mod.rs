//! Dual-path dispatch: send a payload straight to a locally detected RM, or
//! through the bridge server.
//!
//! Layout:
//! - `mod.rs`: detection state machine and the dispatch modes
//! - `transport.rs`: the [`DispatchTransport`] seam and its HTTP implementation
//! - `request_log.rs`: ring buffer of recent dispatches

pub mod request_log;
pub mod transport;

pub use request_log::{REQUEST_LOG_CAPACITY, RequestLog, RequestLogEntry};
pub use transport::{DispatchTransport, HttpTransport};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::DetectionConfig;
use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Always through the bridge server.
    Server,
    /// Direct to the local RM, falling back to the proxy on CORS-shaped errors.
    Local,
    /// Local when detection found an instance, otherwise server.
    Auto,
}

impl FromStr for DispatchMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(DispatchMode::Server),
            "local" => Ok(DispatchMode::Local),
            "auto" => Ok(DispatchMode::Auto),
            other => Err(BridgeError::Validation(format!(
                "unknown execution mode '{other}', expected server, local or auto"
            ))),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchMode::Server => "server",
            DispatchMode::Local => "local",
            DispatchMode::Auto => "auto",
        };
        f.write_str(s)
    }
}

/// Path a dispatch actually took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchSource {
    Local,
    Proxy,
    Server,
}

impl fmt::Display for DispatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchSource::Local => "local",
            DispatchSource::Proxy => "proxy",
            DispatchSource::Server => "server",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionState {
    Idle,
    Detecting,
    LocalAvailable { url: String },
    LocalUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub is_local_available: bool,
    pub local_url: Option<String>,
    pub detection_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub source: DispatchSource,
    pub url: String,
    pub data: String,
    pub duration_ms: u128,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Puts the machine back to `Idle` if a detection round is dropped midway.
struct DetectingGuard<'a> {
    state: &'a Mutex<DetectionState>,
    done: bool,
}

impl Drop for DetectingGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            *lock(self.state) = DetectionState::Idle;
        }
    }
}

pub struct Dispatcher<T> {
    transport: T,
    detection: DetectionConfig,
    state: Mutex<DetectionState>,
    last_result: Mutex<DetectionResult>,
    log: Mutex<RequestLog>,
}

impl<T: DispatchTransport> Dispatcher<T> {
    pub fn new(transport: T, detection: DetectionConfig) -> Self {
        Self {
            transport,
            detection,
            state: Mutex::new(DetectionState::Idle),
            last_result: Mutex::new(DetectionResult::default()),
            log: Mutex::new(RequestLog::default()),
        }
    }

    pub fn state(&self) -> DetectionState {
        lock(&self.state).clone()
    }

    pub fn last_result(&self) -> DetectionResult {
        lock(&self.last_result).clone()
    }

    pub fn log_entries(&self) -> Vec<RequestLogEntry> {
        lock(&self.log).entries().cloned().collect()
    }

    /// Probe the candidate ports one by one and stop at the first live one.
    /// Once a round has finished its result is reused until [`Self::redetect`];
    /// a call made while a round is running also gets the last result.
    pub async fn detect(&self) -> DetectionResult {
        {
            let mut state = lock(&self.state);
            if *state != DetectionState::Idle {
                return self.last_result();
            }
            *state = DetectionState::Detecting;
        }
        let mut guard = DetectingGuard {
            state: &self.state,
            done: false,
        };

        let mut found = None;
        for &port in &self.detection.ports {
            let url = self.detection.local_url(port);
            if self
                .transport
                .probe(&url, self.detection.probe_timeout())
                .await
            {
                found = Some(url);
                break;
            }
        }

        let result = DetectionResult {
            is_local_available: found.is_some(),
            local_url: found.clone(),
            detection_time: Some(Utc::now()),
        };
        *lock(&self.last_result) = result.clone();
        *lock(&self.state) = match found {
            Some(url) => {
                info!(url = %url, "local RM detected");
                DetectionState::LocalAvailable { url }
            }
            None => {
                info!("local RM not detected, using server");
                DetectionState::LocalUnavailable
            }
        };
        guard.done = true;
        result
    }

    /// Forget the cached result and detect again.
    pub async fn redetect(&self) -> DetectionResult {
        {
            let mut state = lock(&self.state);
            if *state != DetectionState::Detecting {
                *state = DetectionState::Idle;
            }
        }
        *lock(&self.last_result) = DetectionResult::default();
        self.detect().await
    }

    fn local_url(&self) -> Option<String> {
        match &*lock(&self.state) {
            DetectionState::LocalAvailable { url } => Some(url.clone()),
            _ => None,
        }
    }

    /// Send `payload` to DataServer `name` along the path chosen by `mode`.
    /// Every call, successful or not, is recorded in the request log.
    pub async fn dispatch(
        &self,
        name: &str,
        payload: &Value,
        mode: DispatchMode,
    ) -> Result<DispatchOutcome, BridgeError> {
        let started = Instant::now();
        let local_url = self.local_url();

        let (source, result) = match (mode, local_url) {
            (DispatchMode::Server, _) | (DispatchMode::Auto, None) => (
                DispatchSource::Server,
                self.transport
                    .send_server(name, payload)
                    .await
                    .map(|data| (data, "server".to_string())),
            ),
            (DispatchMode::Local, None) => (
                DispatchSource::Local,
                Err(BridgeError::LocalUnavailable(
                    "local RM is not available".to_string(),
                )),
            ),
            (DispatchMode::Local | DispatchMode::Auto, Some(url)) => {
                self.local_with_fallback(&url, name, payload).await
            }
        };

        let elapsed = started.elapsed();
        self.record(name, source, elapsed, result.as_ref().err());

        let (data, url) = result?;
        Ok(DispatchOutcome {
            source,
            url,
            data,
            duration_ms: elapsed.as_millis(),
        })
    }

    async fn local_with_fallback(
        &self,
        local_url: &str,
        name: &str,
        payload: &Value,
    ) -> (DispatchSource, Result<(String, String), BridgeError>) {
        let target = format!("{}/{}", local_url.trim_end_matches('/'), name);
        match self.transport.send_local(local_url, name, payload).await {
            Ok(data) => (DispatchSource::Local, Ok((data, target))),
            Err(e) if e.looks_like_cors() => {
                warn!(error = %e, "direct call blocked, retrying through the proxy");
                let result = self
                    .transport
                    .send_proxy(name, payload)
                    .await
                    .map(|data| (data, name.to_string()));
                (DispatchSource::Proxy, result)
            }
            Err(e) => (DispatchSource::Local, Err(e)),
        }
    }

    fn record(
        &self,
        name: &str,
        source: DispatchSource,
        elapsed: Duration,
        error: Option<&BridgeError>,
    ) {
        let entry = RequestLogEntry::new(name, source, elapsed, error.map(|e| e.to_string()));
        let duration_ms = elapsed.as_millis() as u64;
        info!(
            data_server = name,
            source = %source,
            duration_ms,
            success = entry.success,
            "dispatch finished"
        );
        lock(&self.log).push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeTransport {
        live: HashSet<String>,
        local_error: Option<fn() -> BridgeError>,
        probes: AtomicUsize,
        local_calls: AtomicUsize,
        proxy_calls: AtomicUsize,
        server_calls: AtomicUsize,
    }

    impl DispatchTransport for FakeTransport {
        async fn probe(&self, base_url: &str, _timeout: Duration) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.live.contains(base_url)
        }

        async fn send_local(
            &self,
            _local_url: &str,
            _name: &str,
            _payload: &Value,
        ) -> Result<String, BridgeError> {
            self.local_calls.fetch_add(1, Ordering::SeqCst);
            match self.local_error {
                Some(make) => Err(make()),
                None => Ok("local".to_string()),
            }
        }

        async fn send_proxy(&self, _name: &str, _payload: &Value) -> Result<String, BridgeError> {
            self.proxy_calls.fetch_add(1, Ordering::SeqCst);
            Ok("proxy".to_string())
        }

        async fn send_server(&self, _name: &str, _payload: &Value) -> Result<String, BridgeError> {
            self.server_calls.fetch_add(1, Ordering::SeqCst);
            Ok("server".to_string())
        }
    }

    fn detection(ports: Vec<u16>) -> DetectionConfig {
        DetectionConfig {
            ports,
            ..Default::default()
        }
    }

    fn live_on(port: u16) -> HashSet<String> {
        HashSet::from([detection(vec![]).local_url(port)])
    }

    #[tokio::test]
    async fn detection_stops_at_first_live_port() {
        let fake = FakeTransport {
            live: live_on(8052),
            ..Default::default()
        };
        let d = Dispatcher::new(fake, detection(vec![8051, 8052, 8053]));
        let result = d.detect().await;
        assert!(result.is_local_available);
        assert_eq!(
            result.local_url.as_deref(),
            Some("http://localhost:8052/rmsrestdataserver/rest")
        );
        assert_eq!(d.transport.probes.load(Ordering::SeqCst), 2);
        assert!(matches!(d.state(), DetectionState::LocalAvailable { .. }));
    }

    #[tokio::test]
    async fn auto_falls_back_to_proxy_once_on_cors() {
        let fake = FakeTransport {
            live: live_on(8051),
            local_error: Some(|| {
                BridgeError::Validation("TypeError: blocked by CORS policy".to_string())
            }),
            ..Default::default()
        };
        let d = Dispatcher::new(fake, detection(vec![8051]));
        d.detect().await;

        let out = d
            .dispatch("GlbUsuarioData", &serde_json::json!({}), DispatchMode::Auto)
            .await
            .unwrap();
        assert_eq!(out.source, DispatchSource::Proxy);
        assert_eq!(out.data, "proxy");
        assert_eq!(d.transport.local_calls.load(Ordering::SeqCst), 1);
        assert_eq!(d.transport.proxy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(d.transport.server_calls.load(Ordering::SeqCst), 0);

        let log = d.log_entries();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].source, DispatchSource::Proxy);
        assert!(log[0].success);
    }

    #[tokio::test]
    async fn other_local_errors_propagate() {
        let fake = FakeTransport {
            live: live_on(8051),
            local_error: Some(|| BridgeError::UpstreamStatus {
                status: reqwest::StatusCode::BAD_REQUEST,
                body: "Chave duplicada".to_string(),
            }),
            ..Default::default()
        };
        let d = Dispatcher::new(fake, detection(vec![8051]));
        d.detect().await;

        let err = d
            .dispatch("GlbUsuarioData", &serde_json::json!({}), DispatchMode::Local)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamStatus { .. }));
        assert_eq!(d.transport.proxy_calls.load(Ordering::SeqCst), 0);
        assert!(!d.log_entries()[0].success);
    }

    #[tokio::test]
    async fn auto_without_local_goes_to_server() {
        let d = Dispatcher::new(FakeTransport::default(), detection(vec![8051]));
        d.detect().await;
        assert_eq!(d.state(), DetectionState::LocalUnavailable);

        let out = d
            .dispatch("GlbUsuarioData", &serde_json::json!({}), DispatchMode::Auto)
            .await
            .unwrap();
        assert_eq!(out.source, DispatchSource::Server);
        assert_eq!(d.transport.local_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn local_mode_needs_a_detected_instance() {
        let d = Dispatcher::new(FakeTransport::default(), detection(vec![]));
        let err = d
            .dispatch("GlbUsuarioData", &serde_json::json!({}), DispatchMode::Local)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::LocalUnavailable(_)));
    }

    #[tokio::test]
    async fn detect_reuses_a_finished_round() {
        let fake = FakeTransport {
            live: live_on(8052),
            ..Default::default()
        };
        let d = Dispatcher::new(fake, detection(vec![8051, 8052]));
        let first = d.detect().await;
        let second = d.detect().await;

        assert_eq!(d.transport.probes.load(Ordering::SeqCst), 2);
        assert_eq!(first.local_url, second.local_url);
        assert_eq!(first.detection_time, second.detection_time);

        let none = Dispatcher::new(FakeTransport::default(), detection(vec![8051]));
        none.detect().await;
        none.detect().await;
        assert_eq!(none.transport.probes.load(Ordering::SeqCst), 1);
        assert_eq!(none.state(), DetectionState::LocalUnavailable);
    }

    #[tokio::test]
    async fn redetect_clears_the_previous_result() {
        let d = Dispatcher::new(FakeTransport::default(), detection(vec![8051]));
        d.detect().await;
        let again = d.redetect().await;
        assert!(!again.is_local_available);
        assert_eq!(d.transport.probes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("AUTO".parse::<DispatchMode>().unwrap(), DispatchMode::Auto);
        assert!("remote".parse::<DispatchMode>().is_err());
    }
}
