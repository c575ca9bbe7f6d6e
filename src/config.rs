use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

use crate::error::BridgeError;

/// Suffix every RM REST base URL ends with.
pub const RM_REST_SUFFIX: &str = "/rmsrestdataserver/rest";

/// Tenant used for login probes and handed to dispatch clients when
/// `rm.tenant` is unset.
pub const DEFAULT_TENANT: &str = "1";

/// Module prefixes used when grouping the catalog.
pub const SYSTEM_NAMES: &[(&str, &str)] = &[
    ("FOP", "Folha de Pagamento"),
    ("RHU", "Gestão de Pessoas"),
    ("PTO", "Automação de Ponto"),
    ("CTR", "Contratos"),
    ("CMP", "Compras"),
    ("FIN", "Financeiro"),
    ("EST", "Estoque"),
    ("FAT", "Faturamento"),
];

/// Process-wide configuration, loaded once by the server entrypoint.
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::load().unwrap_or_else(|e| panic!("failed to load configuration: {e}"))
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub rm: RmConfig,
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,
    /// Master secret for the private session cookie. Must be at least 64 bytes;
    /// a random key is generated at startup when left empty.
    pub cookie_secret: String,
    pub insecure_cookie: bool,
    pub body_limit_mb: usize,
    pub seed_examples: bool,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            database_url: "sqlite:rm_bridge.sqlite".to_string(),
            loglevel: "info".to_string(),
            cookie_secret: String::new(),
            insecure_cookie: false,
            body_limit_mb: 10,
            seed_examples: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RmConfig {
    pub base_url: Url,
    pub username: String,
    pub password: String,
    pub tenant_header: String,
    pub tenant: Option<String>,
    pub timeout_secs: u64,
    pub proxy: Option<Url>,
    pub login_probe: String,
}

impl Default for RmConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:8051/rmsrestdataserver/rest")
                .expect("static default RM url is valid"),
            username: String::new(),
            password: String::new(),
            tenant_header: "CODCOLIGADA".to_string(),
            tenant: None,
            timeout_secs: 300,
            proxy: None,
            login_probe: "FopFuncData".to_string(),
        }
    }
}

impl RmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Value for `tenant_header`, `"1"` when none is configured.
    pub fn tenant_or_default(&self) -> String {
        self.tenant
            .clone()
            .unwrap_or_else(|| DEFAULT_TENANT.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub path: String,
    pub probe_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub is_production: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            ports: vec![8051, 8050, 8052, 8053],
            path: RM_REST_SUFFIX.to_string(),
            probe_timeout_ms: 2000,
            cache_ttl_secs: 300,
            is_production: false,
        }
    }
}

impl DetectionConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Base URL of an RM instance listening on `port` of the configured host.
    pub fn local_url(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.host, port, self.path)
    }
}

impl Config {
    /// Defaults, then `config.toml`, then `RM_BRIDGE_*` environment variables.
    pub fn load() -> Result<Self, BridgeError> {
        let cfg = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("RM_BRIDGE_").split("__"))
            .extract()?;
        Ok(cfg)
    }
}

/// Normalize a user supplied RM address so it always ends with the REST suffix.
pub fn format_rm_url(base: &str) -> String {
    let trimmed = base.trim().trim_end_matches('/');
    if trimmed
        .to_ascii_lowercase()
        .ends_with(&RM_REST_SUFFIX.to_ascii_lowercase())
    {
        trimmed.to_string()
    } else {
        format!("{trimmed}{RM_REST_SUFFIX}")
    }
}
