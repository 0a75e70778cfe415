use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(skip)]
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Where operations are mirrored from, and how eagerly.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Entries requested per export page while tailing the upstream log.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Seconds between polls once the mirror has caught up.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Set false to serve only what is already stored.
    #[serde(default = "default_import_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8111
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/plc-mirror")
}

fn default_upstream_url() -> String {
    "https://plc.directory".to_string()
}

fn default_page_size() -> u32 {
    1000
}

fn default_poll_interval() -> u64 {
    30
}

fn default_import_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            page_size: default_page_size(),
            poll_interval: default_poll_interval(),
            enabled: default_import_enabled(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, AppError> {
        let path = config_path
            .or_else(|| std::env::var("PLC_CONFIG_PATH").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config.toml"));

        if !path.exists() {
            return Err(AppError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(&path).map_err(AppError::Io)?;
        let mut config = toml::from_str::<AppConfig>(&contents)
            .map_err(|e| AppError::Config(format!("failed to parse {}: {e}", path.display())))?;

        config.config_path = path;

        // Env var override macros
        macro_rules! env_str { ($var:expr, $field:expr) => { if let Ok(v) = std::env::var($var) { $field = v; } }; }
        macro_rules! env_parse { ($var:expr, $field:expr) => {
            if let Ok(v) = std::env::var($var) {
                $field = v.parse().map_err(|e| AppError::Config(format!("invalid {}: {e}", $var)))?;
            }
        }; }
        macro_rules! env_bool { ($var:expr, $field:expr) => {
            if let Ok(v) = std::env::var($var) { $field = v == "1" || v.eq_ignore_ascii_case("true"); }
        }; }

        // Server
        env_str!("PLC_SERVER_HOST", config.server.host);
        env_parse!("PLC_SERVER_PORT", config.server.port);

        // Logging
        env_str!("PLC_LOG_LEVEL", config.log.level);
        if let Ok(format) = std::env::var("PLC_LOG_FORMAT") {
            config.log.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(AppError::Config(format!(
                        "invalid PLC_LOG_FORMAT '{other}', expected 'text' or 'json'"
                    )));
                }
            };
        }

        // Store
        if let Ok(data_dir) = std::env::var("PLC_STORE_DATA_DIR") {
            config.store.data_dir = PathBuf::from(data_dir);
        }

        // Upstream
        env_str!("PLC_UPSTREAM_URL", config.upstream.url);
        env_parse!("PLC_UPSTREAM_PAGE_SIZE", config.upstream.page_size);
        env_parse!("PLC_UPSTREAM_POLL_INTERVAL", config.upstream.poll_interval);
        env_bool!("PLC_UPSTREAM_ENABLED", config.upstream.enabled);

        Ok(config)
    }
}
