use crate::error::{Error, Result};
use crate::settings::is_valid_url;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Runtime configuration, read from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Root directory holding one credential directory per session.
    pub session_path: PathBuf,
    pub max_sessions: usize,
    pub webhook_urls: Vec<String>,
    pub webhook_secret: Option<String>,
    pub webhook_timeout: Duration,
    /// Bearer token required by the send routes.
    pub auth_token: Option<String>,
    /// Env file that webhook settings are mirrored into.
    pub env_file: PathBuf,
    pub upload_dir: PathBuf,
    pub gateway_url: String,
    pub gateway_api_key: Option<String>,
    /// Base URL the gateway uses to post events back to this service.
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_or(get("PORT"), "PORT", 3000u16)?;
        let max_sessions = parse_or(get("MAX_SESSIONS"), "MAX_SESSIONS", 10usize)?;
        let timeout_ms = parse_or(get("WEBHOOK_TIMEOUT_MS"), "WEBHOOK_TIMEOUT_MS", 10_000u64)?;

        let webhook_urls = get("WEBHOOK_URLS")
            .map(|raw| parse_url_list(&raw))
            .unwrap_or_default();

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            session_path: get("SESSION_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./sessions")),
            max_sessions,
            webhook_urls,
            webhook_secret: get("WEBHOOK_SECRET"),
            webhook_timeout: Duration::from_millis(timeout_ms),
            auth_token: get("AUTH_TOKEN"),
            env_file: get("ENV_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".env")),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            gateway_url: get("GATEWAY_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8085".into())
                .trim_end_matches('/')
                .to_string(),
            gateway_api_key: get("GATEWAY_API_KEY"),
            public_url: get("PUBLIC_URL")
                .unwrap_or_else(|| format!("http://127.0.0.1:{port}"))
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {v}"))),
        None => Ok(default),
    }
}

/// Split a comma-separated URL list, dropping blanks and invalid entries.
pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let ok = is_valid_url(s);
            if !ok {
                warn!("ignoring invalid webhook URL from environment: {s}");
            }
            ok
        })
        .map(str::to_owned)
        .collect()
}
