use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

pub const WEBHOOK_URLS_KEY: &str = "WEBHOOK_URLS";

/// Process-wide list of webhook endpoints. Updates are mirrored into the
/// env file so they survive a restart.
pub struct WebhookSettings {
    urls: RwLock<Vec<String>>,
    env_file: PathBuf,
}

impl WebhookSettings {
    pub fn new(urls: Vec<String>, env_file: PathBuf) -> Self {
        Self {
            urls: RwLock::new(urls),
            env_file,
        }
    }

    pub async fn urls(&self) -> Vec<String> {
        self.urls.read().await.clone()
    }

    /// Replace the configured list. Every entry must be an absolute URL; on
    /// any validation or write failure the current list is left untouched.
    pub async fn replace(&self, urls: Vec<String>) -> Result<Vec<String>> {
        validate_urls(&urls)?;

        let mut current = self.urls.write().await;
        update_env_file(&self.env_file, WEBHOOK_URLS_KEY, &urls.join(","))
            .await
            .map_err(Error::ConfigWrite)?;
        *current = urls;
        info!(count = current.len(), "webhook settings updated");
        Ok(current.clone())
    }
}

pub fn is_valid_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok()
}

pub fn validate_urls(urls: &[String]) -> Result<()> {
    if urls.iter().all(|u| is_valid_url(u)) {
        Ok(())
    } else {
        Err(Error::Validation("All webhook URLs must be valid URLs".into()))
    }
}

/// Set `key=value` in a line-oriented env file, replacing an existing
/// assignment or appending a new one. Other lines are preserved.
pub async fn update_env_file(path: &Path, key: &str, value: &str) -> std::io::Result<()> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    let mut lines: Vec<String> = if content.is_empty() {
        Vec::new()
    } else {
        content.split('\n').map(str::to_owned).collect()
    };

    let prefix = format!("{key}=");
    let assignment = format!("{key}={value}");
    match lines.iter().position(|line| line.starts_with(&prefix)) {
        Some(i) => lines[i] = assignment,
        None => lines.push(assignment),
    }

    tokio::fs::write(path, lines.join("\n")).await
}
