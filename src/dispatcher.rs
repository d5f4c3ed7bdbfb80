use crate::store::{DeliveryLog, MAX_LOG_ENTRIES};
use crate::types::{DeliveryLogEntry, DeliveryResult, WebhookPayload};
use crate::verification::{self, SIGNATURE_HEADER};
use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use reqwest::header;
use std::error::Error as _;
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

pub const USER_AGENT: &str = "WhatsApp-Bot-Webhook/1.0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Hard limit for a single delivery attempt.
    pub timeout: Duration,
    /// When set, every delivery carries an HMAC-SHA256 signature header.
    pub signing_secret: Option<String>,
    pub log_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            signing_secret: None,
            log_capacity: MAX_LOG_ENTRIES,
        }
    }
}

/// Best-effort fan-out of webhook payloads. Every attempt is independent;
/// nothing here ever returns an error to the caller. Outcomes of real
/// deliveries are kept in a bounded log.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    config: DispatcherConfig,
    log: Mutex<DeliveryLog>,
}

impl WebhookDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            log: Mutex::new(DeliveryLog::with_capacity(config.log_capacity)),
            config,
        }
    }

    /// POST `payload` to every url concurrently and wait for all attempts
    /// to settle. Appends one log entry per url.
    pub async fn dispatch(&self, payload: WebhookPayload, urls: &[String]) {
        if urls.is_empty() {
            info!(
                session_id = %payload.session_id,
                "No webhook URLs configured, skipping webhook delivery"
            );
            return;
        }

        let body = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                error!("failed to serialize webhook payload: {e}");
                for url in urls {
                    self.record(url, &payload, Err(format!("Failed to serialize payload: {e}")), 0);
                }
                return;
            }
        };

        let attempts = urls.iter().map(|url| self.deliver(url, &payload, &body));
        join_all(attempts).await;
    }

    async fn deliver(&self, url: &str, payload: &WebhookPayload, body: &[u8]) {
        info!(url, session_id = %payload.session_id, "sending webhook");

        let started = Instant::now();
        let outcome = self.post(url, body.to_vec()).await;
        let elapsed = elapsed_ms(started);

        match &outcome {
            Ok(()) => info!(url, response_time = elapsed, "webhook delivered"),
            Err(e) => error!(url, response_time = elapsed, "failed to deliver webhook: {e}"),
        }

        self.record(url, payload, outcome, elapsed);
    }

    fn record(&self, url: &str, payload: &WebhookPayload, outcome: Result<(), String>, elapsed: u64) {
        let entry = DeliveryLogEntry {
            id: generate_id(),
            timestamp: Utc::now(),
            url: url.to_string(),
            payload: payload.clone(),
            success: outcome.is_ok(),
            error: outcome.err(),
            response_time: Some(elapsed),
        };
        self.log.lock().record(entry);
    }

    /// Probe a single url with a synthetic payload. The outcome is returned,
    /// not logged.
    pub async fn test_delivery(&self, url: &str) -> DeliveryResult {
        let payload = test_payload();
        let body = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                return DeliveryResult {
                    success: false,
                    error: Some(format!("Failed to serialize payload: {e}")),
                    response_time: 0,
                }
            }
        };

        let started = Instant::now();
        let outcome = self.post(url, body).await;
        let response_time = elapsed_ms(started);
        info!(url, success = outcome.is_ok(), response_time, "webhook test finished");

        DeliveryResult {
            success: outcome.is_ok(),
            error: outcome.err(),
            response_time,
        }
    }

    pub fn recent_deliveries(&self) -> Vec<DeliveryLogEntry> {
        self.log.lock().recent()
    }

    pub fn clear_deliveries(&self) {
        self.log.lock().clear();
        info!("Webhook delivery logs cleared");
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<(), String> {
        let mut request = self
            .client
            .post(url)
            .timeout(self.config.timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, USER_AGENT);

        if let Some(secret) = &self.config.signing_secret {
            if let Some(signature) = verification::sign_payload(secret, &body) {
                request = request.header(SIGNATURE_HEADER, signature);
            }
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| self.describe(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Request failed with status code {}", status.as_u16()));
        }
        Ok(())
    }

    fn describe(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            return format!("timeout of {}ms exceeded", self.config.timeout.as_millis());
        }
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

fn test_payload() -> WebhookPayload {
    let body = "This is a test message from WhatsApp Bot";
    WebhookPayload {
        session_id: "test_session".into(),
        message: body.into(),
        from: "1234567890@c.us".into(),
        to: "test_bot@c.us".into(),
        message_details: serde_json::json!({
            "id": "test_message_id",
            "type": "chat",
            "timestamp": Utc::now().timestamp_millis(),
            "body": body,
        }),
    }
}

/// Short opaque id for log entries. Not collision-checked.
fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()[..9].to_string()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_short_and_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 9);
        assert_ne!(a, b);
    }

    #[test]
    fn test_payload_is_marked() {
        let payload = test_payload();
        assert_eq!(payload.session_id, "test_session");
        assert_eq!(payload.message_details["id"], "test_message_id");
        assert_eq!(payload.message_details["type"], "chat");
    }

    #[tokio::test]
    async fn empty_url_list_is_a_no_op() {
        let dispatcher = WebhookDispatcher::new(DispatcherConfig::default());
        dispatcher.dispatch(test_payload(), &[]).await;
        assert!(dispatcher.recent_deliveries().is_empty());
    }
}
