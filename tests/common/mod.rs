#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use wa_gateway::dispatcher::{DispatcherConfig, WebhookDispatcher};
use wa_gateway::http_server::{self, AppState};
use wa_gateway::session::{
    AutomationClient, ClientEvent, ClientFactory, EventSender, MediaFile, SessionManager,
    SessionManagerConfig,
};
use wa_gateway::settings::WebhookSettings;
use wa_gateway::{Error, Result};

pub const TOKEN: &str = "test-token";

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { chat_id: String, body: String },
    Media { chat_id: String, file_name: String, caption: Option<String> },
}

/// Automation backend double. Records what was sent and can be told to fail.
#[derive(Default)]
pub struct FakeFactory {
    pub sent: Arc<Mutex<Vec<Sent>>>,
    /// Ids of clients that were released.
    pub destroyed: Arc<Mutex<Vec<String>>>,
    pub fail_initialize: AtomicBool,
    pub fail_logout: AtomicBool,
    pub qr_on_init: AtomicBool,
}

impl ClientFactory for FakeFactory {
    fn create(&self, session_id: &str, events: EventSender) -> Arc<dyn AutomationClient> {
        Arc::new(FakeClient {
            session_id: session_id.to_string(),
            events,
            sent: self.sent.clone(),
            destroyed: self.destroyed.clone(),
            fail_initialize: self.fail_initialize.load(Ordering::SeqCst),
            fail_logout: self.fail_logout.load(Ordering::SeqCst),
            qr_on_init: self.qr_on_init.load(Ordering::SeqCst),
        })
    }
}

pub struct FakeClient {
    session_id: String,
    events: EventSender,
    sent: Arc<Mutex<Vec<Sent>>>,
    destroyed: Arc<Mutex<Vec<String>>>,
    fail_initialize: bool,
    fail_logout: bool,
    qr_on_init: bool,
}

#[async_trait]
impl AutomationClient for FakeClient {
    async fn initialize(&self) -> Result<()> {
        if self.fail_initialize {
            return Err(Error::Client("browser failed to launch".into()));
        }
        if self.qr_on_init {
            let _ = self.events.send(ClientEvent::Qr(format!("qr-{}", self.session_id)));
        }
        Ok(())
    }

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<String> {
        let mut sent = self.sent.lock();
        sent.push(Sent::Text {
            chat_id: chat_id.to_string(),
            body: body.to_string(),
        });
        Ok(format!("msg-{}", sent.len()))
    }

    async fn send_media(&self, chat_id: &str, media: MediaFile, caption: Option<&str>) -> Result<String> {
        let mut sent = self.sent.lock();
        sent.push(Sent::Media {
            chat_id: chat_id.to_string(),
            file_name: media.file_name,
            caption: caption.map(str::to_owned),
        });
        Ok(format!("msg-{}", sent.len()))
    }

    async fn logout(&self) -> Result<()> {
        if self.fail_logout {
            return Err(Error::Client("logout rejected".into()));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.destroyed.lock().push(self.session_id.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub factory: Arc<FakeFactory>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(|_| {})
    }

    pub fn with(customize: impl FnOnce(&mut Options)) -> Self {
        let mut options = Options::default();
        customize(&mut options);

        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(options.factory);
        let dispatcher = Arc::new(WebhookDispatcher::new(DispatcherConfig {
            timeout: options.timeout,
            ..DispatcherConfig::default()
        }));
        let env_file = options
            .env_file
            .unwrap_or_else(|| dir.path().join(".env"));
        let settings = Arc::new(WebhookSettings::new(options.webhook_urls, env_file));
        let sessions = SessionManager::new(
            SessionManagerConfig {
                session_path: dir.path().join("sessions"),
                max_sessions: options.max_sessions,
            },
            factory.clone(),
            dispatcher.clone(),
            settings.clone(),
        );

        let state = AppState {
            sessions,
            dispatcher,
            settings,
            auth_token: Some(TOKEN.to_string()),
            gateway_api_key: options.gateway_api_key,
            upload_dir: dir.path().join("uploads"),
        };
        Self {
            router: http_server::router(state.clone()),
            state,
            factory,
            dir,
        }
    }

    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.dir.path().join("sessions").join(id)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_authed(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {TOKEN}"))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Create a session and drive it to `ready` as `wid`.
    pub async fn ready_session(&self, id: &str, wid: &str) {
        self.state
            .sessions
            .create_session(Some(id.to_string()))
            .await
            .unwrap();
        self.mark_ready(id, wid).await;
    }

    /// Push a `ready` event for an existing session and wait for it to apply.
    pub async fn mark_ready(&self, id: &str, wid: &str) {
        assert!(
            self.state
                .sessions
                .route_event(
                    id,
                    ClientEvent::Ready(wa_gateway::types::ClientInfo {
                        pushname: "Bot".into(),
                        wid: wid.into(),
                        platform: "android".into(),
                    }),
                )
                .await
        );
        wait_for(move || async move {
            self.state
                .sessions
                .get_session(id)
                .await
                .is_some_and(|s| s.status == wa_gateway::types::SessionStatus::Ready)
        })
        .await;
    }
}

pub struct Options {
    pub factory: FakeFactory,
    pub max_sessions: usize,
    pub webhook_urls: Vec<String>,
    pub env_file: Option<PathBuf>,
    pub gateway_api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            factory: FakeFactory::default(),
            max_sessions: 10,
            webhook_urls: Vec::new(),
            env_file: None,
            gateway_api_key: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Poll `check` until it holds, failing after two seconds.
pub async fn wait_for<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
