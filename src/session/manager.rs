use super::client::{AutomationClient, ClientEvent, ClientFactory, EventSender, MediaFile};
use crate::dispatcher::WebhookDispatcher;
use crate::error::{Error, Result};
use crate::settings::WebhookSettings;
use crate::types::{InboundMessage, SendReceipt, Session, SessionStatus, WebhookPayload};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub session_path: PathBuf,
    pub max_sessions: usize,
}

struct SessionEntry {
    session: Session,
    client: Arc<dyn AutomationClient>,
    events: EventSender,
}

/// Tracks sessions and their automation clients. Incoming messages from
/// ready sessions are handed to the webhook dispatcher without waiting for
/// delivery.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    factory: Arc<dyn ClientFactory>,
    dispatcher: Arc<WebhookDispatcher>,
    settings: Arc<WebhookSettings>,
    config: SessionManagerConfig,
}

impl SessionManager {
    pub fn new(
        config: SessionManagerConfig,
        factory: Arc<dyn ClientFactory>,
        dispatcher: Arc<WebhookDispatcher>,
        settings: Arc<WebhookSettings>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            dispatcher,
            settings,
            config,
        })
    }

    /// Re-create a session for every credential directory left on disk.
    /// Returns how many were restored.
    pub async fn restore_sessions(self: &Arc<Self>) -> usize {
        if let Err(e) = tokio::fs::create_dir_all(&self.config.session_path).await {
            error!("failed to create session directory: {e}");
            return 0;
        }

        let mut ids = Vec::new();
        match tokio::fs::read_dir(&self.config.session_path).await {
            Ok(mut dir) => {
                while let Ok(Some(entry)) = dir.next_entry().await {
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    if is_dir {
                        ids.push(entry.file_name().to_string_lossy().to_string());
                    }
                }
            }
            Err(e) => {
                error!("failed to read session directory: {e}");
                return 0;
            }
        }

        let mut restored = 0;
        for id in ids {
            info!(session_id = %id, "restoring session");
            match self.create_session(Some(id.clone())).await {
                Ok(_) => restored += 1,
                Err(e) => warn!(session_id = %id, "failed to restore session: {e}"),
            }
        }
        restored
    }

    /// Register a new session and start its client. The returned session is
    /// in `initializing`; later states arrive through client events.
    pub async fn create_session(self: &Arc<Self>, id: Option<String>) -> Result<Session> {
        let id = id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(Error::Validation("Invalid session id".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(id.clone());
        let session_dir = self.session_dir(&id);
        let (client, created_dir) = {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&id) {
                return Err(Error::SessionExists(id));
            }
            if sessions.len() >= self.config.max_sessions {
                return Err(Error::CapacityExceeded(self.config.max_sessions));
            }

            let created_dir = !tokio::fs::try_exists(&session_dir).await.unwrap_or(false);
            tokio::fs::create_dir_all(&session_dir).await?;
            let client = self.factory.create(&id, tx.clone());
            sessions.insert(
                id.clone(),
                SessionEntry {
                    session: session.clone(),
                    client: client.clone(),
                    events: tx,
                },
            );
            (client, created_dir)
        };

        self.spawn_event_pump(id.clone(), rx);

        if let Err(e) = client.initialize().await {
            self.sessions.write().await.remove(&id);
            if let Err(destroy_err) = client.destroy().await {
                warn!(session_id = %id, "failed to release client: {destroy_err}");
            }
            // Credentials restored from disk are kept for the next attempt.
            if created_dir {
                remove_dir(&id, &session_dir).await;
            }
            return Err(Error::Client(format!("Failed to initialize session: {e}")));
        }

        info!(session_id = %id, "session created");
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).map(|e| e.session.clone())
    }

    pub async fn list_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    pub async fn send_text(&self, id: &str, to: &str, body: &str) -> Result<SendReceipt> {
        let client = self.ready_client(id).await?;
        let chat_id = normalize_recipient(to);
        let message_id = client.send_text(&chat_id, body).await?;
        debug!(session_id = %id, chat_id, "text message sent");
        Ok(SendReceipt { message_id })
    }

    pub async fn send_media(
        &self,
        id: &str,
        to: &str,
        file_path: &Path,
        caption: Option<&str>,
    ) -> Result<SendReceipt> {
        let client = self.ready_client(id).await?;
        let media = MediaFile::from_path(file_path).await?;
        let chat_id = normalize_recipient(to);
        let message_id = client.send_media(&chat_id, media, caption).await?;
        debug!(session_id = %id, chat_id, "media message sent");
        Ok(SendReceipt { message_id })
    }

    /// Log out, release the client and delete the session's credentials.
    /// Returns false if the session is unknown or the client failed.
    pub async fn logout(&self, id: &str) -> bool {
        let Some(client) = self.client(id).await else {
            return false;
        };

        let result = async {
            client.logout().await?;
            client.destroy().await
        }
        .await;

        match result {
            Ok(()) => {
                self.sessions.write().await.remove(id);
                remove_dir(id, &self.session_dir(id)).await;
                info!(session_id = %id, "session logged out");
                true
            }
            Err(e) => {
                error!(session_id = %id, "error logging out session: {e}");
                false
            }
        }
    }

    /// Release the client but keep credentials on disk.
    pub async fn destroy_session(&self, id: &str) -> bool {
        let Some(client) = self.client(id).await else {
            return false;
        };

        match client.destroy().await {
            Ok(()) => {
                self.sessions.write().await.remove(id);
                info!(session_id = %id, "session destroyed");
                true
            }
            Err(e) => {
                error!(session_id = %id, "error destroying session: {e}");
                false
            }
        }
    }

    /// Queue an externally received event for the session's pump. Returns
    /// false when the session is not tracked.
    pub async fn route_event(&self, id: &str, event: ClientEvent) -> bool {
        match self.sessions.read().await.get(id) {
            Some(entry) => entry.events.send(event).is_ok(),
            None => false,
        }
    }

    fn spawn_event_pump(self: &Arc<Self>, id: String, mut rx: mpsc::UnboundedReceiver<ClientEvent>) {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.handle_event(&id, event).await;
            }
            debug!(session_id = %id, "event pump stopped");
        });
    }

    async fn handle_event(&self, id: &str, event: ClientEvent) {
        if let ClientEvent::Message(message) = event {
            if !message.from_me {
                self.handle_incoming_message(id, message).await;
            }
            return;
        }

        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(id) else {
            return;
        };
        let session = &mut entry.session;

        match event {
            ClientEvent::Qr(qr) => {
                session.transition(SessionStatus::Qr);
                session.qr_code = Some(qr);
                info!(session_id = %id, "QR code received");
            }
            ClientEvent::Authenticated => {
                session.transition(SessionStatus::Authenticated);
                info!(session_id = %id, "session authenticated");
            }
            ClientEvent::Ready(info) => {
                session.transition(SessionStatus::Ready);
                session.client_info = Some(info);
                info!(session_id = %id, "session is ready");
            }
            ClientEvent::Disconnected(reason) => {
                session.transition(SessionStatus::Disconnected);
                info!(session_id = %id, "session disconnected: {reason}");
            }
            ClientEvent::AuthFailure(message) => {
                session.transition(SessionStatus::Disconnected);
                warn!(session_id = %id, "authentication failed: {message}");
            }
            ClientEvent::Message(_) => {}
        }
    }

    async fn handle_incoming_message(&self, id: &str, message: InboundMessage) {
        let own_wid = {
            let sessions = self.sessions.read().await;
            match sessions.get(id).and_then(|e| e.session.client_info.as_ref()) {
                Some(info) => info.wid.clone(),
                None => return,
            }
        };

        let payload = WebhookPayload {
            session_id: id.to_string(),
            message: message.body.clone(),
            from: message.from.clone(),
            to: own_wid,
            message_details: serde_json::to_value(&message).unwrap_or_default(),
        };
        let urls = self.settings.urls().await;

        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(payload, &urls).await;
        });
    }

    async fn client(&self, id: &str) -> Option<Arc<dyn AutomationClient>> {
        self.sessions.read().await.get(id).map(|e| e.client.clone())
    }

    async fn ready_client(&self, id: &str) -> Result<Arc<dyn AutomationClient>> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or(Error::SessionNotFound)?;
        if entry.session.status != SessionStatus::Ready {
            return Err(Error::SessionNotReady);
        }
        Ok(entry.client.clone())
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.config.session_path.join(id)
    }
}

async fn remove_dir(id: &str, dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(session_id = %id, "failed to remove session directory: {e}"),
    }
}

/// Map a recipient onto the backend's addressing: anything containing `@`
/// is used as-is, otherwise the digits become `<digits>@c.us`.
pub fn normalize_recipient(to: &str) -> String {
    if to.contains('@') {
        to.to_string()
    } else {
        let digits: String = to.chars().filter(char::is_ascii_digit).collect();
        format!("{digits}@c.us")
    }
}
