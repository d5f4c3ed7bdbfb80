use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event body posted to every configured webhook URL for one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub session_id: String,
    pub message: String,
    pub from: String,
    pub to: String,
    pub message_details: serde_json::Value,
}

/// Outcome of one (payload, url) delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub payload: WebhookPayload,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
}

/// Result of an ad-hoc webhook probe. Never recorded in the delivery log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response_time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initializing,
    /// Waiting for the QR code to be scanned.
    Qr,
    Authenticated,
    Ready,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub pushname: String,
    pub wid: String,
    pub platform: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
}

impl Session {
    pub fn new(id: String) -> Self {
        Self {
            id,
            status: SessionStatus::Initializing,
            qr_code: None,
            client_info: None,
        }
    }

    /// Move to `status`, dropping the QR code and client identity when the
    /// new status no longer carries them.
    pub fn transition(&mut self, status: SessionStatus) {
        self.status = status;
        if status != SessionStatus::Qr {
            self.qr_code = None;
        }
        if status != SessionStatus::Ready {
            self.client_info = None;
        }
    }
}

/// A message received by a session, as reported by the automation client.
/// Serializes to the `messageDetails` object of the webhook payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundMessage {
    pub id: String,
    #[serde(skip_serializing)]
    pub from: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: i64,
    pub body: String,
    pub has_media: bool,
    pub is_forwarded: bool,
    pub is_status: bool,
    pub is_starred: bool,
    pub broadcast: bool,
    pub from_me: bool,
    pub has_quoted_msg: bool,
    pub device_type: String,
    pub is_gif: bool,
    pub v_cards: Vec<String>,
    pub mentioned_ids: Vec<String>,
    pub group_mentions: Vec<serde_json::Value>,
    pub links: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_clears_fields_outside_their_status() {
        let mut session = Session::new("s1".into());
        session.qr_code = Some("qr-data".into());
        session.transition(SessionStatus::Qr);
        assert_eq!(session.qr_code.as_deref(), Some("qr-data"));

        session.transition(SessionStatus::Authenticated);
        assert!(session.qr_code.is_none());

        session.client_info = Some(ClientInfo {
            pushname: "Bot".into(),
            wid: "15550001111@c.us".into(),
            platform: "android".into(),
        });
        session.transition(SessionStatus::Ready);
        assert!(session.client_info.is_some());

        session.transition(SessionStatus::Disconnected);
        assert!(session.client_info.is_none());
    }

    #[test]
    fn session_serializes_wire_names() {
        let mut session = Session::new("abc".into());
        session.qr_code = Some("2@xyz".into());
        session.status = SessionStatus::Qr;
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["status"], "qr");
        assert_eq!(value["qrCode"], "2@xyz");
        assert!(value.get("clientInfo").is_none());
    }

    #[test]
    fn message_details_use_camel_case_keys() {
        let msg = InboundMessage {
            id: "ABC".into(),
            from: "123@c.us".into(),
            kind: "chat".into(),
            body: "hi".into(),
            is_forwarded: true,
            ..Default::default()
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "chat");
        assert_eq!(value["isForwarded"], true);
        assert_eq!(value["hasQuotedMsg"], false);
        assert!(value.get("from").is_none());
    }
}
