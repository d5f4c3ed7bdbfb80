// Automation backend reached over HTTP: an Evolution-API-style WhatsApp
// gateway. One gateway instance per session; instance events come back as
// callbacks on /gateway/events/{session_id} and are translated by
// `parse_gateway_event`.

use super::client::{AutomationClient, ClientEvent, ClientFactory, EventSender, MediaFile};
use crate::error::{Error, Result};
use crate::types::{ClientInfo, InboundMessage};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    /// Public base URL of this service, used to build the callback address.
    pub callback_base: String,
}

pub struct GatewayClientFactory {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayClientFactory {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

impl ClientFactory for GatewayClientFactory {
    fn create(&self, session_id: &str, events: EventSender) -> Arc<dyn AutomationClient> {
        Arc::new(GatewayClient {
            http: self.http.clone(),
            config: self.config.clone(),
            instance: session_id.to_string(),
            events,
        })
    }
}

pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
    instance: String,
    events: EventSender,
}

impl GatewayClient {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, String)> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut request = self
            .http
            .request(method, &url)
            .header("apikey", &self.config.api_key);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        Ok((status, text))
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let (status, text) = self.send(method, path, body).await?;
        if !status.is_success() {
            return Err(gateway_error(status, &text));
        }
        debug!(instance = %self.instance, path, "gateway call ok");
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    /// The instance is already paired: report it ready with the identity the
    /// gateway has on record.
    async fn announce_open(&self) {
        let _ = self.events.send(ClientEvent::Authenticated);
        let path = format!("/instance/fetchInstances?instanceName={}", self.instance);
        match self.call(Method::GET, &path, None).await {
            Ok(resp) => {
                let record = resp.as_array().and_then(|a| a.first()).unwrap_or(&resp);
                let _ = self.events.send(ClientEvent::Ready(instance_info(record)));
            }
            Err(e) => warn!(instance = %self.instance, "failed to fetch instance details: {e}"),
        }
    }

    fn callback_url(&self) -> String {
        format!("{}/gateway/events/{}", self.config.callback_base, self.instance)
    }
}

#[async_trait]
impl AutomationClient for GatewayClient {
    async fn initialize(&self) -> Result<()> {
        let token = format!("wa-{}", &Uuid::new_v4().simple().to_string()[..12]);
        let body = json!({
            "instanceName": self.instance,
            "token": token,
            "qrcode": true,
            "webhook": self.callback_url(),
        });

        info!(instance = %self.instance, "creating gateway instance");
        let (status, text) = self
            .send(Method::POST, "/instance/create", Some(body))
            .await?;

        let resp = if status.is_success() {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        } else if is_instance_conflict(&text) {
            // Instance survived a restart; reattach and keep its credentials.
            info!(instance = %self.instance, "gateway instance exists, reconnecting");
            let path = format!("/instance/connect/{}", self.instance);
            let resp = self.call(Method::GET, &path, None).await?;
            if resp["instance"]["state"].as_str() == Some("open") {
                self.announce_open().await;
                return Ok(());
            }
            resp
        } else {
            return Err(gateway_error(status, &text));
        };

        let qr = extract_qr(&resp);
        if !qr.is_empty() {
            let _ = self.events.send(ClientEvent::Qr(qr));
        }
        Ok(())
    }

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<String> {
        let path = format!("/message/sendText/{}", self.instance);
        let resp = self
            .call(Method::POST, &path, Some(json!({ "number": chat_id, "text": body })))
            .await?;
        message_id(&resp)
    }

    async fn send_media(&self, chat_id: &str, media: MediaFile, caption: Option<&str>) -> Result<String> {
        let path = format!("/message/sendMedia/{}", self.instance);
        let mut body = json!({
            "number": chat_id,
            "mediatype": media.media_kind(),
            "mimetype": media.mime_type,
            "media": base64::engine::general_purpose::STANDARD.encode(&media.data),
            "fileName": media.file_name,
        });
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            body["caption"] = Value::String(caption.to_string());
        }
        let resp = self.call(Method::POST, &path, Some(body)).await?;
        message_id(&resp)
    }

    /// Unpair the account and delete the gateway instance.
    async fn logout(&self) -> Result<()> {
        let path = format!("/instance/logout/{}", self.instance);
        self.call(Method::DELETE, &path, None).await?;
        let path = format!("/instance/delete/{}", self.instance);
        self.call(Method::DELETE, &path, None).await?;
        Ok(())
    }

    /// Drop the local handle only. The gateway instance and its pairing stay
    /// in place so the session can be restored later.
    async fn destroy(&self) -> Result<()> {
        debug!(instance = %self.instance, "releasing gateway client");
        Ok(())
    }
}

fn gateway_error(status: StatusCode, text: &str) -> Error {
    let snippet: String = text.chars().take(300).collect();
    Error::Client(format!("gateway returned {status}: {snippet}"))
}

/// The gateway refuses to create an instance whose name or token is taken.
fn is_instance_conflict(text: &str) -> bool {
    let lower = text.to_lowercase();
    (lower.contains("instance") || lower.contains("name") || lower.contains("token"))
        && (lower.contains("already") || lower.contains("exists"))
}

/// Identity of a paired instance from a `fetchInstances` record. Both the
/// flat and the `{instance: {..}}` layouts are accepted.
fn instance_info(record: &Value) -> ClientInfo {
    let inner = if record["instance"].is_object() {
        &record["instance"]
    } else {
        record
    };
    let wid = inner["ownerJid"]
        .as_str()
        .or_else(|| inner["owner"].as_str())
        .map(to_c_us)
        .unwrap_or_default();
    ClientInfo {
        pushname: inner["profileName"].as_str().unwrap_or("Unknown").to_string(),
        wid,
        platform: inner["integration"].as_str().unwrap_or("Unknown").to_string(),
    }
}

fn message_id(resp: &Value) -> Result<String> {
    resp["key"]["id"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::Client("gateway response carried no message id".into()))
}

/// Pull the QR payload out of the shapes the gateway uses:
/// `{qrcode: {base64}}`, `{base64}`, `{qrcode: "<data>"}` or `{code}`.
pub fn extract_qr(resp: &Value) -> String {
    let qr = resp["qrcode"]["base64"]
        .as_str()
        .or_else(|| resp["base64"].as_str())
        .or_else(|| resp["qrcode"].as_str())
        .or_else(|| resp["code"].as_str())
        .unwrap_or("")
        .to_string();
    if qr.is_empty() {
        debug!("no QR code in gateway response");
    }
    qr
}

/// Translate one gateway callback into client events. Unknown events map to
/// nothing.
pub fn parse_gateway_event(payload: &Value) -> Vec<ClientEvent> {
    let event = payload["event"]
        .as_str()
        .unwrap_or("")
        .to_ascii_lowercase()
        .replace('_', ".");
    let data = &payload["data"];

    match event.as_str() {
        "qrcode.updated" => {
            let qr = extract_qr(data);
            if qr.is_empty() {
                Vec::new()
            } else {
                vec![ClientEvent::Qr(qr)]
            }
        }
        "connection.update" => match data["state"].as_str().unwrap_or("") {
            "open" | "connected" => {
                let info = ClientInfo {
                    pushname: data["profileName"].as_str().unwrap_or("Unknown").to_string(),
                    wid: data["wuid"]
                        .as_str()
                        .or_else(|| payload["sender"].as_str())
                        .map(to_c_us)
                        .unwrap_or_default(),
                    platform: data["platform"].as_str().unwrap_or("Unknown").to_string(),
                };
                vec![ClientEvent::Authenticated, ClientEvent::Ready(info)]
            }
            "close" => {
                let reason = data["statusReason"]
                    .as_i64()
                    .map(|code| format!("connection closed ({code})"))
                    .unwrap_or_else(|| "connection closed".into());
                vec![ClientEvent::Disconnected(reason)]
            }
            _ => Vec::new(),
        },
        "logout.instance" => vec![ClientEvent::Disconnected("logout".into())],
        "messages.upsert" => {
            let messages: Vec<&Value> = match data.as_array() {
                Some(arr) => arr.iter().collect(),
                None => vec![data],
            };
            messages
                .into_iter()
                .filter_map(parse_message)
                .map(ClientEvent::Message)
                .collect()
        }
        other => {
            if !other.is_empty() {
                debug!("ignoring gateway event {other}");
            }
            Vec::new()
        }
    }
}

fn parse_message(msg: &Value) -> Option<InboundMessage> {
    let key = &msg["key"];
    let remote_jid = key["remoteJid"].as_str()?;
    let content = &msg["message"];

    let body = content["conversation"]
        .as_str()
        .or_else(|| content["extendedTextMessage"]["text"].as_str())
        .or_else(|| content["imageMessage"]["caption"].as_str())
        .or_else(|| content["videoMessage"]["caption"].as_str())
        .or_else(|| content["documentMessage"]["caption"].as_str())
        .unwrap_or("")
        .to_string();

    let kind = msg["messageType"].as_str().unwrap_or("conversation");
    let has_media = matches!(
        kind,
        "imageMessage" | "videoMessage" | "audioMessage" | "documentMessage" | "stickerMessage"
    );
    let context = content
        .as_object()
        .and_then(|o| o.values().find_map(|v| v.get("contextInfo")))
        .cloned()
        .unwrap_or(Value::Null);

    let mentioned_ids = context["mentionedJid"]
        .as_array()
        .map(|ids| ids.iter().filter_map(|v| v.as_str()).map(to_c_us).collect())
        .unwrap_or_default();

    if remote_jid.is_empty() {
        warn!("gateway message without remoteJid");
        return None;
    }

    Some(InboundMessage {
        id: key["id"].as_str().unwrap_or_default().to_string(),
        from: to_c_us(remote_jid),
        kind: normalize_type(kind).to_string(),
        timestamp: msg["messageTimestamp"]
            .as_i64()
            .or_else(|| msg["messageTimestamp"].as_str().and_then(|s| s.parse().ok()))
            .unwrap_or_default(),
        has_media,
        is_forwarded: context["isForwarded"].as_bool().unwrap_or(false),
        is_status: remote_jid == "status@broadcast",
        is_starred: msg["starred"].as_bool().unwrap_or(false),
        broadcast: remote_jid.ends_with("@broadcast"),
        from_me: key["fromMe"].as_bool().unwrap_or(false),
        has_quoted_msg: !context["quotedMessage"].is_null(),
        device_type: msg["source"].as_str().unwrap_or("unknown").to_string(),
        is_gif: content["videoMessage"]["gifPlayback"].as_bool().unwrap_or(false),
        v_cards: vcards(content),
        mentioned_ids,
        group_mentions: group_mentions(&context),
        links: links(&body),
        body,
    })
}

/// vCard payloads from a single contact or a contact list message.
fn vcards(content: &Value) -> Vec<String> {
    let single = content["contactMessage"]["vcard"].as_str().map(str::to_owned);
    let listed = content["contactsArrayMessage"]["contacts"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|c| c["vcard"].as_str().map(str::to_owned));
    single.into_iter().chain(listed).collect()
}

fn group_mentions(context: &Value) -> Vec<Value> {
    context["groupMentions"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|m| {
            let group_id = m["groupJid"].as_str()?;
            Some(json!({
                "groupSubject": m["groupSubject"].as_str().unwrap_or_default(),
                "groupJid": group_id,
            }))
        })
        .collect()
}

/// Absolute http(s) URLs appearing in the message text.
fn links(body: &str) -> Vec<Value> {
    body.split_whitespace()
        .map(|word| word.trim_end_matches(|c: char| matches!(c, '.' | ',' | ')' | '!' | '?' | ';' | ':')))
        .filter(|word| word.starts_with("http://") || word.starts_with("https://"))
        .filter(|word| url::Url::parse(word).is_ok())
        .map(|link| json!({ "link": link, "isSuspicious": false }))
        .collect()
}

/// Gateway JIDs use `@s.whatsapp.net`; the payload uses `@c.us`.
fn to_c_us(jid: &str) -> String {
    match jid.strip_suffix("@s.whatsapp.net") {
        Some(user) => format!("{user}@c.us"),
        None => jid.to_string(),
    }
}

fn normalize_type(kind: &str) -> &str {
    match kind {
        "conversation" | "extendedTextMessage" => "chat",
        "imageMessage" => "image",
        "videoMessage" => "video",
        "audioMessage" => "ptt",
        "documentMessage" => "document",
        "stickerMessage" => "sticker",
        "locationMessage" => "location",
        "contactMessage" => "vcard",
        other => other,
    }
}
