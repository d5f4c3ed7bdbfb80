use crate::error::Result;
use crate::types::{ClientInfo, InboundMessage};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events raised by an automation client, applied in order by the owning
/// session's event pump.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Qr(String),
    Authenticated,
    Ready(ClientInfo),
    Disconnected(String),
    AuthFailure(String),
    Message(InboundMessage),
}

pub type EventSender = mpsc::UnboundedSender<ClientEvent>;

#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl MediaFile {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".into());
        Ok(Self {
            file_name,
            mime_type: mime_from_path(path).to_string(),
            data,
        })
    }

    /// Gateway media category for this file.
    pub fn media_kind(&self) -> &'static str {
        match self.mime_type.split('/').next().unwrap_or("") {
            "image" => "image",
            "video" => "video",
            "audio" => "audio",
            _ => "document",
        }
    }
}

pub fn mime_from_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "3gp" => "video/3gpp",
        "mp3" => "audio/mpeg",
        "ogg" | "opus" => "audio/ogg",
        "m4a" => "audio/mp4",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "zip" => "application/zip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Handle to one WhatsApp account driven by an automation backend.
#[async_trait]
pub trait AutomationClient: Send + Sync {
    /// Start the client. State changes arrive later as [`ClientEvent`]s.
    async fn initialize(&self) -> Result<()>;
    /// Returns the backend's message id.
    async fn send_text(&self, chat_id: &str, body: &str) -> Result<String>;
    async fn send_media(&self, chat_id: &str, media: MediaFile, caption: Option<&str>) -> Result<String>;
    async fn logout(&self) -> Result<()>;
    async fn destroy(&self) -> Result<()>;
}

pub trait ClientFactory: Send + Sync {
    fn create(&self, session_id: &str, events: EventSender) -> Arc<dyn AutomationClient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_lookup_is_case_insensitive() {
        assert_eq!(mime_from_path(Path::new("a/photo.JPG")), "image/jpeg");
        assert_eq!(mime_from_path(Path::new("report.pdf")), "application/pdf");
        assert_eq!(mime_from_path(Path::new("blob")), "application/octet-stream");
    }

    #[tokio::test]
    async fn media_file_reads_bytes_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        tokio::fs::write(&path, b"\x00\x01").await.unwrap();

        let media = MediaFile::from_path(&path).await.unwrap();
        assert_eq!(media.file_name, "clip.mp4");
        assert_eq!(media.mime_type, "video/mp4");
        assert_eq!(media.media_kind(), "video");
        assert_eq!(media.data, vec![0, 1]);
    }
}
