//! Telegram Bot channel — long polling + message sending via Bot API.

use async_trait::async_trait;
use futures::stream::Stream;
use serde::Deserialize;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use redclaw_core::config::TelegramConfig;
use redclaw_core::error::{RedClawError, Result};
use redclaw_core::traits::Channel;

/// Telegram caps messages at 4096 characters.
const MAX_MESSAGE_LEN: usize = 4096;

/// An authorized inbound message, already stripped of Telegram envelope.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub text: String,
    pub document: Option<InboundDocument>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A file attached to an inbound message.
#[derive(Debug, Clone)]
pub struct InboundDocument {
    pub file_id: String,
    pub file_name: String,
    pub file_size: Option<u64>,
}

/// Telegram Bot channel with polling loop.
pub struct TelegramChannel {
    token: String,
    authorized_user_ids: Vec<i64>,
    poll_interval_secs: u64,
    client: reqwest::Client,
    last_update_id: i64,
    connected: bool,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            token: config.resolve_token(),
            authorized_user_ids: config.authorized_user_ids.clone(),
            poll_interval_secs: config.poll_interval_secs,
            client: reqwest::Client::new(),
            last_update_id: 0,
            connected: false,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    /// Empty allowlist means nobody gets in.
    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized_user_ids.contains(&user_id)
    }

    /// Get updates using long polling.
    pub async fn get_updates(&mut self) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", (self.last_update_id + 1).to_string()),
                ("timeout", "30".into()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .send()
            .await
            .map_err(|e| RedClawError::Channel(format!("Telegram getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| RedClawError::Channel(format!("Invalid Telegram response: {e}")))?;

        if !body.ok {
            return Err(RedClawError::Channel(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }

    /// Send a text message, chunked to stay under the API limit.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in chunk_message(text, MAX_MESSAGE_LEN) {
            self.send_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    async fn send_chunk(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| RedClawError::Channel(format!("sendMessage failed: {e}")))?;

        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| RedClawError::Channel(format!("Invalid send response: {e}")))?;

        if !result.ok {
            // Markdown parse failures are common with tool output; retry plain.
            let plain = serde_json::json!({ "chat_id": chat_id, "text": text });
            let retry: TelegramApiResponse<serde_json::Value> = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&plain)
                .send()
                .await
                .map_err(|e| RedClawError::Channel(format!("sendMessage failed: {e}")))?
                .json()
                .await
                .map_err(|e| RedClawError::Channel(format!("Invalid send response: {e}")))?;
            if !retry.ok {
                return Err(RedClawError::Channel(format!(
                    "Send failed: {}",
                    retry.description.unwrap_or_default()
                )));
            }
        }
        Ok(())
    }

    /// Send typing indicator. Best effort.
    pub async fn send_typing(&self, chat_id: i64) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "action": "typing",
        });
        let _ = self
            .client
            .post(self.api_url("sendChatAction"))
            .json(&body)
            .send()
            .await;
        Ok(())
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| RedClawError::Channel(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| RedClawError::Channel(format!("Invalid getMe response: {e}")))?;
        body.result
            .ok_or_else(|| RedClawError::Channel("No bot info".into()))
    }

    /// Download an attached document into a temp file and return its path.
    pub async fn download_document(&self, doc: &InboundDocument) -> Result<PathBuf> {
        let response = self
            .client
            .get(self.api_url("getFile"))
            .query(&[("file_id", doc.file_id.as_str())])
            .send()
            .await
            .map_err(|e| RedClawError::Channel(format!("getFile failed: {e}")))?;
        let body: TelegramApiResponse<TelegramFile> = response
            .json()
            .await
            .map_err(|e| RedClawError::Channel(format!("Invalid getFile response: {e}")))?;
        let file = body
            .result
            .ok_or_else(|| RedClawError::Channel("No file info".into()))?;
        let file_path = file
            .file_path
            .ok_or_else(|| RedClawError::Channel("File has no path".into()))?;

        let url = format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.token
        );
        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RedClawError::Channel(format!("File download failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| RedClawError::Channel(format!("File download failed: {e}")))?;

        let temp_dir = std::env::temp_dir().join("redclaw_uploads");
        tokio::fs::create_dir_all(&temp_dir).await?;
        let local = temp_dir.join(format!(
            "{}_{}",
            &uuid::Uuid::new_v4().to_string()[..8],
            sanitize_filename(&doc.file_name)
        ));
        tokio::fs::write(&local, &bytes).await?;
        tracing::info!(file = %doc.file_name, bytes = bytes.len(), "Downloaded document");
        Ok(local)
    }

    /// Start polling loop — returns a stream of authorized inbound messages.
    pub fn start_polling(self) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut channel = self;
            tracing::info!("Telegram polling loop started");

            loop {
                match channel.get_updates().await {
                    Ok(updates) => {
                        for update in updates {
                            let Some(msg) = update.to_inbound() else {
                                continue;
                            };
                            if !channel.is_authorized(msg.user_id) {
                                tracing::warn!(
                                    user_id = msg.user_id,
                                    "Ignoring message from unauthorized user"
                                );
                                continue;
                            }
                            if tx.send(msg).is_err() {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    }
                }

                tokio::time::sleep(tokio::time::Duration::from_secs(
                    channel.poll_interval_secs,
                ))
                .await;
            }
        });

        TelegramPollingStream { rx }
    }
}

/// Stream of inbound Telegram messages from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<InboundMessage>,
}

impl Stream for TelegramPollingStream {
    type Item = InboundMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Unpin for TelegramPollingStream {}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn connect(&mut self) -> Result<()> {
        let me = self.get_me().await?;
        tracing::info!(
            "Telegram bot: @{} ({})",
            me.username.as_deref().unwrap_or("unknown"),
            me.first_name
        );
        self.connected = true;
        Ok(())
    }

    async fn send(&self, thread_id: &str, text: &str) -> Result<()> {
        let chat_id: i64 = thread_id
            .parse()
            .map_err(|_| RedClawError::Channel("Invalid chat_id".into()))?;
        self.send_message(chat_id, text).await
    }
}

/// Split a message into chunks under `max_len`, preferring line boundaries.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.len() + line.len() > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if line.len() > max_len {
            // A single oversized line gets hard-split on char boundaries.
            let mut rest = line;
            while rest.len() > max_len {
                let mut end = max_len;
                while !rest.is_char_boundary(end) {
                    end -= 1;
                }
                chunks.push(rest[..end].to_string());
                rest = &rest[end..];
            }
            current.push_str(rest);
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub document: Option<TelegramDocument>,
    pub date: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramDocument {
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

/// `getFile` payload; `file_path` is absent while Telegram prepares the file.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
    pub file_path: Option<String>,
}

impl TelegramUpdate {
    /// Convert to an inbound message; bot messages and empty updates drop.
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        let msg = self.message.as_ref()?;
        let from = msg.from.as_ref()?;
        if from.is_bot {
            return None;
        }

        let document = msg.document.as_ref().map(|d| InboundDocument {
            file_id: d.file_id.clone(),
            file_name: d.file_name.clone().unwrap_or_else(|| "upload.bin".into()),
            file_size: d.file_size,
        });
        let text = msg
            .text
            .clone()
            .or_else(|| msg.caption.clone())
            .unwrap_or_default();
        if text.is_empty() && document.is_none() {
            return None;
        }

        Some(InboundMessage {
            chat_id: msg.chat.id,
            user_id: from.id,
            username: from.username.clone(),
            text,
            document,
            timestamp: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_json(raw: &str) -> TelegramUpdate {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_update_to_inbound() {
        let update = update_json(
            r#"{
                "update_id": 10,
                "message": {
                    "message_id": 1,
                    "from": {"id": 42, "is_bot": false, "first_name": "Ann", "username": "ann"},
                    "chat": {"id": 42, "type": "private"},
                    "text": "/scan 192.168.1.1",
                    "date": 1700000000
                }
            }"#,
        );
        let msg = update.to_inbound().unwrap();
        assert_eq!(msg.chat_id, 42);
        assert_eq!(msg.text, "/scan 192.168.1.1");
        assert!(msg.document.is_none());
    }

    #[test]
    fn test_bot_messages_dropped() {
        let update = update_json(
            r#"{
                "update_id": 11,
                "message": {
                    "message_id": 2,
                    "from": {"id": 7, "is_bot": true, "first_name": "Bot"},
                    "chat": {"id": 42, "type": "private"},
                    "text": "echo",
                    "date": 1700000000
                }
            }"#,
        );
        assert!(update.to_inbound().is_none());
    }

    #[test]
    fn test_document_with_caption() {
        let update = update_json(
            r#"{
                "update_id": 12,
                "message": {
                    "message_id": 3,
                    "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
                    "chat": {"id": 42, "type": "private"},
                    "caption": "writeup",
                    "document": {"file_id": "abc", "file_name": "report.pdf", "file_size": 1024},
                    "date": 1700000000
                }
            }"#,
        );
        let msg = update.to_inbound().unwrap();
        let doc = msg.document.unwrap();
        assert_eq!(doc.file_name, "report.pdf");
        assert_eq!(msg.text, "writeup");
    }

    #[test]
    fn test_authorization_gate() {
        let config = redclaw_core::config::TelegramConfig {
            enabled: true,
            bot_token: "t".into(),
            authorized_user_ids: vec![42],
            poll_interval_secs: 1,
        };
        let channel = TelegramChannel::new(&config);
        assert!(channel.is_authorized(42));
        assert!(!channel.is_authorized(99));
    }

    #[test]
    fn test_empty_allowlist_blocks_everyone() {
        let channel = TelegramChannel::new(&redclaw_core::config::TelegramConfig::default());
        assert!(!channel.is_authorized(1));
    }

    #[test]
    fn test_chunk_message_short_passthrough() {
        assert_eq!(chunk_message("hello", 4096), vec!["hello"]);
    }

    #[test]
    fn test_chunk_message_splits_on_lines() {
        let text = format!("{}\n{}\n{}", "a".repeat(60), "b".repeat(60), "c".repeat(60));
        let chunks = chunk_message(&text, 100);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.len() <= 100));
        assert_eq!(chunks.join(""), text);
    }

    #[test]
    fn test_chunk_message_hard_splits_long_line() {
        let text = "x".repeat(250);
        let chunks = chunk_message(&text, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_get_file_response_parses() {
        let body: TelegramApiResponse<TelegramFile> = serde_json::from_str(
            r#"{"ok": true, "result": {"file_id": "abc", "file_path": "documents/file_1.pdf"}}"#,
        )
        .unwrap();
        let file = body.result.unwrap();
        assert_eq!(file.file_id, "abc");
        assert_eq!(file.file_path.as_deref(), Some("documents/file_1.pdf"));

        let pending: TelegramApiResponse<TelegramFile> =
            serde_json::from_str(r#"{"ok": true, "result": {"file_id": "abc"}}"#).unwrap();
        assert!(pending.result.unwrap().file_path.is_none());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename("report v2.pdf"), "report_v2.pdf");
    }
}
