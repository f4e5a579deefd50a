use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::caption::{display_len, split_message, truncate_units, CAPTION_LIMIT, MESSAGE_LIMIT};
use crate::media::DownloadedImage;
use crate::storage::RecipientId;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Identifier of a message posted to the broadcast target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle(pub i64);

/// Outbound messaging transport.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Post a captioned image to the broadcast target.
    async fn publish(&self, target: &str, caption: &str, image: &DownloadedImage) -> Result<MessageHandle>;

    /// Send a short text message to one recipient.
    async fn notify(&self, recipient: RecipientId, text: &str) -> Result<()>;

    /// Send text of any length, split into ordered chunks the platform accepts.
    async fn send_text(&self, recipient: RecipientId, text: &str) -> Result<()> {
        for chunk in split_message(text, MESSAGE_LIMIT) {
            self.notify(recipient, &chunk).await?;
        }
        Ok(())
    }
}

/// Bot API client speaking HTML parse mode.
pub struct TelegramPublisher {
    api_base: String,
    token: String,
    client: reqwest::Client,
}

impl TelegramPublisher {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: RecipientId,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

async fn read_response(method: &str, response: reqwest::Response) -> Result<Option<SentMessage>> {
    let status = response.status();
    let body: ApiResponse = response
        .json()
        .await
        .with_context(|| format!("{}: failed to parse API response ({})", method, status))?;
    if !status.is_success() || !body.ok {
        anyhow::bail!(
            "{} failed with status {}: {}",
            method,
            status,
            body.description.unwrap_or_default()
        );
    }
    Ok(body.result)
}

/// Captions over the platform limit are rejected outright, so clip as a last resort.
fn clip_caption(caption: &str) -> String {
    if display_len(caption) > CAPTION_LIMIT {
        format!("{}...", truncate_units(caption, CAPTION_LIMIT - 3))
    } else {
        caption.to_string()
    }
}

#[async_trait::async_trait]
impl Publisher for TelegramPublisher {
    async fn publish(&self, target: &str, caption: &str, image: &DownloadedImage) -> Result<MessageHandle> {
        let photo = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)
            .context("invalid image content type")?;
        let form = Form::new()
            .text("chat_id", target.to_string())
            .text("caption", clip_caption(caption))
            .text("parse_mode", "HTML")
            .part("photo", photo);

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .context("sendPhoto request failed")?;

        let sent = read_response("sendPhoto", response)
            .await?
            .context("sendPhoto response has no message")?;
        info!("published message {} to {}", sent.message_id, target);
        Ok(MessageHandle(sent.message_id))
    }

    async fn notify(&self, recipient: RecipientId, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage {
                chat_id: recipient,
                text,
                parse_mode: "HTML",
            })
            .send()
            .await
            .context("sendMessage request failed")?;
        read_response("sendMessage", response).await?;
        debug!("sent message to {}", recipient);
        Ok(())
    }
}
