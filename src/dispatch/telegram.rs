use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{DispatchError, PhotoDispatcher};
use crate::config::Settings;
use crate::generation::GeneratedArtifact;
use crate::http_utils::create_http_client;

/// File name attached to every uploaded photo
pub const PHOTO_FILE_NAME: &str = "generated-image.png";

/// Telegram caps photo captions at 1024 characters.
const MAX_CAPTION_CHARS: usize = 1024;

/// Sends photos through the Telegram Bot API `sendPhoto` method.
pub struct TelegramDispatcher {
    client: Client,
    api_base: String,
}

/// Envelope returned by every Bot API method
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramDispatcher {
    /// Create a dispatcher talking to `api_base` (e.g. `https://api.telegram.org`).
    #[must_use]
    pub fn new(api_base: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a dispatcher from application settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.telegram_api_base.clone(),
            create_http_client(Duration::from_secs(settings.http_timeout_secs)),
        )
    }

    fn endpoint_url(&self, bot_token: &str) -> String {
        format!("{}/bot{bot_token}/sendPhoto", self.api_base)
    }
}

fn truncate_caption(caption: &str) -> String {
    if caption.chars().count() > MAX_CAPTION_CHARS {
        caption.chars().take(MAX_CAPTION_CHARS).collect()
    } else {
        caption.to_string()
    }
}

/// Pick the service-provided description, falling back to the HTTP status.
fn failure_description(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<TelegramResponse>(body)
        .ok()
        .and_then(|r| r.description)
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

#[async_trait]
impl PhotoDispatcher for TelegramDispatcher {
    #[instrument(skip(self, bot_token, artifact, caption))]
    async fn send_photo(
        &self,
        bot_token: &str,
        chat_id: &str,
        artifact: &GeneratedArtifact,
        caption: &str,
    ) -> Result<(), DispatchError> {
        let (bytes, mime_type) = artifact.decode()?;
        let size = bytes.len();

        let photo = Part::bytes(bytes)
            .file_name(PHOTO_FILE_NAME)
            .mime_str(&mime_type)
            .map_err(|e| DispatchError::Service(format!("invalid image type {mime_type}: {e}")))?;

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", photo)
            .text("caption", truncate_caption(caption));

        let response = self
            .client
            .post(self.endpoint_url(bot_token))
            .multipart(form)
            .send()
            .await
            // The URL embeds the bot token; keep it out of the message
            .map_err(|e| DispatchError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let description = failure_description(status, &body);
            warn!(%status, %description, "Telegram rejected photo");
            return Err(DispatchError::Service(description));
        }

        if let Ok(envelope) = serde_json::from_str::<TelegramResponse>(&body) {
            if !envelope.ok {
                let description = envelope
                    .description
                    .unwrap_or_else(|| "Telegram reported failure".to_string());
                warn!(%description, "Telegram returned ok=false");
                return Err(DispatchError::Service(description));
            }
        }

        info!(size, "Photo sent to Telegram");
        Ok(())
    }
}
