//! Delivery of generated images to a chat
//!
//! Contains the dispatcher interface and its Telegram Bot API implementation.

mod telegram;

pub use telegram::{TelegramDispatcher, PHOTO_FILE_NAME};

use crate::generation::GeneratedArtifact;
use crate::transcoder::TranscodeError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while sending a photo
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The service rejected the upload; carries its description
    #[error("Failed to send image to Telegram: {0}")]
    Service(String),
    /// The request never produced a response
    #[error("Failed to send image to Telegram: network error: {0}")]
    Network(String),
    /// The artifact could not be decoded for upload
    #[error("Failed to send image to Telegram: {0}")]
    Transcode(#[from] TranscodeError),
}

/// Interface for photo delivery backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PhotoDispatcher: Send + Sync {
    /// Upload `artifact` with `caption` to `chat_id` using `bot_token`.
    async fn send_photo(
        &self,
        bot_token: &str,
        chat_id: &str,
        artifact: &GeneratedArtifact,
        caption: &str,
    ) -> Result<(), DispatchError>;
}
