//! Image generation client
//!
//! Wraps the Gemini `generateContent` API in two modes: create from text and
//! edit from text plus a source image.

mod gemini;
mod types;

pub use gemini::GeminiImageClient;
pub use types::{
    Candidate, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    InlineData, Part, PromptFeedback,
};

use crate::transcoder::{self, TranscodeError};
use thiserror::Error;

/// Message shown when no Gemini key is configured
pub const MISSING_API_KEY_MESSAGE: &str =
    "Google AI API Key is not configured. Set GEMINI_API_KEY to enable image generation.";

/// Errors that can occur during image generation
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The Gemini key is absent; no request was made
    #[error("Google AI API Key is not configured. Set GEMINI_API_KEY to enable image generation.")]
    MissingCredential,
    /// The model answered without any inline image
    #[error("No image was returned by the model: {0}")]
    NoImageInResponse(String),
    /// Transport or service failure, carrying the upstream message
    #[error("Image generation failed: {0}")]
    Service(String),
    /// The source image could not be decoded
    #[error("Invalid source image: {0}")]
    Transcode(#[from] TranscodeError),
}

/// The single image produced by the most recent successful generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// Data URI of the generated image
    pub encoded: String,
}

impl GeneratedArtifact {
    /// Decode the artifact into raw bytes and MIME type.
    ///
    /// # Errors
    ///
    /// Returns `TranscodeError::MalformedEncoding` if the data URI is invalid.
    pub fn decode(&self) -> Result<(Vec<u8>, String), TranscodeError> {
        transcoder::decode(&self.encoded)
    }
}

/// Interface for image generation backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Create an image from a text prompt
    async fn generate(&self, prompt: &str) -> Result<GeneratedArtifact, GenerationError>;

    /// Edit a source image (given as a data URI) following a text prompt
    async fn edit(
        &self,
        prompt: &str,
        source_encoded: &str,
        source_mime: &str,
    ) -> Result<GeneratedArtifact, GenerationError>;
}

/// Pick the first inline-data part across all candidates and re-encode it.
///
/// # Errors
///
/// Returns `GenerationError::NoImageInResponse` when no candidate carries an
/// inline image.
pub fn extract_image(response: &GenerateContentResponse) -> Result<GeneratedArtifact, GenerationError> {
    let inline = response
        .candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .find_map(|part| match part {
            Part::InlineData { inline_data } => Some(inline_data),
            Part::Text { .. } | Part::Other(_) => None,
        });

    if let Some(inline) = inline {
        return Ok(GeneratedArtifact {
            encoded: format!("data:{};base64,{}", inline.mime_type, inline.data),
        });
    }

    let reason = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
        .map_or_else(
            || {
                response
                    .first_text()
                    .map_or_else(|| "try a different prompt".to_string(), ToString::to_string)
            },
            |reason| format!("prompt blocked ({reason})"),
        );

    Err(GenerationError::NoImageInResponse(reason))
}
