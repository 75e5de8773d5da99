//! Gemini `generateContent` wire types.

use serde::{Deserialize, Serialize};

/// Content container used in both requests and responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    /// Author role, omitted for single-turn requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Ordered content fragments
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One content fragment.
///
/// Variant order matters for untagged decoding: parts the relay does not
/// understand (thought signatures, function calls) land in `Other`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    /// Plain text
    Text {
        /// Text content
        text: String,
    },
    /// Inline binary payload
    InlineData {
        /// Payload and its MIME type
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
    /// Anything else
    Other(serde_json::Value),
}

impl Part {
    /// Text part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Inline data part from an already base64-encoded payload
    #[must_use]
    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }
}

/// Base64 inline payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    /// MIME type of the payload
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

/// Generation options
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Requested output modalities
    pub response_modalities: Vec<String>,
}

impl GenerationConfig {
    /// Ask for an image (text is allowed alongside, as the image models require)
    #[must_use]
    pub fn image_output() -> Self {
        Self {
            response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
        }
    }
}

/// Top-level `generateContent` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation contents, a single user turn here
    pub contents: Vec<Content>,
    /// Output options
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    /// Single-turn request with image output
    #[must_use]
    pub fn single_turn(parts: Vec<Part>) -> Self {
        Self {
            contents: vec![Content { role: None, parts }],
            generation_config: GenerationConfig::image_output(),
        }
    }
}

/// Top-level `generateContent` response envelope
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidate completions, in service order
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Present when the prompt itself was rejected
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// First text fragment across all candidates
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .find_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
    }
}

/// Candidate completion
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Missing when the candidate was filtered
    #[serde(default)]
    pub content: Option<Content>,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Prompt-level feedback
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Set when the prompt was blocked
    #[serde(default)]
    pub block_reason: Option<String>,
}
