use crate::config::Settings;
use crate::generation::{
    extract_image, GenerateContentRequest, GenerateContentResponse, GeneratedArtifact,
    GenerationError, ImageGenerator, Part,
};
use crate::http_utils::{create_http_client, send_json_request};
use crate::transcoder;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Image generation backed by Google Gemini.
///
/// The API key is checked once at construction, so an instance always holds
/// a usable key.
pub struct GeminiImageClient {
    http_client: HttpClient,
    api_key: String,
    model: String,
    api_base: String,
}

impl std::fmt::Debug for GeminiImageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiImageClient")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl GeminiImageClient {
    /// Create a client for `model` at `api_base`.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::MissingCredential` if `api_key` is absent or blank.
    pub fn new(
        api_key: Option<&str>,
        model: impl Into<String>,
        api_base: impl Into<String>,
        http_client: HttpClient,
    ) -> Result<Self, GenerationError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(GenerationError::MissingCredential)?;

        Ok(Self {
            http_client,
            api_key: api_key.to_string(),
            model: model.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from application settings.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::MissingCredential` if no key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, GenerationError> {
        Self::new(
            settings.gemini_api_key(),
            settings.gemini_model.clone(),
            settings.gemini_api_base.clone(),
            create_http_client(Duration::from_secs(settings.http_timeout_secs)),
        )
    }

    /// Model identifier used in requests
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    async fn request_image(&self, parts: Vec<Part>) -> Result<GeneratedArtifact, GenerationError> {
        let body = GenerateContentRequest::single_turn(parts);
        let response: GenerateContentResponse = send_json_request(
            &self.http_client,
            &self.endpoint_url(),
            &body,
            &[("x-goog-api-key", self.api_key.as_str())],
        )
        .await
        .map_err(|e| GenerationError::Service(e.to_string()))?;

        debug!(
            candidates = response.candidates.len(),
            "Received generateContent response"
        );
        extract_image(&response)
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageClient {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<GeneratedArtifact, GenerationError> {
        info!("Requesting image generation");
        self.request_image(vec![Part::text(prompt)]).await
    }

    #[instrument(skip(self, prompt, source_encoded), fields(model = %self.model))]
    async fn edit(
        &self,
        prompt: &str,
        source_encoded: &str,
        source_mime: &str,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let (bytes, embedded_mime) = transcoder::decode(source_encoded)?;
        let mime_type = if source_mime.is_empty() {
            embedded_mime
        } else {
            source_mime.to_string()
        };

        info!(source_size = bytes.len(), "Requesting image edit");
        self.request_image(vec![
            Part::inline(mime_type, BASE64.encode(&bytes)),
            Part::text(prompt),
        ])
        .await
    }
}
