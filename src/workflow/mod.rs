//! Request orchestration
//!
//! The controller sequences the generation and dispatch clients, owns the
//! current request state and exposes the user-triggered actions. Every
//! failure is recorded as an [`OperationStatus::Failure`] before being
//! returned, so presentation layers can simply render the snapshot.
//!
//! Entry into Generate and Send is guarded by the phase: a second request
//! while one is in flight is rejected with [`WorkflowError::AlreadyInProgress`].
//! The phase returns to idle when the request finishes or its future is
//! dropped.

mod state;
#[cfg(test)]
mod tests;

pub use state::{OperationStatus, Phase, WorkflowSnapshot};

use std::path::Path;
use std::sync::{Arc, PoisonError};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Settings;
use crate::credentials::{
    load_credentials, CredentialStore, CredentialStoreError, FileCredentialStore, BOT_TOKEN_KEY,
    CHAT_ID_KEY,
};
use crate::dispatch::{DispatchError, PhotoDispatcher, TelegramDispatcher};
use crate::generation::{
    GeminiImageClient, GeneratedArtifact, GenerationError, ImageGenerator,
    MISSING_API_KEY_MESSAGE,
};
use crate::transcoder::{self, SourceImage, TranscodeError};
use state::WorkflowState;

/// Validation message for an empty prompt
pub const PROMPT_REQUIRED: &str = "prompt required";
/// Validation message for Send without a generated image
pub const NOTHING_TO_SEND: &str = "nothing to send";
/// Validation message for Send without bot token or chat id
pub const CREDENTIALS_REQUIRED: &str = "credentials required";
/// Status message after a successful upload
pub const SEND_SUCCESS_MESSAGE: &str = "Image sent to Telegram successfully!";

/// Errors surfaced by workflow actions
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A local precondition failed; nothing reached the network
    #[error("{0}")]
    Validation(&'static str),
    /// Another request is still running
    #[error("Another request is already in progress ({0})")]
    AlreadyInProgress(Phase),
    /// Generation failed
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Upload failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The source image could not be loaded
    #[error("Failed to load image: {0}")]
    Transcode(#[from] TranscodeError),
    /// Credentials could not be persisted
    #[error("Failed to save credentials: {0}")]
    Storage(#[from] CredentialStoreError),
}

/// Orchestrates Generate and Send over shared request state.
pub struct WorkflowController {
    generator: Option<Arc<dyn ImageGenerator>>,
    dispatcher: Arc<dyn PhotoDispatcher>,
    store: Arc<dyn CredentialStore>,
    state: Mutex<WorkflowState>,
    /// Never held across an await, so it can be reset from `Drop`
    phase: std::sync::Mutex<Phase>,
}

/// Holds the controller in a busy phase until dropped
struct PhaseGuard<'a> {
    cell: &'a std::sync::Mutex<Phase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(cell: &'a std::sync::Mutex<Phase>, phase: Phase) -> Self {
        *cell.lock().unwrap_or_else(PoisonError::into_inner) = phase;
        Self { cell }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.cell.lock().unwrap_or_else(PoisonError::into_inner) = Phase::Idle;
    }
}

impl WorkflowController {
    /// Create a controller and load persisted credentials.
    ///
    /// `generator` is `None` when the generation service is not configured;
    /// Generate then fails locally and [`Self::configuration_warning`] reports
    /// the problem.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Storage` if the credential store cannot be read.
    pub async fn new(
        generator: Option<Arc<dyn ImageGenerator>>,
        dispatcher: Arc<dyn PhotoDispatcher>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, WorkflowError> {
        let credentials = load_credentials(store.as_ref()).await?;
        info!(
            has_bot_token = !credentials.bot_token.is_empty(),
            has_chat_id = !credentials.chat_id.is_empty(),
            generation_enabled = generator.is_some(),
            "Workflow initialized"
        );

        Ok(Self {
            generator,
            dispatcher,
            store,
            state: Mutex::new(WorkflowState {
                credentials,
                ..WorkflowState::default()
            }),
            phase: std::sync::Mutex::new(Phase::Idle),
        })
    }

    /// Wire Gemini, Telegram and the file credential store from settings.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Storage` if the credential file is unreadable.
    pub async fn from_settings(settings: &Settings) -> Result<Self, WorkflowError> {
        let generator: Option<Arc<dyn ImageGenerator>> =
            match GeminiImageClient::from_settings(settings) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "Image generation disabled");
                    None
                }
            };

        Self::new(
            generator,
            Arc::new(TelegramDispatcher::from_settings(settings)),
            Arc::new(FileCredentialStore::new(settings.credentials_path.clone())),
        )
        .await
    }

    /// Persistent warning when the generation service key is missing
    #[must_use]
    pub fn configuration_warning(&self) -> Option<&'static str> {
        self.generator.is_none().then_some(MISSING_API_KEY_MESSAGE)
    }

    /// Current state for rendering
    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let state = self.state.lock().await;
        WorkflowSnapshot {
            phase: self.current_phase(),
            prompt: state.prompt.clone(),
            source: state.source.clone(),
            artifact: state.artifact.clone(),
            status: state.status.clone(),
            credentials: state.credentials.clone(),
            reveal_credentials: state.reveal_credentials,
            configuration_warning: self.configuration_warning(),
        }
    }

    fn current_phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callers hold the state lock so the check and a following
    /// [`PhaseGuard::enter`] cannot interleave with another action.
    fn ensure_idle(&self) -> Result<(), WorkflowError> {
        match self.current_phase() {
            Phase::Idle => Ok(()),
            busy => Err(WorkflowError::AlreadyInProgress(busy)),
        }
    }

    /// Replace the prompt text
    pub async fn set_prompt(&self, prompt: impl Into<String>) {
        self.state.lock().await.prompt = prompt.into();
    }

    /// Update the bot token and persist it immediately.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Storage` if the value could not be written.
    pub async fn set_bot_token(&self, bot_token: &str) -> Result<(), WorkflowError> {
        self.state.lock().await.credentials.bot_token = bot_token.to_string();
        self.persist(BOT_TOKEN_KEY, bot_token).await
    }

    /// Update the chat id and persist it immediately.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Storage` if the value could not be written.
    pub async fn set_chat_id(&self, chat_id: &str) -> Result<(), WorkflowError> {
        self.state.lock().await.credentials.chat_id = chat_id.to_string();
        self.persist(CHAT_ID_KEY, chat_id).await
    }

    async fn persist(&self, key: &str, value: &str) -> Result<(), WorkflowError> {
        if let Err(e) = self.store.set(key, value).await {
            warn!(key, error = %e, "Failed to persist credential");
            let err = WorkflowError::from(e);
            self.state.lock().await.status = Some(OperationStatus::Failure(err.to_string()));
            return Err(err);
        }
        Ok(())
    }

    /// Read and lower the request to show credential entry
    pub async fn take_credentials_reveal(&self) -> bool {
        std::mem::take(&mut self.state.lock().await.reveal_credentials)
    }

    /// Forget the last operation outcome. Dismissing twice is a no-op.
    pub async fn dismiss_status(&self) {
        self.state.lock().await.status = None;
    }

    /// Use `image` as the edit source. Any generated image is discarded.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::AlreadyInProgress` while a request is running.
    pub async fn set_source_image(&self, image: SourceImage) -> Result<(), WorkflowError> {
        let mut state = self.state.lock().await;
        self.ensure_idle()?;
        info!(file = %image.display_name, mime_type = %image.mime_type, "Source image set");
        state.source = Some(image);
        state.clear_artifact();
        Ok(())
    }

    /// Drop the edit source. Any generated image is discarded.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::AlreadyInProgress` while a request is running.
    pub async fn clear_source_image(&self) -> Result<(), WorkflowError> {
        let mut state = self.state.lock().await;
        self.ensure_idle()?;
        state.source = None;
        state.clear_artifact();
        Ok(())
    }

    /// Read a file from disk and use it as the edit source.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Transcode` if the file cannot be read, or
    /// `WorkflowError::AlreadyInProgress` while a request is running.
    pub async fn load_source_image(
        &self,
        path: &Path,
        reported_mime: Option<&str>,
    ) -> Result<(), WorkflowError> {
        match transcoder::encode(path, reported_mime).await {
            Ok(image) => self.set_source_image(image).await,
            Err(e) => {
                let err = WorkflowError::from(e);
                self.state.lock().await.status = Some(OperationStatus::Failure(err.to_string()));
                Err(err)
            }
        }
    }

    /// Generate a new image, or edit the source image if one is set.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Validation` for an empty prompt,
    /// `WorkflowError::AlreadyInProgress` while another request runs, or the
    /// generation failure. Failures are also recorded in the status.
    pub async fn on_generate(&self) -> Result<(), WorkflowError> {
        let (busy, prompt, source) = {
            let mut state = self.state.lock().await;
            self.ensure_idle()?;

            if state.prompt.trim().is_empty() {
                return Err(record_failure(&mut state, WorkflowError::Validation(PROMPT_REQUIRED)));
            }

            let busy = PhaseGuard::enter(&self.phase, Phase::Generating);
            state.clear_artifact();
            state.status = None;
            (busy, state.prompt.clone(), state.source.clone())
        };

        info!(edit = source.is_some(), "Generation started");
        let outcome = self.run_generation(&prompt, source.as_ref()).await;

        let mut state = self.state.lock().await;
        drop(busy);
        match outcome {
            Ok(artifact) => {
                info!("Generation finished");
                state.artifact = Some(artifact);
                state.artifact_prompt = Some(prompt);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Generation failed");
                Err(record_failure(&mut state, e.into()))
            }
        }
    }

    async fn run_generation(
        &self,
        prompt: &str,
        source: Option<&SourceImage>,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or(GenerationError::MissingCredential)?;

        match source {
            Some(image) => {
                generator
                    .edit(prompt, &image.encoded, &image.mime_type)
                    .await
            }
            None => generator.generate(prompt).await,
        }
    }

    /// Send the generated image to the configured Telegram chat.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Validation` when there is nothing to send or
    /// credentials are incomplete (the latter also raises the reveal flag),
    /// `WorkflowError::AlreadyInProgress` while another request runs, or the
    /// dispatch failure. Failures are also recorded in the status.
    pub async fn on_send(&self) -> Result<(), WorkflowError> {
        let (busy, credentials, artifact, caption) = {
            let mut state = self.state.lock().await;
            self.ensure_idle()?;

            let Some(artifact) = state.artifact.clone() else {
                return Err(record_failure(&mut state, WorkflowError::Validation(NOTHING_TO_SEND)));
            };
            if !state.credentials.is_complete() {
                state.reveal_credentials = true;
                return Err(record_failure(
                    &mut state,
                    WorkflowError::Validation(CREDENTIALS_REQUIRED),
                ));
            }

            let busy = PhaseGuard::enter(&self.phase, Phase::Sending);
            state.status = None;
            let caption = state
                .artifact_prompt
                .clone()
                .unwrap_or_else(|| state.prompt.clone());
            (busy, state.credentials.clone(), artifact, caption)
        };

        info!(chat_id = %credentials.chat_id, "Sending started");
        let outcome = self
            .dispatcher
            .send_photo(
                credentials.bot_token.trim(),
                credentials.chat_id.trim(),
                &artifact,
                &caption,
            )
            .await;

        let mut state = self.state.lock().await;
        drop(busy);
        match outcome {
            Ok(()) => {
                state.status = Some(OperationStatus::Success(SEND_SUCCESS_MESSAGE.to_string()));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Sending failed");
                Err(record_failure(&mut state, e.into()))
            }
        }
    }
}

fn record_failure(state: &mut WorkflowState, err: WorkflowError) -> WorkflowError {
    state.status = Some(OperationStatus::Failure(err.to_string()));
    err
}
