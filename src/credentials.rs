//! Credential storage for the Telegram side of the relay
//!
//! Two opaque string slots (bot token and chat id) persisted under stable
//! key names. Values are never validated here; the Telegram API is the judge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Storage key for the Telegram bot token
pub const BOT_TOKEN_KEY: &str = "telegram_bot_token";
/// Storage key for the Telegram chat id
pub const CHAT_ID_KEY: &str = "telegram_chat_id";

/// Errors that can occur during credential storage operations
#[derive(Error, Debug)]
pub enum CredentialStoreError {
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Telegram credentials supplied by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bot API token
    pub bot_token: String,
    /// Target chat identifier
    pub chat_id: String,
}

impl Credentials {
    /// Both fields are filled in
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

/// Interface for key/value credential storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read a slot
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialStoreError>;
    /// Write a slot
    async fn set(&self, key: &str, value: &str) -> Result<(), CredentialStoreError>;
}

/// Load both credential slots, treating absent slots as empty.
///
/// # Errors
///
/// Propagates any storage error.
pub async fn load_credentials(
    store: &dyn CredentialStore,
) -> Result<Credentials, CredentialStoreError> {
    Ok(Credentials {
        bot_token: store.get(BOT_TOKEN_KEY).await?.unwrap_or_default(),
        chat_id: store.get(CHAT_ID_KEY).await?.unwrap_or_default(),
    })
}

/// Credentials kept in a JSON file on disk.
///
/// The whole file is rewritten on every `set`.
pub struct FileCredentialStore {
    path: PathBuf,
    slots: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileCredentialStore {
    /// Create a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slots: Mutex::new(None),
        }
    }

    async fn read_slots(&self) -> Result<BTreeMap<String, String>, CredentialStoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Credential file not found, starting empty");
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialStoreError> {
        let mut guard = self.slots.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_slots().await?);
        }
        Ok(guard.as_ref().and_then(|slots| slots.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CredentialStoreError> {
        let mut guard = self.slots.lock().await;
        let mut slots = match guard.take() {
            Some(slots) => slots,
            None => self.read_slots().await?,
        };
        slots.insert(key.to_string(), value.to_string());

        let json = serde_json::to_vec_pretty(&slots)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let write_result = tokio::fs::write(&self.path, json).await;
        *guard = Some(slots);
        write_result?;

        info!(key, path = %self.path.display(), "Credential slot saved");
        Ok(())
    }
}

/// Credentials kept only in memory, for tests and throwaway sessions
#[derive(Default)]
pub struct MemoryCredentialStore {
    slots: Mutex<BTreeMap<String, String>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialStoreError> {
        Ok(self.slots.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CredentialStoreError> {
        self.slots
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
