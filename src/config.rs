//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! service constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default Gemini model used for image generation and editing
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image-preview";
/// Default Gemini REST endpoint
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default Telegram Bot API endpoint
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
/// Default location of the persisted Telegram credentials
pub const DEFAULT_CREDENTIALS_PATH: &str = "photo-relay-credentials.json";
/// Default timeout for outbound HTTP calls
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

/// Application settings loaded from config files and environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Google AI (Gemini) API key
    pub gemini_api_key: Option<String>,

    /// Gemini model identifier
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Gemini REST base URL
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,

    /// Telegram Bot API base URL
    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,

    /// File holding the bot token and chat id between sessions
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// Timeout for outbound HTTP requests, in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_gemini_api_base() -> String {
    DEFAULT_GEMINI_API_BASE.to_string()
}

fn default_telegram_api_base() -> String {
    DEFAULT_TELEGRAM_API_BASE.to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from(DEFAULT_CREDENTIALS_PATH)
}

const fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: default_gemini_model(),
            gemini_api_base: default_gemini_api_base(),
            telegram_api_base: default_telegram_api_base(),
            credentials_path: default_credentials_path(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use photo_relay::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg. `APP__GEMINI_MODEL=... ./photo-relay`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain env vars; empty values are treated as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Google tooling commonly exports GOOGLE_API_KEY instead
        if settings.gemini_api_key.is_none() {
            if let Ok(val) = std::env::var("GOOGLE_API_KEY") {
                if !val.is_empty() {
                    settings.gemini_api_key = Some(val);
                }
            }
        }

        Ok(settings)
    }

    /// Returns the Gemini key if it is present and not blank
    #[must_use]
    pub fn gemini_api_key(&self) -> Option<&str> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
