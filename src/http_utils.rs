//! HTTP helpers shared by the Gemini and Telegram clients
//!
//! Client construction, JSON request sending and upstream error cleanup.

use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Errors from a JSON request/response exchange
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request never produced a response
    #[error("Network error: {0}")]
    Network(String),
    /// Non-success status, with the cleaned-up upstream message
    #[error("{0}")]
    Status(String),
    /// The response body was not the expected JSON
    #[error("Invalid response JSON: {0}")]
    Json(String),
}

/// Creates an HTTP client with the given request timeout.
///
/// Without a timeout a stalled upstream would block the workflow forever.
#[must_use]
pub fn create_http_client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends a JSON POST request and decodes the JSON response.
///
/// # Errors
///
/// Returns `HttpError::Network` on connectivity issues, `HttpError::Status`
/// on non-success status codes, or `HttpError::Json` for an undecodable body.
pub async fn send_json_request<B, R>(
    client: &HttpClient,
    url: &str,
    body: &B,
    extra_headers: &[(&str, &str)],
) -> Result<R, HttpError>
where
    B: Serialize + ?Sized + Sync,
    R: DeserializeOwned + Send,
{
    let mut request = client.post(url).json(body);
    for (key, value) in extra_headers {
        request = request.header(*key, *value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| HttpError::Network(e.without_url().to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(HttpError::Status(format_http_error(status, &error_text)));
    }

    response
        .json()
        .await
        .map_err(|e| HttpError::Json(e.to_string()))
}

/// Turns a failed response into a readable message.
///
/// Google APIs wrap failures as `{"error": {"message": ...}}`; that message
/// is used verbatim. HTML proxy pages are dropped and long bodies truncated.
pub fn format_http_error(status: StatusCode, body: &str) -> String {
    if let Some(message) = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(serde_json::Value::as_str)
    {
        return message.to_string();
    }

    let trimmed = body.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return format!("API error: {status} (Server returned HTML error page)");
    }
    if trimmed.is_empty() {
        return format!("API error: {status}");
    }

    let truncated = if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        let head: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{head}... (truncated)")
    } else {
        trimmed.to_string()
    };
    format!("API error: {status} - {truncated}")
}
