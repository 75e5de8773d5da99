//! Binary transcoding between files, raw bytes and data URIs.
//!
//! A data URI here always has the shape `data:<mime>;base64,<payload>`.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;
use tracing::debug;

const DATA_URI_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// Fallback MIME type when neither the caller nor the extension provides one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Errors produced while encoding or decoding binary payloads
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The source file could not be read
    #[error("Failed to read file {path}: {source}")]
    Read {
        /// Path that was being read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The input is not a `data:<mime>;base64,<payload>` string
    #[error("Malformed data URI: {0}")]
    MalformedEncoding(String),
}

/// An image supplied by the user, held in its inline representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// Data URI carrying MIME type and payload
    pub encoded: String,
    /// File name shown to the user
    pub display_name: String,
    /// MIME type of the payload
    pub mime_type: String,
}

/// Build a data URI from raw bytes and a MIME type.
#[must_use]
pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> String {
    format!(
        "{DATA_URI_SCHEME}{mime_type}{BASE64_MARKER}{}",
        BASE64.encode(bytes)
    )
}

/// Read a file and convert it into a [`SourceImage`].
///
/// `reported_mime` is the type reported by the file input, if any. Without it
/// the type is guessed from the file extension.
///
/// # Errors
///
/// Returns `TranscodeError::Read` if the file cannot be read.
pub async fn encode(path: &Path, reported_mime: Option<&str>) -> Result<SourceImage, TranscodeError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| TranscodeError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let mime_type = reported_mime
        .filter(|m| !m.trim().is_empty())
        .map(ToString::to_string)
        .or_else(|| mime_guess::from_path(path).first_raw().map(ToString::to_string))
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

    let display_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    debug!(
        file = %display_name,
        mime_type = %mime_type,
        size = bytes.len(),
        "Encoded source image"
    );

    Ok(SourceImage {
        encoded: encode_bytes(&bytes, &mime_type),
        display_name,
        mime_type,
    })
}

/// Split a data URI into its decoded payload and MIME type.
///
/// # Errors
///
/// Returns `TranscodeError::MalformedEncoding` if the prefix, the base64
/// marker or the payload itself is invalid.
pub fn decode(data_uri: &str) -> Result<(Vec<u8>, String), TranscodeError> {
    let rest = data_uri
        .strip_prefix(DATA_URI_SCHEME)
        .ok_or_else(|| TranscodeError::MalformedEncoding("missing data: prefix".to_string()))?;

    let (mime_type, payload) = rest
        .split_once(BASE64_MARKER)
        .ok_or_else(|| TranscodeError::MalformedEncoding("missing ;base64, marker".to_string()))?;

    if mime_type.is_empty() {
        return Err(TranscodeError::MalformedEncoding(
            "missing MIME type".to_string(),
        ));
    }

    let bytes = BASE64
        .decode(payload)
        .map_err(|e| TranscodeError::MalformedEncoding(format!("invalid base64 payload: {e}")))?;

    Ok((bytes, mime_type.to_string()))
}
