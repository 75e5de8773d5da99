#![deny(missing_docs)]
//! Photo relay core library.
//!
//! Orchestrates Gemini image generation and forwards the result to a
//! Telegram chat as a photo.

/// Configuration management.
pub mod config;
/// Persistent Telegram credentials.
pub mod credentials;
/// Telegram photo upload.
pub mod dispatch;
/// Gemini image generation client.
pub mod generation;
/// Shared HTTP client helpers.
pub mod http_utils;
/// Data URI encoding and decoding.
pub mod transcoder;
/// Request orchestration state machine.
pub mod workflow;
