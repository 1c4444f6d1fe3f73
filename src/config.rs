//! Application configuration
//!
//! Loads the embedded config.toml carrying endpoint URLs and recording
//! defaults.

use anyhow::Context;
use serde::Deserialize;

/// Application configuration
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub signaling: SignalingConfig,
    pub translation: TranslationConfig,
    pub recording: RecordingConfig,
}

/// Endpoints for the offer/answer exchange
#[derive(Debug, Deserialize)]
pub struct SignalingConfig {
    /// Ephemeral-credential issuance endpoint
    pub credential_url: String,
    /// Third-party real-time negotiation endpoint
    pub realtime_url: String,
}

/// Translation proxy settings
#[derive(Debug, Deserialize)]
pub struct TranslationConfig {
    pub url: String,
    /// Whether completed segments are translated by default
    pub enabled: bool,
}

/// Recording defaults
#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    /// Default transcription language code (e.g. "he", "en")
    pub language: String,
}

/// Load configuration from embedded config.toml
pub fn load() -> anyhow::Result<AppConfig> {
    const CONFIG_TOML: &str = include_str!("../config.toml");
    toml::from_str(CONFIG_TOML).context("Failed to parse embedded config.toml")
}
