//! Translation proxy client
//!
//! Translates one completed transcript segment at a time. Failures here
//! are non-fatal to a recording; the assembler falls back to the raw
//! segment text.

use crate::config::TranslationConfig;
use crate::error::TranslationError;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;
use url::Url;

/// Translates one segment from a source language
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
    ) -> Result<String, TranslationError>;
}

/// Translation endpoint response
#[derive(Debug, Deserialize)]
struct TranslationResponse {
    translations: Vec<String>,
}

/// HTTP client for the translation proxy endpoint
pub struct TranslationClient {
    http: reqwest::Client,
    url: String,
}

impl TranslationClient {
    pub fn new(config: &TranslationConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client for TranslationClient")?;

        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl Translator for TranslationClient {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
    ) -> Result<String, TranslationError> {
        let url = translation_url(&self.url, text, source_language)
            .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(TranslationError::Endpoint { status, message });
        }

        let body: TranslationResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;

        // The endpoint may return several candidates; only the first is used.
        body.translations
            .into_iter()
            .next()
            .ok_or(TranslationError::Empty)
    }
}

/// Build the translation request URL
fn translation_url(base: &str, text: &str, from: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(base, &[("text", text), ("from", from)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_url_encodes_query() {
        let url = translation_url("http://localhost:4321/api/translate", "hello world", "he")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4321/api/translate?text=hello+world&from=he"
        );
    }

    #[test]
    fn test_translation_response_uses_first_candidate() {
        let json = r#"{ "translations": ["Hello", "Hi"] }"#;
        let parsed: TranslationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.translations.first().unwrap(), "Hello");
    }

    #[test]
    fn test_empty_translations_rejected() {
        let json = r#"{ "translations": [] }"#;
        let parsed: TranslationResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.translations.is_empty());
    }
}
