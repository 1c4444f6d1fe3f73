//! Offer/answer signaling for the real-time transcription session
//!
//! Exchanges a local session offer for a remote answer in two strictly
//! sequential requests: fetch a short-lived credential from the
//! credential endpoint, then post the offer to the real-time negotiation
//! endpoint with that credential as bearer auth. No retries; the caller
//! decides whether to start over.

use crate::config::SignalingConfig;
use crate::error::SignalingError;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;
use zeroize::Zeroize;

/// Exchanges a local offer for a remote answer
#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(&self, local_offer: &str, language: &str)
        -> Result<String, SignalingError>;
}

/// Credential endpoint response
#[derive(Debug, Deserialize)]
struct CredentialResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

/// HTTP signaling client for the credential and negotiation endpoints
pub struct SignalingClient {
    http: reqwest::Client,
    credential_url: String,
    realtime_url: String,
}

impl SignalingClient {
    pub fn new(config: &SignalingConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client for SignalingClient")?;

        Ok(Self {
            http,
            credential_url: config.credential_url.clone(),
            realtime_url: config.realtime_url.clone(),
        })
    }

    /// Request a short-lived credential for one transcription session
    async fn fetch_credential(&self, language: &str) -> Result<String, SignalingError> {
        let url = credential_url(&self.credential_url, language)
            .map_err(|e| SignalingError::Credential(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SignalingError::Credential(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SignalingError::Credential(format!(
                "credential endpoint returned {}",
                response.status()
            )));
        }

        let credential: CredentialResponse = response
            .json()
            .await
            .map_err(|e| SignalingError::Credential(format!("invalid credential payload: {}", e)))?;

        debug!("Ephemeral credential issued");
        Ok(credential.client_secret.value)
    }
}

#[async_trait]
impl Negotiator for SignalingClient {
    /// Exchange `local_offer` for the remote answer.
    ///
    /// The negotiation request is never issued without a credential from
    /// the first request; a dangling unauthorized negotiation would
    /// otherwise be leaked upstream.
    #[instrument(skip(self, local_offer), fields(offer_len = local_offer.len()))]
    async fn negotiate(
        &self,
        local_offer: &str,
        language: &str,
    ) -> Result<String, SignalingError> {
        let mut credential = self.fetch_credential(language).await?;

        let url = negotiation_url(&self.realtime_url)
            .map_err(|e| SignalingError::Negotiation(e.to_string()))?;

        let result = self
            .http
            .post(url)
            .bearer_auth(&credential)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(local_offer.to_owned())
            .send()
            .await;
        credential.zeroize();

        let response = result.map_err(|e| SignalingError::Negotiation(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SignalingError::Negotiation(format!(
                "negotiation endpoint returned {}",
                response.status()
            )));
        }

        let answer = response
            .text()
            .await
            .map_err(|e| SignalingError::Negotiation(e.to_string()))?;

        info!("Remote answer received");
        Ok(answer)
    }
}

/// Build the credential request URL with the language query parameter
fn credential_url(base: &str, language: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(base, &[("lang", language)])
}

/// Build the negotiation URL with the transcription intent
fn negotiation_url(base: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(base, &[("intent", "translations")])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_url_encodes_language() {
        let url = credential_url("http://localhost:4321/api/ephemeralKey", "he").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4321/api/ephemeralKey?lang=he"
        );
    }

    #[test]
    fn test_negotiation_url_carries_intent() {
        let url = negotiation_url("https://api.openai.com/v1/realtime").unwrap();
        assert_eq!(url.as_str(), "https://api.openai.com/v1/realtime?intent=translations");
    }

    #[test]
    fn test_credential_response_deserialization() {
        let json = r#"{
            "id": "sess_123",
            "client_secret": { "value": "ek_abc", "expires_at": 1735000000 },
            "input_audio_transcription": { "model": "whisper-1", "language": "he" }
        }"#;
        let parsed: CredentialResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.client_secret.value, "ek_abc");
    }
}
