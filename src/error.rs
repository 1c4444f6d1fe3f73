use thiserror::Error;

/// Errors from the offer/answer exchange with the credential and
/// negotiation endpoints.
///
/// The two variants mirror the two sequential requests: everything that
/// goes wrong before a credential is in hand is a `Credential` error,
/// everything after is a `Negotiation` error.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("credential request failed: {0}")]
    Credential(String),

    #[error("negotiation request failed: {0}")]
    Negotiation(String),
}

/// Errors from the translation proxy.
///
/// Translation failures are non-fatal to a recording; callers fall back
/// to the untranslated segment.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("translation endpoint returned {status}: {message}")]
    Endpoint { status: u16, message: String },

    #[error("invalid response from translation endpoint: {0}")]
    InvalidResponse(String),

    #[error("translation endpoint returned no translations")]
    Empty,
}
