//! Data-channel messages from the transcription service
//!
//! Messages arrive as JSON over the peer data channel. Only the session
//! lifecycle and transcription events are modeled; everything else maps
//! to [`ServerEvent::Other`] and is ignored.

use serde::Deserialize;

/// One message received over the data channel
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// The remote transcription session is ready
    #[serde(rename = "transcription_session.created")]
    SessionCreated {
        #[serde(default)]
        session: Option<SessionInfo>,
    },

    /// Incremental transcript text for the segment in progress
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    Delta {
        #[serde(default)]
        delta: Option<String>,
        #[serde(default)]
        content_index: Option<u64>,
    },

    /// Final text for one completed segment
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    Completed {
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Any message type this client does not handle
    #[serde(other)]
    Other,
}

/// Remote session metadata carried by the created event
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl ServerEvent {
    /// Delta text, if this event carries any
    pub fn delta_text(&self) -> Option<&str> {
        match self {
            ServerEvent::Delta { delta: Some(d), .. } if !d.is_empty() => Some(d),
            _ => None,
        }
    }

    /// Completed segment text, if this event carries any
    pub fn completed_text(&self) -> Option<&str> {
        match self {
            ServerEvent::Completed {
                transcript: Some(t),
            } if !t.trim().is_empty() => Some(t),
            _ => None,
        }
    }
}
