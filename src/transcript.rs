//! Transcript assembly from data channel events
//!
//! Delta events accumulate into an in-progress line; a completed event
//! replaces that line with the final segment text, optionally translated
//! before it joins the finalized transcript. Observers watch a
//! [`TranscriptView`] snapshot that updates on every change.

use crate::peer::protocol::ServerEvent;
use crate::translate::Translator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Accumulated transcript text for one recording
#[derive(Debug, Default)]
struct TranscriptBuffer {
    pending_delta: String,
    finalized: Vec<String>,
}

impl TranscriptBuffer {
    fn push_delta(&mut self, delta: &str) {
        self.pending_delta.push_str(delta);
    }

    fn push_segment(&mut self, segment: String) {
        self.finalized.push(segment);
    }

    fn clear_pending(&mut self) {
        self.pending_delta.clear();
    }

    fn clear(&mut self) {
        self.pending_delta.clear();
        self.finalized.clear();
    }

    /// Finalized segments joined with single spaces
    fn finalized_text(&self) -> String {
        self.finalized.join(" ")
    }

    fn view(&self) -> TranscriptView {
        TranscriptView {
            in_progress: self.pending_delta.clone(),
            finalized: self.finalized_text(),
        }
    }
}

/// Snapshot of the transcript for display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptView {
    /// Text of the segment still being spoken
    pub in_progress: String,
    /// All completed segments, space-joined
    pub finalized: String,
}

/// Turns server events into transcript text, translating completed
/// segments when asked.
///
/// Translation runs on a spawned task per segment; a reset invalidates
/// any in-flight translation so a new recording never receives text from
/// a previous one.
pub struct TranscriptAssembler {
    buffer: Arc<Mutex<TranscriptBuffer>>,
    translator: Arc<dyn Translator>,
    epoch: Arc<AtomicU64>,
    view_tx: Arc<watch::Sender<TranscriptView>>,
}

impl TranscriptAssembler {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        let (view_tx, _) = watch::channel(TranscriptView::default());
        Self {
            buffer: Arc::new(Mutex::new(TranscriptBuffer::default())),
            translator,
            epoch: Arc::new(AtomicU64::new(0)),
            view_tx: Arc::new(view_tx),
        }
    }

    /// Watch transcript snapshots
    pub fn subscribe(&self) -> watch::Receiver<TranscriptView> {
        self.view_tx.subscribe()
    }

    /// Clear all text and invalidate in-flight translations
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
        let _ = self.view_tx.send(TranscriptView::default());
    }

    /// Finalized transcript text so far
    pub fn finalized_text(&self) -> String {
        self.buffer
            .lock()
            .map(|b| b.finalized_text())
            .unwrap_or_default()
    }

    /// Whether any segment has been finalized
    pub fn has_finalized(&self) -> bool {
        self.buffer
            .lock()
            .map(|b| !b.finalized.is_empty())
            .unwrap_or(false)
    }

    /// Apply one server event.
    ///
    /// Returns the translation task handle when one was spawned, so
    /// callers that need determinism can await it.
    pub fn apply_event(
        &self,
        event: &ServerEvent,
        translate_from: Option<&str>,
    ) -> Option<JoinHandle<()>> {
        match event {
            ServerEvent::SessionCreated { session } => {
                let id = session
                    .as_ref()
                    .and_then(|s| s.id.as_deref())
                    .unwrap_or("unknown");
                info!("Transcription session created: {}", id);
                None
            }
            ServerEvent::Delta { .. } => {
                if let Some(delta) = event.delta_text() {
                    if let Ok(mut buffer) = self.buffer.lock() {
                        buffer.push_delta(delta);
                        let _ = self.view_tx.send(buffer.view());
                    }
                }
                None
            }
            ServerEvent::Completed { .. } => {
                let text = match event.completed_text() {
                    Some(t) => t.to_owned(),
                    None => {
                        // Segment ended without usable text; drop the
                        // partial deltas for it as well.
                        if let Ok(mut buffer) = self.buffer.lock() {
                            buffer.clear_pending();
                            let _ = self.view_tx.send(buffer.view());
                        }
                        return None;
                    }
                };

                // The pending line is replaced immediately; translation
                // fills in the finalized segment when it lands.
                if let Ok(mut buffer) = self.buffer.lock() {
                    buffer.clear_pending();
                    let _ = self.view_tx.send(buffer.view());
                }

                match translate_from {
                    Some(language) => Some(self.spawn_translation(text, language.to_owned())),
                    None => {
                        self.append_segment(text);
                        None
                    }
                }
            }
            ServerEvent::Other => None,
        }
    }

    fn append_segment(&self, segment: String) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push_segment(segment);
            let _ = self.view_tx.send(buffer.view());
        }
    }

    fn spawn_translation(&self, text: String, language: String) -> JoinHandle<()> {
        let translator = self.translator.clone();
        let buffer = self.buffer.clone();
        let view_tx = self.view_tx.clone();
        let epoch = self.epoch.clone();
        let started_at = epoch.load(Ordering::SeqCst);

        tokio::spawn(async move {
            let segment = match translator.translate(&text, &language).await {
                Ok(translated) => translated,
                Err(e) => {
                    // Keep the original text rather than losing the segment
                    warn!("Translation failed, keeping original text: {}", e);
                    text
                }
            };

            if epoch.load(Ordering::SeqCst) != started_at {
                debug!("Discarding stale translation result");
                return;
            }

            if let Ok(mut buffer) = buffer.lock() {
                buffer.push_segment(segment);
                let _ = view_tx.send(buffer.view());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranslationError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct EchoTranslator;

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn translate(&self, text: &str, _from: &str) -> Result<String, TranslationError> {
            Ok(format!("[{}]", text))
        }
    }

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(&self, _text: &str, _from: &str) -> Result<String, TranslationError> {
            Err(TranslationError::Empty)
        }
    }

    struct SlowTranslator;

    #[async_trait]
    impl Translator for SlowTranslator {
        async fn translate(&self, text: &str, _from: &str) -> Result<String, TranslationError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(text.to_owned())
        }
    }

    fn delta(text: &str) -> ServerEvent {
        serde_json::from_str(&format!(
            r#"{{"type":"conversation.item.input_audio_transcription.delta","delta":"{}"}}"#,
            text
        ))
        .unwrap()
    }

    fn completed(text: &str) -> ServerEvent {
        serde_json::from_str(&format!(
            r#"{{"type":"conversation.item.input_audio_transcription.completed","transcript":"{}"}}"#,
            text
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_deltas_accumulate_then_finalize() {
        let assembler = TranscriptAssembler::new(Arc::new(EchoTranslator));
        let view = assembler.subscribe();

        assembler.apply_event(&delta("Hel"), None);
        assembler.apply_event(&delta("lo "), None);
        assembler.apply_event(&delta("wor"), None);
        assembler.apply_event(&delta("ld"), None);
        assert_eq!(view.borrow().in_progress, "Hello world");

        assembler.apply_event(&completed("Hello world"), None);
        assert_eq!(view.borrow().in_progress, "");
        assert_eq!(view.borrow().finalized, "Hello world");
    }

    #[tokio::test]
    async fn test_segments_join_with_single_space() {
        let assembler = TranscriptAssembler::new(Arc::new(EchoTranslator));

        assembler.apply_event(&completed("First segment."), None);
        assembler.apply_event(&completed("Second segment."), None);
        assert_eq!(
            assembler.finalized_text(),
            "First segment. Second segment."
        );
    }

    #[tokio::test]
    async fn test_translated_segment_appended() {
        let assembler = TranscriptAssembler::new(Arc::new(EchoTranslator));

        let handle = assembler.apply_event(&completed("shalom"), Some("he"));
        handle.unwrap().await.unwrap();
        assert_eq!(assembler.finalized_text(), "[shalom]");
    }

    #[tokio::test]
    async fn test_translation_failure_keeps_original_text() {
        let assembler = TranscriptAssembler::new(Arc::new(FailingTranslator));

        let handle = assembler.apply_event(&completed("shalom"), Some("he"));
        handle.unwrap().await.unwrap();
        assert_eq!(assembler.finalized_text(), "shalom");
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_translation() {
        let assembler = TranscriptAssembler::new(Arc::new(SlowTranslator));

        let handle = assembler.apply_event(&completed("late arrival"), Some("he"));
        assembler.reset();
        handle.unwrap().await.unwrap();
        assert!(!assembler.has_finalized());
        assert_eq!(assembler.finalized_text(), "");
    }

    #[tokio::test]
    async fn test_blank_completion_clears_pending_only() {
        let assembler = TranscriptAssembler::new(Arc::new(EchoTranslator));
        let view = assembler.subscribe();

        assembler.apply_event(&delta("noise"), None);
        assembler.apply_event(&completed(" "), None);
        assert_eq!(view.borrow().in_progress, "");
        assert!(!assembler.has_finalized());
    }
}
