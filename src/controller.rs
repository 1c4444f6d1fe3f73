//! Recording lifecycle controller
//!
//! Owns the state machine of one recording at a time: acquire the
//! microphone, start a peer session, route its events into the
//! transcript assembler, and tear everything down on stop or failure.
//! State, transcript, and status messages are exposed as watch channels
//! for the front end.

use crate::languages;
use crate::media::{MediaError, MediaSource};
use crate::peer::{PeerError, PeerEvent, PeerSession, PeerState};
use crate::signaling::Negotiator;
use crate::storage::{StorageError, TranscriptStore};
use crate::transcript::{TranscriptAssembler, TranscriptView};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, instrument, warn};

/// State of the recording lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordingState {
    #[default]
    Ready,
    Initializing,
    Running,
    Paused,
    Stopped,
    Error,
}

/// Errors from recording lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Operation not valid in state {0:?}")]
    InvalidState(RecordingState),

    #[error("Unknown language code '{0}'")]
    UnknownLanguage(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Per-recording options
#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub language: String,
    pub translate: bool,
}

struct ActiveSession {
    peer: Arc<PeerSession>,
}

/// Drives recordings and publishes their state
pub struct RecordingController {
    media: Arc<dyn MediaSource>,
    negotiator: Arc<dyn Negotiator>,
    assembler: Arc<TranscriptAssembler>,
    store: TranscriptStore,
    settings: Mutex<RecordingSettings>,
    state_tx: Arc<watch::Sender<RecordingState>>,
    message_tx: Arc<watch::Sender<Option<String>>>,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
    // Bumped on every start, stop, and failure; event forwarders carry a
    // snapshot and exit when it no longer matches.
    epoch: Arc<AtomicU64>,
}

impl RecordingController {
    pub fn new(
        media: Arc<dyn MediaSource>,
        negotiator: Arc<dyn Negotiator>,
        assembler: Arc<TranscriptAssembler>,
        store: TranscriptStore,
        settings: RecordingSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(RecordingState::default());
        let (message_tx, _) = watch::channel(None);
        Self {
            media,
            negotiator,
            assembler,
            store,
            settings: Mutex::new(settings),
            state_tx: Arc::new(state_tx),
            message_tx: Arc::new(message_tx),
            active: tokio::sync::Mutex::new(None),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Watch recording state changes
    pub fn state(&self) -> watch::Receiver<RecordingState> {
        self.state_tx.subscribe()
    }

    /// Watch transcript snapshots
    pub fn transcript(&self) -> watch::Receiver<TranscriptView> {
        self.assembler.subscribe()
    }

    /// Watch user-facing status messages
    pub fn message(&self) -> watch::Receiver<Option<String>> {
        self.message_tx.subscribe()
    }

    /// Current recording state
    pub fn current_state(&self) -> RecordingState {
        *self.state_tx.borrow()
    }

    /// Current settings snapshot
    pub fn current_settings(&self) -> RecordingSettings {
        self.settings
            .lock()
            .map(|s| s.clone())
            .unwrap_or(RecordingSettings {
                language: String::new(),
                translate: false,
            })
    }

    /// Start a new recording.
    ///
    /// Any transcript from a previous recording is discarded first.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Result<(), ControllerError> {
        match self.current_state() {
            RecordingState::Ready | RecordingState::Stopped | RecordingState::Error => {}
            state => return Err(ControllerError::InvalidState(state)),
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.assembler.reset();
        self.set_state(RecordingState::Initializing);
        let _ = self.message_tx.send(None);

        let stream = match self.media.open_microphone().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to open microphone: {}", e);
                let _ = self.message_tx.send(Some(e.to_string()));
                self.set_state(RecordingState::Error);
                return Err(e.into());
            }
        };

        let settings = self.current_settings();
        let translate_from = settings.translate.then(|| settings.language.clone());

        let peer = Arc::new(PeerSession::new(self.negotiator.clone()));
        let events = peer.subscribe();
        *self.active.lock().await = Some(ActiveSession { peer: peer.clone() });
        self.spawn_event_forwarder(events, self.epoch.load(Ordering::SeqCst), translate_from);

        if let Err(e) = peer.start(stream, &settings.language).await {
            error!("Failed to start peer session: {}", e);
            peer.stop().await;
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *self.active.lock().await = None;
            let _ = self.message_tx.send(Some(e.to_string()));
            self.set_state(RecordingState::Error);
            return Err(e.into());
        }

        info!("Recording started (language: {})", settings.language);
        Ok(())
    }

    /// Pause the running recording; capture continues muted
    pub async fn pause(&self) -> Result<(), ControllerError> {
        if self.current_state() != RecordingState::Running {
            return Err(ControllerError::InvalidState(self.current_state()));
        }
        if let Some(session) = self.active.lock().await.as_ref() {
            session.peer.set_muted(true);
        }
        self.set_state(RecordingState::Paused);
        Ok(())
    }

    /// Resume a paused recording
    pub async fn resume(&self) -> Result<(), ControllerError> {
        if self.current_state() != RecordingState::Paused {
            return Err(ControllerError::InvalidState(self.current_state()));
        }
        if let Some(session) = self.active.lock().await.as_ref() {
            session.peer.set_muted(false);
        }
        self.set_state(RecordingState::Running);
        Ok(())
    }

    /// Stop the current recording and release its resources; idempotent
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(session) = self.active.lock().await.take() {
            session.peer.stop().await;
        }
        if self.current_state() != RecordingState::Ready {
            self.set_state(RecordingState::Stopped);
        }
    }

    /// Tear down after an unrecoverable failure
    async fn fail(&self, message: String) {
        warn!("Recording failed: {}", message);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(session) = self.active.lock().await.take() {
            session.peer.stop().await;
        }
        let _ = self.message_tx.send(Some(message));
        self.set_state(RecordingState::Error);
    }

    /// Save the finalized transcript of the stopped recording
    pub async fn save(&self, name: &str) -> Result<PathBuf, ControllerError> {
        if self.current_state() != RecordingState::Stopped {
            return Err(ControllerError::InvalidState(self.current_state()));
        }

        let text = self.assembler.finalized_text();
        let path = self.store.save(name, &text)?;
        self.assembler.reset();
        self.set_state(RecordingState::Ready);
        Ok(path)
    }

    /// Saved transcript store
    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    /// Change the transcription language; only while no recording is active
    pub fn set_language(&self, code: &str) -> Result<(), ControllerError> {
        if !languages::is_supported(code) {
            return Err(ControllerError::UnknownLanguage(code.to_owned()));
        }
        match self.current_state() {
            RecordingState::Ready | RecordingState::Stopped | RecordingState::Error => {}
            state => return Err(ControllerError::InvalidState(state)),
        }
        if let Ok(mut settings) = self.settings.lock() {
            settings.language = code.to_owned();
        }
        info!("Transcription language set to {}", code);
        Ok(())
    }

    /// Enable or disable translation for the next recording
    pub fn set_translate(&self, enabled: bool) -> Result<(), ControllerError> {
        match self.current_state() {
            RecordingState::Ready | RecordingState::Stopped | RecordingState::Error => {}
            state => return Err(ControllerError::InvalidState(state)),
        }
        if let Ok(mut settings) = self.settings.lock() {
            settings.translate = enabled;
        }
        Ok(())
    }

    fn set_state(&self, state: RecordingState) {
        let _ = self.state_tx.send(state);
    }

    fn spawn_event_forwarder(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<PeerEvent>,
        epoch: u64,
        translate_from: Option<String>,
    ) {
        let controller = self.clone();
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Dropped {} peer events", missed);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !controller
                    .handle_peer_event(event, epoch, translate_from.as_deref())
                    .await
                {
                    break;
                }
            }
        });
    }

    /// Handle one peer event for the recording started at `epoch`.
    ///
    /// Returns false once the event belongs to a recording that is no
    /// longer current.
    pub(crate) async fn handle_peer_event(
        self: &Arc<Self>,
        event: PeerEvent,
        epoch: u64,
        translate_from: Option<&str>,
    ) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }

        match event {
            PeerEvent::ChannelOpen => {
                if self.current_state() == RecordingState::Initializing {
                    self.set_state(RecordingState::Running);
                }
            }
            PeerEvent::Message(server_event) => {
                self.assembler.apply_event(&server_event, translate_from);
            }
            PeerEvent::StateChanged(
                PeerState::Failed | PeerState::Closed | PeerState::Disconnected,
            ) => {
                // Once a session was established, losing it is an ordinary
                // stop; only a failure during startup is an error.
                match self.current_state() {
                    RecordingState::Running | RecordingState::Paused => {
                        info!("Connection lost, stopping recording");
                        self.stop().await;
                    }
                    RecordingState::Initializing => {
                        self.fail("Connection to transcription service failed".to_owned())
                            .await;
                    }
                    _ => {}
                }
            }
            PeerEvent::StateChanged(_) => {}
            PeerEvent::Error(message) => {
                self.fail(message).await;
            }
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: RecordingState) {
        self.set_state(state);
    }

    #[cfg(test)]
    pub(crate) async fn install_session(&self, peer: Arc<PeerSession>) {
        *self.active.lock().await = Some(ActiveSession { peer });
    }

    #[cfg(test)]
    pub(crate) async fn has_active_session(&self) -> bool {
        self.active.lock().await.is_some()
    }

    #[cfg(test)]
    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SignalingError, TranslationError};
    use crate::media::{MediaStream, CAPTURE_SAMPLE_RATE};
    use crate::peer::protocol::ServerEvent;
    use crate::translate::Translator;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct NoMicrophone;

    #[async_trait]
    impl MediaSource for NoMicrophone {
        async fn open_microphone(&self) -> Result<MediaStream, MediaError> {
            Err(MediaError::NoInputDevice)
        }
    }

    struct SyntheticMicrophone;

    #[async_trait]
    impl MediaSource for SyntheticMicrophone {
        async fn open_microphone(&self) -> Result<MediaStream, MediaError> {
            let (stream, _tx) = MediaStream::synthetic(CAPTURE_SAMPLE_RATE);
            Ok(stream)
        }
    }

    struct FailingNegotiator;

    #[async_trait]
    impl Negotiator for FailingNegotiator {
        async fn negotiate(&self, _offer: &str, _lang: &str) -> Result<String, SignalingError> {
            Err(SignalingError::Credential("endpoint unreachable".into()))
        }
    }

    struct EchoTranslator;

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn translate(&self, text: &str, _from: &str) -> Result<String, TranslationError> {
            Ok(text.to_owned())
        }
    }

    fn controller(media: Arc<dyn MediaSource>, root: PathBuf) -> Arc<RecordingController> {
        Arc::new(RecordingController::new(
            media,
            Arc::new(FailingNegotiator),
            Arc::new(TranscriptAssembler::new(Arc::new(EchoTranslator))),
            TranscriptStore::open(root),
            RecordingSettings {
                language: "he".to_owned(),
                translate: false,
            },
        ))
    }

    fn completed(text: &str) -> ServerEvent {
        serde_json::from_str(&format!(
            r#"{{"type":"conversation.item.input_audio_transcription.completed","transcript":"{}"}}"#,
            text
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_microphone_enters_error_state() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(NoMicrophone), dir.path().to_path_buf());

        let result = ctrl.start().await;
        assert!(matches!(result, Err(ControllerError::Media(_))));
        assert_eq!(ctrl.current_state(), RecordingState::Error);
        assert!(ctrl.message().borrow().is_some());
        assert!(!ctrl.has_active_session().await);
    }

    #[tokio::test]
    async fn test_failed_negotiation_enters_error_state_and_releases_session() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(SyntheticMicrophone), dir.path().to_path_buf());

        let result = ctrl.start().await;
        assert!(matches!(result, Err(ControllerError::Peer(_))));
        assert_eq!(ctrl.current_state(), RecordingState::Error);
        assert!(!ctrl.has_active_session().await);
    }

    #[tokio::test]
    async fn test_restart_allowed_after_error() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(NoMicrophone), dir.path().to_path_buf());

        let _ = ctrl.start().await;
        assert_eq!(ctrl.current_state(), RecordingState::Error);
        // A second start attempt is permitted from the error state
        let result = ctrl.start().await;
        assert!(matches!(result, Err(ControllerError::Media(_))));
    }

    #[tokio::test]
    async fn test_channel_open_moves_initializing_to_running() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(SyntheticMicrophone), dir.path().to_path_buf());

        ctrl.force_state(RecordingState::Initializing);
        let epoch = ctrl.current_epoch();
        assert!(ctrl.handle_peer_event(PeerEvent::ChannelOpen, epoch, None).await);
        assert_eq!(ctrl.current_state(), RecordingState::Running);
    }

    #[tokio::test]
    async fn test_peer_failure_while_running_stops_without_error() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(SyntheticMicrophone), dir.path().to_path_buf());

        ctrl.install_session(Arc::new(PeerSession::new(Arc::new(FailingNegotiator))))
            .await;
        ctrl.force_state(RecordingState::Running);
        let epoch = ctrl.current_epoch();

        ctrl.handle_peer_event(
            PeerEvent::StateChanged(PeerState::Failed),
            epoch,
            None,
        )
        .await;
        assert_eq!(ctrl.current_state(), RecordingState::Stopped);
        assert!(!ctrl.has_active_session().await);
    }

    #[tokio::test]
    async fn test_peer_failure_during_startup_enters_error_state() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(SyntheticMicrophone), dir.path().to_path_buf());

        ctrl.install_session(Arc::new(PeerSession::new(Arc::new(FailingNegotiator))))
            .await;
        ctrl.force_state(RecordingState::Initializing);
        let epoch = ctrl.current_epoch();

        ctrl.handle_peer_event(
            PeerEvent::StateChanged(PeerState::Failed),
            epoch,
            None,
        )
        .await;
        assert_eq!(ctrl.current_state(), RecordingState::Error);
        assert!(!ctrl.has_active_session().await);
        assert!(ctrl.message().borrow().is_some());
    }

    #[tokio::test]
    async fn test_remote_close_while_running_stops_cleanly() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(SyntheticMicrophone), dir.path().to_path_buf());

        ctrl.install_session(Arc::new(PeerSession::new(Arc::new(FailingNegotiator))))
            .await;
        ctrl.force_state(RecordingState::Running);
        let epoch = ctrl.current_epoch();

        ctrl.handle_peer_event(
            PeerEvent::StateChanged(PeerState::Closed),
            epoch,
            None,
        )
        .await;
        assert_eq!(ctrl.current_state(), RecordingState::Stopped);
        assert!(!ctrl.has_active_session().await);
    }

    #[tokio::test]
    async fn test_stale_epoch_events_ignored() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(SyntheticMicrophone), dir.path().to_path_buf());

        ctrl.force_state(RecordingState::Initializing);
        let stale = ctrl.current_epoch();
        ctrl.stop().await;

        assert!(
            !ctrl
                .handle_peer_event(PeerEvent::ChannelOpen, stale, None)
                .await
        );
        assert_ne!(ctrl.current_state(), RecordingState::Running);
    }

    #[tokio::test]
    async fn test_pause_and_resume_gate_on_state() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(SyntheticMicrophone), dir.path().to_path_buf());

        assert!(matches!(
            ctrl.pause().await,
            Err(ControllerError::InvalidState(RecordingState::Ready))
        ));

        ctrl.install_session(Arc::new(PeerSession::new(Arc::new(FailingNegotiator))))
            .await;
        ctrl.force_state(RecordingState::Running);
        ctrl.pause().await.unwrap();
        assert_eq!(ctrl.current_state(), RecordingState::Paused);
        assert!(matches!(
            ctrl.pause().await,
            Err(ControllerError::InvalidState(RecordingState::Paused))
        ));
        ctrl.resume().await.unwrap();
        assert_eq!(ctrl.current_state(), RecordingState::Running);
    }

    #[tokio::test]
    async fn test_save_requires_stopped_recording() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(SyntheticMicrophone), dir.path().to_path_buf());

        assert!(matches!(
            ctrl.save("notes").await,
            Err(ControllerError::InvalidState(RecordingState::Ready))
        ));

        let epoch = ctrl.current_epoch();
        ctrl.force_state(RecordingState::Running);
        ctrl.handle_peer_event(PeerEvent::Message(completed("Hello world")), epoch, None)
            .await;
        ctrl.stop().await;
        assert_eq!(ctrl.current_state(), RecordingState::Stopped);

        let path = ctrl.save("notes").await.unwrap();
        assert!(path.exists());
        assert_eq!(ctrl.current_state(), RecordingState::Ready);
        // The buffer is cleared after a save
        assert_eq!(ctrl.transcript().borrow().finalized, "");
    }

    #[tokio::test]
    async fn test_language_changes_validated_and_gated() {
        let dir = tempdir().unwrap();
        let ctrl = controller(Arc::new(SyntheticMicrophone), dir.path().to_path_buf());

        assert!(matches!(
            ctrl.set_language("xx"),
            Err(ControllerError::UnknownLanguage(_))
        ));
        ctrl.set_language("en").unwrap();
        assert_eq!(ctrl.current_settings().language, "en");

        ctrl.force_state(RecordingState::Running);
        assert!(matches!(
            ctrl.set_language("de"),
            Err(ControllerError::InvalidState(RecordingState::Running))
        ));
    }
}
