//! Peer session with the real-time transcription service
//!
//! One [`PeerSession`] owns a WebRTC peer connection, the outbound audio
//! track fed from the microphone, and the data channel that delivers
//! transcription events. Observers subscribe to a broadcast stream of
//! [`PeerEvent`]s; the session itself never interprets transcript text.

pub mod protocol;

use crate::error::SignalingError;
use crate::media::{AudioChunk, MediaStream};
use crate::signaling::Negotiator;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use protocol::ServerEvent;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Transport-level state of the peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for PeerState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => PeerState::New,
            RTCPeerConnectionState::Connecting => PeerState::Connecting,
            RTCPeerConnectionState::Connected => PeerState::Connected,
            RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
            RTCPeerConnectionState::Failed => PeerState::Failed,
            RTCPeerConnectionState::Closed => PeerState::Closed,
        }
    }
}

/// Events emitted by a peer session
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Transport state changed
    StateChanged(PeerState),
    /// The data channel opened; transcription events can now arrive
    ChannelOpen,
    /// A parsed message from the data channel
    Message(ServerEvent),
    /// The session failed during setup or negotiation
    Error(String),
}

/// Errors from peer session operations
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("Session already started")]
    AlreadyStarted,

    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    #[error("Transport error: {0}")]
    Transport(#[from] webrtc::Error),
}

/// Resources owned by a started session
#[derive(Default)]
struct PeerInner {
    connection: Option<Arc<RTCPeerConnection>>,
    channel: Option<Arc<RTCDataChannel>>,
    stream: Option<MediaStream>,
    pump: Option<JoinHandle<()>>,
}

/// One peer session from start to teardown.
///
/// A session is single-use: once stopped it cannot be started again, the
/// controller creates a fresh session per recording.
pub struct PeerSession {
    negotiator: Arc<dyn Negotiator>,
    event_tx: broadcast::Sender<PeerEvent>,
    started: AtomicBool,
    muted: AtomicBool,
    track_flags: Mutex<Vec<Arc<AtomicBool>>>,
    inner: tokio::sync::Mutex<PeerInner>,
}

impl PeerSession {
    pub fn new(negotiator: Arc<dyn Negotiator>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            negotiator,
            event_tx,
            started: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            track_flags: Mutex::new(Vec::new()),
            inner: tokio::sync::Mutex::new(PeerInner::default()),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the session: open the transport, attach the audio stream,
    /// and negotiate with the remote service.
    ///
    /// Resources are registered before negotiation so that [`stop`]
    /// releases everything even when negotiation fails mid-way.
    ///
    /// [`stop`]: PeerSession::stop
    #[instrument(skip(self, stream, language))]
    pub async fn start(
        self: &Arc<Self>,
        mut stream: MediaStream,
        language: &str,
    ) -> Result<(), PeerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PeerError::AlreadyStarted);
        }

        match self.connect(&mut stream, language).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Report the failure exactly once, then leave teardown to
                // the caller via stop().
                let _ = self.event_tx.send(PeerEvent::Error(e.to_string()));
                self.inner.lock().await.stream.get_or_insert(stream);
                Err(e)
            }
        }
    }

    async fn connect(
        self: &Arc<Self>,
        stream: &mut MediaStream,
        language: &str,
    ) -> Result<(), PeerError> {
        let connection = build_peer_connection().await?;

        let event_tx = self.event_tx.clone();
        connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let event_tx = event_tx.clone();
            Box::pin(async move {
                debug!("Peer connection state: {}", state);
                let _ = event_tx.send(PeerEvent::StateChanged(state.into()));
            })
        }));

        // Outbound audio track fed from the capture stream
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 1,
                ..Default::default()
            },
            "audio".to_owned(),
            "translive".to_owned(),
        ));
        connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        let pump = if let Some(capture_track) = stream.primary_track_mut() {
            let flag = capture_track.enabled_flag();
            self.register_track_flag(flag.clone());
            capture_track
                .take_samples()
                .map(|samples| self.spawn_outbound_pump(track, samples, flag))
        } else {
            warn!("Media stream has no audio track");
            None
        };

        // The service sends transcription events over an unnamed channel
        // opened by this side.
        let channel = connection.create_data_channel("", None).await?;

        let event_tx = self.event_tx.clone();
        channel.on_open(Box::new(move || {
            let event_tx = event_tx.clone();
            Box::pin(async move {
                info!("Data channel open");
                let _ = event_tx.send(PeerEvent::ChannelOpen);
            })
        }));

        let event_tx = self.event_tx.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let event_tx = event_tx.clone();
            Box::pin(async move {
                match serde_json::from_slice::<ServerEvent>(&msg.data) {
                    Ok(event) => {
                        let _ = event_tx.send(PeerEvent::Message(event));
                    }
                    Err(e) => {
                        debug!("Ignoring unparseable data channel message: {}", e);
                    }
                }
            })
        }));

        // Register resources before negotiating so a failed negotiation
        // still tears everything down.
        {
            let mut inner = self.inner.lock().await;
            inner.connection = Some(connection.clone());
            inner.channel = Some(channel);
            inner.stream = Some(std::mem::replace(stream, MediaStream::empty()));
            inner.pump = pump;
        }

        // The offer is posted right away; remaining ICE candidates trickle
        // in over the established transport.
        let offer = connection.create_offer(None).await?;
        let local_sdp = offer.sdp.clone();
        connection.set_local_description(offer).await?;

        let answer_sdp = self.negotiator.negotiate(&local_sdp, language).await?;
        let answer = RTCSessionDescription::answer(answer_sdp)?;
        connection.set_remote_description(answer).await?;

        info!("Peer session negotiated");
        Ok(())
    }

    fn register_track_flag(&self, flag: Arc<AtomicBool>) {
        if let Ok(mut flags) = self.track_flags.lock() {
            flags.push(flag);
        }
    }

    /// Forward captured audio chunks to the outbound track.
    ///
    /// Muting skips the write but keeps draining the channel so capture
    /// never backs up.
    fn spawn_outbound_pump(
        self: &Arc<Self>,
        track: Arc<TrackLocalStaticSample>,
        mut samples: mpsc::Receiver<AudioChunk>,
        enabled: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let session = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(chunk) = samples.recv().await {
                let muted = session
                    .upgrade()
                    .map(|s| s.muted.load(Ordering::SeqCst))
                    .unwrap_or(true);
                if muted || !enabled.load(Ordering::SeqCst) {
                    continue;
                }

                let mut data = Vec::with_capacity(chunk.samples.len() * 2);
                for sample in &chunk.samples {
                    data.extend_from_slice(&sample.to_le_bytes());
                }
                let duration = Duration::from_millis(
                    chunk.samples.len() as u64 * 1000 / chunk.sample_rate.max(1) as u64,
                );

                if let Err(e) = track
                    .write_sample(&Sample {
                        data: Bytes::from(data),
                        duration,
                        ..Default::default()
                    })
                    .await
                {
                    debug!("Outbound audio write failed: {}", e);
                }
            }
            debug!("Outbound audio pump finished");
        })
    }

    /// Mute or unmute outbound audio without interrupting capture
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        if let Ok(flags) = self.track_flags.lock() {
            for flag in flags.iter() {
                flag.store(!muted, Ordering::SeqCst);
            }
        }
        info!("Outbound audio {}", if muted { "muted" } else { "unmuted" });
    }

    /// Whether outbound audio is muted
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Release every resource the session holds; idempotent.
    ///
    /// The session stays in the started state so it cannot be reused.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;

        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }
        if let Some(channel) = inner.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("Data channel close: {}", e);
            }
        }
        if let Some(connection) = inner.connection.take() {
            if let Err(e) = connection.close().await {
                debug!("Peer connection close: {}", e);
            }
        }
        if let Some(mut stream) = inner.stream.take() {
            stream.stop_all();
        }

        info!("Peer session stopped");
    }

    /// Number of capture tracks still live; used by teardown checks
    pub async fn live_track_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .stream
            .as_ref()
            .map(|s| s.live_track_count())
            .unwrap_or(0)
    }

    /// Whether a data channel is currently held open
    pub async fn has_open_channel(&self) -> bool {
        self.inner.lock().await.channel.is_some()
    }
}

/// Build a peer connection with default codecs and a public STUN server
async fn build_peer_connection() -> Result<Arc<RTCPeerConnection>, webrtc::Error> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: vec!["stun:stun.l.google.com:19302".to_owned()],
            ..Default::default()
        }],
        ..Default::default()
    };

    Ok(Arc::new(api.new_peer_connection(config).await?))
}
