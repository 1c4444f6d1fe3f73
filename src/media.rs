//! Microphone capture using cpal for cross-platform audio input
//!
//! Capture runs on a dedicated thread and feeds mono PCM16 chunks into an
//! async channel. The resulting [`MediaStream`] owns one [`AudioTrack`]
//! per capture device; tracks can be disabled (mute) without interrupting
//! capture, and stopped exactly once on teardown.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{error, info, trace, warn};

/// Capture sample rate expected by the transcription service (24kHz)
pub const CAPTURE_SAMPLE_RATE: u32 = 24000;

/// Samples per chunk sent downstream (100ms at 24kHz)
const CHUNK_SIZE: usize = 2400;

/// Audio chunk ready to be fed to the outbound peer track
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// PCM 16-bit signed samples (mono)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// Errors that can occur while opening the microphone
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("No audio input device found")]
    NoInputDevice,

    #[error("No supported audio configuration found")]
    NoSupportedConfig,

    #[error("Audio configuration error: {0}")]
    Config(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Audio play error: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("Default config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
}

/// One captured audio track
///
/// The `enabled` flag gates transmission only; capture keeps running while
/// a track is disabled so re-enabling resumes instantly.
pub struct AudioTrack {
    enabled: Arc<AtomicBool>,
    is_capturing: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
    samples: Option<mpsc::Receiver<AudioChunk>>,
}

impl AudioTrack {
    /// Enable or disable transmission of this track
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether the track is still capturing
    pub fn is_live(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }

    /// Stop capturing; idempotent
    pub fn stop(&mut self) {
        if self.is_capturing.swap(false, Ordering::SeqCst) {
            info!("Audio track stopped");
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Shared handle to the enabled flag, used by the outbound pump
    pub(crate) fn enabled_flag(&self) -> Arc<AtomicBool> {
        self.enabled.clone()
    }

    /// Take the sample receiver; `None` once taken
    pub(crate) fn take_samples(&mut self) -> Option<mpsc::Receiver<AudioChunk>> {
        self.samples.take()
    }
}

impl Drop for AudioTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A set of captured audio tracks owned by one recording session
pub struct MediaStream {
    tracks: Vec<AudioTrack>,
}

impl MediaStream {
    /// A stream with no tracks, used as a placeholder when ownership of
    /// the real stream moves elsewhere
    pub fn empty() -> Self {
        Self { tracks: Vec::new() }
    }

    /// First audio track of the stream, if any
    pub fn primary_track_mut(&mut self) -> Option<&mut AudioTrack> {
        self.tracks.first_mut()
    }

    /// Number of tracks still capturing
    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    /// Stop every track; idempotent
    pub fn stop_all(&mut self) {
        for track in &mut self.tracks {
            track.stop();
        }
    }

    /// Build a stream from an externally fed sample channel.
    ///
    /// Used by tests to drive the peer session without a microphone.
    #[cfg(test)]
    pub(crate) fn synthetic(sample_rate: u32) -> (Self, mpsc::Sender<AudioChunk>) {
        let _ = sample_rate;
        let (tx, rx) = mpsc::channel(16);
        let track = AudioTrack {
            enabled: Arc::new(AtomicBool::new(true)),
            is_capturing: Arc::new(AtomicBool::new(true)),
            thread_handle: None,
            samples: Some(rx),
        };
        (Self { tracks: vec![track] }, tx)
    }
}

/// Source of microphone media streams
///
/// Seam between the session controller and the capture hardware; tests
/// substitute a stub implementation.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Open the default microphone and begin capturing
    async fn open_microphone(&self) -> Result<MediaStream, MediaError>;
}

/// Real microphone backed by the default cpal input device
pub struct Microphone {
    target_sample_rate: u32,
}

impl Microphone {
    pub fn new() -> Self {
        Self {
            target_sample_rate: CAPTURE_SAMPLE_RATE,
        }
    }
}

impl Default for Microphone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for Microphone {
    async fn open_microphone(&self) -> Result<MediaStream, MediaError> {
        // Fail fast on the caller thread if no device is present; the
        // capture thread re-acquires its own device handle because cpal
        // streams are not Send.
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(MediaError::NoInputDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        device.default_input_config()?;
        drop(device);
        info!("Using audio input device: {}", device_name);

        let is_capturing = Arc::new(AtomicBool::new(true));
        let is_capturing_thread = is_capturing.clone();
        let (chunk_tx, chunk_rx) = mpsc::channel(600);
        let target_sample_rate = self.target_sample_rate;

        let thread_handle = thread::spawn(move || {
            if let Err(e) = run_capture(is_capturing_thread, chunk_tx, target_sample_rate) {
                error!("Audio capture error: {}", e);
            }
        });

        let track = AudioTrack {
            enabled: Arc::new(AtomicBool::new(true)),
            is_capturing,
            thread_handle: Some(thread_handle),
            samples: Some(chunk_rx),
        };

        Ok(MediaStream { tracks: vec![track] })
    }
}

/// Run audio capture on the current thread (blocking).
///
/// When the device cannot capture at the target rate the highest
/// supported rate is used instead. Chunks carry their actual rate, the
/// outbound pump derives sample durations from it, and the transcription
/// service resamples the received audio; no local resampling happens.
fn run_capture(
    is_capturing: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<AudioChunk>,
    target_sample_rate: u32,
) -> Result<(), MediaError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(MediaError::NoInputDevice)?;

    let supported_configs = device
        .supported_input_configs()
        .map_err(|e| MediaError::Config(e.to_string()))?;

    // Prefer a config at the target rate; otherwise take the highest rate
    // any config offers.
    let mut best_config = None;
    let mut found_target_rate = false;
    for config in supported_configs {
        if config.channels() == 0 {
            continue;
        }
        if config.min_sample_rate().0 <= target_sample_rate
            && config.max_sample_rate().0 >= target_sample_rate
        {
            best_config = Some(config.with_sample_rate(cpal::SampleRate(target_sample_rate)));
            found_target_rate = true;
            break;
        } else if best_config.is_none() {
            best_config = Some(config.with_max_sample_rate());
        }
    }
    let supported_config = best_config.ok_or(MediaError::NoSupportedConfig)?;
    if !found_target_rate {
        warn!(
            "{}Hz not supported, capturing at {}Hz instead",
            target_sample_rate,
            supported_config.sample_rate().0
        );
    }

    let sample_format = supported_config.sample_format();
    let config: cpal::StreamConfig = supported_config.into();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;
    info!("Audio config: {} channels, {} Hz", channels, sample_rate);

    let mut pending: Vec<i16> = Vec::with_capacity(CHUNK_SIZE * 2);
    let is_capturing_stream = is_capturing.clone();

    let err_callback = |err| {
        error!("Audio stream error: {}", err);
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| {
                if !is_capturing_stream.load(Ordering::SeqCst) {
                    return;
                }
                push_samples(
                    data.iter().step_by(channels).copied(),
                    &mut pending,
                    sample_rate,
                    &chunk_tx,
                );
            },
            err_callback,
            None,
        )?,
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| {
                if !is_capturing_stream.load(Ordering::SeqCst) {
                    return;
                }
                push_samples(
                    data.iter()
                        .step_by(channels)
                        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16),
                    &mut pending,
                    sample_rate,
                    &chunk_tx,
                );
            },
            err_callback,
            None,
        )?,
        other => {
            return Err(MediaError::UnsupportedFormat(format!("{:?}", other)));
        }
    };

    stream.play()?;
    info!("Audio capture started");

    // Keep the stream alive until capture is stopped
    while is_capturing.load(Ordering::SeqCst) {
        thread::sleep(std::time::Duration::from_millis(100));
    }

    drop(stream);
    Ok(())
}

/// Accumulate mono samples and forward full chunks downstream.
///
/// Runs inside the realtime audio callback, so the channel is never
/// awaited; a full channel drops the chunk.
fn push_samples<I>(
    samples: I,
    pending: &mut Vec<i16>,
    sample_rate: u32,
    chunk_tx: &mpsc::Sender<AudioChunk>,
) where
    I: Iterator<Item = i16>,
{
    pending.extend(samples);
    while pending.len() >= CHUNK_SIZE {
        let chunk: Vec<i16> = pending.drain(..CHUNK_SIZE).collect();
        if chunk_tx
            .try_send(AudioChunk {
                samples: chunk,
                sample_rate,
            })
            .is_err()
        {
            trace!("Audio chunk dropped: channel full or closed");
        }
    }
}
