// Media tracks and streams
//
// `MediaStreamTrack` is a shared handle: cloning the Rust value yields the same
// track (same id, same enabled flag). `clone_track` creates an independent
// track over the same source, which is what callers of the virtual device get.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{MicError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// Advisory hint to platform processing pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentHint {
    #[default]
    None,
    Speech,
    Music,
}

/// Audio processing constraints applied to a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioProcessingSettings {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub channel_count: u16,
    pub sample_rate: u32,
}

impl AudioProcessingSettings {
    /// Everything voice-specific off, mono, at `sample_rate`
    pub fn raw_mono(sample_rate: u32) -> Self {
        Self {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
            channel_count: 1,
            sample_rate,
        }
    }
}

/// Where a track's audio comes from. Shared by all clones of a track.
#[derive(Debug)]
pub struct TrackSource {
    id: String,
    sample_rate: u32,
    blocks: broadcast::Sender<Arc<[f32]>>,
    last_rms_bits: AtomicU32,
}

impl TrackSource {
    pub fn new(sample_rate: u32) -> Arc<Self> {
        let (blocks, _) = broadcast::channel(64);
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            sample_rate,
            blocks,
            last_rms_bits: AtomicU32::new(0f32.to_bits()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Publish one rendered block to every live subscriber
    pub fn publish(&self, block: &[f32]) {
        let rms = if block.is_empty() {
            0.0
        } else {
            (block.iter().map(|s| s * s).sum::<f32>() / block.len() as f32).sqrt()
        };
        self.last_rms_bits.store(rms.to_bits(), Ordering::Relaxed);
        let _ = self.blocks.send(Arc::from(block));
    }

    /// RMS of the most recently published block
    pub fn last_rms(&self) -> f32 {
        f32::from_bits(self.last_rms_bits.load(Ordering::Relaxed))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<[f32]>> {
        self.blocks.subscribe()
    }
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    ended: AtomicBool,
    content_hint: Mutex<ContentHint>,
    settings: Mutex<Option<AudioProcessingSettings>>,
    source: Option<Arc<TrackSource>>,
}

#[derive(Debug, Clone)]
pub struct MediaStreamTrack {
    inner: Arc<TrackInner>,
}

impl MediaStreamTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>, source: Option<Arc<TrackSource>>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                ended: AtomicBool::new(false),
                content_hint: Mutex::new(ContentHint::None),
                settings: Mutex::new(None),
                source,
            }),
        }
    }

    /// A plain platform track with no engine-side source
    pub fn device(kind: TrackKind, label: impl Into<String>) -> Self {
        Self::new(kind, label, None)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn content_hint(&self) -> ContentHint {
        self.inner
            .content_hint
            .lock()
            .map(|h| *h)
            .unwrap_or_default()
    }

    pub fn set_content_hint(&self, hint: ContentHint) {
        if let Ok(mut current) = self.inner.content_hint.lock() {
            *current = hint;
        }
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.inner.ended.store(true, Ordering::Relaxed);
    }

    pub fn settings(&self) -> Option<AudioProcessingSettings> {
        self.inner.settings.lock().ok().and_then(|s| s.clone())
    }

    pub fn apply_constraints(&self, settings: AudioProcessingSettings) -> Result<()> {
        if self.is_ended() {
            return Err(MicError::TrackEnded {
                track_id: self.id().to_string(),
            });
        }
        if self.kind() != TrackKind::Audio {
            return Err(MicError::Constraint(format!(
                "audio constraints on a {} track",
                self.kind().as_str()
            )));
        }
        if let Some(source) = &self.inner.source {
            if source.sample_rate() != settings.sample_rate {
                return Err(MicError::Constraint(format!(
                    "sample rate {} unsupported (source runs at {})",
                    settings.sample_rate,
                    source.sample_rate()
                )));
            }
        }
        let mut current = self
            .inner
            .settings
            .lock()
            .map_err(|_| MicError::Constraint("settings lock poisoned".into()))?;
        *current = Some(settings);
        Ok(())
    }

    /// Independent track over the same source: new id, own enabled/stop state
    pub fn clone_track(&self) -> Self {
        let clone = Self::new(self.kind(), self.label(), self.inner.source.clone());
        clone.set_enabled(self.is_enabled());
        clone.set_content_hint(self.content_hint());
        clone
    }

    pub fn source(&self) -> Option<&Arc<TrackSource>> {
        self.inner.source.as_ref()
    }

    pub fn shares_source_with(&self, other: &MediaStreamTrack) -> bool {
        match (&self.inner.source, &other.inner.source) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Same track object (not merely the same source)
    pub fn is_same_track(&self, other: &MediaStreamTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Rendered audio for this track; `None` once stopped or if sourceless
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Arc<[f32]>>> {
        if self.is_ended() {
            return None;
        }
        self.inner.source.as_ref().map(|s| s.subscribe())
    }
}

#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaStreamTrack>,
}

impl MediaStream {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks: Vec::new(),
        }
    }

    pub fn with_tracks(tracks: Vec<MediaStreamTrack>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_track(&mut self, track: MediaStreamTrack) {
        if !self.tracks.iter().any(|t| t.is_same_track(&track)) {
            self.tracks.push(track);
        }
    }

    pub fn tracks(&self) -> &[MediaStreamTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> Vec<MediaStreamTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> Vec<MediaStreamTrack> {
        self.tracks_of(TrackKind::Video)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<MediaStreamTrack> {
        self.tracks.iter().filter(|t| t.kind() == kind).cloned().collect()
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new()
    }
}
