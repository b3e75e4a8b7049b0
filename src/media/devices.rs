// Device enumeration and acquisition, with the virtual microphone spliced in
//
// `VirtualMediaDevices` wraps the host's real implementation. Enumeration gets
// one extra audio input; acquisition is answered from the graph when the
// request names the virtual device, or when forced mode is on and any audio
// is requested. Everything else passes through untouched.

use std::sync::Arc;

use async_trait::async_trait;
use colored::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::constraints::MediaStreamConstraints;
use super::track::{AudioProcessingSettings, ContentHint, MediaStream};
use crate::activation::ActivationState;
use crate::audio::graph::GraphManager;
use crate::error::{MicError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaDeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDeviceInfo {
    pub kind: MediaDeviceKind,
    pub device_id: String,
    pub label: String,
    pub group_id: String,
}

impl MediaDeviceInfo {
    pub fn audio_input(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: MediaDeviceKind::AudioInput,
            device_id: device_id.into(),
            label: label.into(),
            group_id: String::new(),
        }
    }
}

/// The platform's media device entry points
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>>;

    async fn get_user_media(&self, constraints: &MediaStreamConstraints) -> Result<MediaStream>;
}

pub struct VirtualMediaDevices<D> {
    inner: D,
    graph: Arc<GraphManager>,
    activation: Arc<ActivationState>,
}

impl<D: MediaDevices> VirtualMediaDevices<D> {
    pub fn new(inner: D, graph: Arc<GraphManager>, activation: Arc<ActivationState>) -> Self {
        Self {
            inner,
            graph,
            activation,
        }
    }

    /// The wrapped platform implementation
    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn virtual_device(&self) -> MediaDeviceInfo {
        let config = self.graph.config();
        MediaDeviceInfo::audio_input(&config.device_id, &config.device_label)
    }

    fn should_intercept(&self, constraints: &MediaStreamConstraints) -> bool {
        constraints.wants_virtual_mic(&self.graph.config().device_id)
            || (self.activation.forced_mode() && constraints.wants_audio())
    }

    async fn virtual_stream(&self) -> Result<MediaStream> {
        let state = self.graph.ensure_graph().await?;
        let track = state.mic_track().ok_or(MicError::GraphUnavailable)?.clone_track();
        track.set_content_hint(ContentHint::Music);
        track.set_enabled(true);
        if let Err(e) = track.apply_constraints(AudioProcessingSettings::raw_mono(self.graph.config().sample_rate)) {
            debug!("Virtual track kept default settings: {}", e);
        }
        Ok(MediaStream::with_tracks(vec![track]))
    }
}

#[async_trait]
impl<D: MediaDevices> MediaDevices for VirtualMediaDevices<D> {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>> {
        let mut devices = match self.inner.enumerate_devices().await {
            Ok(devices) => devices,
            Err(first) => {
                warn!("{}: enumeration failed, retrying: {}", "DEVICE_ENUM".yellow(), first);
                match self.inner.enumerate_devices().await {
                    Ok(devices) => devices,
                    Err(second) => {
                        warn!("{}: enumeration failed twice: {}", "DEVICE_ENUM".red(), second);
                        Vec::new()
                    }
                }
            }
        };
        devices.push(self.virtual_device());
        Ok(devices)
    }

    async fn get_user_media(&self, constraints: &MediaStreamConstraints) -> Result<MediaStream> {
        if self.should_intercept(constraints) {
            match self.virtual_stream().await {
                Ok(stream) => {
                    info!(
                        "{}: answered with virtual microphone (forced: {})",
                        "GET_USER_MEDIA".green(),
                        self.activation.forced_mode()
                    );
                    return Ok(stream);
                }
                Err(e) => warn!("{}: virtual track unavailable, delegating: {}", "GET_USER_MEDIA".yellow(), e),
            }
        }
        self.inner.get_user_media(constraints).await
    }
}

impl<D> std::fmt::Debug for VirtualMediaDevices<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMediaDevices")
            .field("forced_mode", &self.activation.forced_mode())
            .finish()
    }
}
