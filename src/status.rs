// Status snapshots
//
// Every state change the UI cares about is announced twice: as a `status`
// message on the control channel and as a bare payload on the page event
// stream. Both sides are broadcast; having no listeners is normal.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::control::{ChannelMessage, ControlChannel};
use crate::mic_debug;

/// Partial status; only the fields that changed are set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mic_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viz: Option<Vec<u8>>,
}

impl StatusPayload {
    pub fn volume(volume: f32) -> Self {
        Self {
            volume: Some(volume),
            ..Default::default()
        }
    }

    pub fn mic_mode(forced: bool) -> Self {
        Self {
            mic_mode: Some(forced),
            ..Default::default()
        }
    }

    pub fn source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Default::default()
        }
    }

    pub fn monitor(enabled: bool) -> Self {
        Self {
            monitor: Some(enabled),
            ..Default::default()
        }
    }

    pub fn viz(buckets: Vec<u8>) -> Self {
        Self {
            viz: Some(buckets),
            ..Default::default()
        }
    }

    /// Overlay the fields set in `other`
    pub fn merge(&mut self, other: StatusPayload) {
        if other.volume.is_some() {
            self.volume = other.volume;
        }
        if other.mic_mode.is_some() {
            self.mic_mode = other.mic_mode;
        }
        if other.source.is_some() {
            self.source = other.source;
        }
        if other.monitor.is_some() {
            self.monitor = other.monitor;
        }
        if other.viz.is_some() {
            self.viz = other.viz;
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    channel: ControlChannel,
    page_events: broadcast::Sender<StatusPayload>,
}

impl StatusBroadcaster {
    pub fn new(channel: ControlChannel) -> Self {
        let (page_events, _) = broadcast::channel(64);
        Self {
            channel,
            page_events,
        }
    }

    pub fn emit(&self, payload: StatusPayload) {
        let delivered = self.channel.post(ChannelMessage::Status(payload.clone()));
        let _ = self.page_events.send(payload);
        mic_debug!("Status emitted to {} channel listeners", delivered);
    }

    /// Page-level status events
    pub fn subscribe(&self) -> broadcast::Receiver<StatusPayload> {
        self.page_events.subscribe()
    }
}
