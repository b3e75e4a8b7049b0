// Fake host platform pieces shared by the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use voicehub_mic_lib::media::track::TrackKind;
use voicehub_mic_lib::{
    HeadlessPlatform, MediaDeviceInfo, MediaDevices, MediaStream, MediaStreamConstraints, MediaStreamTrack, MemoryStore,
    MicConfig, MicError, PeerConnection, PeerConnectionFactory, Result, RtpSender, RtpTransceiver, TrackOrKind,
    StatusPayload, TransceiverInit, VirtualMicEngine,
};
use tokio::sync::broadcast;

pub fn engine() -> VirtualMicEngine {
    VirtualMicEngine::new(
        MicConfig::default(),
        Arc::new(HeadlessPlatform),
        Arc::new(MemoryStore::new()),
        None,
    )
    .expect("engine")
}

/// Poll `condition` until it holds or a second passes
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Next status that is not a visualization frame
pub async fn next_status(rx: &mut broadcast::Receiver<StatusPayload>) -> StatusPayload {
    loop {
        let payload = rx.recv().await.expect("status stream open");
        if payload.viz.is_none() {
            return payload;
        }
    }
}

/// Media devices with one microphone and one camera
#[derive(Debug, Default)]
pub struct FakeDevices {
    pub enumerations: AtomicUsize,
    pub acquisitions: AtomicUsize,
    pub fail_enumeration: bool,
}

impl FakeDevices {
    pub fn failing() -> Self {
        Self {
            fail_enumeration: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumeration {
            return Err(MicError::Platform(anyhow::anyhow!("enumeration blocked")));
        }
        Ok(vec![
            MediaDeviceInfo::audio_input("default", "Built-in Microphone"),
            MediaDeviceInfo::audio_input("usb-1", "USB Headset"),
        ])
    }

    async fn get_user_media(&self, constraints: &MediaStreamConstraints) -> Result<MediaStream> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let mut stream = MediaStream::new();
        if constraints.wants_audio() {
            stream.add_track(MediaStreamTrack::device(TrackKind::Audio, "Built-in Microphone"));
        }
        if constraints.video.is_some() {
            stream.add_track(MediaStreamTrack::device(TrackKind::Video, "FaceTime Camera"));
        }
        Ok(stream)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeSender {
    current: Arc<Mutex<Option<MediaStreamTrack>>>,
}

#[async_trait]
impl RtpSender for FakeSender {
    fn track(&self) -> Option<MediaStreamTrack> {
        self.current.lock().ok().and_then(|t| t.clone())
    }

    async fn replace_track(&self, track: Option<MediaStreamTrack>) -> Result<()> {
        if let Ok(mut current) = self.current.lock() {
            *current = track;
        }
        Ok(())
    }
}

/// Records what reached the "platform"
#[derive(Debug, Default)]
pub struct FakeConnection {
    pub senders: Mutex<Vec<FakeSender>>,
    pub stream_counts: Mutex<Vec<usize>>,
}

impl FakeConnection {
    fn attach(&self, track: Option<MediaStreamTrack>) -> FakeSender {
        let sender = FakeSender {
            current: Arc::new(Mutex::new(track)),
        };
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(sender.clone());
        }
        sender
    }
}

impl PeerConnection for FakeConnection {
    type Sender = FakeSender;

    fn add_track(&self, track: MediaStreamTrack, streams: &[MediaStream]) -> Result<FakeSender> {
        if let Ok(mut counts) = self.stream_counts.lock() {
            counts.push(streams.len());
        }
        Ok(self.attach(Some(track)))
    }

    fn add_transceiver(&self, track_or_kind: TrackOrKind, init: TransceiverInit) -> Result<RtpTransceiver<FakeSender>> {
        let track = match track_or_kind {
            TrackOrKind::Track(track) => Some(track),
            TrackOrKind::Kind(_) => None,
        };
        Ok(RtpTransceiver {
            sender: self.attach(track),
            direction: init.direction.unwrap_or_default(),
        })
    }

    fn get_senders(&self) -> Vec<FakeSender> {
        self.senders.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct FakeFactory;

impl PeerConnectionFactory for FakeFactory {
    type Connection = FakeConnection;

    fn create(&self, _configuration: &serde_json::Value) -> Result<FakeConnection> {
        Ok(FakeConnection::default())
    }
}
