// Peer-connection track injection
//
// When forced mode is on, any audio track handed to a peer connection is
// swapped for the virtual microphone track before it reaches the platform.
// The wrappers keep the platform's signatures; only the track argument
// changes. With forced mode off, for video, or when no virtual track can be
// produced, calls go through verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use colored::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::activation::ActivationState;
use crate::audio::graph::GraphManager;
use crate::error::Result;
use crate::media::track::{MediaStream, MediaStreamTrack, TrackKind};

/// First argument of add-transceiver
#[derive(Debug, Clone)]
pub enum TrackOrKind {
    Track(MediaStreamTrack),
    Kind(TrackKind),
}

impl TrackOrKind {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackOrKind::Track(track) => track.kind(),
            TrackOrKind::Kind(kind) => *kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransceiverDirection {
    #[default]
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

#[derive(Debug, Clone, Default)]
pub struct TransceiverInit {
    pub direction: Option<TransceiverDirection>,
    pub streams: Vec<MediaStream>,
}

#[async_trait]
pub trait RtpSender: Send + Sync {
    fn track(&self) -> Option<MediaStreamTrack>;

    async fn replace_track(&self, track: Option<MediaStreamTrack>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RtpTransceiver<S> {
    pub sender: S,
    pub direction: TransceiverDirection,
}

impl<S> RtpTransceiver<S> {
    pub fn map_sender<T>(self, f: impl FnOnce(S) -> T) -> RtpTransceiver<T> {
        RtpTransceiver {
            sender: f(self.sender),
            direction: self.direction,
        }
    }
}

pub trait PeerConnection: Send + Sync {
    type Sender: RtpSender;

    fn add_track(&self, track: MediaStreamTrack, streams: &[MediaStream]) -> Result<Self::Sender>;

    fn add_transceiver(
        &self,
        track_or_kind: TrackOrKind,
        init: TransceiverInit,
    ) -> Result<RtpTransceiver<Self::Sender>>;

    fn get_senders(&self) -> Vec<Self::Sender>;
}

/// Constructs peer connections
pub trait PeerConnectionFactory: Send + Sync {
    type Connection: PeerConnection;

    fn create(&self, configuration: &serde_json::Value) -> Result<Self::Connection>;

    /// True once this factory hands out injecting connections
    fn is_injecting(&self) -> bool {
        false
    }
}

/// Decides when and with what to substitute
#[derive(Debug, Clone)]
pub struct TrackInjector {
    graph: Arc<GraphManager>,
    activation: Arc<ActivationState>,
}

impl TrackInjector {
    pub fn new(graph: Arc<GraphManager>, activation: Arc<ActivationState>) -> Self {
        Self { graph, activation }
    }

    /// The virtual track to use instead of a `kind` track, if any
    pub fn substitute(&self, kind: TrackKind) -> Option<MediaStreamTrack> {
        if kind != TrackKind::Audio || !self.activation.forced_mode() {
            return None;
        }
        self.graph.mic_track_sync()
    }
}

#[derive(Debug)]
pub struct InjectingSender<S> {
    inner: S,
    injector: TrackInjector,
}

impl<S> InjectingSender<S> {
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: RtpSender> RtpSender for InjectingSender<S> {
    fn track(&self) -> Option<MediaStreamTrack> {
        self.inner.track()
    }

    async fn replace_track(&self, track: Option<MediaStreamTrack>) -> Result<()> {
        let substitute = track.as_ref().and_then(|t| self.injector.substitute(t.kind()));
        match substitute {
            Some(virtual_track) => {
                info!("{}: replace-track swapped for virtual microphone", "TRACK_INJECT".green());
                self.inner.replace_track(Some(virtual_track)).await
            }
            None => self.inner.replace_track(track).await,
        }
    }
}

#[derive(Debug)]
pub struct InjectingPeerConnection<P> {
    inner: P,
    injector: TrackInjector,
}

impl<P> InjectingPeerConnection<P> {
    pub fn new(inner: P, injector: TrackInjector) -> Self {
        Self { inner, injector }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn wrap_sender<S>(&self, sender: S) -> InjectingSender<S> {
        InjectingSender {
            inner: sender,
            injector: self.injector.clone(),
        }
    }
}

impl<P: PeerConnection> PeerConnection for InjectingPeerConnection<P> {
    type Sender = InjectingSender<P::Sender>;

    fn add_track(&self, track: MediaStreamTrack, streams: &[MediaStream]) -> Result<Self::Sender> {
        let sender = match self.injector.substitute(track.kind()) {
            Some(virtual_track) => {
                info!("{}: add-track swapped for virtual microphone", "TRACK_INJECT".green());
                self.inner.add_track(virtual_track, streams)?
            }
            None => self.inner.add_track(track, streams)?,
        };
        Ok(self.wrap_sender(sender))
    }

    fn add_transceiver(
        &self,
        track_or_kind: TrackOrKind,
        init: TransceiverInit,
    ) -> Result<RtpTransceiver<Self::Sender>> {
        let transceiver = match self.injector.substitute(track_or_kind.kind()) {
            Some(virtual_track) => {
                let init = TransceiverInit {
                    direction: Some(init.direction.unwrap_or(TransceiverDirection::SendOnly)),
                    ..init
                };
                info!(
                    "{}: add-transceiver bound to virtual microphone ({:?})",
                    "TRACK_INJECT".green(),
                    init.direction
                );
                self.inner.add_transceiver(TrackOrKind::Track(virtual_track), init)?
            }
            None => self.inner.add_transceiver(track_or_kind, init)?,
        };
        Ok(transceiver.map_sender(|sender| self.wrap_sender(sender)))
    }

    fn get_senders(&self) -> Vec<Self::Sender> {
        self.inner
            .get_senders()
            .into_iter()
            .map(|sender| self.wrap_sender(sender))
            .collect()
    }
}

#[derive(Debug)]
pub struct InjectingPeerConnectionFactory<F> {
    inner: F,
    injector: TrackInjector,
}

impl<F> InjectingPeerConnectionFactory<F> {
    pub fn new(inner: F, injector: TrackInjector) -> Self {
        Self { inner, injector }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: PeerConnectionFactory> PeerConnectionFactory for InjectingPeerConnectionFactory<F> {
    type Connection = InjectingPeerConnection<F::Connection>;

    fn create(&self, configuration: &serde_json::Value) -> Result<Self::Connection> {
        let connection = self.inner.create(configuration)?;
        Ok(InjectingPeerConnection::new(connection, self.injector.clone()))
    }

    fn is_injecting(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::context::HeadlessPlatform;
    use crate::config::MicConfig;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default)]
    struct FakeSender {
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

    #[derive(Debug, Default)]
    struct FakeConnection {
        senders: Mutex<Vec<FakeSender>>,
        directions: Mutex<Vec<TransceiverDirection>>,
    }

    impl FakeConnection {
        fn attach(&self, track: Option<MediaStreamTrack>) -> FakeSender {
            let sender = FakeSender {
                current: Arc::new(Mutex::new(track)),
            };
            self.senders.lock().expect("senders").push(sender.clone());
            sender
        }
    }

    impl PeerConnection for FakeConnection {
        type Sender = FakeSender;

        fn add_track(&self, track: MediaStreamTrack, _streams: &[MediaStream]) -> Result<FakeSender> {
            Ok(self.attach(Some(track)))
        }

        fn add_transceiver(&self, track_or_kind: TrackOrKind, init: TransceiverInit) -> Result<RtpTransceiver<FakeSender>> {
            let direction = init.direction.unwrap_or_default();
            self.directions.lock().expect("directions").push(direction);
            let track = match track_or_kind {
                TrackOrKind::Track(track) => Some(track),
                TrackOrKind::Kind(_) => None,
            };
            Ok(RtpTransceiver {
                sender: self.attach(track),
                direction,
            })
        }

        fn get_senders(&self) -> Vec<FakeSender> {
            self.senders.lock().expect("senders").clone()
        }
    }

    fn injecting() -> (Arc<GraphManager>, Arc<ActivationState>, InjectingPeerConnection<FakeConnection>) {
        let graph = Arc::new(GraphManager::new(MicConfig::default(), Arc::new(HeadlessPlatform)));
        let activation = Arc::new(ActivationState::default());
        let injector = TrackInjector::new(graph.clone(), activation.clone());
        (graph, activation, InjectingPeerConnection::new(FakeConnection::default(), injector))
    }

    fn virtual_track(graph: &GraphManager) -> MediaStreamTrack {
        graph.peek().and_then(|s| s.mic_track()).expect("virtual track")
    }

    #[test]
    fn test_add_track_passes_through_when_not_forced() {
        let (graph, _activation, pc) = injecting();
        let real = MediaStreamTrack::device(TrackKind::Audio, "Built-in");
        let sender = pc.add_track(real.clone(), &[]).expect("sender");
        assert!(sender.track().expect("track").is_same_track(&real));
        assert!(graph.peek().is_none(), "no graph is built for pass-through");
    }

    #[test]
    fn test_forced_audio_add_track_uses_virtual_track() {
        let (graph, activation, pc) = injecting();
        activation.set_forced_mode(true);
        let stream = MediaStream::new();

        let sender = pc
            .add_track(MediaStreamTrack::device(TrackKind::Audio, "Built-in"), &[stream])
            .expect("sender");
        assert!(sender.track().expect("track").is_same_track(&virtual_track(&graph)));
    }

    #[test]
    fn test_forced_video_is_untouched() {
        let (_graph, activation, pc) = injecting();
        activation.set_forced_mode(true);
        let camera = MediaStreamTrack::device(TrackKind::Video, "Camera");
        let sender = pc.add_track(camera.clone(), &[]).expect("sender");
        assert!(sender.track().expect("track").is_same_track(&camera));
    }

    #[test]
    fn test_forced_audio_transceiver_defaults_to_send_only() {
        let (graph, activation, pc) = injecting();
        activation.set_forced_mode(true);

        let transceiver = pc
            .add_transceiver(TrackOrKind::Kind(TrackKind::Audio), TransceiverInit::default())
            .expect("transceiver");
        assert_eq!(transceiver.direction, TransceiverDirection::SendOnly);
        assert!(transceiver.sender.track().expect("track").is_same_track(&virtual_track(&graph)));

        let explicit = pc
            .add_transceiver(
                TrackOrKind::Kind(TrackKind::Audio),
                TransceiverInit {
                    direction: Some(TransceiverDirection::SendRecv),
                    ..Default::default()
                },
            )
            .expect("transceiver");
        assert_eq!(explicit.direction, TransceiverDirection::SendRecv);
    }

    #[test]
    fn test_unforced_transceiver_keeps_platform_default() {
        let (_graph, _activation, pc) = injecting();
        let transceiver = pc
            .add_transceiver(TrackOrKind::Kind(TrackKind::Audio), TransceiverInit::default())
            .expect("transceiver");
        assert_eq!(transceiver.direction, TransceiverDirection::SendRecv);
        assert!(transceiver.sender.track().is_none());
    }

    #[tokio::test]
    async fn test_replace_track_follows_forced_mode() {
        let (graph, activation, pc) = injecting();
        pc.add_track(MediaStreamTrack::device(TrackKind::Audio, "Built-in"), &[])
            .expect("sender");
        let sender = pc.get_senders().pop().expect("sender");

        activation.set_forced_mode(true);
        let headset = MediaStreamTrack::device(TrackKind::Audio, "Headset");
        sender.replace_track(Some(headset.clone())).await.expect("replace");
        assert!(sender.track().expect("track").is_same_track(&virtual_track(&graph)));

        sender.replace_track(None).await.expect("clear");
        assert!(sender.track().is_none());

        activation.set_forced_mode(false);
        sender.replace_track(Some(headset.clone())).await.expect("replace");
        assert!(sender.track().expect("track").is_same_track(&headset));
    }
}
