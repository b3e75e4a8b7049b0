// VoiceHub virtual microphone engine
//
// Synthesizes a virtual microphone device, feeds it streamed audio and
// substitutes it wherever the host asks for microphone input: device
// enumeration and acquisition, and peer-connection track attachment.
// Platform services (audio context, module loading, real devices, peer
// connections, display frames, local storage) are traits the host implements.

pub mod activation;
pub mod assets;
pub mod audio;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod interception;
pub mod log;
pub mod media;
pub mod status;
pub mod storage;
pub mod transport;
pub mod visualization;

pub use activation::{ActivationState, GestureGate, UnlockOutcome, UserInputEvent};
pub use assets::{module_specifier, resolve_asset_base, ScriptTag};
pub use audio::{
    AnalyserNode, AudioContext, AudioFrame, AudioPlatform, ContextState, FrameIngestor, GraphManager, GraphState,
    HeadlessPlatform, PendingFrameQueue, RenderDriver, SampleFormat,
};
pub use config::MicConfig;
pub use control::{ChannelMessage, ChannelReceiver, ControlChannel, ControlHandler};
pub use engine::VirtualMicEngine;
pub use error::{MicError, Result};
pub use interception::{Installation, InterceptionRegistry};
pub use log::init_tracing;
pub use media::{
    AudioConstraints, ConstrainDomString, ContentHint, MediaDeviceInfo, MediaDeviceKind, MediaDevices, MediaStream,
    MediaStreamConstraints, MediaStreamTrack, TrackKind, VirtualMediaDevices,
};
pub use status::{StatusBroadcaster, StatusPayload};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{
    InjectingPeerConnection, InjectingPeerConnectionFactory, InjectingSender, PeerConnection, PeerConnectionFactory,
    RtpSender, RtpTransceiver, TrackInjector, TrackOrKind, TransceiverDirection, TransceiverInit,
};
pub use visualization::{bucketize, FrameScheduler, VisualizationLoop};
