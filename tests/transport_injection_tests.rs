mod common;

use common::{engine, FakeFactory};
use voicehub_mic_lib::media::track::TrackKind;
use voicehub_mic_lib::{
    ChannelMessage, MediaStream, MediaStreamTrack, PeerConnection, PeerConnectionFactory, RtpSender,
    TransceiverDirection, TransceiverInit, TrackOrKind,
};

fn virtual_track(engine: &voicehub_mic_lib::VirtualMicEngine) -> MediaStreamTrack {
    engine.graph().mic_track_sync().expect("virtual track")
}

#[tokio::test]
async fn test_forced_mode_gates_add_track() {
    let engine = engine();
    let factory = engine.install_transport(FakeFactory).wrapped().expect("wrapped");
    let pc = factory.create(&serde_json::json!({})).expect("connection");
    let mic = MediaStreamTrack::device(TrackKind::Audio, "Built-in Microphone");
    let stream = MediaStream::with_tracks(vec![mic.clone()]);

    let sender = pc.add_track(mic.clone(), std::slice::from_ref(&stream)).expect("sender");
    assert!(sender.track().expect("track").is_same_track(&mic));

    engine.activation().set_forced_mode(true);
    let sender = pc.add_track(mic.clone(), std::slice::from_ref(&stream)).expect("sender");
    assert!(sender.track().expect("track").is_same_track(&virtual_track(&engine)));

    // Stream arguments pass through untouched
    assert_eq!(*pc.inner().stream_counts.lock().expect("counts"), vec![1, 1]);
}

#[tokio::test]
async fn test_mode_message_switches_injection() {
    let engine = engine();
    engine.start();
    let factory = engine.install_transport(FakeFactory).wrapped().expect("wrapped");
    let pc = factory.create(&serde_json::Value::Null).expect("connection");

    let mut status = engine.subscribe_status();
    engine.channel().post(ChannelMessage::Mode { state: Some("on".into()) });
    // Skip the start-up announcement, wait for the mode change
    loop {
        let payload = status.recv().await.expect("status");
        if payload.mic_mode == Some(true) {
            break;
        }
    }

    let transceiver = pc
        .add_transceiver(TrackOrKind::Kind(TrackKind::Audio), TransceiverInit::default())
        .expect("transceiver");
    assert_eq!(transceiver.direction, TransceiverDirection::SendOnly);
    assert!(transceiver.sender.track().expect("track").is_same_track(&virtual_track(&engine)));
}

#[tokio::test]
async fn test_video_never_substituted() {
    let engine = engine();
    engine.activation().set_forced_mode(true);
    let factory = engine.install_transport(FakeFactory).wrapped().expect("wrapped");
    let pc = factory.create(&serde_json::Value::Null).expect("connection");

    let camera = MediaStreamTrack::device(TrackKind::Video, "Camera");
    let sender = pc.add_track(camera.clone(), &[]).expect("sender");
    assert!(sender.track().expect("track").is_same_track(&camera));

    let transceiver = pc
        .add_transceiver(TrackOrKind::Kind(TrackKind::Video), TransceiverInit::default())
        .expect("transceiver");
    assert_eq!(transceiver.direction, TransceiverDirection::SendRecv);
    assert!(transceiver.sender.track().is_none());
    assert!(engine.graph().peek().is_none(), "video paths never build the graph");
}

#[tokio::test]
async fn test_replace_track_on_existing_senders() {
    let engine = engine();
    let factory = engine.install_transport(FakeFactory).wrapped().expect("wrapped");
    let pc = factory.create(&serde_json::Value::Null).expect("connection");
    pc.add_track(MediaStreamTrack::device(TrackKind::Audio, "Built-in"), &[])
        .expect("sender");

    engine.activation().set_forced_mode(true);
    let headset = MediaStreamTrack::device(TrackKind::Audio, "Headset");
    for sender in pc.get_senders() {
        sender.replace_track(Some(headset.clone())).await.expect("replace");
        assert!(sender.track().expect("track").is_same_track(&virtual_track(&engine)));
    }
}

#[tokio::test]
async fn test_transport_installs_once() {
    let engine = engine();
    assert!(engine.install_transport(FakeFactory).is_wrapped());
    assert!(!engine.install_transport(FakeFactory).is_wrapped());
    assert!(engine.registry().transport_wrapped());
}
