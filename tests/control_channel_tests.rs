mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{engine, next_status, wait_until};
use serial_test::serial;
use tempfile::TempDir;
use voicehub_mic_lib::{
    AudioPlatform, ChannelMessage, FileStore, HeadlessPlatform, KeyValueStore, MemoryStore, MicConfig, Result,
    StatusPayload, UserInputEvent, VirtualMicEngine,
};

/// Platform whose module load takes a while, stalling the control loop
struct SlowModulePlatform {
    delay: Duration,
}

#[async_trait]
impl AudioPlatform for SlowModulePlatform {
    fn create_context(&self, _sample_rate: u32) -> Result<()> {
        Ok(())
    }

    async fn resume_context(&self) -> Result<()> {
        Ok(())
    }

    async fn load_module(&self, _specifier: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_wire_json_drives_volume_and_monitor() {
    let engine = engine();
    let mut status = engine.subscribe_status();
    engine.start();
    assert_eq!(next_status(&mut status).await, StatusPayload::mic_mode(false));

    engine
        .channel()
        .post_json(r#"{"type":"volume","value":"0.4"}"#)
        .expect("volume");
    assert_eq!(next_status(&mut status).await, StatusPayload::volume(0.4));
    let gain = engine.graph().peek().expect("graph").master_gain.gain();
    assert!((gain - 0.4).abs() < f32::EPSILON);

    engine
        .channel()
        .post_json(r#"{"type":"monitor","value":true}"#)
        .expect("monitor");
    assert_eq!(next_status(&mut status).await, StatusPayload::monitor(true));

    engine.channel().post_json(r#"{"type":"source"}"#).expect("source");
    assert_eq!(next_status(&mut status).await, StatusPayload::source("agent"));
}

#[tokio::test]
async fn test_unknown_and_status_messages_are_ignored() {
    let engine = engine();
    engine.start();
    engine.channel().post_json(r#"{"type":"teleport","value":1}"#).expect("unknown");
    engine
        .channel()
        .post(ChannelMessage::Status(StatusPayload::volume(0.1)));
    engine.channel().post_json(r#"{"type":"play"}"#).expect("play");

    let activation = engine.activation().clone();
    assert!(wait_until(|| {
        let activation = activation.clone();
        async move { activation.desired_playing() }
    })
    .await);
    assert_eq!(engine.activation().volume(), 0.9);
    assert!(engine.graph().peek().is_none());
}

#[tokio::test]
async fn test_toggle_off_flushes_rendered_audio() {
    let engine = engine();
    engine.start();
    assert!(matches!(
        engine.on_user_input(UserInputEvent::TouchStart).await,
        voicehub_mic_lib::UnlockOutcome::Unlocked { drained: 0 }
    ));

    engine.channel().post(ChannelMessage::pcm16(&[16384; 1024]));
    engine.channel().post_json(r#"{"type":"toggle","state":"off"}"#).expect("toggle");
    // Both the buffer and the flush are waiting on the render port
    let port = engine.graph().peek().and_then(|s| s.rendering_unit).expect("rendering unit");
    assert!(wait_until(|| {
        let backlog = port.backlog();
        async move { backlog == 2 }
    })
    .await);

    let block = engine.graph().render_quantum().expect("running");
    let peak = block.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert!(peak < 0.001, "flushed audio must not render (peak {})", peak);
}

#[tokio::test]
async fn test_frames_posted_during_a_stall_are_all_queued() {
    let engine = VirtualMicEngine::new(
        MicConfig::default(),
        Arc::new(SlowModulePlatform {
            delay: Duration::from_millis(200),
        }),
        Arc::new(MemoryStore::new()),
        None,
    )
    .expect("engine");
    engine.start();

    // toggle off builds the graph, so the handler sits in the module load
    engine.channel().post_json(r#"{"type":"toggle","state":"off"}"#).expect("toggle");
    for _ in 0..300 {
        engine.channel().post(ChannelMessage::pcm16(&[100; 128]));
    }

    let ingestor = engine.ingestor().clone();
    assert!(wait_until(|| {
        let ingestor = ingestor.clone();
        async move { ingestor.pending_len().await == 300 }
    })
    .await);
    assert_eq!(ingestor.pending_dropped().await, 0);
}

#[tokio::test]
#[serial]
async fn test_flags_persist_to_file_store() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("storage.json");

    {
        let store = Arc::new(FileStore::open(&path).expect("store"));
        let engine =
            VirtualMicEngine::new(MicConfig::default(), Arc::new(HeadlessPlatform), store, None).expect("engine");
        engine.start();
        engine.channel().post_json(r#"{"type":"mode","state":"on"}"#).expect("mode");
        engine.channel().post_json(r#"{"type":"play"}"#).expect("play");

        let activation = engine.activation().clone();
        assert!(wait_until(|| {
            let activation = activation.clone();
            async move { activation.forced_mode() && activation.desired_playing() }
        })
        .await);
    }

    let reopened = FileStore::open(&path).expect("reopen");
    assert_eq!(reopened.get("cb_mic_mode").expect("get").as_deref(), Some("on"));
    assert_eq!(reopened.get("cb_playing").expect("get").as_deref(), Some("1"));

    let restored = VirtualMicEngine::new(
        MicConfig::default(),
        Arc::new(HeadlessPlatform),
        Arc::new(reopened),
        None,
    )
    .expect("engine");
    assert!(restored.activation().forced_mode());
    assert!(restored.activation().desired_playing());
}
