// Control channel: message types and the handler behind them
//
// The channel is broadcast-style with one endpoint per participant. The UI
// side posts commands, the engine posts `status` messages back, and a post
// reaches every endpoint except the one it came from. Observers subscribe to
// a bounded view that may lag; the handler drains a lossless inbound queue,
// so commands are handled strictly in order and none are skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use colored::*;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::activation::ActivationState;
use crate::audio::graph::GraphManager;
use crate::audio::ingest::FrameIngestor;
use crate::audio::types::{AudioFrame, SampleFormat};
use crate::config::CONTROL_CHANNEL_NAME;
use crate::error::{MicError, Result};
use crate::status::{StatusBroadcaster, StatusPayload};
use crate::storage::KeyValueStore;
use crate::mic_debug;

/// The only source the engine plays from
pub const AGENT_SOURCE: &str = "agent";

/// Base64 encoding for binary buffers carried in JSON
mod base64_buffer {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelMessage {
    Pcm16 {
        #[serde(with = "base64_buffer")]
        buffer: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    Toggle {
        #[serde(default)]
        state: Option<String>,
    },
    Mode {
        #[serde(default)]
        state: Option<String>,
    },
    Source,
    Play,
    Pause,
    Reset,
    Seek {
        #[serde(default)]
        value: serde_json::Value,
    },
    Volume {
        #[serde(default)]
        value: serde_json::Value,
    },
    Monitor {
        #[serde(default)]
        value: serde_json::Value,
    },
    Status(StatusPayload),
    #[serde(other)]
    Unknown,
}

impl ChannelMessage {
    pub fn pcm16(samples: &[i16]) -> Self {
        ChannelMessage::Pcm16 {
            buffer: AudioFrame::from_pcm16(samples).buffer,
            format: None,
        }
    }

    pub fn f32(samples: &[f32]) -> Self {
        ChannelMessage::Pcm16 {
            buffer: AudioFrame::from_f32(samples).buffer,
            format: Some("f32".into()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: u64,
    message: ChannelMessage,
}

#[derive(Debug)]
struct ChannelShared {
    observers: broadcast::Sender<Envelope>,
    inbound: Mutex<Vec<(u64, mpsc::UnboundedSender<ChannelMessage>)>>,
    next_endpoint: AtomicU64,
}

/// One endpoint on a named channel shared by the UI and the engine.
/// Clones are the same endpoint; `endpoint()` opens another one.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    name: Arc<str>,
    endpoint: u64,
    shared: Arc<ChannelShared>,
}

impl ControlChannel {
    pub fn new(capacity: usize) -> Self {
        Self::named(CONTROL_CHANNEL_NAME, capacity)
    }

    /// `capacity` bounds the observer view only
    pub fn named(name: &str, capacity: usize) -> Self {
        let (observers, _) = broadcast::channel(capacity.max(1));
        Self {
            name: Arc::from(name),
            endpoint: 0,
            shared: Arc::new(ChannelShared {
                observers,
                inbound: Mutex::new(Vec::new()),
                next_endpoint: AtomicU64::new(1),
            }),
        }
    }

    /// Open another endpoint on the same channel
    pub fn endpoint(&self) -> Self {
        Self {
            name: self.name.clone(),
            endpoint: self.shared.next_endpoint.fetch_add(1, Ordering::Relaxed),
            shared: self.shared.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post to every other endpoint; returns how many queues and observers took it
    pub fn post(&self, message: ChannelMessage) -> usize {
        let mut delivered = 0;
        {
            let mut queues = self.shared.inbound.lock().unwrap_or_else(PoisonError::into_inner);
            queues.retain(|(_, tx)| !tx.is_closed());
            for (endpoint, tx) in queues.iter() {
                if *endpoint != self.endpoint && tx.send(message.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        let observed = self
            .shared
            .observers
            .send(Envelope {
                origin: self.endpoint,
                message,
            })
            .unwrap_or(0);
        delivered + observed
    }

    pub fn post_json(&self, json: &str) -> Result<usize> {
        Ok(self.post(ChannelMessage::from_json(json)?))
    }

    /// Bounded view of what other endpoints post. Slow observers lag.
    pub fn subscribe(&self) -> ChannelReceiver {
        ChannelReceiver {
            endpoint: self.endpoint,
            rx: self.shared.observers.subscribe(),
        }
    }

    /// Unbounded queue of everything other endpoints post from now on
    pub fn inbound(&self) -> mpsc::UnboundedReceiver<ChannelMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((self.endpoint, tx));
        rx
    }
}

/// Observer side of a `ControlChannel` endpoint
#[derive(Debug)]
pub struct ChannelReceiver {
    endpoint: u64,
    rx: broadcast::Receiver<Envelope>,
}

impl ChannelReceiver {
    pub async fn recv(&mut self) -> std::result::Result<ChannelMessage, broadcast::error::RecvError> {
        loop {
            let envelope = self.rx.recv().await?;
            if envelope.origin != self.endpoint {
                return Ok(envelope.message);
            }
        }
    }

    pub fn try_recv(&mut self) -> std::result::Result<ChannelMessage, broadcast::error::TryRecvError> {
        loop {
            let envelope = self.rx.try_recv()?;
            if envelope.origin != self.endpoint {
                return Ok(envelope.message);
            }
        }
    }
}

/// JS-style numeric coercion: strings parse, booleans are 0/1, the rest is NaN
pub fn coerce_number(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        serde_json::Value::String(s) if s.trim().is_empty() => 0.0,
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        serde_json::Value::Bool(b) => f64::from(u8::from(*b)),
        serde_json::Value::Null => 0.0,
        _ => f64::NAN,
    }
}

pub fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan()),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

/// Volume in [0, 1]; anything non-numeric becomes 0
pub fn clamp_volume(value: &serde_json::Value) -> f32 {
    let v = coerce_number(value);
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 1.0) as f32
}

pub struct ControlHandler {
    graph: Arc<GraphManager>,
    activation: Arc<ActivationState>,
    ingestor: Arc<FrameIngestor>,
    store: Arc<dyn KeyValueStore>,
    status: StatusBroadcaster,
}

impl ControlHandler {
    pub fn new(
        graph: Arc<GraphManager>,
        activation: Arc<ActivationState>,
        ingestor: Arc<FrameIngestor>,
        store: Arc<dyn KeyValueStore>,
        status: StatusBroadcaster,
    ) -> Self {
        Self {
            graph,
            activation,
            ingestor,
            store,
            status,
        }
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!("{}: could not persist {}={}: {}", "STORAGE".yellow(), key, value, e);
        }
    }

    /// Handle one control message
    pub async fn handle(&self, message: ChannelMessage) -> Result<()> {
        match message {
            ChannelMessage::Pcm16 { buffer, format } => {
                let frame = AudioFrame::new(SampleFormat::from_tag(format.as_deref()), buffer);
                let outcome = self.ingestor.ingest(frame).await;
                mic_debug!("pcm16 frame: {:?}", outcome);
            }
            ChannelMessage::Toggle { state } => {
                if state.as_deref() == Some("off") {
                    self.graph.ensure_graph().await?;
                    if self.graph.flush_renderer() {
                        info!("{}: rendering unit flushed", "TOGGLE_OFF".green());
                    }
                }
            }
            ChannelMessage::Mode { state } => {
                let forced = state.as_deref() == Some("on");
                self.activation.set_forced_mode(forced);
                self.persist(&self.graph.config().mic_mode_key, if forced { "on" } else { "off" });
                info!("{}: forced microphone {}", "MIC_MODE".green(), if forced { "on" } else { "off" });
                self.status.emit(StatusPayload::mic_mode(forced));
            }
            ChannelMessage::Source => {
                self.status.emit(StatusPayload::source(AGENT_SOURCE));
            }
            ChannelMessage::Play => {
                self.activation.set_desired_playing(true);
                self.persist(&self.graph.config().playing_key, "1");
            }
            ChannelMessage::Pause => {
                self.activation.set_desired_playing(false);
                self.persist(&self.graph.config().playing_key, "0");
            }
            ChannelMessage::Reset => {
                debug!("reset: nothing to reset for the agent source");
            }
            ChannelMessage::Seek { value } => {
                debug!("seek to {}: agent source is not seekable", coerce_number(&value));
            }
            ChannelMessage::Volume { value } => {
                let volume = clamp_volume(&value);
                self.graph.ensure_graph().await?;
                let applied = self.graph.set_master_gain(volume).ok_or(MicError::GraphUnavailable)?;
                self.activation.set_volume(applied);
                info!("{}: master gain {:.2}", "VOLUME".green(), applied);
                self.status.emit(StatusPayload::volume(applied));
            }
            ChannelMessage::Monitor { value } => {
                let enabled = is_truthy(&value);
                if enabled {
                    self.graph.ensure_graph().await?;
                    self.graph.connect_monitor()?;
                } else {
                    self.graph.disconnect_monitor();
                }
                info!("{}: local monitor {}", "MONITOR".green(), if enabled { "on" } else { "off" });
                self.status.emit(StatusPayload::monitor(enabled));
            }
            ChannelMessage::Status(_) | ChannelMessage::Unknown => {}
        }
        Ok(())
    }

    /// Drain the inbound queue until every endpoint is gone
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<ChannelMessage>) {
        info!("{}: listening for control messages", "CONTROL".green());
        while let Some(message) = inbound.recv().await {
            if let Err(e) = self.handle(message).await {
                warn!("{}: message failed: {}", "CONTROL".yellow(), e);
            }
        }
        info!("{}: channel closed", "CONTROL".green());
    }
}

impl std::fmt::Debug for ControlHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::context::HeadlessPlatform;
    use crate::config::MicConfig;
    use crate::storage::{MemoryStore, MockKeyValueStore};
    use serde_json::json;

    struct Fixture {
        graph: Arc<GraphManager>,
        activation: Arc<ActivationState>,
        ingestor: Arc<FrameIngestor>,
        store: Arc<MemoryStore>,
        status_rx: broadcast::Receiver<StatusPayload>,
        handler: ControlHandler,
    }

    fn fixture() -> Fixture {
        let graph = Arc::new(GraphManager::new(MicConfig::default(), Arc::new(HeadlessPlatform)));
        let activation = Arc::new(ActivationState::new(0.9));
        let ingestor = Arc::new(FrameIngestor::new(graph.clone(), activation.clone()));
        let store = Arc::new(MemoryStore::new());
        let status = StatusBroadcaster::new(ControlChannel::new(16));
        let status_rx = status.subscribe();
        let handler = ControlHandler::new(graph.clone(), activation.clone(), ingestor.clone(), store.clone(), status);
        Fixture {
            graph,
            activation,
            ingestor,
            store,
            status_rx,
            handler,
        }
    }

    #[test]
    fn test_messages_parse_from_wire_json() {
        let msg = ChannelMessage::from_json(r#"{"type":"pcm16","buffer":"AAD/fw==","format":"f32"}"#).expect("pcm16");
        assert_eq!(
            msg,
            ChannelMessage::Pcm16 {
                buffer: vec![0x00, 0x00, 0xff, 0x7f],
                format: Some("f32".into())
            }
        );
        assert_eq!(
            ChannelMessage::from_json(r#"{"type":"mode","state":"on"}"#).expect("mode"),
            ChannelMessage::Mode { state: Some("on".into()) }
        );
        assert_eq!(ChannelMessage::from_json(r#"{"type":"play"}"#).expect("play"), ChannelMessage::Play);
        assert_eq!(
            ChannelMessage::from_json(r#"{"type":"dance","value":3}"#).expect("unknown"),
            ChannelMessage::Unknown
        );
    }

    #[test]
    fn test_status_message_wire_shape() {
        let json = ChannelMessage::Status(StatusPayload::volume(0.5)).to_json().expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("value");
        assert_eq!(value, json!({ "type": "status", "volume": 0.5 }));
    }

    #[test]
    fn test_volume_clamping() {
        assert_eq!(clamp_volume(&json!(0.5)), 0.5);
        assert_eq!(clamp_volume(&json!(1.7)), 1.0);
        assert_eq!(clamp_volume(&json!(-2)), 0.0);
        assert_eq!(clamp_volume(&json!("0.25")), 0.25);
        assert_eq!(clamp_volume(&json!("loud")), 0.0);
        assert_eq!(clamp_volume(&json!(null)), 0.0);
        assert_eq!(clamp_volume(&json!({})), 0.0);
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(null)));
    }

    #[tokio::test]
    async fn test_mode_sets_flag_persists_and_announces() {
        let mut f = fixture();
        f.handler
            .handle(ChannelMessage::Mode { state: Some("on".into()) })
            .await
            .expect("handled");

        assert!(f.activation.forced_mode());
        assert_eq!(f.store.get("cb_mic_mode").expect("get").as_deref(), Some("on"));
        assert_eq!(f.status_rx.recv().await.expect("status"), StatusPayload::mic_mode(true));

        f.handler
            .handle(ChannelMessage::Mode { state: Some("off".into()) })
            .await
            .expect("handled");
        assert!(!f.activation.forced_mode());
        assert_eq!(f.store.get("cb_mic_mode").expect("get").as_deref(), Some("off"));
    }

    #[tokio::test]
    async fn test_play_pause_persist_desired_state() {
        let f = fixture();
        f.handler.handle(ChannelMessage::Play).await.expect("play");
        assert!(f.activation.desired_playing());
        assert_eq!(f.store.get("cb_playing").expect("get").as_deref(), Some("1"));

        f.handler.handle(ChannelMessage::Pause).await.expect("pause");
        assert!(!f.activation.desired_playing());
        assert_eq!(f.store.get("cb_playing").expect("get").as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_volume_applies_to_master_gain_and_echoes() {
        let mut f = fixture();
        f.handler
            .handle(ChannelMessage::Volume { value: json!(3) })
            .await
            .expect("volume");

        let state = f.graph.peek().expect("graph built");
        assert_eq!(state.master_gain.gain(), 1.0);
        assert_eq!(f.activation.volume(), 1.0);
        assert_eq!(f.status_rx.recv().await.expect("status"), StatusPayload::volume(1.0));
    }

    #[tokio::test]
    async fn test_monitor_toggles_tap_and_echoes() {
        let mut f = fixture();
        f.handler
            .handle(ChannelMessage::Monitor { value: json!(true) })
            .await
            .expect("monitor on");
        let monitor = f.graph.peek().and_then(|s| s.monitor).expect("monitor tap");
        assert!(monitor.is_connected());
        assert_eq!(f.status_rx.recv().await.expect("status"), StatusPayload::monitor(true));

        f.handler
            .handle(ChannelMessage::Monitor { value: json!(false) })
            .await
            .expect("monitor off");
        assert!(!monitor.is_connected());
        assert_eq!(f.status_rx.recv().await.expect("status"), StatusPayload::monitor(false));
    }

    #[tokio::test]
    async fn test_source_acknowledges_agent() {
        let mut f = fixture();
        f.handler.handle(ChannelMessage::Source).await.expect("source");
        assert_eq!(f.status_rx.recv().await.expect("status"), StatusPayload::source("agent"));
    }

    #[tokio::test]
    async fn test_pcm16_before_unlock_is_queued() {
        let f = fixture();
        f.handler.handle(ChannelMessage::pcm16(&[1; 480])).await.expect("pcm16");
        f.handler.handle(ChannelMessage::f32(&[0.5; 480])).await.expect("f32");
        assert_eq!(f.ingestor.pending_len().await, 2);
    }

    #[tokio::test]
    async fn test_toggle_only_flushes_on_off() {
        let f = fixture();
        f.handler
            .handle(ChannelMessage::Toggle { state: Some("on".into()) })
            .await
            .expect("toggle on");
        assert!(f.graph.peek().is_none(), "toggle on does nothing");

        f.handler
            .handle(ChannelMessage::Toggle { state: Some("off".into()) })
            .await
            .expect("toggle off");
        assert!(f.graph.peek().is_some());
    }

    #[tokio::test]
    async fn test_ignored_messages_have_no_effect() {
        let f = fixture();
        for message in [
            ChannelMessage::Reset,
            ChannelMessage::Seek { value: json!(12) },
            ChannelMessage::Status(StatusPayload::volume(0.1)),
            ChannelMessage::Unknown,
        ] {
            f.handler.handle(message).await.expect("ignored");
        }
        assert!(f.graph.peek().is_none());
        assert_eq!(f.activation.volume(), 0.9);
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_block_mode_change() {
        let graph = Arc::new(GraphManager::new(MicConfig::default(), Arc::new(HeadlessPlatform)));
        let activation = Arc::new(ActivationState::default());
        let ingestor = Arc::new(FrameIngestor::new(graph.clone(), activation.clone()));
        let mut store = MockKeyValueStore::new();
        store
            .expect_set()
            .returning(|_, _| Err(MicError::Storage("quota exceeded".into())));
        let handler = ControlHandler::new(
            graph,
            activation.clone(),
            ingestor,
            Arc::new(store),
            StatusBroadcaster::new(ControlChannel::new(4)),
        );

        handler
            .handle(ChannelMessage::Mode { state: Some("on".into()) })
            .await
            .expect("handled");
        assert!(activation.forced_mode());
    }

    #[tokio::test]
    async fn test_run_processes_channel_in_order() {
        let f = fixture();
        let engine_side = ControlChannel::new(16);
        let ui = engine_side.endpoint();
        let inbound = engine_side.inbound();
        let handler = Arc::new(f.handler);
        let task = tokio::spawn(handler.clone().run(inbound));

        ui.post_json(r#"{"type":"mode","state":"on"}"#).expect("post");
        ui.post_json(r#"{"type":"play"}"#).expect("post");
        drop(ui);
        drop(engine_side);
        task.await.expect("run loop ends when channel closes");

        assert!(f.activation.forced_mode());
        assert!(f.activation.desired_playing());
    }

    #[tokio::test]
    async fn test_endpoint_never_hears_its_own_posts() {
        let engine_side = ControlChannel::new(8);
        let ui = engine_side.endpoint();
        let mut inbound = engine_side.inbound();
        let mut engine_view = engine_side.subscribe();
        let mut ui_view = ui.subscribe();

        engine_side.post(ChannelMessage::Status(StatusPayload::volume(0.5)));
        ui.post(ChannelMessage::Play);

        assert_eq!(inbound.recv().await, Some(ChannelMessage::Play));
        assert!(inbound.try_recv().is_err(), "own status must not come back");
        assert_eq!(engine_view.try_recv().expect("play"), ChannelMessage::Play);
        assert!(engine_view.try_recv().is_err());
        assert_eq!(
            ui_view.try_recv().expect("status"),
            ChannelMessage::Status(StatusPayload::volume(0.5))
        );
        assert!(ui_view.try_recv().is_err());
    }

    #[test]
    fn test_inbound_queue_outlasts_observer_capacity() {
        let engine_side = ControlChannel::new(4);
        let ui = engine_side.endpoint();
        let mut inbound = engine_side.inbound();
        let mut observer = engine_side.subscribe();

        for _ in 0..300 {
            ui.post(ChannelMessage::pcm16(&[7; 32]));
        }

        let mut received = 0;
        while inbound.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 300);
        assert!(matches!(
            observer.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }
}
