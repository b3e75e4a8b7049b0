// The engine: one explicit context object per page
//
// Owns the graph, the activation flags, the ingestion path, the control
// channel and the visualization loop, and hands shared pieces to the
// interceptors it installs. Nothing is global; two engines are independent.

use std::sync::{Arc, Mutex};

use colored::*;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::activation::{ActivationState, GestureGate, UnlockOutcome, UserInputEvent};
use crate::audio::context::{AudioPlatform, HeadlessPlatform};
use crate::audio::driver::RenderDriver;
use crate::audio::graph::GraphManager;
use crate::audio::ingest::FrameIngestor;
use crate::config::MicConfig;
use crate::control::{ChannelMessage, ControlChannel, ControlHandler};
use crate::error::Result;
use crate::interception::{Installation, InterceptionRegistry};
use crate::media::devices::{MediaDevices, VirtualMediaDevices};
use crate::status::{StatusBroadcaster, StatusPayload};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::transport::{InjectingPeerConnectionFactory, PeerConnectionFactory, TrackInjector};
use crate::visualization::{FrameScheduler, VisualizationLoop};

const CHANNEL_CAPACITY: usize = 256;

pub struct VirtualMicEngine {
    graph: Arc<GraphManager>,
    activation: Arc<ActivationState>,
    ingestor: Arc<FrameIngestor>,
    gate: GestureGate,
    channel: ControlChannel,
    page_channel: ControlChannel,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<ChannelMessage>>>,
    status: StatusBroadcaster,
    handler: Arc<ControlHandler>,
    visualization: Arc<VisualizationLoop>,
    registry: InterceptionRegistry,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl VirtualMicEngine {
    pub fn new(
        config: MicConfig,
        platform: Arc<dyn AudioPlatform>,
        store: Arc<dyn KeyValueStore>,
        scheduler: Option<Arc<dyn FrameScheduler>>,
    ) -> Result<Self> {
        config.validate()?;

        let activation = Arc::new(ActivationState::new(config.master_gain));
        restore_persisted(&config, store.as_ref(), &activation);

        let channel = ControlChannel::named(&config.channel_name, CHANNEL_CAPACITY);
        let page_channel = channel.endpoint();
        // registered now so commands posted before start() are kept
        let inbound = channel.inbound();
        let graph = Arc::new(GraphManager::new(config, platform));
        let ingestor = Arc::new(FrameIngestor::new(graph.clone(), activation.clone()));
        let gate = GestureGate::new(graph.clone(), ingestor.clone());
        let status = StatusBroadcaster::new(channel.clone());
        let handler = Arc::new(ControlHandler::new(
            graph.clone(),
            activation.clone(),
            ingestor.clone(),
            store,
            status.clone(),
        ));
        let visualization = Arc::new(VisualizationLoop::new(graph.clone(), status.clone(), scheduler));

        Ok(Self {
            graph,
            activation,
            ingestor,
            gate,
            channel,
            page_channel,
            inbound: Mutex::new(Some(inbound)),
            status,
            handler,
            visualization,
            registry: InterceptionRegistry::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Environment-configured engine on the headless platform with
    /// in-memory storage
    pub fn from_env() -> Result<Self> {
        Self::new(
            MicConfig::from_env()?,
            Arc::new(HeadlessPlatform),
            Arc::new(MemoryStore::new()),
            None,
        )
    }

    /// Start the control loop and the visualization loop, then announce the
    /// restored mode. Must run inside a tokio runtime. Idempotent.
    pub fn start(&self) {
        let Ok(mut tasks) = self.tasks.lock() else {
            warn!("Engine task list poisoned; not starting");
            return;
        };
        if !tasks.is_empty() {
            return;
        }

        let inbound = self.inbound.lock().ok().and_then(|mut slot| slot.take());
        let Some(inbound) = inbound else {
            warn!("Control inbound queue already taken; not starting");
            return;
        };
        tasks.push(tokio::spawn(self.handler.clone().run(inbound)));
        if let Some(handle) = self.visualization.start() {
            tasks.push(handle);
        }

        self.status.emit(StatusPayload::mic_mode(self.activation.forced_mode()));
        info!(
            "{}: engine started on channel {} (forced: {}, playing: {})",
            "ENGINE".green(),
            self.channel.name(),
            self.activation.forced_mode(),
            self.activation.desired_playing()
        );
    }

    /// Wrap the host's device entry points
    pub fn install_media_devices<D: MediaDevices>(&self, devices: D) -> Installation<VirtualMediaDevices<D>, D> {
        self.registry
            .install_media_devices(devices, self.graph.clone(), self.activation.clone())
    }

    /// Wrap the host's peer-connection constructor
    pub fn install_transport<F: PeerConnectionFactory>(
        &self,
        factory: F,
    ) -> Installation<InjectingPeerConnectionFactory<F>, F> {
        self.registry.install_transport(factory, self.track_injector())
    }

    /// Presence marker: device acquisition is intercepted
    pub fn is_installed(&self) -> bool {
        self.registry.acquisition_wrapped()
    }

    pub fn registry(&self) -> &InterceptionRegistry {
        &self.registry
    }

    pub fn track_injector(&self) -> TrackInjector {
        TrackInjector::new(self.graph.clone(), self.activation.clone())
    }

    /// Forward a page input event to the gesture gate
    pub async fn on_user_input(&self, event: UserInputEvent) -> UnlockOutcome {
        self.gate.on_user_input(event).await
    }

    /// Real-time render thread for hosts without an audio callback
    pub fn spawn_render_driver(&self) -> std::io::Result<RenderDriver> {
        RenderDriver::spawn(self.graph.clone())
    }

    /// Page-side endpoint of the control channel: posts reach the engine,
    /// subscribers hear the engine's statuses
    pub fn channel(&self) -> &ControlChannel {
        &self.page_channel
    }

    /// Page-level status events
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusPayload> {
        self.status.subscribe()
    }

    pub fn graph(&self) -> &Arc<GraphManager> {
        &self.graph
    }

    pub fn activation(&self) -> &Arc<ActivationState> {
        &self.activation
    }

    pub fn ingestor(&self) -> &Arc<FrameIngestor> {
        &self.ingestor
    }

    pub fn visualization(&self) -> &Arc<VisualizationLoop> {
        &self.visualization
    }

    pub fn config(&self) -> &MicConfig {
        self.graph.config()
    }
}

impl Drop for VirtualMicEngine {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl std::fmt::Debug for VirtualMicEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMicEngine")
            .field("graph", &self.graph)
            .field("forced_mode", &self.activation.forced_mode())
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Load the persisted flags. Storage failures leave the defaults in place.
fn restore_persisted(config: &MicConfig, store: &dyn KeyValueStore, activation: &ActivationState) {
    match store.get(&config.mic_mode_key) {
        Ok(Some(mode)) => activation.set_forced_mode(mode == "on"),
        Ok(None) => {}
        Err(e) => warn!("{}: mic mode not restored: {}", "STORAGE".yellow(), e),
    }
    match store.get(&config.playing_key) {
        Ok(Some(playing)) => activation.set_desired_playing(playing == "1"),
        Ok(None) => {}
        Err(e) => warn!("{}: playing flag not restored: {}", "STORAGE".yellow(), e),
    }
}
