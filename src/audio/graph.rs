// Audio graph lifecycle
//
// One graph per engine, built lazily and never torn down:
//
//   rendering unit ─┐
//   keep-alive ─────┼─> mixer input ─> master gain ─> capture destination
//                   │        ├─> analyser
//                   │        └─> monitor ─> speakers
//   fallback bursts ───────────────────> master gain
//
// Construction is idempotent. `ensure_graph` serializes the asynchronous part
// (module loading) behind a build lock; the synchronous core (context,
// destination, gains) is guarded by the slot mutex so the sync track accessor
// can race with it safely.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use colored::*;
use tracing::{error, info, warn};

use super::analyzer::AnalyserNode;
use super::context::{AudioContext, AudioPlatform};
use super::nodes::{GainNode, KeepAlive, ToneBurst};
use super::renderer::{PcmRenderer, RenderPort};
use super::taps::{MediaStreamDestination, MonitorTap};
use super::types::RenderMessage;
use crate::assets::module_specifier;
use crate::config::{MicConfig, RENDER_QUANTUM_FRAMES};
use crate::error::{MicError, Result};
use crate::media::track::MediaStreamTrack;
use crate::mic_debug;

/// Snapshot of the constructed graph. Cheap to clone; every node is shared.
#[derive(Debug, Clone)]
pub struct GraphState {
    pub context: Arc<AudioContext>,
    pub destination: Arc<MediaStreamDestination>,
    pub master_gain: Arc<GainNode>,
    pub mixer_input: Arc<GainNode>,
    pub rendering_unit: Option<RenderPort>,
    pub analyser: Option<Arc<AnalyserNode>>,
    pub keep_alive_active: bool,
    pub monitor: Option<Arc<MonitorTap>>,
}

impl GraphState {
    /// The virtual microphone track
    pub fn mic_track(&self) -> Option<MediaStreamTrack> {
        self.destination.track()
    }
}

/// How many times each node kind has been created
#[derive(Debug, Default)]
pub struct GraphStats {
    pub contexts: AtomicUsize,
    pub destinations: AtomicUsize,
    pub master_gains: AtomicUsize,
    pub mixers: AtomicUsize,
    pub renderers: AtomicUsize,
    pub keep_alives: AtomicUsize,
    pub analysers: AtomicUsize,
    pub monitors: AtomicUsize,
    pub fallback_bursts: AtomicUsize,
}

#[derive(Default)]
struct GraphSlots {
    context: Option<Arc<AudioContext>>,
    destination: Option<Arc<MediaStreamDestination>>,
    master_gain: Option<Arc<GainNode>>,
    mixer_input: Option<Arc<GainNode>>,
    renderer_attempted: bool,
    rendering_unit: Option<RenderPort>,
    analyser: Option<Arc<AnalyserNode>>,
    keep_alive_active: bool,
    monitor: Option<Arc<MonitorTap>>,
}

impl GraphSlots {
    fn snapshot(&self) -> Option<GraphState> {
        Some(GraphState {
            context: self.context.clone()?,
            destination: self.destination.clone()?,
            master_gain: self.master_gain.clone()?,
            mixer_input: self.mixer_input.clone()?,
            rendering_unit: self.rendering_unit.clone(),
            analyser: self.analyser.clone(),
            keep_alive_active: self.keep_alive_active,
            monitor: self.monitor.clone(),
        })
    }
}

/// Render-thread owned state
struct RenderState {
    renderer: Option<PcmRenderer>,
    keep_alive: Option<KeepAlive>,
    bursts: Vec<ToneBurst>,
    source_block: Vec<f32>,
    mixed_block: Vec<f32>,
    master_block: Vec<f32>,
}

impl RenderState {
    fn new() -> Self {
        Self {
            renderer: None,
            keep_alive: None,
            bursts: Vec::new(),
            source_block: vec![0.0; RENDER_QUANTUM_FRAMES],
            mixed_block: vec![0.0; RENDER_QUANTUM_FRAMES],
            master_block: vec![0.0; RENDER_QUANTUM_FRAMES],
        }
    }
}

pub struct GraphManager {
    config: MicConfig,
    platform: Arc<dyn AudioPlatform>,
    slots: Mutex<GraphSlots>,
    build_lock: tokio::sync::Mutex<()>,
    render: Mutex<RenderState>,
    stats: GraphStats,
}

impl GraphManager {
    pub fn new(config: MicConfig, platform: Arc<dyn AudioPlatform>) -> Self {
        Self {
            config,
            platform,
            slots: Mutex::new(GraphSlots::default()),
            build_lock: tokio::sync::Mutex::new(()),
            render: Mutex::new(RenderState::new()),
            stats: GraphStats::default(),
        }
    }

    pub fn config(&self) -> &MicConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<dyn AudioPlatform> {
        &self.platform
    }

    pub fn stats(&self) -> &GraphStats {
        &self.stats
    }

    fn lock_slots(&self) -> Result<std::sync::MutexGuard<'_, GraphSlots>> {
        self.slots
            .lock()
            .map_err(|_| MicError::Platform(anyhow::anyhow!("graph slot lock poisoned")))
    }

    /// Build context → destination → master gain → mixer input, whichever
    /// are missing. Never touches the rendering unit.
    pub fn ensure_core(&self) -> Result<GraphState> {
        let mut slots = self.lock_slots()?;

        if slots.context.is_none() {
            let context = AudioContext::create(self.platform.as_ref(), self.config.sample_rate)?;
            slots.context = Some(Arc::new(context));
            self.stats.contexts.fetch_add(1, Ordering::Relaxed);
        }
        if slots.destination.is_none() {
            slots.destination = Some(Arc::new(MediaStreamDestination::new(
                self.config.sample_rate,
                &self.config.device_label,
            )));
            self.stats.destinations.fetch_add(1, Ordering::Relaxed);
        }
        if slots.master_gain.is_none() {
            slots.master_gain = Some(Arc::new(GainNode::new("master", self.config.master_gain)));
            self.stats.master_gains.fetch_add(1, Ordering::Relaxed);
        }
        if slots.mixer_input.is_none() {
            slots.mixer_input = Some(Arc::new(GainNode::new("mixer", 1.0)));
            self.stats.mixers.fetch_add(1, Ordering::Relaxed);
        }

        slots.snapshot().ok_or(MicError::GraphUnavailable)
    }

    /// Full construction: core, then rendering unit, keep-alive and analyser.
    /// Concurrent callers wait for the one construction sequence in flight.
    pub async fn ensure_graph(&self) -> Result<GraphState> {
        let _build = self.build_lock.lock().await;
        self.ensure_core()?;

        let needs_renderer = {
            let mut slots = self.lock_slots()?;
            let first = !slots.renderer_attempted;
            slots.renderer_attempted = true;
            first
        };
        if needs_renderer {
            self.attach_renderer().await?;
        }

        let mut slots = self.lock_slots()?;
        if !slots.keep_alive_active {
            let mut keep_alive = KeepAlive::new(
                self.config.keep_alive_frequency_hz,
                self.config.keep_alive_gain,
                self.config.sample_rate,
            );
            keep_alive.start();
            if let Ok(mut render) = self.render.lock() {
                render.keep_alive = Some(keep_alive);
                slots.keep_alive_active = true;
                self.stats.keep_alives.fetch_add(1, Ordering::Relaxed);
            }
        }
        if slots.analyser.is_none() {
            slots.analyser = Some(Arc::new(AnalyserNode::from_config(&self.config)));
            self.stats.analysers.fetch_add(1, Ordering::Relaxed);
        }

        let state = slots.snapshot().ok_or(MicError::GraphUnavailable)?;
        info!(
            "{}: graph ready (renderer: {}, context {})",
            "GRAPH_READY".green(),
            if state.rendering_unit.is_some() { "worklet" } else { "fallback" },
            state.context.id()
        );
        Ok(state)
    }

    async fn attach_renderer(&self) -> Result<()> {
        let specifier = module_specifier(
            self.config.asset_base_url.as_deref(),
            &self.config.renderer_module,
        );
        match self.platform.load_module(&specifier).await {
            Ok(()) => {
                let (port, renderer) = PcmRenderer::new();
                if let Ok(mut render) = self.render.lock() {
                    render.renderer = Some(renderer);
                }
                self.lock_slots()?.rendering_unit = Some(port);
                self.stats.renderers.fetch_add(1, Ordering::Relaxed);
                info!("{}: rendering unit loaded from {}", "RENDERER_LOAD".green(), specifier);
            }
            Err(e) => {
                warn!(
                    "{}: rendering unit unavailable ({}), using tone-burst fallback",
                    "RENDERER_LOAD".yellow(),
                    e
                );
            }
        }
        Ok(())
    }

    /// Current graph without constructing anything
    pub fn peek(&self) -> Option<GraphState> {
        self.slots.lock().ok().and_then(|s| s.snapshot())
    }

    /// Virtual microphone track, building only the synchronous core
    pub fn mic_track_sync(&self) -> Option<MediaStreamTrack> {
        match self.ensure_core() {
            Ok(state) => state.mic_track(),
            Err(e) => {
                warn!("Virtual track unavailable: {}", e);
                None
            }
        }
    }

    /// Make sure something audible-in-principle is flowing. With a rendering
    /// unit nothing extra is needed; without one, emit a short tone burst.
    pub fn start_synthetic(&self) {
        let Some(state) = self.peek() else {
            return;
        };
        if state.rendering_unit.is_some() {
            return;
        }
        if let Ok(mut render) = self.render.lock() {
            render.bursts.push(ToneBurst::new(
                self.config.fallback_frequency_hz,
                self.config.fallback_gain,
                self.config.sample_rate,
                self.config.fallback_burst_samples(),
            ));
            self.stats.fallback_bursts.fetch_add(1, Ordering::Relaxed);
            mic_debug!("Fallback tone burst scheduled");
        }
    }

    /// Post to the rendering unit. Returns false when there is none.
    pub fn post_to_renderer(&self, message: RenderMessage) -> bool {
        let port = self.peek().and_then(|s| s.rendering_unit);
        match port {
            Some(port) => match port.post(message) {
                Ok(()) => true,
                Err(e) => {
                    error!("Rendering unit post failed: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    /// Discard whatever the rendering unit has buffered
    pub fn flush_renderer(&self) -> bool {
        self.post_to_renderer(RenderMessage::Flush)
    }

    pub fn set_master_gain(&self, gain: f32) -> Option<f32> {
        let state = self.peek()?;
        state.master_gain.set_gain(gain);
        Some(state.master_gain.gain())
    }

    /// Connect mixer → monitor → speakers, creating the tap on first use
    pub fn connect_monitor(&self) -> Result<Arc<MonitorTap>> {
        let mut slots = self.lock_slots()?;
        if slots.context.is_none() {
            return Err(MicError::GraphUnavailable);
        }
        let monitor = match &slots.monitor {
            Some(monitor) => monitor.clone(),
            None => {
                let monitor = Arc::new(MonitorTap::new(self.config.monitor_buffer_capacity));
                slots.monitor = Some(monitor.clone());
                self.stats.monitors.fetch_add(1, Ordering::Relaxed);
                monitor
            }
        };
        monitor.connect();
        Ok(monitor)
    }

    pub fn disconnect_monitor(&self) {
        if let Some(monitor) = self.peek().and_then(|s| s.monitor) {
            monitor.disconnect();
        }
    }

    /// Advance the graph by one render quantum. Returns the block written to
    /// the capture destination, or `None` while the context is not running.
    pub fn render_quantum(&self) -> Option<Vec<f32>> {
        let state = self.peek()?;
        if !state.context.is_running() {
            return None;
        }
        let Ok(mut guard) = self.render.lock() else {
            return None;
        };
        let render = &mut *guard;

        render.source_block.fill(0.0);
        if let Some(renderer) = render.renderer.as_mut() {
            renderer.process(&mut render.source_block);
        }
        if let Some(keep_alive) = render.keep_alive.as_mut() {
            keep_alive.mix_into(&mut render.source_block);
        }

        state
            .mixer_input
            .process(&render.source_block, &mut render.mixed_block);
        if let Some(analyser) = &state.analyser {
            analyser.push(&render.mixed_block);
        }
        if let Some(monitor) = &state.monitor {
            monitor.write(&render.mixed_block);
        }

        render.master_block.copy_from_slice(&render.mixed_block);
        for burst in render.bursts.iter_mut() {
            burst.mix_into(&mut render.master_block);
        }
        render.bursts.retain(|b| !b.is_finished());

        let mut out = vec![0.0; RENDER_QUANTUM_FRAMES];
        state.master_gain.process(&render.master_block, &mut out);
        state.destination.write(&out);
        state.context.advance(RENDER_QUANTUM_FRAMES);
        Some(out)
    }

    /// Fallback bursts still sounding
    pub fn active_bursts(&self) -> usize {
        self.render.lock().map(|r| r.bursts.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for GraphManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphManager")
            .field("sample_rate", &self.config.sample_rate)
            .field("built", &self.peek().is_some())
            .finish()
    }
}
