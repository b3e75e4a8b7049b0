// Activation state and the user-gesture unlock
//
// Platforms refuse to run audio until the user interacts with the page. The
// gate listens for the first qualifying input event, builds the graph, resumes
// the context and only then lets queued frames through. A rejected resume
// re-arms the gate for the next gesture.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use colored::*;
use tracing::{info, warn};

use crate::audio::graph::GraphManager;
use crate::audio::ingest::FrameIngestor;

/// Flags shared between the control handler, the gesture gate and the
/// interceptors
#[derive(Debug)]
pub struct ActivationState {
    user_activated: AtomicBool,
    forced_mode: AtomicBool,
    desired_playing: AtomicBool,
    volume_bits: AtomicU32,
}

impl ActivationState {
    pub fn new(initial_volume: f32) -> Self {
        Self {
            user_activated: AtomicBool::new(false),
            forced_mode: AtomicBool::new(false),
            desired_playing: AtomicBool::new(false),
            volume_bits: AtomicU32::new(initial_volume.to_bits()),
        }
    }

    pub fn user_activated(&self) -> bool {
        self.user_activated.load(Ordering::Acquire)
    }

    pub(crate) fn set_user_activated(&self, activated: bool) {
        self.user_activated.store(activated, Ordering::Release);
    }

    /// Whether every audio request is answered with the virtual microphone
    pub fn forced_mode(&self) -> bool {
        self.forced_mode.load(Ordering::Acquire)
    }

    pub fn set_forced_mode(&self, forced: bool) {
        self.forced_mode.store(forced, Ordering::Release);
    }

    pub fn desired_playing(&self) -> bool {
        self.desired_playing.load(Ordering::Acquire)
    }

    pub fn set_desired_playing(&self, playing: bool) {
        self.desired_playing.store(playing, Ordering::Release);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Acquire))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Release);
    }
}

impl Default for ActivationState {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Page input events the gate listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInputEvent {
    PointerDown,
    KeyDown,
    TouchStart,
    Other,
}

impl UserInputEvent {
    /// Events the platform counts as a user activation
    pub fn is_activation(&self) -> bool {
        matches!(
            self,
            UserInputEvent::PointerDown | UserInputEvent::KeyDown | UserInputEvent::TouchStart
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Not an activation event
    Ignored,
    /// The gate already fired (or is firing)
    Disarmed,
    /// Context running; `drained` queued frames were delivered
    Unlocked { drained: usize },
    /// Graph or resume failed; gate re-armed
    Rejected,
}

/// Single-fire listener for the first user gesture
#[derive(Debug)]
pub struct GestureGate {
    armed: AtomicBool,
    graph: Arc<GraphManager>,
    ingestor: Arc<FrameIngestor>,
}

impl GestureGate {
    pub fn new(graph: Arc<GraphManager>, ingestor: Arc<FrameIngestor>) -> Self {
        Self {
            armed: AtomicBool::new(true),
            graph,
            ingestor,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub async fn on_user_input(&self, event: UserInputEvent) -> UnlockOutcome {
        if !event.is_activation() {
            return UnlockOutcome::Ignored;
        }
        if !self.armed.swap(false, Ordering::AcqRel) {
            return UnlockOutcome::Disarmed;
        }

        let state = match self.graph.ensure_graph().await {
            Ok(state) => state,
            Err(e) => {
                warn!("{}: graph construction failed on {:?}: {}", "GESTURE_UNLOCK".yellow(), event, e);
                self.armed.store(true, Ordering::Release);
                return UnlockOutcome::Rejected;
            }
        };

        if let Err(e) = state.context.resume(self.graph.platform().as_ref()).await {
            warn!("{}: resume failed, waiting for next gesture: {}", "GESTURE_UNLOCK".yellow(), e);
            self.armed.store(true, Ordering::Release);
            return UnlockOutcome::Rejected;
        }

        let drained = self.ingestor.unlock().await;
        info!("{}: unlocked by {:?}", "GESTURE_UNLOCK".green(), event);
        UnlockOutcome::Unlocked { drained }
    }
}
