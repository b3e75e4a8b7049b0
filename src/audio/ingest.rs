// Frame ingestion with pre-activation queuing
//
// Until a user gesture unlocks audio, frames are held in a bounded FIFO. The
// unlock drains it through the normal delivery path while holding the same
// lock `ingest` uses, so frames arriving mid-drain wait their turn and global
// order is preserved.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use colored::*;
use tracing::{info, warn};

use super::conversion::frame_to_pcm16;
use super::graph::GraphManager;
use super::types::{AudioFrame, RenderMessage};
use crate::activation::ActivationState;
use crate::mic_debug;

/// Ordered frames awaiting the audio unlock. Drop-oldest past capacity.
#[derive(Debug)]
pub struct PendingFrameQueue {
    frames: VecDeque<AudioFrame>,
    capacity: usize,
    dropped: u64,
}

impl PendingFrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Append a frame; returns the evicted oldest frame when full
    pub fn push(&mut self, frame: AudioFrame) -> Option<AudioFrame> {
        let evicted = if self.frames.len() >= self.capacity {
            self.dropped += 1;
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    /// Take every queued frame in arrival order, leaving the queue empty
    pub fn drain(&mut self) -> Vec<AudioFrame> {
        self.frames.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Held until the audio unlock
    Queued,
    /// Posted to the rendering unit
    Delivered,
    /// No rendering unit (or no graph); frame discarded
    Dropped,
}

#[derive(Debug)]
struct IngestState {
    unlocked: bool,
    pending: PendingFrameQueue,
}

#[derive(Debug)]
pub struct FrameIngestor {
    graph: Arc<GraphManager>,
    activation: Arc<ActivationState>,
    state: tokio::sync::Mutex<IngestState>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl FrameIngestor {
    pub fn new(graph: Arc<GraphManager>, activation: Arc<ActivationState>) -> Self {
        let capacity = graph.config().pending_frame_capacity;
        Self {
            graph,
            activation,
            state: tokio::sync::Mutex::new(IngestState {
                unlocked: false,
                pending: PendingFrameQueue::new(capacity),
            }),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub async fn ingest(&self, frame: AudioFrame) -> IngestOutcome {
        let mut state = self.state.lock().await;
        if !state.unlocked {
            if state.pending.push(frame).is_some() {
                warn!(
                    "{}: pending queue full ({}), dropped oldest frame",
                    "PENDING_OVERFLOW".yellow(),
                    state.pending.capacity()
                );
            }
            mic_debug!("Queued frame while locked ({} pending)", state.pending.len());
            return IngestOutcome::Queued;
        }
        self.deliver(frame).await
    }

    async fn deliver(&self, frame: AudioFrame) -> IngestOutcome {
        if let Err(e) = self.graph.ensure_graph().await {
            warn!("Dropping frame, graph unavailable: {}", e);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return IngestOutcome::Dropped;
        }
        self.graph.start_synthetic();

        let pcm = frame_to_pcm16(&frame);
        let samples = pcm.len();
        if self.graph.post_to_renderer(RenderMessage::Pcm16(pcm)) {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            mic_debug!("Delivered {} samples to rendering unit", samples);
            IngestOutcome::Delivered
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            mic_debug!("No rendering unit, dropped {} samples", samples);
            IngestOutcome::Dropped
        }
    }

    /// Switch to immediate delivery and drain the pending queue in order.
    /// Returns how many queued frames were handed to the delivery path.
    pub async fn unlock(&self) -> usize {
        let mut state = self.state.lock().await;
        if state.unlocked {
            return 0;
        }
        let frames = state.pending.drain();
        state.unlocked = true;
        self.activation.set_user_activated(true);

        let count = frames.len();
        for frame in frames {
            self.deliver(frame).await;
        }
        info!("{}: audio unlocked, drained {} queued frames", "AUDIO_UNLOCK".green(), count);
        count
    }

    pub async fn is_unlocked(&self) -> bool {
        self.state.lock().await.unlocked
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn pending_dropped(&self) -> u64 {
        self.state.lock().await.pending.dropped()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
