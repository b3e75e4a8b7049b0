// Rendering unit: turns queued 16-bit buffers into graph output
//
// The control side only ever holds a `RenderPort`. Buffers cross to the render
// thread by move through the channel; the renderer owns them from then on.

use std::collections::VecDeque;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use tracing::warn;

use super::types::RenderMessage;
use crate::error::{MicError, Result};

/// Fire-and-forget sender half of the rendering unit
#[derive(Debug, Clone)]
pub struct RenderPort {
    tx: Sender<RenderMessage>,
}

impl RenderPort {
    pub fn post(&self, message: RenderMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| MicError::ChannelClosed("render port"))
    }

    /// Messages posted but not yet picked up by the render thread
    pub fn backlog(&self) -> usize {
        self.tx.len()
    }
}

/// Render-thread half: the queue of decoded PCM awaiting playback
#[derive(Debug)]
pub struct PcmRenderer {
    rx: Receiver<RenderMessage>,
    queue: VecDeque<Vec<i16>>,
    /// Read offset into the front buffer
    cursor: usize,
    buffers_received: u64,
}

impl PcmRenderer {
    pub fn new() -> (RenderPort, PcmRenderer) {
        let (tx, rx) = channel::unbounded();
        (
            RenderPort { tx },
            PcmRenderer {
                rx,
                queue: VecDeque::new(),
                cursor: 0,
                buffers_received: 0,
            },
        )
    }

    fn drain_port(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(RenderMessage::Pcm16(buffer)) => {
                    if !buffer.is_empty() {
                        self.queue.push_back(buffer);
                    }
                    self.buffers_received += 1;
                }
                Ok(RenderMessage::Flush) => {
                    self.queue.clear();
                    self.cursor = 0;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("Render port disconnected; renderer keeps its queue");
                    break;
                }
            }
        }
    }

    /// Render one block. Samples are `pcm / 32768`; underruns are zero-filled.
    /// Always succeeds so the node is never removed from the graph.
    pub fn process(&mut self, output: &mut [f32]) {
        self.drain_port();

        let mut written = 0;
        while written < output.len() {
            let Some(front) = self.queue.front() else {
                break;
            };
            let available = front.len() - self.cursor;
            let n = available.min(output.len() - written);
            for (out, &pcm) in output[written..written + n]
                .iter_mut()
                .zip(&front[self.cursor..self.cursor + n])
            {
                *out = pcm as f32 / 32768.0;
            }
            written += n;
            self.cursor += n;
            if self.cursor == front.len() {
                self.queue.pop_front();
                self.cursor = 0;
            }
        }
        output[written..].fill(0.0);
    }

    /// Samples queued and not yet rendered
    pub fn queued_samples(&self) -> usize {
        self.queue.iter().map(Vec::len).sum::<usize>() - self.cursor
    }

    pub fn buffers_received(&self) -> u64 {
        self.buffers_received
    }
}
