// Graph endpoints: the capture destination and the local monitor output

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rtrb::{Consumer, Producer, RingBuffer};

use super::nodes::GainNode;
use crate::media::track::{MediaStream, MediaStreamTrack, TrackKind, TrackSource};

/// Output-capture node. Its stream is the virtual device.
#[derive(Debug)]
pub struct MediaStreamDestination {
    source: Arc<TrackSource>,
    stream: MediaStream,
}

impl MediaStreamDestination {
    pub fn new(sample_rate: u32, label: &str) -> Self {
        let source = TrackSource::new(sample_rate);
        let track = MediaStreamTrack::new(TrackKind::Audio, label, Some(source.clone()));
        Self {
            source,
            stream: MediaStream::with_tracks(vec![track]),
        }
    }

    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    /// First audio track of the capture stream
    pub fn track(&self) -> Option<MediaStreamTrack> {
        self.stream.audio_tracks().into_iter().next()
    }

    pub fn source(&self) -> &Arc<TrackSource> {
        &self.source
    }

    pub(crate) fn write(&self, block: &[f32]) {
        self.source.publish(block);
    }
}

/// Mixer → speaker tap for local monitoring.
///
/// The render thread pushes into a realtime ring buffer; the host's output
/// callback owns the consumer half (`take_output`).
pub struct MonitorTap {
    gain: GainNode,
    producer: Mutex<Producer<f32>>,
    consumer: Mutex<Option<Consumer<f32>>>,
    overflowed: AtomicU64,
}

impl MonitorTap {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity.max(1));
        let gain = GainNode::new("monitor", 1.0);
        gain.disconnect();
        Self {
            gain,
            producer: Mutex::new(producer),
            consumer: Mutex::new(Some(consumer)),
            overflowed: AtomicU64::new(0),
        }
    }

    pub fn connect(&self) {
        self.gain.connect();
    }

    pub fn disconnect(&self) {
        self.gain.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.gain.is_connected()
    }

    /// Hand the speaker side to the host; only the first caller gets it
    pub fn take_output(&self) -> Option<Consumer<f32>> {
        self.consumer.lock().ok().and_then(|mut c| c.take())
    }

    /// Samples dropped because the speaker side was not draining
    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    pub(crate) fn write(&self, block: &[f32]) {
        if !self.gain.is_connected() {
            return;
        }
        let Ok(mut producer) = self.producer.lock() else {
            return;
        };
        let gain = self.gain.gain();
        let mut dropped = 0u64;
        for &sample in block {
            if producer.push(sample * gain).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            self.overflowed.fetch_add(dropped, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for MonitorTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorTap")
            .field("connected", &self.is_connected())
            .field("overflowed", &self.overflowed())
            .finish()
    }
}
