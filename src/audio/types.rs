use serde::{Deserialize, Serialize};

/// Sample encoding of an inbound frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 16-bit little-endian (the wire default)
    #[default]
    I16,
    /// 32-bit float little-endian in [-1, 1]
    F32,
}

impl SampleFormat {
    /// Parse the optional `format` tag of a `pcm16` message; anything but
    /// `"f32"` is treated as 16-bit PCM.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some("f32") => SampleFormat::F32,
            _ => SampleFormat::I16,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// An externally sourced audio frame awaiting delivery to the rendering unit
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub format: SampleFormat,
    /// Raw little-endian sample bytes
    pub buffer: Vec<u8>,
}

impl AudioFrame {
    pub fn new(format: SampleFormat, buffer: Vec<u8>) -> Self {
        Self { format, buffer }
    }

    pub fn from_pcm16(samples: &[i16]) -> Self {
        let buffer = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(SampleFormat::I16, buffer)
    }

    pub fn from_f32(samples: &[f32]) -> Self {
        let buffer = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(SampleFormat::F32, buffer)
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len() / self.format.bytes_per_sample()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }
}

/// Messages accepted by the rendering unit's port
#[derive(Debug, Clone, PartialEq)]
pub enum RenderMessage {
    /// Ownership of the buffer moves to the render thread
    Pcm16(Vec<i16>),
    /// Drop everything the renderer has queued internally
    Flush,
}
