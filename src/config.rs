// Engine configuration
//
// Every tunable constant of the virtual microphone lives here. Defaults match
// what the host extension expects; `from_env` lets a host override the
// handful of values that vary between deployments.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MicError, Result};

/// Identifier of the synthetic capture device
pub const VIRTUAL_DEVICE_ID: &str = "cb-space-mic";
/// Human-readable label of the synthetic capture device
pub const VIRTUAL_DEVICE_LABEL: &str = "VoiceHub (Virtual)";
/// Name of the broadcast control channel
pub const CONTROL_CHANNEL_NAME: &str = "cb-space-mic";
/// Local storage key for forced-microphone mode ("on" / "off")
pub const MIC_MODE_STORAGE_KEY: &str = "cb_mic_mode";
/// Local storage key for the desired playing flag ("1" / "0")
pub const PLAYING_STORAGE_KEY: &str = "cb_playing";
/// Frames per render quantum
pub const RENDER_QUANTUM_FRAMES: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicConfig {
    /// Execution context sample rate
    pub sample_rate: u32,
    /// Initial master gain
    pub master_gain: f32,

    /// Keep-alive oscillator
    pub keep_alive_frequency_hz: f32,
    pub keep_alive_gain: f32,

    /// Fallback tone burst (no rendering unit)
    pub fallback_frequency_hz: f32,
    pub fallback_gain: f32,
    pub fallback_duration_ms: u64,

    /// Analysis tap
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,

    /// Visualization loop
    pub visualization_bins: usize,
    pub fallback_tick_interval_ms: u64,

    /// Frames held while audio is locked; oldest dropped past this
    pub pending_frame_capacity: usize,

    /// Samples buffered for the local monitor output
    pub monitor_buffer_capacity: usize,

    /// Virtual device identity
    pub device_id: String,
    pub device_label: String,

    pub channel_name: String,
    pub mic_mode_key: String,
    pub playing_key: String,

    /// Rendering unit module, resolved against `asset_base_url`
    pub renderer_module: String,
    pub asset_base_url: Option<String>,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            master_gain: 0.9,
            keep_alive_frequency_hz: 40.0,
            keep_alive_gain: 0.00005,
            fallback_frequency_hz: 440.0,
            fallback_gain: 0.0001,
            fallback_duration_ms: 300,
            fft_size: 256,
            smoothing_time_constant: 0.7,
            min_decibels: -90.0,
            max_decibels: -20.0,
            visualization_bins: 64,
            fallback_tick_interval_ms: 100,
            pending_frame_capacity: 512,
            monitor_buffer_capacity: 16_384,
            device_id: VIRTUAL_DEVICE_ID.to_string(),
            device_label: VIRTUAL_DEVICE_LABEL.to_string(),
            channel_name: CONTROL_CHANNEL_NAME.to_string(),
            mic_mode_key: MIC_MODE_STORAGE_KEY.to_string(),
            playing_key: PLAYING_STORAGE_KEY.to_string(),
            renderer_module: "worklet.js".to_string(),
            asset_base_url: None,
        }
    }
}

impl MicConfig {
    /// Defaults with `VOICEHUB_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(rate) = std::env::var("VOICEHUB_SAMPLE_RATE") {
            config.sample_rate = rate
                .parse()
                .map_err(|_| MicError::InvalidConfig(format!("VOICEHUB_SAMPLE_RATE: {}", rate)))?;
        }
        if let Ok(capacity) = std::env::var("VOICEHUB_PENDING_CAPACITY") {
            config.pending_frame_capacity = capacity.parse().map_err(|_| {
                MicError::InvalidConfig(format!("VOICEHUB_PENDING_CAPACITY: {}", capacity))
            })?;
        }
        if let Ok(base) = std::env::var("VOICEHUB_ASSET_BASE") {
            config.asset_base_url = Some(base);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000 || self.sample_rate > 192_000 {
            return Err(MicError::InvalidConfig(format!(
                "Invalid sample rate: {} (must be 8000-192000 Hz)",
                self.sample_rate
            )));
        }
        if !(32..=32768).contains(&self.fft_size) || !self.fft_size.is_power_of_two() {
            return Err(MicError::InvalidConfig(format!(
                "Invalid FFT size: {} (must be a power of two in 32-32768)",
                self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(MicError::InvalidConfig(format!(
                "Invalid smoothing constant: {}",
                self.smoothing_time_constant
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(MicError::InvalidConfig(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        if self.visualization_bins == 0 {
            return Err(MicError::InvalidConfig("Visualization needs at least one bin".into()));
        }
        if self.pending_frame_capacity == 0 {
            return Err(MicError::InvalidConfig("Pending frame capacity cannot be zero".into()));
        }
        if self.device_id.is_empty() {
            return Err(MicError::InvalidConfig("Virtual device ID cannot be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.master_gain) {
            return Err(MicError::InvalidConfig(format!(
                "Invalid master gain: {} (must be 0.0-1.0)",
                self.master_gain
            )));
        }
        Ok(())
    }

    pub fn fallback_tick_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_tick_interval_ms)
    }

    /// Number of samples a fallback burst lasts at the context rate
    pub fn fallback_burst_samples(&self) -> usize {
        (self.sample_rate as u64 * self.fallback_duration_ms / 1000) as usize
    }
}
