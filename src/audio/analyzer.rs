// Frequency analysis tap for the mixer
//
// Follows the browser analyser contract: Blackman-windowed FFT over the most
// recent `fft_size` samples, magnitudes smoothed over time, mapped from the
// [min_decibels, max_decibels] range onto 0-255.

use std::sync::{Arc, Mutex};

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::MicConfig;

pub struct AnalyserNode {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    state: Mutex<AnalyserState>,
}

struct AnalyserState {
    time_domain: Vec<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl AnalyserNode {
    pub fn new(fft_size: usize, smoothing: f32, min_decibels: f32, max_decibels: f32) -> Self {
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let x = i as f32 / fft_size as f32;
                0.42 - 0.5 * (std::f32::consts::TAU * x).cos()
                    + 0.08 * (2.0 * std::f32::consts::TAU * x).cos()
            })
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft_size,
            smoothing,
            min_decibels,
            max_decibels,
            window,
            fft,
            state: Mutex::new(AnalyserState {
                time_domain: vec![0.0; fft_size],
                smoothed: vec![0.0; fft_size / 2],
                scratch: vec![Complex::new(0.0, 0.0); fft_size],
            }),
        }
    }

    pub fn from_config(config: &MicConfig) -> Self {
        Self::new(
            config.fft_size,
            config.smoothing_time_constant,
            config.min_decibels,
            config.max_decibels,
        )
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Feed rendered mixer output (render thread)
    pub fn push(&self, samples: &[f32]) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let n = samples.len().min(self.fft_size);
        if n == self.fft_size {
            state
                .time_domain
                .copy_from_slice(&samples[samples.len() - self.fft_size..]);
        } else {
            state.time_domain.rotate_left(n);
            let start = self.fft_size - n;
            state.time_domain[start..].copy_from_slice(&samples[samples.len() - n..]);
        }
    }

    /// Fill `out` with byte magnitudes. Writes at most `frequency_bin_count`
    /// entries; any remainder of `out` is left untouched.
    pub fn get_byte_frequency_data(&self, out: &mut [u8]) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        let state = &mut *guard;

        for (i, slot) in state.scratch.iter_mut().enumerate() {
            *slot = Complex::new(state.time_domain[i] * self.window[i], 0.0);
        }
        self.fft.process(&mut state.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        for k in 0..self.frequency_bin_count() {
            let magnitude = state.scratch[k].norm() * scale;
            let mut value = self.smoothing * state.smoothed[k] + (1.0 - self.smoothing) * magnitude;
            if !value.is_finite() {
                value = 0.0;
            }
            state.smoothed[k] = value;

            if let Some(slot) = out.get_mut(k) {
                let db = if value > 0.0 { 20.0 * value.log10() } else { f32::NEG_INFINITY };
                let scaled = (255.0 / range) * (db - self.min_decibels);
                *slot = if scaled.is_finite() {
                    scaled.floor().clamp(0.0, 255.0) as u8
                } else {
                    0
                };
            }
        }
    }

    /// Latest time-domain window
    pub fn time_domain(&self) -> Vec<f32> {
        self.state
            .lock()
            .map(|s| s.time_domain.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for AnalyserNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyserNode")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish()
    }
}
