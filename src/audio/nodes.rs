// Primitive graph nodes: gains, oscillators, tone bursts
//
// Control-side parameters are atomics so the control task can change them
// while the render thread reads them without locking.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Gain node with a lock-free gain parameter
#[derive(Debug)]
pub struct GainNode {
    label: &'static str,
    gain_bits: AtomicU32,
    connected: AtomicBool,
}

impl GainNode {
    pub fn new(label: &'static str, gain: f32) -> Self {
        Self {
            label,
            gain_bits: AtomicU32::new(gain.to_bits()),
            connected: AtomicBool::new(true),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::Release);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Scale `input` into `output`
    pub fn process(&self, input: &[f32], output: &mut [f32]) {
        let gain = self.gain();
        for (out, &sample) in output.iter_mut().zip(input) {
            *out = sample * gain;
        }
    }
}

/// Sine oscillator
#[derive(Debug, Clone)]
pub struct Oscillator {
    frequency_hz: f32,
    sample_rate: f32,
    phase: f32,
}

impl Oscillator {
    pub fn sine(frequency_hz: f32, sample_rate: u32) -> Self {
        Self {
            frequency_hz,
            sample_rate: sample_rate as f32,
            phase: 0.0,
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency_hz
    }

    /// Add `amplitude * sin` into `output`
    pub fn mix_into(&mut self, output: &mut [f32], amplitude: f32) {
        let step = std::f32::consts::TAU * self.frequency_hz / self.sample_rate;
        for sample in output.iter_mut() {
            *sample += amplitude * self.phase.sin();
            self.phase += step;
            if self.phase >= std::f32::consts::TAU {
                self.phase -= std::f32::consts::TAU;
            }
        }
    }
}

/// Continuous near-silent tone that keeps the capture stream non-zero
#[derive(Debug)]
pub struct KeepAlive {
    oscillator: Oscillator,
    gain: GainNode,
    started: bool,
}

impl KeepAlive {
    pub fn new(frequency_hz: f32, gain: f32, sample_rate: u32) -> Self {
        Self {
            oscillator: Oscillator::sine(frequency_hz, sample_rate),
            gain: GainNode::new("keep_alive", gain),
            started: false,
        }
    }

    pub fn start(&mut self) {
        self.started = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn gain(&self) -> f32 {
        self.gain.gain()
    }

    pub fn mix_into(&mut self, output: &mut [f32]) {
        if self.started {
            let amplitude = self.gain.gain();
            self.oscillator.mix_into(output, amplitude);
        }
    }
}

/// Short oscillator burst that stops itself after a fixed sample count
#[derive(Debug)]
pub struct ToneBurst {
    oscillator: Oscillator,
    amplitude: f32,
    remaining: usize,
}

impl ToneBurst {
    pub fn new(frequency_hz: f32, amplitude: f32, sample_rate: u32, duration_samples: usize) -> Self {
        Self {
            oscillator: Oscillator::sine(frequency_hz, sample_rate),
            amplitude,
            remaining: duration_samples,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn mix_into(&mut self, output: &mut [f32]) {
        let n = output.len().min(self.remaining);
        self.oscillator.mix_into(&mut output[..n], self.amplitude);
        self.remaining -= n;
    }
}
