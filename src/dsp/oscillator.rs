//! Periodic oscillators, band-limited with PolyBLEP at the discontinuities.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::pitch::transpose_cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
    ];

    /// Position in the discrete mutation scale.
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|w| *w == self).unwrap_or(0)
    }

    /// Out-of-range indices saturate.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    /// Value at `phase` in [0, 1) for a per-sample phase step of `step`.
    pub fn at(self, phase: f64, step: f64) -> f64 {
        match self {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Sawtooth => 2.0 * phase - 1.0 - blep(phase, step),
            Waveform::Square => {
                let naive = if phase < 0.5 { 1.0 } else { -1.0 };
                naive + blep(phase, step) - blep((phase + 0.5).fract(), step)
            }
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

/// Polynomial correction of a unit step within one sample of the wrap.
fn blep(phase: f64, step: f64) -> f64 {
    let step = step.abs();
    if step <= 0.0 {
        0.0
    } else if phase < step {
        let x = phase / step;
        2.0 * x - x * x - 1.0
    } else if phase > 1.0 - step {
        let x = (phase - 1.0) / step;
        x * x + 2.0 * x + 1.0
    } else {
        0.0
    }
}

/// Running oscillator. Frequency and detune arrive with every sample so
/// they can be automated.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    sample_rate: f64,
    phase: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            sample_rate,
            phase: 0.0,
        }
    }

    /// Emit one sample at `frequency` Hz shifted by `detune` cents.
    pub fn tick(&mut self, frequency: f64, detune: f64) -> f64 {
        let step = transpose_cents(frequency, detune) / self.sample_rate;
        let out = self.waveform.at(self.phase, step);
        let next = (self.phase + step).rem_euclid(1.0);
        self.phase = if next.is_finite() && next < 1.0 { next } else { 0.0 };
        out
    }
}
