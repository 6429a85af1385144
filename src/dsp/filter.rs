//! Biquad filter with RBJ cookbook coefficients, matching WebAudio's
//! BiquadFilterNode for the types a patch can hold.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Peaking,
}

impl FilterType {
    const ALL: [FilterType; 5] = [
        FilterType::Lowpass,
        FilterType::Highpass,
        FilterType::Bandpass,
        FilterType::Notch,
        FilterType::Peaking,
    ];

    /// Position in the discrete mutation scale.
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }
}

/// Normalized coefficients (a0 = 1).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b: [f64; 3],
    a: [f64; 2],
}

impl Coefficients {
    /// Frequency is kept inside (0, Nyquist) and Q above zero, so any
    /// automated value yields a stable filter.
    fn design(filter_type: FilterType, frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * frequency.clamp(1.0, sample_rate * 0.49) / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q.max(1e-4));

        let (b, a0, a2) = match filter_type {
            FilterType::Lowpass => {
                let side = (1.0 - cos) / 2.0;
                ([side, 1.0 - cos, side], 1.0 + alpha, 1.0 - alpha)
            }
            FilterType::Highpass => {
                let side = (1.0 + cos) / 2.0;
                ([side, -(1.0 + cos), side], 1.0 + alpha, 1.0 - alpha)
            }
            FilterType::Bandpass => ([alpha, 0.0, -alpha], 1.0 + alpha, 1.0 - alpha),
            FilterType::Notch => ([1.0, -2.0 * cos, 1.0], 1.0 + alpha, 1.0 - alpha),
            FilterType::Peaking => {
                let amp = 10f64.powf(gain_db / 40.0);
                (
                    [1.0 + alpha * amp, -2.0 * cos, 1.0 - alpha * amp],
                    1.0 + alpha / amp,
                    1.0 - alpha / amp,
                )
            }
        };
        Coefficients {
            b: b.map(|v| v / a0),
            a: [-2.0 * cos / a0, a2 / a0],
        }
    }
}

/// Second-order IIR section, transposed direct form II.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: FilterType,
    sample_rate: f64,
    /// `(frequency, q, gain_db)` the coefficients were designed for.
    designed: (f64, f64, f64),
    coefficients: Coefficients,
    state: [f64; 2],
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let designed = (1000.0, std::f64::consts::FRAC_1_SQRT_2, 0.0);
        BiquadFilter {
            filter_type,
            sample_rate,
            designed,
            coefficients: Coefficients::design(filter_type, designed.0, designed.1, designed.2, sample_rate),
            state: [0.0; 2],
        }
    }

    /// Redesign only when a parameter actually moved.
    pub fn set_params(&mut self, frequency: f64, q: f64, gain_db: f64) {
        let wanted = (frequency, q, gain_db);
        if wanted != self.designed {
            self.designed = wanted;
            self.coefficients = Coefficients::design(self.filter_type, frequency, q, gain_db, self.sample_rate);
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let Coefficients { b, a } = self.coefficients;
        let out = b[0] * input + self.state[0];
        self.state[0] = b[1] * input - a[0] * out + self.state[1];
        self.state[1] = b[2] * input - a[1] * out;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled(filter: &mut BiquadFilter, input: impl Fn(usize) -> f64, skip: usize, len: usize) -> f64 {
        let mut peak = 0.0f64;
        for i in 0..len {
            let out = filter.process(input(i));
            if i >= skip {
                peak = peak.max(out.abs());
            }
        }
        peak
    }

    #[test]
    fn lowpass_and_highpass_at_dc() {
        let mut lp = BiquadFilter::new(FilterType::Lowpass, 44100.0);
        lp.set_params(5000.0, 0.707, 0.0);
        let mut out = 0.0;
        for _ in 0..1000 {
            out = lp.process(1.0);
        }
        assert!((out - 1.0).abs() < 1e-3);

        let mut hp = BiquadFilter::new(FilterType::Highpass, 44100.0);
        for _ in 0..1000 {
            out = hp.process(1.0);
        }
        assert!(out.abs() < 1e-3);
    }

    #[test]
    fn lowpass_attenuates_far_above_cutoff() {
        let mut lp = BiquadFilter::new(FilterType::Lowpass, 44100.0);
        lp.set_params(200.0, 0.707, 0.0);
        let sine = |i: usize| (2.0 * PI * 10_000.0 * i as f64 / 44100.0).sin();
        assert!(settled(&mut lp, sine, 1000, 4410) < 0.01);
    }

    #[test]
    fn notch_removes_its_centre() {
        let mut notch = BiquadFilter::new(FilterType::Notch, 8000.0);
        notch.set_params(1000.0, 2.0, 0.0);
        let sine = |i: usize| (2.0 * PI * 1000.0 * i as f64 / 8000.0).sin();
        assert!(settled(&mut notch, sine, 4000, 8000) < 0.01);
    }

    #[test]
    fn automated_params_stay_stable() {
        for filter_type in FilterType::ALL {
            let mut f = BiquadFilter::new(filter_type, 8000.0);
            for i in 0..8000 {
                // Sweeps past Nyquist and through Q = 0.
                let freq = (i as f64 * 3.0) - 1000.0;
                f.set_params(freq, (i % 7) as f64 - 1.0, 12.0);
                let out = f.process(if i % 50 == 0 { 1.0 } else { 0.0 });
                assert!(out.is_finite(), "{filter_type:?} unstable at sample {i}");
            }
        }
    }

    #[test]
    fn index_round_trips() {
        for t in FilterType::ALL {
            assert_eq!(FilterType::from_index(t.index()), t);
        }
        assert_eq!(FilterType::from_index(99), FilterType::Peaking);
    }
}
