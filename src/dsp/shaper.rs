//! Wave-shaper — memoryless distortion through a transfer curve.

/// Maps input in [-1, 1] through a sampled curve with linear interpolation,
/// matching the WebAudio WaveShaperNode. Inputs outside the range clamp to
/// the curve ends.
#[derive(Debug, Clone)]
pub struct WaveShaper {
    curve: Vec<f64>,
}

impl WaveShaper {
    /// A shaper with an explicit curve (at least two points).
    pub fn with_curve(curve: Vec<f64>) -> Self {
        if curve.len() < 2 {
            return Self::tanh(0.0);
        }
        WaveShaper { curve }
    }

    /// A soft-clipping `tanh(amount·x) / tanh(amount)` curve. Amount 0 is
    /// the identity.
    pub fn tanh(amount: f64) -> Self {
        const POINTS: usize = 1025;
        let curve = (0..POINTS)
            .map(|i| {
                let x = i as f64 / (POINTS - 1) as f64 * 2.0 - 1.0;
                if amount.abs() < 1e-9 {
                    x
                } else {
                    (amount * x).tanh() / amount.tanh()
                }
            })
            .collect();
        WaveShaper { curve }
    }

    pub fn process(&self, input: f64) -> f64 {
        let n = self.curve.len();
        let pos = (input.clamp(-1.0, 1.0) + 1.0) * 0.5 * (n - 1) as f64;
        let idx = (pos as usize).min(n - 2);
        let frac = pos - idx as f64;
        self.curve[idx] * (1.0 - frac) + self.curve[idx + 1] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_amount_is_identity() {
        let s = WaveShaper::tanh(0.0);
        for x in [-1.0, -0.3, 0.0, 0.42, 1.0] {
            assert!((s.process(x) - x).abs() < 1e-9);
        }
    }

    #[test]
    fn tanh_curve_keeps_unit_range() {
        let s = WaveShaper::tanh(8.0);
        assert!((s.process(1.0) - 1.0).abs() < 1e-9);
        assert!((s.process(-1.0) + 1.0).abs() < 1e-9);
        assert!(s.process(0.2) > 0.2);
        assert_eq!(s.process(5.0), s.process(1.0));
    }

    #[test]
    fn explicit_curve_interpolates() {
        let s = WaveShaper::with_curve(vec![0.0, 1.0, 0.0]);
        assert!((s.process(-1.0)).abs() < 1e-12);
        assert!((s.process(0.0) - 1.0).abs() < 1e-12);
        assert!((s.process(-0.5) - 0.5).abs() < 1e-12);
    }
}
