//! Mixer — sums the signals arriving at the output sink.

/// A summing mixer that accumulates audio from every input of the sink.
#[derive(Debug, Clone)]
pub struct Mixer {
    buffer: Vec<f64>,
}

impl Mixer {
    /// Prepare a buffer of `num_samples` filled with zeros.
    pub fn new(num_samples: usize) -> Self {
        Mixer {
            buffer: vec![0.0; num_samples],
        }
    }

    /// Add a sample at the given index.
    pub fn add(&mut self, index: usize, sample: f64) {
        if let Some(slot) = self.buffer.get_mut(index) {
            *slot += sample;
        }
    }

    /// The mixed buffer, peak-normalized when it would exceed unit amplitude.
    /// Non-finite samples are replaced with silence first.
    pub fn output(mut self) -> Vec<f64> {
        for s in self.buffer.iter_mut() {
            if !s.is_finite() {
                *s = 0.0;
            }
        }
        normalize_peak(&mut self.buffer);
        self.buffer
    }
}

/// Scale `buffer` so its peak magnitude is at most 1.0.
/// Buffers already within range are left untouched.
pub fn normalize_peak(buffer: &mut [f64]) {
    let peak = peak(buffer);
    if peak > 1.0 {
        for s in buffer.iter_mut() {
            *s /= peak;
        }
    }
}

/// Largest absolute sample value.
pub fn peak(buffer: &[f64]) -> f64 {
    buffer.iter().fold(0.0_f64, |m, &s| m.max(s.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer() {
        let out = Mixer::new(128).output();
        assert_eq!(out.len(), 128);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn accumulates_samples() {
        let mut m = Mixer::new(4);
        m.add(0, 0.5);
        m.add(0, 0.3);
        m.add(1, -0.25);
        m.add(9, 1.0);
        let out = m.output();
        assert!((out[0] - 0.8).abs() < 1e-12);
        assert!((out[1] + 0.25).abs() < 1e-12);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn normalizes_overflow() {
        let mut m = Mixer::new(2);
        m.add(0, 4.0);
        m.add(1, -2.0);
        let out = m.output();
        assert!((out[0] - 1.0).abs() < 1e-12);
        assert!((out[1] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn non_finite_samples_are_silenced() {
        let mut m = Mixer::new(3);
        m.add(0, f64::NAN);
        m.add(1, f64::INFINITY);
        m.add(2, 0.5);
        let out = m.output();
        assert_eq!(out, vec![0.0, 0.0, 0.5]);
    }
}
