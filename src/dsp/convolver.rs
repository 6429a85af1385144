//! Convolver — direct-form FIR convolution with a generated impulse response.

/// A mono convolver.
///
/// The impulse response is truncated to `max_len` samples; direct
/// convolution costs `O(len)` per sample.
#[derive(Debug, Clone)]
pub struct Convolver {
    impulse: Vec<f64>,
    history: Vec<f64>,
    pos: usize,
}

impl Convolver {
    /// Create a convolver. With `normalize`, the impulse is scaled so its
    /// absolute sum is at most 1, which bounds the output by the input peak.
    pub fn new(impulse: &[f64], max_len: usize, normalize: bool) -> Self {
        let mut impulse: Vec<f64> = impulse.iter().take(max_len.max(1)).copied().collect();
        if impulse.is_empty() {
            impulse.push(1.0);
        }
        if normalize {
            let l1: f64 = impulse.iter().map(|h| h.abs()).sum();
            if l1 > 1.0 {
                for h in impulse.iter_mut() {
                    *h /= l1;
                }
            }
        }
        let len = impulse.len();
        Convolver {
            impulse,
            history: vec![0.0; len],
            pos: 0,
        }
    }

    /// Process one sample.
    pub fn process(&mut self, input: f64) -> f64 {
        let len = self.history.len();
        self.history[self.pos] = input;
        let mut acc = 0.0;
        for (k, h) in self.impulse.iter().enumerate() {
            let idx = (self.pos + len - k) % len;
            acc += h * self.history[idx];
        }
        self.pos = (self.pos + 1) % len;
        acc
    }
}
