//! Fade envelope — fixed-length linear fade-in/out at buffer edges.
//!
//! Generated buffers start and stop wherever the pattern network happens to
//! be, which clicks. A short fade at both ends removes the discontinuity.

/// Linear fade-in over the first `fade_samples`, fade-out over the last.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeEnvelope {
    pub fade_samples: usize,
}

impl FadeEnvelope {
    pub fn new(fade_samples: usize) -> Self {
        FadeEnvelope { fade_samples }
    }

    /// Gain at sample `index` of a buffer of `len` samples.
    ///
    /// The first and last samples are exactly zero; gain rises
    /// monotonically to 1 over `fade_samples` and mirrors that at the end.
    /// Buffers shorter than two fades use a fade of half their length.
    pub fn gain_at(&self, index: usize, len: usize) -> f64 {
        if len == 0 || index >= len {
            return 0.0;
        }
        let fade = self.fade_samples.min(len / 2);
        if fade == 0 {
            return 1.0;
        }
        let from_start = index;
        let from_end = len - 1 - index;
        let edge = from_start.min(from_end);
        if edge >= fade {
            1.0
        } else {
            edge as f64 / fade as f64
        }
    }

    /// Apply the fade in place.
    pub fn apply(&self, buffer: &mut [f64]) {
        let len = buffer.len();
        let fade = self.fade_samples.min(len / 2);
        for i in 0..fade {
            let g = self.gain_at(i, len);
            buffer[i] *= g;
            buffer[len - 1 - i] *= g;
        }
    }
}

impl Default for FadeEnvelope {
    fn default() -> Self {
        FadeEnvelope { fade_samples: 128 }
    }
}
