//! Feed-forward compressor with a soft knee, shaped after WebAudio's
//! DynamicsCompressorNode.
//!
//! The settings are passed on every sample so that automated parameters
//! take effect immediately; only the level follower carries state.

/// Compressor parameters for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dynamics {
    /// dB.
    pub threshold: f64,
    /// Soft-knee width in dB. Zero is a hard knee.
    pub knee: f64,
    pub ratio: f64,
    /// Seconds.
    pub attack: f64,
    /// Seconds.
    pub release: f64,
}

impl Default for Dynamics {
    fn default() -> Self {
        Dynamics {
            threshold: -24.0,
            knee: 30.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

impl Dynamics {
    /// Gain change in dB (≤ 0) for a detector level in dB.
    pub fn reduction_db(&self, level_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio.max(1.0);
        let over = level_db - self.threshold;
        let half = self.knee.max(0.0) / 2.0;
        if over <= -half {
            0.0
        } else if over >= half {
            -over * slope
        } else {
            // Quadratic blend across the knee.
            let x = over + half;
            -slope * x * x / (2.0 * self.knee)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Compressor {
    sample_rate: f64,
    level: f64,
}

impl Compressor {
    pub fn new(sample_rate: f64) -> Self {
        Compressor {
            sample_rate,
            level: 0.0,
        }
    }

    fn coefficient(&self, seconds: f64) -> f64 {
        (-1.0 / (seconds.max(1e-4) * self.sample_rate)).exp()
    }

    pub fn process(&mut self, input: f64, dynamics: &Dynamics) -> f64 {
        let rectified = input.abs();
        let coef = if rectified > self.level {
            self.coefficient(dynamics.attack)
        } else {
            self.coefficient(dynamics.release)
        };
        self.level = coef * self.level + (1.0 - coef) * rectified;

        let level_db = if self.level > 1e-6 {
            20.0 * self.level.log10()
        } else {
            -120.0
        };
        input * 10f64.powf(dynamics.reduction_db(level_db) / 20.0)
    }
}
