//! Activation functions, mostly periodic so that a ramp input turns into
//! oscillation.

use std::f64::consts::PI;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Identity,
    Sine,
    Cosine,
    Tanh,
    /// Bipolar sigmoid.
    Sigmoid,
    Gaussian,
    Abs,
    Triangle,
    Square,
}

impl Activation {
    pub const ALL: [Activation; 9] = [
        Activation::Identity,
        Activation::Sine,
        Activation::Cosine,
        Activation::Tanh,
        Activation::Sigmoid,
        Activation::Gaussian,
        Activation::Abs,
        Activation::Triangle,
        Activation::Square,
    ];

    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Identity => x,
            Activation::Sine => x.sin(),
            Activation::Cosine => x.cos(),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 2.0 / (1.0 + (-4.9 * x).exp()) - 1.0,
            Activation::Gaussian => 2.0 * (-x * x).exp() - 1.0,
            Activation::Abs => x.abs(),
            Activation::Triangle => {
                let t = (x / (2.0 * PI)).rem_euclid(1.0);
                1.0 - 4.0 * (t - 0.5).abs()
            }
            Activation::Square => {
                if x.sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Activation {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}
