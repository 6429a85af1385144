//! Built-in noise sources, seeded so a genome always renders the same way.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::patch::NoiseKind;

pub fn generate(kind: NoiseKind, len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut white = move || rng.gen_range(-1.0..=1.0);
    match kind {
        NoiseKind::White => (0..len).map(|_| white()).collect(),
        NoiseKind::Pink => {
            // Paul Kellet's refined pink filter bank.
            let mut b = [0.0f64; 7];
            (0..len)
                .map(|_| {
                    let w = white();
                    b[0] = 0.99886 * b[0] + w * 0.0555179;
                    b[1] = 0.99332 * b[1] + w * 0.0750759;
                    b[2] = 0.96900 * b[2] + w * 0.1538520;
                    b[3] = 0.86650 * b[3] + w * 0.3104856;
                    b[4] = 0.55000 * b[4] + w * 0.5329522;
                    b[5] = -0.7616 * b[5] - w * 0.0168980;
                    let out = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + w * 0.5362;
                    b[6] = w * 0.115926;
                    (out * 0.11).clamp(-1.0, 1.0)
                })
                .collect()
        }
        NoiseKind::Brown => {
            let mut last = 0.0;
            (0..len)
                .map(|_| {
                    last = (last + 0.02 * white()) / 1.02;
                    (last * 3.5).clamp(-1.0, 1.0)
                })
                .collect()
        }
    }
}
