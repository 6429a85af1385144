//! Additive synthesis from per-partial buffers and envelopes.

use std::collections::BTreeMap;

use crate::dsp::mixer::normalize_peak;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partial {
    pub buffer: Option<Vec<f64>>,
    /// Gain envelope in [0, 1]. Full gain when absent.
    pub envelope: Option<Vec<f64>>,
}

/// `Σ buffer_n × envelope_n × n^(−power)` over the partials that have a
/// buffer, peak-normalized when the sum exceeds unit amplitude.
pub fn synthesize(partials: &BTreeMap<u32, Partial>, power: f64, len: usize) -> Vec<f64> {
    let mut out = vec![0.0; len];
    for (&n, partial) in partials {
        let Some(buffer) = &partial.buffer else {
            continue;
        };
        let weight = (n.max(1) as f64).powf(-power);
        for (t, slot) in out.iter_mut().enumerate() {
            let env = partial
                .envelope
                .as_ref()
                .and_then(|e| e.get(t).copied())
                .unwrap_or(1.0);
            *slot += buffer.get(t).copied().unwrap_or(0.0) * env * weight;
        }
    }
    normalize_peak(&mut out);
    out
}
