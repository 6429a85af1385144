//! Oversampled evaluation support: windowed-sinc low-pass and decimation.

use std::f64::consts::PI;

/// Blackman-windowed sinc low-pass with `2 × half_width + 1` taps and cutoff
/// `0.5 / factor` cycles per (oversampled) sample, normalized to unity DC
/// gain.
pub fn lowpass_taps(factor: usize, half_width: usize) -> Vec<f64> {
    let cutoff = 0.5 / factor.max(1) as f64;
    let len = 2 * half_width + 1;
    let mut taps: Vec<f64> = (0..len)
        .map(|i| {
            let m = i as f64 - half_width as f64;
            let sinc = if m == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * m).sin() / (PI * m)
            };
            let window = if len == 1 {
                1.0
            } else {
                let x = i as f64 / (len - 1) as f64;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            };
            sinc * window
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    if sum.abs() > f64::EPSILON {
        for t in &mut taps {
            *t /= sum;
        }
    }
    taps
}

/// Filter and decimate. `oversampled` holds `(count - 1) × factor + taps.len()`
/// samples whose centre taps land on every `factor`-th sample.
pub fn decimate(oversampled: &[f64], taps: &[f64], factor: usize, count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| {
            let start = i * factor;
            taps.iter()
                .zip(&oversampled[start..start + taps.len()])
                .map(|(t, x)| t * x)
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taps_are_symmetric_with_unit_gain() {
        let taps = lowpass_taps(4, 32);
        assert_eq!(taps.len(), 65);
        let sum: f64 = taps.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        for i in 0..32 {
            assert!((taps[i] - taps[64 - i]).abs() < 1e-15);
        }
    }

    #[test]
    fn dc_passes_and_nyquist_is_removed() {
        let factor = 4;
        let taps = lowpass_taps(factor, 32);
        let count = 50;
        let len = (count - 1) * factor + taps.len();
        let dc = vec![0.7; len];
        for y in decimate(&dc, &taps, factor, count) {
            assert!((y - 0.7).abs() < 1e-9);
        }
        let nyquist: Vec<f64> = (0..len).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        for y in decimate(&nyquist, &taps, factor, count) {
            assert!(y.abs() < 1e-3, "residual {y}");
        }
    }
}
