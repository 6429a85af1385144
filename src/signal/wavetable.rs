//! Wavetable blending.

/// Blend `sources` sample by sample. With a `control` signal in [-1, 1] the
/// output crossfades linearly between the two adjacent sources at position
/// `(c + 1) / 2 × (n − 1)`; without one every source is weighted equally.
///
/// Each output sample is a convex combination of source samples, so it never
/// exceeds the largest constituent amplitude.
pub fn blend(sources: &[Vec<f64>], control: Option<&[f64]>, len: usize) -> Vec<f64> {
    let n = sources.len();
    if n == 0 {
        return vec![0.0; len];
    }
    let at = |s: usize, t: usize| sources[s].get(t).copied().unwrap_or(0.0);
    (0..len)
        .map(|t| match control {
            Some(c) if n > 1 => {
                let c = c.get(t).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
                let pos = (c + 1.0) * 0.5 * (n - 1) as f64;
                let lo = (pos as usize).min(n - 2);
                let frac = pos - lo as f64;
                at(lo, t) * (1.0 - frac) + at(lo + 1, t) * frac
            }
            _ => (0..n).map(|s| at(s, t)).sum::<f64>() / n as f64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_selects_between_neighbours() {
        let sources = vec![vec![1.0; 3], vec![0.0; 3], vec![-1.0; 3]];
        let control = [-1.0, 0.0, 1.0];
        assert_eq!(blend(&sources, Some(&control), 3), vec![1.0, 0.0, -1.0]);
        let halfway = [0.5; 3];
        let out = blend(&sources, Some(&halfway), 3);
        assert!((out[0] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn uncontrolled_blend_is_the_mean() {
        let sources = vec![vec![0.6, 0.2], vec![0.2, -0.2]];
        let out = blend(&sources, None, 2);
        assert!((out[0] - 0.4).abs() < 1e-12);
        assert!(out[1].abs() < 1e-12);
    }

    #[test]
    fn never_exceeds_the_loudest_source() {
        let sources: Vec<Vec<f64>> = (0..4)
            .map(|k| (0..256).map(|t| ((t * (k + 1)) as f64 * 0.1).sin() * (0.25 * (k + 1) as f64)).collect())
            .collect();
        let control: Vec<f64> = (0..256).map(|t| (t as f64 * 0.05).cos()).collect();
        let loudest = sources.iter().flatten().fold(0.0f64, |m, v| m.max(v.abs()));
        for out in [blend(&sources, Some(&control), 256), blend(&sources, None, 256)] {
            assert!(out.iter().all(|v| v.abs() <= loudest + 1e-12));
        }
    }

    #[test]
    fn no_sources_is_silence() {
        assert_eq!(blend(&[], None, 4), vec![0.0; 4]);
    }
}
