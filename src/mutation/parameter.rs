//! Parametric mutation — perturb one number according to its schema.
//!
//! Pure functions of their inputs and the RNG.

use rand::Rng;

use crate::patch::schema::{Interpolation, MutationSchema};

/// Mutate `value` at mutation `distance` (0..=1).
///
/// With probability `delta_chance` the value moves by a delta whose bounds
/// are interpolated along the schema's delta range; otherwise it is replaced
/// by a fresh random draw.
pub fn mutate_value<R: Rng + ?Sized>(
    value: f64,
    schema: &MutationSchema,
    distance: f64,
    rng: &mut R,
) -> f64 {
    let distance = distance.clamp(0.0, 1.0);
    let raw = if rng.gen_bool(schema.delta_chance.clamp(0.0, 1.0)) {
        let lo = interpolate(schema.law, schema.delta.min, distance);
        let hi = interpolate(schema.law, schema.delta.max, distance);
        let mut delta = uniform(lo.min(hi), lo.max(hi), rng);
        if schema.delta_inverse && rng.gen_bool(0.5) {
            delta = -delta;
        }
        value + delta
    } else {
        draw(schema, rng)
    };
    finish(raw, schema)
}

/// A fresh random value for a parameter, as used when a node is created.
pub fn random_value<R: Rng + ?Sized>(schema: &MutationSchema, rng: &mut R) -> f64 {
    finish(draw(schema, rng), schema)
}

/// Value of a delta bound at `distance` between its two endpoints.
pub fn interpolate(law: Interpolation, [a, b]: [f64; 2], distance: f64) -> f64 {
    let linear = a + (b - a) * distance;
    match law {
        Interpolation::Linear => linear,
        // Geometric interpolation needs both endpoints strictly on one side
        // of zero.
        Interpolation::Exponential if a * b > 0.0 => a * (b / a).powf(distance),
        Interpolation::Exponential => linear,
    }
}

fn draw<R: Rng + ?Sized>(schema: &MutationSchema, rng: &mut R) -> f64 {
    let [lo, hi] = schema.random;
    let v = uniform(lo, hi, rng);
    if schema.random_inverse && rng.gen_bool(0.5) {
        -v
    } else {
        v
    }
}

fn finish(value: f64, schema: &MutationSchema) -> f64 {
    let mut v = if schema.discrete { value.trunc() } else { value };
    if let Some([lo, hi]) = schema.clamp {
        v = v.clamp(lo, hi);
    }
    v
}

fn uniform<R: Rng + ?Sized>(lo: f64, hi: f64, rng: &mut R) -> f64 {
    if hi > lo { rng.gen_range(lo..hi) } else { lo }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::schema::DeltaRange;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const DELTA: DeltaRange = DeltaRange {
        min: [1.0, 10.0],
        max: [2.0, 20.0],
    };

    #[test]
    fn interpolation_laws() {
        assert_eq!(interpolate(Interpolation::Linear, [1.0, 3.0], 0.5), 2.0);
        assert!((interpolate(Interpolation::Exponential, [1.0, 100.0], 0.5) - 10.0).abs() < 1e-9);
        // Straddling zero degrades to linear.
        assert_eq!(interpolate(Interpolation::Exponential, [-1.0, 1.0], 0.5), 0.0);
        assert_eq!(interpolate(Interpolation::Exponential, [0.0, 4.0], 0.25), 1.0);
    }

    #[test]
    fn delta_steps_respect_bounds_at_zero_distance() {
        let schema = MutationSchema {
            delta_chance: 1.0,
            clamp: None,
            ..MutationSchema::continuous(DELTA, [0.0, 1000.0])
        };
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let d = (mutate_value(500.0, &schema, 0.0, &mut rng) - 500.0).abs();
            assert!((1.0..=2.0).contains(&d), "delta {d}");
        }
    }

    #[test]
    fn delta_steps_grow_with_distance() {
        let schema = MutationSchema {
            delta_chance: 1.0,
            delta_inverse: false,
            clamp: None,
            ..MutationSchema::continuous(DELTA, [0.0, 1000.0])
        };
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..500 {
            let d = mutate_value(0.0, &schema, 1.0, &mut rng);
            assert!((10.0..=20.0).contains(&d), "delta {d}");
        }
    }

    #[test]
    fn results_are_clamped_and_discrete() {
        let schema = MutationSchema::discrete(DELTA, [0.0, 4.0]);
        let mut rng = StdRng::seed_from_u64(5);
        let mut seen_top = false;
        for _ in 0..500 {
            let v = mutate_value(2.0, &schema, 1.0, &mut rng);
            assert!((0.0..=4.0).contains(&v));
            assert_eq!(v, v.trunc());
            seen_top |= v == 4.0;
        }
        assert!(seen_top);
    }

    #[test]
    fn random_replacement_stays_in_random_range() {
        let schema = MutationSchema {
            delta_chance: 0.0,
            random_inverse: true,
            clamp: None,
            ..MutationSchema::continuous(DELTA, [2.0, 3.0])
        };
        let mut rng = StdRng::seed_from_u64(6);
        let mut negative = false;
        for _ in 0..200 {
            let v = mutate_value(0.0, &schema, 0.5, &mut rng);
            assert!((2.0..3.0).contains(&v.abs()));
            negative |= v < 0.0;
        }
        assert!(negative);
    }

    #[test]
    fn same_seed_same_result() {
        let schema = MutationSchema::continuous(DELTA, [0.0, 100.0]);
        let a = mutate_value(50.0, &schema, 0.3, &mut StdRng::seed_from_u64(9));
        let b = mutate_value(50.0, &schema, 0.3, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
