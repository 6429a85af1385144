//! Evolution loop — bounded offspring production with an optional fitness gate.

use rand::Rng;
use tracing::{info, warn};

use crate::config::EvolutionConfig;
use crate::cppn::{OffspringDriver, PatternNetwork};
use crate::crossover::crossover;
use crate::error::{EvolveError, GenomeError};
use crate::genome::Genome;
use crate::mutation::mutate;
use crate::orchestrator::{PatternSource, ensure_outputs_connected};
use crate::patch::{MAX_ID, Patch};

/// Decides whether a rendered offspring survives.
pub trait FitnessGate {
    fn accept(&mut self, samples: &[f64]) -> bool;
}

impl<F: FnMut(&[f64]) -> bool> FitnessGate for F {
    fn accept(&mut self, samples: &[f64]) -> bool {
        self(samples)
    }
}

/// Gate that keeps every offspring that renders.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl FitnessGate for AcceptAll {
    fn accept(&mut self, _samples: &[f64]) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct Offspring<N> {
    pub genome: Genome<N>,
    /// The rendering the gate accepted.
    pub samples: Vec<f64>,
    pub attempts: usize,
}

/// Produce one accepted offspring of `parents`.
///
/// Two or more parents are crossed (the first two), one is cloned, none
/// seeds a fresh genome. The patch is mutated, the pattern network(s) come
/// from `driver`, and the result is rendered with `config.render`. Attempts
/// that fail to render count towards `config.max_attempts` like rejected ones.
pub fn produce_offspring<N, D, G, R>(
    parents: &[&Genome<N>],
    config: &EvolutionConfig,
    driver: &mut D,
    gate: &mut G,
    rng: &mut R,
) -> Result<Offspring<N>, GenomeError>
where
    N: PatternNetwork,
    D: OffspringDriver<Network = N>,
    G: FitnessGate + ?Sized,
    R: Rng + ?Sized,
{
    config.render.validate()?;

    let attempts = config.max_attempts.max(1);
    for attempt in 1..=attempts {
        let mut genome = breed(parents, config, driver, rng);
        match genome.render(&config.render, &config.orchestrator, driver, rng) {
            Ok(samples) => {
                if gate.accept(&samples) {
                    info!(
                        id = genome.id,
                        generation = genome.patch.generation,
                        nodes = genome.patch.nodes.len(),
                        connections = genome.patch.connections.len(),
                        attempt,
                        "offspring accepted"
                    );
                    return Ok(Offspring {
                        genome,
                        samples,
                        attempts: attempt,
                    });
                }
            }
            Err(e) => warn!(attempt, error = %e, "offspring failed to render"),
        }
    }
    Err(EvolveError::Rejected { attempts }.into())
}

fn breed<N, D, R>(parents: &[&Genome<N>], config: &EvolutionConfig, driver: &mut D, rng: &mut R) -> Genome<N>
where
    N: PatternNetwork,
    D: OffspringDriver<Network = N>,
    R: Rng + ?Sized,
{
    let (mut patch, mut pattern) = match parents {
        [] => (
            Patch::seeded(config.operator_weights.clone(), rng),
            PatternSource::Shared(driver.offspring(&[], rng)),
        ),
        [parent] => (parent.patch.clone(), parent.pattern.offspring(None, driver, rng)),
        [a, b, ..] => (
            crossover(&a.patch, &b.patch, rng),
            a.pattern.offspring(Some(&b.pattern), driver, rng),
        ),
    };

    patch.generation = parents.iter().map(|p| p.patch.generation).max().map_or(0, |g| g + 1);
    mutate(&mut patch, config, rng);
    for network in pattern.networks_mut() {
        ensure_outputs_connected(&patch, network, rng);
    }
    Genome::new(rng.gen_range(0..MAX_ID), patch, pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderRequest;
    use crate::cppn::{Cppn, CppnDriver};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn quick() -> EvolutionConfig {
        EvolutionConfig {
            render: RenderRequest {
                duration: 0.02,
                sample_rate: 8000.0,
                ..RenderRequest::default()
            },
            ..EvolutionConfig::default()
        }
    }

    #[test]
    fn seeds_without_parents() {
        let mut rng = StdRng::seed_from_u64(81);
        let mut driver = CppnDriver::default();
        let child: Offspring<Cppn> =
            produce_offspring(&[], &quick(), &mut driver, &mut AcceptAll, &mut rng).unwrap();
        assert_eq!(child.attempts, 1);
        assert_eq!(child.genome.patch.generation, 0);
        assert_eq!(child.samples.len(), 160);
    }

    #[test]
    fn children_are_one_generation_older() {
        let mut rng = StdRng::seed_from_u64(82);
        let config = quick();
        let mut driver = CppnDriver::default();
        let mut a: Genome<Cppn> =
            Genome::seeded(1, config.operator_weights.clone(), &mut driver, &mut rng);
        a.patch.generation = 3;
        let b: Genome<Cppn> = Genome::seeded(2, config.operator_weights.clone(), &mut driver, &mut rng);

        let child = produce_offspring(&[&a, &b], &config, &mut driver, &mut AcceptAll, &mut rng).unwrap();
        assert_eq!(child.genome.patch.generation, 4);
        child.genome.patch.validate().unwrap();

        let clone = produce_offspring(&[&b], &config, &mut driver, &mut AcceptAll, &mut rng).unwrap();
        assert_eq!(clone.genome.patch.generation, 1);
    }

    #[test]
    fn gate_decides_and_retries() {
        let mut rng = StdRng::seed_from_u64(83);
        let mut driver = CppnDriver::default();
        let mut seen = 0;
        let mut gate = |_: &[f64]| {
            seen += 1;
            seen == 3
        };
        let child: Offspring<Cppn> =
            produce_offspring(&[], &quick(), &mut driver, &mut gate, &mut rng).unwrap();
        assert_eq!(child.attempts, 3);
    }

    #[test]
    fn rejects_after_max_attempts() {
        let mut rng = StdRng::seed_from_u64(84);
        let mut driver = CppnDriver::default();
        let config = EvolutionConfig {
            max_attempts: 4,
            ..quick()
        };
        let mut calls = 0;
        let mut never = |_: &[f64]| {
            calls += 1;
            false
        };
        let err = produce_offspring::<Cppn, _, _, _>(&[], &config, &mut driver, &mut never, &mut rng)
            .unwrap_err();
        assert!(matches!(err, GenomeError::Evolve(EvolveError::Rejected { attempts: 4 })));
        assert_eq!(calls, 4);
    }

    #[test]
    fn invalid_request_fails_fast() {
        let mut rng = StdRng::seed_from_u64(85);
        let mut driver = CppnDriver::default();
        let mut config = quick();
        config.render.sample_rate = 0.0;
        let err = produce_offspring::<Cppn, _, _, _>(&[], &config, &mut driver, &mut AcceptAll, &mut rng)
            .unwrap_err();
        assert!(matches!(err, GenomeError::Render(_)));
    }
}
