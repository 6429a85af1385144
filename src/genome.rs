//! Genome — a patch paired with the pattern network(s) that drive it.

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bridge;
use crate::config::{OperatorWeights, OrchestratorConfig, RenderRequest};
use crate::cppn::{OffspringDriver, PatternNetwork};
use crate::dsp::engine;
use crate::error::{GenomeError, RecordError};
use crate::orchestrator::{Orchestrator, PatternSource, ensure_outputs_connected};
use crate::patch::{Patch, PatchRecord};
use crate::signal;

#[derive(Debug, Clone, PartialEq)]
pub struct Genome<N> {
    pub id: u64,
    pub patch: Patch,
    pub pattern: PatternSource<N>,
}

/// Serialized form: the patch travels as its record.
#[derive(Serialize, Deserialize)]
struct GenomeRecord<P> {
    id: u64,
    patch: PatchRecord,
    pattern: P,
}

impl<N: PatternNetwork> Genome<N> {
    pub fn new(id: u64, patch: Patch, pattern: PatternSource<N>) -> Self {
        Genome { id, patch, pattern }
    }

    /// The minimal genome: a seeded patch and one fresh shared network whose
    /// outputs the patch reads are connected.
    pub fn seeded<D, R>(id: u64, weights: OperatorWeights, driver: &mut D, rng: &mut R) -> Self
    where
        D: OffspringDriver<Network = N>,
        R: Rng + ?Sized,
    {
        let patch = Patch::seeded(weights, rng);
        let mut network = driver.offspring(&[], rng);
        ensure_outputs_connected(&patch, &mut network, rng);
        Genome {
            id,
            patch,
            pattern: PatternSource::Shared(network),
        }
    }

    /// Compile, evaluate, bind and render one note.
    pub fn render<D, R>(
        &mut self,
        request: &RenderRequest,
        orchestrator: &OrchestratorConfig,
        driver: &mut D,
        rng: &mut R,
    ) -> Result<Vec<f64>, GenomeError>
    where
        D: OffspringDriver<Network = N>,
        R: Rng + ?Sized,
    {
        request.validate()?;
        let graph = bridge::compile(&self.patch, request.note_delta);
        let outputs = Orchestrator::new(orchestrator.clone()).evaluate_graph(
            &mut self.pattern,
            &graph,
            request,
            driver,
            rng,
        )?;
        let render_graph = signal::compile(&graph, &outputs, request)?;
        Ok(engine::render(&render_graph, request)?)
    }
}

impl<N: PatternNetwork + Serialize> Genome<N> {
    pub fn to_json(&self) -> Result<String, RecordError> {
        let record = GenomeRecord {
            id: self.id,
            patch: PatchRecord::from(&self.patch),
            pattern: &self.pattern,
        };
        Ok(serde_json::to_string(&record)?)
    }
}

impl<N: PatternNetwork + DeserializeOwned> Genome<N> {
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        let record: GenomeRecord<PatternSource<N>> = serde_json::from_str(json)?;
        Ok(Genome {
            id: record.id,
            patch: record.patch.into_patch()?,
            pattern: record.pattern,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvolutionConfig;
    use crate::cppn::{Cppn, CppnDriver};
    use crate::mutation::mutate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn short() -> RenderRequest {
        RenderRequest {
            duration: 0.05,
            sample_rate: 8000.0,
            ..RenderRequest::default()
        }
    }

    #[test]
    fn seeded_genome_renders() {
        let mut rng = StdRng::seed_from_u64(71);
        let mut driver = CppnDriver::default();
        let mut genome: Genome<Cppn> =
            Genome::seeded(1, OperatorWeights::default(), &mut driver, &mut rng);
        let samples = genome
            .render(&short(), &OrchestratorConfig::default(), &mut driver, &mut rng)
            .unwrap();
        assert_eq!(samples.len(), 400);
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }

    #[test]
    fn json_round_trip() {
        let mut rng = StdRng::seed_from_u64(72);
        let mut driver = CppnDriver::default();
        let config = EvolutionConfig::default();
        let mut genome: Genome<Cppn> =
            Genome::seeded(99, OperatorWeights::default(), &mut driver, &mut rng);
        for _ in 0..10 {
            mutate(&mut genome.patch, &config, &mut rng);
        }
        let json = genome.to_json().unwrap();
        let back = Genome::<Cppn>::from_json(&json).unwrap();
        assert_eq!(back.id, 99);
        assert_eq!(back.patch.nodes, genome.patch.nodes);
        assert_eq!(back.patch.connections, genome.patch.connections);
        assert_eq!(back.pattern, genome.pattern);
        assert_eq!(back.to_json().unwrap(), json);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Genome::<Cppn>::from_json(r#"{"id": 1}"#).is_err());
    }
}
