//! Configuration — operator weights, evolution, orchestration, rendering
//! and the reference pattern network.
//!
//! Every struct has a `Default` and deserializes with missing fields filled
//! from it, so a JSON config only needs the values it changes.

use serde::{Deserialize, Serialize};

use crate::error::{RecordError, RenderError};

// ── Operator Weights ────────────────────────────────────────

/// Relative likelihood of each structural mutation operator. Carried per
/// patch so lineages may drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperatorWeights {
    pub split: f64,
    pub add_generator: f64,
    pub add_buffer_source: f64,
    pub add_partial: f64,
    pub add_connection: f64,
    pub mutate_parameters: f64,
}

impl Default for OperatorWeights {
    fn default() -> Self {
        OperatorWeights {
            split: 0.2,
            add_generator: 0.15,
            add_buffer_source: 0.1,
            add_partial: 0.05,
            add_connection: 0.2,
            mutate_parameters: 0.3,
        }
    }
}

// ── Evolution ───────────────────────────────────────────────

/// Top-level configuration of the offspring loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvolutionConfig {
    /// Mutation distance in [0, 1]. Scales delta magnitudes and the number
    /// of structural rounds.
    pub mutation_distance: f64,
    /// Per-node probability of a parameter perturbation.
    pub node_mutation_rate: f64,
    /// Per-connection probability of a weight perturbation.
    pub connection_mutation_rate: f64,
    /// Restrict add-connection to parameter-targeting connections.
    pub param_connections_only: bool,
    /// Chance that a new generator plays noise instead of a network output.
    pub noise_probability: f64,
    /// Offspring attempts before giving up.
    pub max_attempts: usize,
    /// Weights given to freshly seeded patches.
    pub operator_weights: OperatorWeights,
    pub orchestrator: OrchestratorConfig,
    pub render: RenderRequest,
    pub cppn: CppnConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig {
            mutation_distance: 0.5,
            node_mutation_rate: 0.3,
            connection_mutation_rate: 0.2,
            param_connections_only: false,
            noise_probability: 0.05,
            max_attempts: 10,
            operator_weights: OperatorWeights::default(),
            orchestrator: OrchestratorConfig::default(),
            render: RenderRequest::default(),
            cppn: CppnConfig::default(),
        }
    }
}

impl EvolutionConfig {
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Structural rounds per mutation: `1 + round(2 × distance)`.
    pub fn mutation_rounds(&self) -> usize {
        1 + (2.0 * self.mutation_distance.clamp(0.0, 1.0)).round() as usize
    }
}

// ── Orchestrator ────────────────────────────────────────────

/// How pattern networks are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One network activation per sample.
    Sequential,
    /// Flattened kernel evaluated over sample chunks in parallel.
    Batched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrchestratorConfig {
    pub backend: Backend,
    /// Samples per parallel work item in the batched backend.
    pub chunk_size: usize,
    /// Create missing per-frequency networks as offspring of the nearest one.
    pub lazy_create: bool,
    /// Otherwise borrow the nearest frequency's network.
    pub nearest_fallback: bool,
    /// Oversampling factor used when a request asks for anti-aliasing.
    pub oversample: usize,
    /// Half-width of the windowed-sinc low-pass, in oversampled samples.
    pub fir_half_width: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            backend: Backend::Batched,
            chunk_size: 4096,
            lazy_create: true,
            nearest_fallback: true,
            oversample: 4,
            fir_half_width: 32,
        }
    }
}

// ── Render Request ──────────────────────────────────────────

/// One note rendering of a genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderRequest {
    /// Seconds.
    pub duration: f64,
    pub sample_rate: f64,
    /// Semitones relative to the genome's own pitch.
    pub note_delta: i32,
    /// Output scale in [0, 1].
    pub velocity: f64,
    /// Play the evaluated network outputs backwards.
    pub reverse: bool,
    /// Oversample and low-pass network outputs before use.
    pub anti_alias: bool,
    /// Linear fade length at buffer edges.
    pub fade_samples: usize,
    /// Longest convolver impulse response, in samples.
    pub max_impulse: usize,
}

impl Default for RenderRequest {
    fn default() -> Self {
        RenderRequest {
            duration: 1.0,
            sample_rate: 48000.0,
            note_delta: 0,
            velocity: 1.0,
            reverse: false,
            anti_alias: false,
            fade_samples: 128,
            max_impulse: 2048,
        }
    }
}

impl RenderRequest {
    pub fn num_samples(&self) -> usize {
        (self.duration * self.sample_rate).round() as usize
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(RenderError::InvalidRequest(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(RenderError::InvalidRequest(format!(
                "duration must be positive, got {}",
                self.duration
            )));
        }
        Ok(())
    }
}

// ── Reference CPPN ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CppnConfig {
    /// Output neurons; generator nodes index into these.
    pub outputs: usize,
    /// Chance that each input→output synapse exists in a fresh network.
    pub initial_connection_probability: f64,
    /// Magnitude bound of fresh synapse weights.
    pub weight_range: f64,
    pub weight_mutation_rate: f64,
    /// Maximum perturbation of a mutated weight.
    pub weight_perturbation: f64,
    /// Chance a mutated weight is replaced instead of perturbed.
    pub weight_replace_rate: f64,
    pub add_connection_rate: f64,
    pub add_neuron_rate: f64,
    pub activation_mutation_rate: f64,
    pub allow_recurrent: bool,
    /// Relaxation passes for networks with cycles.
    pub recurrent_iterations: usize,
}

impl Default for CppnConfig {
    fn default() -> Self {
        CppnConfig {
            outputs: 18,
            initial_connection_probability: 0.8,
            weight_range: 3.0,
            weight_mutation_rate: 0.8,
            weight_perturbation: 0.5,
            weight_replace_rate: 0.1,
            add_connection_rate: 0.1,
            add_neuron_rate: 0.05,
            activation_mutation_rate: 0.05,
            allow_recurrent: false,
            recurrent_iterations: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config = EvolutionConfig::from_json(
            r#"{"mutationDistance": 1.0, "orchestrator": {"backend": "sequential"}}"#,
        )
        .unwrap();
        assert_eq!(config.mutation_distance, 1.0);
        assert_eq!(config.orchestrator.backend, Backend::Sequential);
        assert_eq!(config.orchestrator.chunk_size, 4096);
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.cppn.outputs, 18);
    }

    #[test]
    fn rounds_follow_distance() {
        let mut config = EvolutionConfig::default();
        config.mutation_distance = 0.0;
        assert_eq!(config.mutation_rounds(), 1);
        config.mutation_distance = 0.5;
        assert_eq!(config.mutation_rounds(), 2);
        config.mutation_distance = 1.0;
        assert_eq!(config.mutation_rounds(), 3);
    }

    #[test]
    fn request_validation() {
        let request = RenderRequest::default();
        assert!(request.validate().is_ok());
        assert_eq!(request.num_samples(), 48000);
        let bad = RenderRequest {
            sample_rate: 0.0,
            ..RenderRequest::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(EvolutionConfig::from_json("{").is_err());
    }
}
