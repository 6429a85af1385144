//! Pattern-generator networks.
//!
//! The orchestrator only talks to the [`PatternNetwork`] and
//! [`OffspringDriver`] traits. [`Cppn`] and [`CppnDriver`] are a small
//! NEAT-style implementation: bias and signal inputs, periodic activations,
//! hash-keyed innovations so that identical structural mutations in separate
//! lineages line up during crossover.

mod activation;
mod driver;
mod innovation;
mod network;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub use activation::Activation;
pub use driver::CppnDriver;
pub use innovation::{connection_innovation, split_neuron_id};
pub use network::Cppn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeuronKind {
    /// Receives the constant first input.
    Bias,
    /// Receives the per-sample signal input.
    Input,
    Output,
    Hidden,
}

impl NeuronKind {
    pub fn is_input(self) -> bool {
        matches!(self, NeuronKind::Bias | NeuronKind::Input)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neuron {
    pub id: u64,
    pub kind: NeuronKind,
    pub activation: Activation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    pub innovation: u64,
    pub from: u64,
    pub to: u64,
    pub weight: f64,
    pub enabled: bool,
}

/// Value an input neuron takes for the input pair `[bias, signal]`.
pub fn input_value(kind: NeuronKind, inputs: [f64; 2]) -> f64 {
    match kind {
        NeuronKind::Bias => inputs[0],
        _ => inputs[1],
    }
}

/// Final output transform shared by every evaluation path.
#[inline]
pub fn squash_output(v: f64) -> f64 {
    if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 }
}

/// A network mapping `[bias, signal]` to a vector of outputs in [-1, 1].
pub trait PatternNetwork: Clone + Send + Sync {
    fn neurons(&self) -> &[Neuron];

    fn synapses(&self) -> &[Synapse];

    /// Add an enabled synapse, or re-enable and reweight an existing one.
    fn add_synapse(&mut self, from: u64, to: u64, weight: f64);

    /// Activate once. Outputs are returned in output-index order.
    fn evaluate(&self, inputs: [f64; 2]) -> Vec<f64>;

    fn output_count(&self) -> usize {
        self.neurons()
            .iter()
            .filter(|n| n.kind == NeuronKind::Output)
            .count()
    }

    /// Neuron id behind output `index`.
    fn output_neuron(&self, index: usize) -> Option<u64> {
        self.neurons()
            .iter()
            .filter(|n| n.kind == NeuronKind::Output)
            .nth(index)
            .map(|n| n.id)
    }

    fn input_neurons(&self) -> Vec<u64> {
        self.neurons()
            .iter()
            .filter(|n| n.kind.is_input())
            .map(|n| n.id)
            .collect()
    }
}

/// Produces new networks from zero (fresh), one (mutated copy) or more
/// (crossover, then mutation) parents.
pub trait OffspringDriver {
    type Network: PatternNetwork;

    fn offspring<R: Rng + ?Sized>(
        &mut self,
        parents: &[&Self::Network],
        rng: &mut R,
    ) -> Self::Network;
}
