//! Reference CPPN: neuron and synapse genes plus a cached activation plan.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::{
    Activation, Neuron, NeuronKind, PatternNetwork, Synapse, connection_innovation, input_value,
    split_neuron_id, squash_output,
};
use crate::config::CppnConfig;

pub const BIAS_ID: u64 = 0;
pub const INPUT_ID: u64 = 1;
const FIRST_OUTPUT_ID: u64 = 2;

fn default_iterations() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cppn {
    neurons: Vec<Neuron>,
    synapses: Vec<Synapse>,
    #[serde(default = "default_iterations")]
    recurrent_iterations: usize,
    #[serde(skip)]
    plan: OnceLock<Plan>,
}

impl PartialEq for Cppn {
    fn eq(&self, other: &Self) -> bool {
        self.neurons == other.neurons
            && self.synapses == other.synapses
            && self.recurrent_iterations == other.recurrent_iterations
    }
}

/// Activation plan derived from the genes.
#[derive(Debug, Clone)]
struct Plan {
    /// Enabled incoming `(source position, weight)` per neuron, synapse order.
    incoming: Vec<Vec<(usize, f64)>>,
    /// Evaluation order when the enabled graph is acyclic.
    order: Option<Vec<usize>>,
    outputs: Vec<usize>,
}

impl Cppn {
    /// A network with a bias, one signal input and `outputs` output neurons,
    /// all unconnected.
    pub fn new(outputs: usize) -> Self {
        let mut neurons = vec![
            Neuron {
                id: BIAS_ID,
                kind: NeuronKind::Bias,
                activation: Activation::Identity,
            },
            Neuron {
                id: INPUT_ID,
                kind: NeuronKind::Input,
                activation: Activation::Identity,
            },
        ];
        for i in 0..outputs as u64 {
            neurons.push(Neuron {
                id: FIRST_OUTPUT_ID + i,
                kind: NeuronKind::Output,
                activation: Activation::Sine,
            });
        }
        Cppn {
            neurons,
            synapses: Vec::new(),
            recurrent_iterations: default_iterations(),
            plan: OnceLock::new(),
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.recurrent_iterations = iterations.max(1);
        self
    }

    pub fn neuron(&self, id: u64) -> Option<&Neuron> {
        self.neurons.iter().find(|n| n.id == id)
    }

    pub fn is_acyclic(&self) -> bool {
        self.plan().order.is_some()
    }

    fn invalidate(&mut self) {
        self.plan = OnceLock::new();
    }

    fn plan(&self) -> &Plan {
        self.plan.get_or_init(|| build_plan(&self.neurons, &self.synapses))
    }

    // ── Mutation ────────────────────────────────────────────

    pub fn set_activation(&mut self, id: u64, activation: Activation) {
        if let Some(n) = self.neurons.iter_mut().find(|n| n.id == id) {
            n.activation = activation;
        }
    }

    /// Perturb (or occasionally replace) each synapse weight with
    /// probability `weight_mutation_rate`.
    pub fn mutate_weights<R: Rng + ?Sized>(&mut self, config: &CppnConfig, rng: &mut R) {
        let range = config.weight_range.abs().max(f64::EPSILON);
        let step = config.weight_perturbation.abs();
        for syn in &mut self.synapses {
            if !rng.gen_bool(config.weight_mutation_rate.clamp(0.0, 1.0)) {
                continue;
            }
            if rng.gen_bool(config.weight_replace_rate.clamp(0.0, 1.0)) {
                syn.weight = rng.gen_range(-range..=range);
            } else if step > 0.0 {
                syn.weight = (syn.weight + rng.gen_range(-step..=step)).clamp(-range, range);
            }
        }
        self.invalidate();
    }

    /// Connect a random unconnected pair. Returns false when none qualifies.
    pub fn add_random_synapse<R: Rng + ?Sized>(
        &mut self,
        config: &CppnConfig,
        rng: &mut R,
    ) -> bool {
        let existing: HashSet<(u64, u64)> = self
            .synapses
            .iter()
            .filter(|s| s.enabled)
            .map(|s| (s.from, s.to))
            .collect();
        let mut candidates = Vec::new();
        for from in self.neurons.iter().filter(|n| n.kind != NeuronKind::Output) {
            for to in self.neurons.iter().filter(|n| !n.kind.is_input()) {
                if from.id == to.id || existing.contains(&(from.id, to.id)) {
                    continue;
                }
                if !config.allow_recurrent && self.reaches(to.id, from.id) {
                    continue;
                }
                candidates.push((from.id, to.id));
            }
        }
        let Some(&(from, to)) = candidates.choose(rng) else {
            return false;
        };
        let range = config.weight_range.abs().max(f64::EPSILON);
        let weight = rng.gen_range(-range..=range);
        self.add_synapse(from, to, weight);
        true
    }

    /// Split a random enabled synapse with a hidden neuron. The incoming half
    /// gets weight 1, the outgoing half keeps the old weight.
    pub fn add_random_neuron<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let enabled: Vec<usize> = self
            .synapses
            .iter()
            .enumerate()
            .filter(|(_, s)| s.enabled)
            .map(|(i, _)| i)
            .collect();
        let Some(&pick) = enabled.choose(rng) else {
            return false;
        };
        let old = self.synapses[pick].clone();
        let hidden = split_neuron_id(old.innovation);
        if self.neuron(hidden).is_some() {
            return false;
        }
        self.synapses[pick].enabled = false;
        self.neurons.push(Neuron {
            id: hidden,
            kind: NeuronKind::Hidden,
            activation: Activation::random(rng),
        });
        self.add_synapse(old.from, hidden, 1.0);
        self.add_synapse(hidden, old.to, old.weight);
        true
    }

    pub fn mutate_activation<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let ids: Vec<u64> = self
            .neurons
            .iter()
            .filter(|n| !n.kind.is_input())
            .map(|n| n.id)
            .collect();
        if let Some(&id) = ids.choose(rng) {
            self.set_activation(id, Activation::random(rng));
        }
    }

    /// Whether `to` is reachable from `from` along enabled synapses.
    fn reaches(&self, from: u64, to: u64) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            stack.extend(
                self.synapses
                    .iter()
                    .filter(|s| s.enabled && s.from == id)
                    .map(|s| s.to),
            );
        }
        false
    }

    pub(super) fn genes(&self) -> (&[Neuron], &[Synapse]) {
        (&self.neurons, &self.synapses)
    }

    pub(super) fn from_genes(
        neurons: Vec<Neuron>,
        synapses: Vec<Synapse>,
        recurrent_iterations: usize,
    ) -> Self {
        Cppn {
            neurons,
            synapses,
            recurrent_iterations,
            plan: OnceLock::new(),
        }
    }
}

impl PatternNetwork for Cppn {
    fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    fn synapses(&self) -> &[Synapse] {
        &self.synapses
    }

    fn add_synapse(&mut self, from: u64, to: u64, weight: f64) {
        let innovation = connection_innovation(from, to);
        match self.synapses.iter_mut().find(|s| s.innovation == innovation) {
            Some(existing) => {
                existing.enabled = true;
                existing.weight = weight;
            }
            None => self.synapses.push(Synapse {
                innovation,
                from,
                to,
                weight,
                enabled: true,
            }),
        }
        self.invalidate();
    }

    fn evaluate(&self, inputs: [f64; 2]) -> Vec<f64> {
        let plan = self.plan();
        let mut values = vec![0.0; self.neurons.len()];
        for (i, n) in self.neurons.iter().enumerate() {
            if n.kind.is_input() {
                values[i] = input_value(n.kind, inputs);
            }
        }

        match &plan.order {
            Some(order) => {
                for &i in order {
                    let n = &self.neurons[i];
                    if n.kind.is_input() {
                        continue;
                    }
                    let sum: f64 = plan.incoming[i].iter().map(|&(s, w)| values[s] * w).sum();
                    values[i] = n.activation.apply(sum);
                }
            }
            None => {
                for _ in 0..self.recurrent_iterations {
                    let prev = values.clone();
                    for (i, n) in self.neurons.iter().enumerate() {
                        if n.kind.is_input() {
                            continue;
                        }
                        let sum: f64 = plan.incoming[i].iter().map(|&(s, w)| prev[s] * w).sum();
                        values[i] = n.activation.apply(sum);
                    }
                }
            }
        }

        plan.outputs.iter().map(|&i| squash_output(values[i])).collect()
    }
}

fn build_plan(neurons: &[Neuron], synapses: &[Synapse]) -> Plan {
    let index: HashMap<u64, usize> = neurons.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
    let mut incoming = vec![Vec::new(); neurons.len()];
    let mut outgoing = vec![Vec::new(); neurons.len()];
    for syn in synapses.iter().filter(|s| s.enabled) {
        let (Some(&from), Some(&to)) = (index.get(&syn.from), index.get(&syn.to)) else {
            continue;
        };
        if neurons[to].kind.is_input() {
            continue;
        }
        incoming[to].push((from, syn.weight));
        outgoing[from].push(to);
    }

    // Kahn's algorithm; falls short of every neuron when a cycle exists.
    let mut indegree: Vec<usize> = incoming.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..neurons.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(neurons.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &t in &outgoing[i] {
            indegree[t] -= 1;
            if indegree[t] == 0 {
                queue.push_back(t);
            }
        }
    }

    let outputs = neurons
        .iter()
        .enumerate()
        .filter(|(_, n)| n.kind == NeuronKind::Output)
        .map(|(i, _)| i)
        .collect();

    Plan {
        incoming,
        order: (order.len() == neurons.len()).then_some(order),
        outputs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn unconnected_outputs_are_zero_activations() {
        let net = Cppn::new(3);
        assert_eq!(net.output_count(), 3);
        // sin(0) for every output
        assert_eq!(net.evaluate([1.0, 0.5]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn direct_synapse() {
        let mut net = Cppn::new(1);
        net.set_activation(2, Activation::Identity);
        net.add_synapse(INPUT_ID, 2, 0.5);
        net.add_synapse(BIAS_ID, 2, 0.25);
        let out = net.evaluate([1.0, 0.4]);
        assert!((out[0] - 0.45).abs() < 1e-12, "got {}", out[0]);
    }

    #[test]
    fn outputs_are_clamped() {
        let mut net = Cppn::new(1);
        net.set_activation(2, Activation::Identity);
        net.add_synapse(BIAS_ID, 2, 10.0);
        assert_eq!(net.evaluate([1.0, 0.0]), vec![1.0]);
    }

    #[test]
    fn split_preserves_connectivity() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut net = Cppn::new(1);
        net.add_synapse(INPUT_ID, 2, 0.7);
        assert!(net.add_random_neuron(&mut rng));
        assert_eq!(net.neurons().len(), 4);
        assert_eq!(net.synapses().iter().filter(|s| s.enabled).count(), 2);
        assert!(net.is_acyclic());
        let hidden = split_neuron_id(connection_innovation(INPUT_ID, 2));
        assert!(net.neuron(hidden).is_some());
    }

    #[test]
    fn cache_is_reset_by_mutation() {
        let mut net = Cppn::new(1);
        net.set_activation(2, Activation::Identity);
        assert_eq!(net.evaluate([1.0, 1.0]), vec![0.0]);
        net.add_synapse(INPUT_ID, 2, 0.5);
        assert_eq!(net.evaluate([1.0, 1.0]), vec![0.5]);
    }

    #[test]
    fn feedforward_growth_stays_acyclic() {
        let mut rng = StdRng::seed_from_u64(6);
        let config = CppnConfig::default();
        let mut net = Cppn::new(4);
        for _ in 0..40 {
            net.add_random_synapse(&config, &mut rng);
            net.add_random_neuron(&mut rng);
        }
        assert!(net.is_acyclic());
        for y in net.evaluate([1.0, -0.3]) {
            assert!((-1.0..=1.0).contains(&y));
        }
    }

    #[test]
    fn recurrent_networks_relax() {
        let mut net = Cppn::new(1).with_iterations(4);
        let hidden_a = split_neuron_id(1);
        let hidden_b = split_neuron_id(2);
        net.neurons.push(Neuron {
            id: hidden_a,
            kind: NeuronKind::Hidden,
            activation: Activation::Tanh,
        });
        net.neurons.push(Neuron {
            id: hidden_b,
            kind: NeuronKind::Hidden,
            activation: Activation::Tanh,
        });
        net.add_synapse(INPUT_ID, hidden_a, 1.0);
        net.add_synapse(hidden_a, hidden_b, 1.0);
        net.add_synapse(hidden_b, hidden_a, 0.5);
        net.add_synapse(hidden_b, 2, 1.0);
        assert!(!net.is_acyclic());
        let out = net.evaluate([1.0, 0.5]);
        assert!(out[0].is_finite() && out[0] != 0.0);
    }

    #[test]
    fn serde_skips_the_plan() {
        let mut net = Cppn::new(2);
        net.add_synapse(BIAS_ID, 3, -1.5);
        let _ = net.evaluate([1.0, 0.0]);
        let json = serde_json::to_string(&net).unwrap();
        let back: Cppn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, net);
        assert_eq!(back.evaluate([1.0, 0.2]), net.evaluate([1.0, 0.2]));
    }
}
