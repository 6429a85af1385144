//! Offspring production for [`Cppn`]s.

use std::collections::HashMap;

use rand::Rng;
use tracing::trace;

use super::network::{BIAS_ID, INPUT_ID};
use super::{Activation, Cppn, OffspringDriver, PatternNetwork};
use crate::config::CppnConfig;

#[derive(Debug, Clone, Default)]
pub struct CppnDriver {
    pub config: CppnConfig,
}

impl CppnDriver {
    pub fn new(config: CppnConfig) -> Self {
        CppnDriver { config }
    }

    /// A fresh network: each input reaches each output with probability
    /// `initial_connection_probability`; output activations are random.
    pub fn fresh<R: Rng + ?Sized>(&self, rng: &mut R) -> Cppn {
        let mut net = Cppn::new(self.config.outputs).with_iterations(self.config.recurrent_iterations);
        let range = self.config.weight_range.abs().max(f64::EPSILON);
        let p = self.config.initial_connection_probability.clamp(0.0, 1.0);
        let outputs: Vec<u64> = (0..self.config.outputs)
            .filter_map(|i| net.output_neuron(i))
            .collect();
        for out in outputs {
            net.set_activation(out, Activation::random(rng));
            for input in [BIAS_ID, INPUT_ID] {
                if rng.gen_bool(p) {
                    let weight = rng.gen_range(-range..=range);
                    net.add_synapse(input, out, weight);
                }
            }
        }
        net
    }

    pub fn mutate<R: Rng + ?Sized>(&self, net: &mut Cppn, rng: &mut R) {
        net.mutate_weights(&self.config, rng);
        if rng.gen_bool(self.config.add_connection_rate.clamp(0.0, 1.0)) {
            net.add_random_synapse(&self.config, rng);
        }
        if rng.gen_bool(self.config.add_neuron_rate.clamp(0.0, 1.0)) {
            net.add_random_neuron(rng);
        }
        if rng.gen_bool(self.config.activation_mutation_rate.clamp(0.0, 1.0)) {
            net.mutate_activation(rng);
        }
    }

    /// Innovation-aligned crossover. `a` is treated as the primary parent:
    /// its disjoint genes are kept, matching genes come from either parent.
    pub fn crossover<R: Rng + ?Sized>(&self, a: &Cppn, b: &Cppn, rng: &mut R) -> Cppn {
        let (a_neurons, a_synapses) = a.genes();
        let (b_neurons, b_synapses) = b.genes();
        let b_neurons: HashMap<u64, _> = b_neurons.iter().map(|n| (n.id, n)).collect();
        let b_synapses: HashMap<u64, _> = b_synapses.iter().map(|s| (s.innovation, s)).collect();

        let neurons = a_neurons
            .iter()
            .map(|n| match b_neurons.get(&n.id) {
                Some(other) if rng.gen_bool(0.5) => (*other).clone(),
                _ => n.clone(),
            })
            .collect();
        let synapses = a_synapses
            .iter()
            .map(|s| match b_synapses.get(&s.innovation) {
                Some(other) if rng.gen_bool(0.5) => (*other).clone(),
                _ => s.clone(),
            })
            .collect();
        Cppn::from_genes(neurons, synapses, self.config.recurrent_iterations)
    }
}

impl OffspringDriver for CppnDriver {
    type Network = Cppn;

    fn offspring<R: Rng + ?Sized>(&mut self, parents: &[&Cppn], rng: &mut R) -> Cppn {
        let mut child = match parents {
            [] => return self.fresh(rng),
            [only] => (*only).clone(),
            [a, b, ..] => self.crossover(a, b, rng),
        };
        self.mutate(&mut child, rng);
        trace!(
            neurons = child.neurons().len(),
            synapses = child.synapses().len(),
            "cppn offspring"
        );
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn fresh_networks_have_the_configured_outputs() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut driver = CppnDriver::default();
        let net = driver.offspring(&[], &mut rng);
        assert_eq!(net.output_count(), 18);
        assert_eq!(net.input_neurons(), vec![BIAS_ID, INPUT_ID]);
        assert!(net.synapses().len() <= 36);
    }

    #[test]
    fn mutated_children_differ_from_parents() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut driver = CppnDriver::default();
        let parent = driver.offspring(&[], &mut rng);
        let child = driver.offspring(&[&parent], &mut rng);
        assert_eq!(child.output_count(), parent.output_count());
        assert_ne!(child, parent, "weights should have been perturbed");
    }

    #[test]
    fn crossover_keeps_primary_structure() {
        let mut rng = StdRng::seed_from_u64(3);
        let driver = CppnDriver::default();
        let a = driver.fresh(&mut rng);
        let mut b = a.clone();
        driver.mutate(&mut b, &mut rng);
        b.add_random_neuron(&mut rng);
        let child = driver.crossover(&a, &b, &mut rng);
        assert_eq!(child.neurons().len(), a.neurons().len());
        assert_eq!(child.synapses().len(), a.synapses().len());
        for (c, s) in child.synapses().iter().zip(a.synapses()) {
            assert_eq!(c.innovation, s.innovation);
        }
    }

    #[test]
    fn two_parent_offspring_evaluates() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut driver = CppnDriver::default();
        let a = driver.offspring(&[], &mut rng);
        let b = driver.offspring(&[], &mut rng);
        let child = driver.offspring(&[&a, &b], &mut rng);
        let out = child.evaluate([1.0, 0.25]);
        assert_eq!(out.len(), 18);
        assert!(out.iter().all(|v| v.is_finite() && v.abs() <= 1.0));
    }
}
