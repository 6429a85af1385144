//! Flattened network evaluation for the batched backend.
//!
//! A [`Kernel`] holds only the neurons the requested outputs depend on, in
//! topological order, as slot-indexed steps. Each step sums its inputs in the
//! network's synapse order, so a kernel reproduces [`PatternNetwork::evaluate`]
//! bit for bit on acyclic networks.

use std::collections::HashMap;

use crate::cppn::{Activation, NeuronKind, PatternNetwork, input_value, squash_output};
use crate::error::KernelError;

#[derive(Debug, Clone)]
struct Step {
    slot: usize,
    activation: Activation,
    incoming: Vec<(usize, f64)>,
}

#[derive(Debug, Clone)]
pub struct Kernel {
    inputs: Vec<(usize, NeuronKind)>,
    steps: Vec<Step>,
    /// Slot of each requested output, in request order.
    outputs: Vec<usize>,
    slots: usize,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Fresh,
    Visiting,
    Done,
}

impl Kernel {
    /// Flatten `network` for the given output indices. Callers check the
    /// indices against [`PatternNetwork::output_count`] first; unknown ones
    /// are ignored.
    pub fn build<N: PatternNetwork>(network: &N, outputs: &[usize]) -> Result<Kernel, KernelError> {
        let neurons = network.neurons();
        let index: HashMap<u64, usize> =
            neurons.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        let mut incoming = vec![Vec::new(); neurons.len()];
        for syn in network.synapses().iter().filter(|s| s.enabled) {
            let from = *index.get(&syn.from).ok_or(KernelError::UnknownNeuron(syn.from))?;
            let to = *index.get(&syn.to).ok_or(KernelError::UnknownNeuron(syn.to))?;
            if neurons[to].kind.is_input() {
                continue;
            }
            incoming[to].push((from, syn.weight));
        }

        let roots: Vec<usize> = outputs
            .iter()
            .filter_map(|&i| network.output_neuron(i))
            .filter_map(|id| index.get(&id).copied())
            .collect();

        // Depth-first post-order from the requested outputs.
        let mut marks = vec![Mark::Fresh; neurons.len()];
        let mut order = Vec::new();
        for &root in &roots {
            if marks[root] != Mark::Fresh {
                continue;
            }
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::Visiting;
            while let Some(top) = stack.last_mut() {
                let (node, next) = *top;
                if neurons[node].kind.is_input() || next >= incoming[node].len() {
                    marks[node] = Mark::Done;
                    order.push(node);
                    stack.pop();
                    continue;
                }
                top.1 += 1;
                let (source, _) = incoming[node][next];
                match marks[source] {
                    Mark::Fresh => {
                        marks[source] = Mark::Visiting;
                        stack.push((source, 0));
                    }
                    Mark::Visiting => return Err(KernelError::Cycle(neurons[source].id)),
                    Mark::Done => {}
                }
            }
        }

        let slot_of: HashMap<usize, usize> =
            order.iter().enumerate().map(|(slot, &n)| (n, slot)).collect();
        let mut inputs = Vec::new();
        let mut steps = Vec::new();
        for (slot, &n) in order.iter().enumerate() {
            let neuron = &neurons[n];
            if neuron.kind.is_input() {
                inputs.push((slot, neuron.kind));
                continue;
            }
            steps.push(Step {
                slot,
                activation: neuron.activation,
                incoming: incoming[n]
                    .iter()
                    .filter_map(|&(s, w)| slot_of.get(&s).map(|&slot| (slot, w)))
                    .collect(),
            });
        }

        Ok(Kernel {
            inputs,
            steps,
            outputs: roots.iter().filter_map(|r| slot_of.get(r).copied()).collect(),
            slots: order.len(),
        })
    }

    /// Number of neurons kept after pruning.
    pub fn len(&self) -> usize {
        self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots == 0
    }

    fn activate(&self, inputs: [f64; 2], values: &mut [f64]) {
        for &(slot, kind) in &self.inputs {
            values[slot] = input_value(kind, inputs);
        }
        for step in &self.steps {
            let sum: f64 = step.incoming.iter().map(|&(s, w)| values[s] * w).sum();
            values[step.slot] = step.activation.apply(sum);
        }
    }

    /// Evaluate every signal value with bias 1. Returns one column per
    /// requested output.
    pub fn run(&self, signals: &[f64]) -> Vec<Vec<f64>> {
        let mut values = vec![0.0; self.slots];
        let mut columns = vec![Vec::with_capacity(signals.len()); self.outputs.len()];
        for &s in signals {
            self.activate([1.0, s], &mut values);
            for (column, &slot) in columns.iter_mut().zip(&self.outputs) {
                column.push(squash_output(values[slot]));
            }
        }
        columns
    }
}
