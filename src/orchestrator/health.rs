//! Keeps every network output a patch listens to driven by something.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::cppn::PatternNetwork;
use crate::patch::Patch;

const REPAIR_WEIGHT: (f64, f64) = (0.5, 3.0);

/// Give each output index referenced by `patch` at least one enabled
/// incoming synapse, drawn from a random input with a weight of magnitude in
/// [0.5, 3.0]. Returns the number of synapses added.
pub fn ensure_outputs_connected<N: PatternNetwork, R: Rng + ?Sized>(
    patch: &Patch,
    network: &mut N,
    rng: &mut R,
) -> usize {
    ensure_indices_connected(patch.output_indices(), network, rng)
}

/// [`ensure_outputs_connected`] for an explicit set of output indices.
pub fn ensure_indices_connected<N, R, I>(indices: I, network: &mut N, rng: &mut R) -> usize
where
    N: PatternNetwork,
    R: Rng + ?Sized,
    I: IntoIterator<Item = usize>,
{
    let inputs = network.input_neurons();
    let mut added = 0;
    for index in indices {
        let Some(neuron) = network.output_neuron(index) else {
            debug!(index, outputs = network.output_count(), "output index beyond network");
            continue;
        };
        let driven = network.synapses().iter().any(|s| s.enabled && s.to == neuron);
        if driven {
            continue;
        }
        let Some(&from) = inputs.choose(rng) else {
            continue;
        };
        let magnitude = rng.gen_range(REPAIR_WEIGHT.0..=REPAIR_WEIGHT.1);
        let weight = if rng.gen_bool(0.5) { magnitude } else { -magnitude };
        network.add_synapse(from, neuron, weight);
        debug!(index, from, weight, "reconnected network output");
        added += 1;
    }
    added
}
