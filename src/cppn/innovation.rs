//! Hash-based innovation numbers.
//!
//! A synapse's innovation is a hash of its endpoints and a split neuron's id
//! is a hash of the synapse it replaced, so the same structural change gets
//! the same number in every lineage without a shared counter.

const SPLIT_MARKER: u64 = 0x5350_4c49_545f_4e45;
/// Hidden neuron ids have the top bit set so they never collide with the
/// small sequential ids of inputs and outputs.
const HIDDEN_BIT: u64 = 1 << 63;

#[inline]
fn mix(mut x: u64) -> u64 {
    // splitmix64 finalizer
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

pub fn connection_innovation(from: u64, to: u64) -> u64 {
    mix(mix(from) ^ to.rotate_left(32))
}

/// Id of the hidden neuron created by splitting synapse `innovation`.
pub fn split_neuron_id(innovation: u64) -> u64 {
    mix(innovation ^ SPLIT_MARKER) | HIDDEN_BIT
}
