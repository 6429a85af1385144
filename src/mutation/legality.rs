//! Legality table — which connections a mutation may create.
//!
//! [`check_kinds`] decides what a pair of node kinds allows on its own;
//! [`check`] adds the rules that depend on the rest of the patch (existing
//! connections, cycles). Both return the normalized target parameter: a
//! plain connection from a generator into a buffer-style node becomes a
//! connection to that node's `buffer`.

use thiserror::Error;

use crate::patch::schema::BUFFER;
use crate::patch::{NodeId, NodeKind, NodeType, Patch};

/// Why a connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Illegal {
    #[error("unknown node")]
    UnknownNode,
    #[error("self loop")]
    SelfLoop,
    #[error("generator-style nodes have no inputs")]
    GeneratorTarget,
    #[error("the output sink has no outputs")]
    SinkSource,
    #[error("additive nodes are fed through partial pairs only")]
    AdditiveReserved,
    #[error("plain generator output needs a buffer-style target")]
    GeneratorNeedsBuffer,
    #[error("oscillators take no signal input")]
    OscillatorInput,
    #[error("target has no signal input")]
    NoSignalInput,
    #[error("target has no such connectable parameter")]
    UnknownParam,
    #[error("buffer inputs accept generator-style sources only")]
    BufferNeedsGenerator,
    #[error("parameter already driven by a generator")]
    ParamTaken,
    #[error("nodes already connected")]
    AlreadyConnected,
    #[error("connection would close a cycle")]
    Cycle,
}

/// Rules that only depend on the two node kinds and the parameter.
pub fn check_kinds(
    source: &NodeKind,
    target: &NodeKind,
    param: Option<&str>,
) -> Result<Option<&'static str>, Illegal> {
    let s = source.node_type();
    let t = target.node_type();

    if t.is_generator() {
        return Err(Illegal::GeneratorTarget);
    }
    if s == NodeType::Output {
        return Err(Illegal::SinkSource);
    }
    if t == NodeType::Additive || s.is_partial() {
        return Err(Illegal::AdditiveReserved);
    }

    let param = match param {
        None if s.is_generator() => {
            if !matches!(t, NodeType::BufferSource | NodeType::Wavetable) {
                return Err(Illegal::GeneratorNeedsBuffer);
            }
            Some(BUFFER)
        }
        None => {
            if t.is_oscillator() {
                return Err(Illegal::OscillatorInput);
            }
            if !t.accepts_audio_input() {
                return Err(Illegal::NoSignalInput);
            }
            None
        }
        Some(name) => Some(name),
    };

    let Some(name) = param else {
        return Ok(None);
    };
    let spec = target.connectable_param(name).ok_or(Illegal::UnknownParam)?;
    if !s.is_generator() && (spec.is_buffer() || t.is_buffer_style()) {
        return Err(Illegal::BufferNeedsGenerator);
    }
    Ok(Some(spec.name))
}

/// Full legality of `source → target` (optionally into `param`) in `patch`.
pub fn check(
    patch: &Patch,
    source: NodeId,
    target: NodeId,
    param: Option<&str>,
) -> Result<Option<&'static str>, Illegal> {
    if source == target {
        return Err(Illegal::SelfLoop);
    }
    let s = patch.node(source).ok_or(Illegal::UnknownNode)?;
    let t = patch.node(target).ok_or(Illegal::UnknownNode)?;
    let param = check_kinds(&s.kind, &t.kind, param)?;

    clashes(patch, source, target, param)?;
    Ok(param)
}

/// The rules that depend on the connections already in `patch`: one enabled
/// connection per node pair, one generator per parameter (wavetable buffers
/// and partial pairs excepted), and no cycles. Node kinds are not consulted beyond that.
pub fn clashes(
    patch: &Patch,
    source: NodeId,
    target: NodeId,
    param: Option<&str>,
) -> Result<(), Illegal> {
    if patch.has_enabled_between(source, target) {
        return Err(Illegal::AlreadyConnected);
    }
    if let (Some(name), Some(s), Some(t)) = (param, patch.node(source), patch.node(target)) {
        let (s, t) = (s.node_type(), t.node_type());
        if s.is_generator()
            && !blends_many(t, name)
            && partial_param(s, t).is_none()
            && param_driven_by_generator(patch, target, name)
        {
            return Err(Illegal::ParamTaken);
        }
    }
    if patch.reaches(target, source) {
        return Err(Illegal::Cycle);
    }
    Ok(())
}

/// Partial-pair wiring: partial output → `partialBuffer`, partial envelope →
/// `partialGainEnvelope`, always into an additive node.
pub fn partial_param(source: NodeType, target: NodeType) -> Option<&'static str> {
    use crate::patch::schema::{PARTIAL_BUFFER, PARTIAL_GAIN_ENVELOPE};
    match (source, target) {
        (NodeType::PartialOutput, NodeType::Additive) => Some(PARTIAL_BUFFER),
        (NodeType::PartialEnvelope, NodeType::Additive) => Some(PARTIAL_GAIN_ENVELOPE),
        _ => None,
    }
}

/// Parameters that combine any number of generator sources.
pub fn blends_many(target: NodeType, param: &str) -> bool {
    target == NodeType::Wavetable && param == BUFFER
}

/// Whether an enabled connection from a generator-style node already drives
/// `target.param`.
pub fn param_driven_by_generator(patch: &Patch, target: NodeId, param: &str) -> bool {
    patch.incoming(target).any(|c| {
        c.param() == Some(param)
            && patch
                .node(c.source)
                .is_some_and(|n| n.node_type().is_generator())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorWeights;
    use crate::patch::schema::{CURVE, MIX};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn kind(t: NodeType) -> NodeKind {
        NodeKind::default_for(t)
    }

    #[test]
    fn generators_are_never_targets_and_sink_never_source() {
        let gain = kind(NodeType::Gain);
        for t in [NodeType::Generator, NodeType::NoteGenerator, NodeType::PartialOutput] {
            assert_eq!(check_kinds(&gain, &kind(t), None), Err(Illegal::GeneratorTarget));
        }
        assert_eq!(check_kinds(&kind(NodeType::Output), &gain, None), Err(Illegal::SinkSource));
    }

    #[test]
    fn plain_generator_output_is_normalized_to_buffer() {
        let generator = kind(NodeType::Generator);
        assert_eq!(check_kinds(&generator, &kind(NodeType::Wavetable), None), Ok(Some(BUFFER)));
        assert_eq!(check_kinds(&generator, &kind(NodeType::BufferSource), None), Ok(Some(BUFFER)));
        assert_eq!(
            check_kinds(&generator, &kind(NodeType::Gain), None),
            Err(Illegal::GeneratorNeedsBuffer)
        );
    }

    #[test]
    fn oscillators_take_parameters_only() {
        let gain = kind(NodeType::Gain);
        let osc = kind(NodeType::Oscillator);
        assert_eq!(check_kinds(&gain, &osc, None), Err(Illegal::OscillatorInput));
        assert_eq!(check_kinds(&gain, &osc, Some("frequency")), Ok(Some("frequency")));
        assert_eq!(check_kinds(&gain, &osc, Some("nope")), Err(Illegal::UnknownParam));
    }

    #[test]
    fn buffer_inputs_need_generators() {
        let filter = kind(NodeType::Filter);
        let generator = kind(NodeType::Generator);
        let shaper = kind(NodeType::WaveShaper);
        let table = kind(NodeType::Wavetable);
        assert_eq!(check_kinds(&filter, &shaper, Some(CURVE)), Err(Illegal::BufferNeedsGenerator));
        assert_eq!(check_kinds(&generator, &shaper, Some(CURVE)), Ok(Some(CURVE)));
        assert_eq!(check_kinds(&filter, &table, Some(MIX)), Err(Illegal::BufferNeedsGenerator));
        assert_eq!(check_kinds(&filter, &table, None), Err(Illegal::NoSignalInput));
    }

    #[test]
    fn additive_is_reserved_for_partials() {
        let additive = kind(NodeType::Additive);
        let partial = kind(NodeType::PartialOutput);
        assert_eq!(check_kinds(&partial, &additive, None), Err(Illegal::AdditiveReserved));
        assert_eq!(
            check_kinds(&partial, &kind(NodeType::Gain), None),
            Err(Illegal::AdditiveReserved)
        );
        assert_eq!(
            partial_param(NodeType::PartialEnvelope, NodeType::Additive),
            Some("partialGainEnvelope")
        );
    }

    #[test]
    fn patch_rules_block_duplicates_cycles_and_taken_params() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut patch = Patch::seeded(OperatorWeights::default(), &mut rng);
        let gain = patch
            .nodes
            .iter()
            .find(|n| n.node_type() == NodeType::Gain)
            .unwrap()
            .id;
        let filter = patch.add_node(kind(NodeType::Filter), &mut rng);
        let lfo = patch.add_node(kind(NodeType::Generator), &mut rng);
        let lfo2 = patch.add_node(kind(NodeType::Generator), &mut rng);

        assert_eq!(check(&patch, gain, NodeId::OUTPUT, None), Err(Illegal::AlreadyConnected));
        assert_eq!(check(&patch, gain, gain, None), Err(Illegal::SelfLoop));

        patch.connect(gain, filter, None, 1.0, &mut rng);
        assert_eq!(check(&patch, filter, gain, None), Err(Illegal::AlreadyConnected));
        let delay = patch.add_node(kind(NodeType::Delay), &mut rng);
        patch.connect(filter, delay, None, 1.0, &mut rng);
        assert_eq!(check(&patch, delay, gain, None), Err(Illegal::Cycle));

        assert_eq!(check(&patch, lfo, filter, Some("q")), Ok(Some("q")));
        patch.connect(lfo, filter, Some("q"), 1.0, &mut rng);
        assert_eq!(check(&patch, lfo2, filter, Some("q")), Err(Illegal::ParamTaken));
        assert_eq!(check(&patch, lfo2, filter, Some("frequency")), Ok(Some("frequency")));
    }

    #[test]
    fn wavetable_buffer_blends_many_generators() {
        let mut rng = StdRng::seed_from_u64(22);
        let mut patch = Patch::new();
        let table = patch.add_node(kind(NodeType::Wavetable), &mut rng);
        let a = patch.add_node(kind(NodeType::Generator), &mut rng);
        let b = patch.add_node(kind(NodeType::Generator), &mut rng);
        patch.connect(a, table, Some(BUFFER), 1.0, &mut rng);
        assert_eq!(check(&patch, b, table, None), Ok(Some(BUFFER)));
    }
}
