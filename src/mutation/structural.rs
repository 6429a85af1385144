//! Structural mutation — operators that grow and rewire a patch.
//!
//! Every operator collects its legal candidates first and samples once. An
//! operator with no candidate returns a no-op outcome; it never fails.

use std::collections::BTreeSet;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use tracing::debug;

use super::legality::{self, blends_many, check_kinds, param_driven_by_generator, partial_param};
use super::parameter::mutate_value;
use crate::config::{EvolutionConfig, OperatorWeights};
use crate::patch::node::{GeneratorParams, PartialEnvelopeParams, PartialParams};
use crate::patch::schema::{BUFFER, MIX};
use crate::patch::{
    Changed, Connection, GeneratorSource, MutationOutcome, NodeId, NodeKind, NodeType, NoiseKind,
    Patch, Rate,
};

// ── Operators ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Split,
    AddGenerator,
    AddBufferSource,
    AddPartial,
    AddConnection,
    MutateParameters,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Split,
        Operator::AddGenerator,
        Operator::AddBufferSource,
        Operator::AddPartial,
        Operator::AddConnection,
        Operator::MutateParameters,
    ];

    pub fn weight(self, weights: &OperatorWeights) -> f64 {
        match self {
            Operator::Split => weights.split,
            Operator::AddGenerator => weights.add_generator,
            Operator::AddBufferSource => weights.add_buffer_source,
            Operator::AddPartial => weights.add_partial,
            Operator::AddConnection => weights.add_connection,
            Operator::MutateParameters => weights.mutate_parameters,
        }
    }

    /// Weighted choice. Unusable weights (all zero, negative, NaN) fall back
    /// to parameter mutation.
    pub fn choose<R: Rng + ?Sized>(weights: &OperatorWeights, rng: &mut R) -> Operator {
        match WeightedIndex::new(Self::ALL.iter().map(|op| op.weight(weights))) {
            Ok(dist) => Self::ALL[dist.sample(rng)],
            Err(_) => Operator::MutateParameters,
        }
    }
}

/// Mutate `patch` in place: `1 + round(2 × distance)` rounds of weighted
/// operator choice. Each outcome is recorded on the patch.
pub fn mutate<R: Rng + ?Sized>(
    patch: &mut Patch,
    config: &EvolutionConfig,
    rng: &mut R,
) -> Vec<MutationOutcome> {
    let rounds = config.mutation_rounds();
    let mut outcomes = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        let op = Operator::choose(&patch.weights, rng);
        let outcome = apply(op, patch, config, rng);
        debug!(
            operator = ?op,
            changed = outcome.changed.len(),
            "{}",
            outcome.description
        );
        patch.record_mutation(outcome.clone());
        outcomes.push(outcome);
    }
    outcomes
}

pub fn apply<R: Rng + ?Sized>(
    op: Operator,
    patch: &mut Patch,
    config: &EvolutionConfig,
    rng: &mut R,
) -> MutationOutcome {
    match op {
        Operator::Split => split(patch, config, rng),
        Operator::AddGenerator => add_generator(patch, config, rng),
        Operator::AddBufferSource => add_buffer_source(patch, config, rng),
        Operator::AddPartial => add_partial(patch, config, rng),
        Operator::AddConnection => add_connection(patch, config, config.param_connections_only, rng),
        Operator::MutateParameters => mutate_parameters(patch, config, rng),
    }
}

// ── Split ───────────────────────────────────────────────────

/// Insert a new node into an enabled connection. The old connection is
/// disabled; the new in-edge has weight 1 and the out-edge inherits weight,
/// target parameter, schema and range.
pub fn split<R: Rng + ?Sized>(
    patch: &mut Patch,
    config: &EvolutionConfig,
    rng: &mut R,
) -> MutationOutcome {
    let mut candidates = Vec::new();
    for conn in patch.enabled_connections() {
        let (Some(source), Some(target)) = (patch.node(conn.source), patch.node(conn.target))
        else {
            continue;
        };
        let buffer_only = conn
            .param()
            .and_then(|p| target.kind.connectable_param(p))
            .is_some_and(|c| c.is_buffer());
        if buffer_only {
            continue;
        }
        for &node_type in NodeType::INSERTABLE {
            let inserted = NodeKind::default_for(node_type);
            let Ok(in_param) = check_kinds(&source.kind, &inserted, None) else {
                continue;
            };
            if check_kinds(&inserted, &target.kind, conn.param()).is_err() {
                continue;
            }
            candidates.push((conn.id, node_type, in_param));
        }
    }

    let Some(&(conn_id, node_type, in_param)) = candidates.choose(rng) else {
        return MutationOutcome::noop("split: no splittable connection");
    };
    let Some(old) = patch.connection(conn_id).cloned() else {
        return MutationOutcome::noop("split: connection vanished");
    };

    let node = patch.add_node(NodeKind::random(node_type, rng), rng);
    if let Some(c) = patch.connection_mut(conn_id) {
        c.enabled = false;
    }
    let inbound = patch.connect(old.source, node, in_param, 1.0, rng);
    let outbound = patch.fresh_connection_id(rng);
    patch.connections.push(Connection {
        id: outbound,
        source: node,
        target: old.target,
        enabled: true,
        ..old
    });

    let mut changed = vec![
        Changed::Connection(conn_id),
        Changed::Node(node),
        Changed::Connection(inbound),
        Changed::Connection(outbound),
    ];
    changed.extend(ensure_auxiliaries(patch, node, config, rng));
    MutationOutcome {
        changed,
        description: format!("split connection {conn_id} with {node_type:?} {node}"),
    }
}

// ── Generators ──────────────────────────────────────────────

fn random_source<R: Rng + ?Sized>(config: &EvolutionConfig, rng: &mut R) -> GeneratorSource {
    if rng.gen_bool(config.noise_probability.clamp(0.0, 1.0)) {
        let noise = [NoiseKind::White, NoiseKind::Pink, NoiseKind::Brown];
        GeneratorSource::Noise(noise[rng.gen_range(0..noise.len())])
    } else {
        GeneratorSource::Output(rng.gen_range(0..config.cppn.outputs.max(1)))
    }
}

fn generator_kind<R: Rng + ?Sized>(
    node_type: NodeType,
    rate: Rate,
    config: &EvolutionConfig,
    rng: &mut R,
) -> NodeKind {
    let source = random_source(config, rng);
    let mut kind = match node_type {
        NodeType::Generator => NodeKind::Generator(GeneratorParams {
            source,
            rate,
            frequency: 0.0,
        }),
        _ => NodeKind::default_for(node_type),
    };
    kind.set_generator_source(source);
    kind.randomize(rng);
    kind
}

fn add_generator_node<R: Rng + ?Sized>(
    patch: &mut Patch,
    rate: Rate,
    config: &EvolutionConfig,
    rng: &mut R,
) -> NodeId {
    let kind = generator_kind(NodeType::Generator, rate, config, rng);
    patch.add_node(kind, rng)
}

/// Add a control- or audio-rate generator driving a free connectable
/// parameter. Only audio-rate generators may fill buffer inputs.
pub fn add_generator<R: Rng + ?Sized>(
    patch: &mut Patch,
    config: &EvolutionConfig,
    rng: &mut R,
) -> MutationOutcome {
    let (node_type, rate) = if rng.gen_bool(0.5) {
        (NodeType::Generator, Rate::Control)
    } else if rng.gen_bool(0.5) {
        (NodeType::NoteGenerator, Rate::Audio)
    } else {
        (NodeType::Generator, Rate::Audio)
    };
    let kind = generator_kind(node_type, rate, config, rng);

    let mut candidates = Vec::new();
    for node in &patch.nodes {
        for input in node.kind.connectable() {
            if input.is_buffer() && rate == Rate::Control {
                continue;
            }
            if check_kinds(&kind, &node.kind, Some(input.name)).is_err() {
                continue;
            }
            if !blends_many(node.node_type(), input.name)
                && param_driven_by_generator(patch, node.id, input.name)
            {
                continue;
            }
            candidates.push((node.id, input.name));
        }
    }

    let Some(&(target, param)) = candidates.choose(rng) else {
        return MutationOutcome::noop("add generator: no free input");
    };
    let generator = patch.add_node(kind, rng);
    let conn = patch.connect(generator, target, Some(param), 1.0, rng);
    let mut changed = vec![Changed::Node(generator), Changed::Connection(conn)];
    changed.extend(ensure_auxiliaries(patch, target, config, rng));
    MutationOutcome {
        changed,
        description: format!("add {rate:?} {node_type:?} {generator} -> {target}.{param}"),
    }
}

/// Wire the inputs a node cannot work without: a wavetable's blend control
/// and a convolver's impulse response.
fn ensure_auxiliaries<R: Rng + ?Sized>(
    patch: &mut Patch,
    node: NodeId,
    config: &EvolutionConfig,
    rng: &mut R,
) -> Vec<Changed> {
    let Some(node_type) = patch.node(node).map(|n| n.node_type()) else {
        return Vec::new();
    };
    let (param, rate) = match node_type {
        NodeType::Wavetable => (MIX, Rate::Control),
        NodeType::Convolver => (BUFFER, Rate::Audio),
        _ => return Vec::new(),
    };
    if patch.incoming(node).any(|c| c.param() == Some(param)) {
        return Vec::new();
    }
    let generator = add_generator_node(patch, rate, config, rng);
    let conn = patch.connect(generator, node, Some(param), 1.0, rng);
    vec![Changed::Node(generator), Changed::Connection(conn)]
}

// ── Buffer sources ──────────────────────────────────────────

/// Add a buffer-style node fed by fresh generators and route it into a
/// node that accepts audio input.
pub fn add_buffer_source<R: Rng + ?Sized>(
    patch: &mut Patch,
    config: &EvolutionConfig,
    rng: &mut R,
) -> MutationOutcome {
    const KINDS: [(NodeType, f64); 3] = [
        (NodeType::BufferSource, 0.5),
        (NodeType::Wavetable, 0.3),
        (NodeType::Additive, 0.2),
    ];
    let targets: Vec<NodeId> = patch
        .nodes
        .iter()
        .filter(|n| n.node_type().accepts_audio_input())
        .map(|n| n.id)
        .collect();
    let Some(&target) = targets.choose(rng) else {
        return MutationOutcome::noop("add buffer source: no audio input");
    };
    let node_type = match WeightedIndex::new(KINDS.iter().map(|(_, w)| *w)) {
        Ok(dist) => KINDS[dist.sample(rng)].0,
        Err(_) => NodeType::BufferSource,
    };

    let node = patch.add_node(NodeKind::random(node_type, rng), rng);
    let mut changed = vec![Changed::Node(node)];
    match node_type {
        NodeType::Additive => changed.extend(add_partial_pair(patch, node, 1, config, rng)),
        _ => {
            let sources = if node_type == NodeType::Wavetable { 2 } else { 1 };
            for _ in 0..sources {
                let generator = add_generator_node(patch, Rate::Audio, config, rng);
                let conn = patch.connect(generator, node, Some(BUFFER), 1.0, rng);
                changed.extend([Changed::Node(generator), Changed::Connection(conn)]);
            }
            changed.extend(ensure_auxiliaries(patch, node, config, rng));
        }
    }
    let out = patch.connect(node, target, None, 1.0, rng);
    changed.push(Changed::Connection(out));
    MutationOutcome {
        changed,
        description: format!("add {node_type:?} {node} -> {target}"),
    }
}

// ── Partials ────────────────────────────────────────────────

fn add_partial_pair<R: Rng + ?Sized>(
    patch: &mut Patch,
    additive: NodeId,
    partial: u32,
    config: &EvolutionConfig,
    rng: &mut R,
) -> Vec<Changed> {
    let mut output = NodeKind::PartialOutput(PartialParams {
        source: random_source(config, rng),
        partial,
    });
    output.randomize(rng);
    let mut envelope = NodeKind::PartialEnvelope(PartialEnvelopeParams {
        source: random_source(config, rng),
        partial,
        frequency: 1.0,
    });
    envelope.randomize(rng);

    let mut changed = Vec::new();
    for kind in [output, envelope] {
        let Some(param) = partial_param(kind.node_type(), NodeType::Additive) else {
            continue;
        };
        let node = patch.add_node(kind, rng);
        let conn = patch.connect(node, additive, Some(param), 1.0, rng);
        changed.extend([Changed::Node(node), Changed::Connection(conn)]);
    }
    changed
}

/// Add the next partial (content plus gain envelope) to an additive node.
pub fn add_partial<R: Rng + ?Sized>(
    patch: &mut Patch,
    config: &EvolutionConfig,
    rng: &mut R,
) -> MutationOutcome {
    let additives: Vec<NodeId> = patch
        .nodes
        .iter()
        .filter(|n| n.node_type() == NodeType::Additive)
        .map(|n| n.id)
        .collect();
    let Some(&additive) = additives.choose(rng) else {
        return MutationOutcome::noop("add partial: no additive node");
    };
    let next = patch
        .incoming(additive)
        .filter_map(|c| patch.node(c.source).and_then(|n| n.kind.partial()))
        .max()
        .unwrap_or(0)
        + 1;
    let changed = add_partial_pair(patch, additive, next, config, rng);
    MutationOutcome {
        changed,
        description: format!("add partial {next} to {additive}"),
    }
}

// ── Connections ─────────────────────────────────────────────

/// Every connection the legality table allows and the patch lacks.
pub fn legal_connections(
    patch: &Patch,
    param_only: bool,
) -> BTreeSet<(NodeId, NodeId, Option<&'static str>)> {
    let mut out = BTreeSet::new();
    for source in &patch.nodes {
        for target in &patch.nodes {
            let params = std::iter::once(None)
                .chain(target.kind.connectable().iter().map(|c| Some(c.name)));
            for param in params {
                if let Ok(normalized) = legality::check(patch, source.id, target.id, param) {
                    if param_only && normalized.is_none() {
                        continue;
                    }
                    out.insert((source.id, target.id, normalized));
                }
            }
        }
    }
    out
}

/// Add one uniformly chosen legal connection.
pub fn add_connection<R: Rng + ?Sized>(
    patch: &mut Patch,
    config: &EvolutionConfig,
    param_only: bool,
    rng: &mut R,
) -> MutationOutcome {
    let candidates: Vec<_> = legal_connections(patch, param_only).into_iter().collect();
    let Some(&(source, target, param)) = candidates.choose(rng) else {
        return MutationOutcome::noop("add connection: no legal connection");
    };
    let from_generator = patch
        .node(source)
        .is_some_and(|n| n.node_type().is_generator());
    let id = patch.connect(source, target, param, 1.0, rng);
    if !from_generator {
        if let Some(conn) = patch.connection_mut(id) {
            conn.weight = super::parameter::random_value(&conn.schema, rng);
        }
    }
    let mut changed = vec![Changed::Connection(id)];
    changed.extend(ensure_auxiliaries(patch, target, config, rng));
    let param = param.unwrap_or("input");
    MutationOutcome {
        changed,
        description: format!("connect {source} -> {target}.{param}"),
    }
}

// ── Parameters ──────────────────────────────────────────────

fn perturb_node<R: Rng + ?Sized>(kind: &mut NodeKind, distance: f64, rng: &mut R) -> bool {
    let Some(spec) = kind.mutatable().choose(rng) else {
        return false;
    };
    let Some(value) = kind.get_param(spec.name) else {
        return false;
    };
    kind.set_param(spec.name, mutate_value(value, &spec.schema, distance, rng))
}

/// Perturb connection weights and node parameters with independent
/// probabilities; if nothing was chosen, perturb one element.
pub fn mutate_parameters<R: Rng + ?Sized>(
    patch: &mut Patch,
    config: &EvolutionConfig,
    rng: &mut R,
) -> MutationOutcome {
    let distance = config.mutation_distance;
    let mut changed = Vec::new();

    for conn in patch.connections.iter_mut().filter(|c| c.enabled) {
        if rng.gen_bool(config.connection_mutation_rate.clamp(0.0, 1.0)) {
            conn.weight = mutate_value(conn.weight, &conn.schema, distance, rng);
            changed.push(Changed::Connection(conn.id));
        }
    }
    for node in patch.nodes.iter_mut() {
        if node.kind.mutatable().is_empty() {
            continue;
        }
        if rng.gen_bool(config.node_mutation_rate.clamp(0.0, 1.0))
            && perturb_node(&mut node.kind, distance, rng)
        {
            changed.push(Changed::Node(node.id));
        }
    }

    if changed.is_empty() {
        let elements: Vec<Changed> = patch
            .enabled_connections()
            .map(|c| Changed::Connection(c.id))
            .chain(
                patch
                    .nodes
                    .iter()
                    .filter(|n| !n.kind.mutatable().is_empty())
                    .map(|n| Changed::Node(n.id)),
            )
            .collect();
        match elements.choose(rng) {
            Some(&Changed::Connection(id)) => {
                if let Some(conn) = patch.connection_mut(id) {
                    conn.weight = mutate_value(conn.weight, &conn.schema, distance, rng);
                    changed.push(Changed::Connection(id));
                }
            }
            Some(&Changed::Node(id)) => {
                if let Some(node) = patch.node_mut(id) {
                    if perturb_node(&mut node.kind, distance, rng) {
                        changed.push(Changed::Node(id));
                    }
                }
            }
            None => return MutationOutcome::noop("mutate parameters: nothing to mutate"),
        }
    }

    MutationOutcome {
        description: format!("mutate {} parameters", changed.len()),
        changed,
    }
}
