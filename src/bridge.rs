//! Representation bridge — compiles a patch into the keyed graph description
//! consumed by the signal compiler, and back.
//!
//! Graph keys are the node id in decimal (`"0"` is the sink) and `"w<id>"`
//! for the gain node that carries a connection's weight. Generator-style
//! nodes do not appear as graph nodes: their connections become
//! [`NetworkOutput`] entries that the orchestrator evaluates and the signal
//! compiler binds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::OperatorWeights;
use crate::dsp::pitch::{midi_to_frequency, transpose_semitones};
use crate::error::RecordError;
use crate::mutation::legality::blends_many;
use crate::patch::schema::{PARTIAL_BUFFER, PARTIAL_GAIN_ENVELOPE};
use crate::patch::{
    Connection, ConnectionId, GeneratorSource, MutationHistory, Node, NodeId, NodeKind, Patch,
    Rate,
};

// ── Keys ────────────────────────────────────────────────────

pub fn node_key(id: NodeId) -> String {
    id.to_string()
}

pub fn weight_key(id: ConnectionId) -> String {
    format!("w{id}")
}

fn parse_node_key(key: &str) -> Result<NodeId, RecordError> {
    key.parse::<u64>()
        .map(NodeId)
        .map_err(|_| RecordError::UnknownGraphKey(key.to_string()))
}

// ── Graph description ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphNodeKind {
    /// A patch node, carried with its parameters.
    Node(NodeKind),
    /// Gain node realizing the weight of the wrapped connection.
    WeightGain(Connection),
}

/// An edge end: a graph key plus, for modulation, the parameter it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphTarget {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// The patch connection this edge realizes directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<Connection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub kind: GraphNodeKind,
    pub outputs: Vec<GraphTarget>,
}

/// A generator's signal bound to a target input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOutput {
    pub generator: NodeId,
    pub source: GeneratorSource,
    /// Frequency at which the network is evaluated, after transposition.
    pub frequency: f64,
    /// Audio-rate content (faded at the edges) rather than a control signal.
    pub audio_rate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<u32>,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    pub connection: Connection,
}

/// Several network outputs competing for one input, by index into
/// [`AudioGraph::network_outputs`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanIn {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    pub outputs: Vec<usize>,
}

/// The compiled description of one patch at one note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioGraph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub network_outputs: Vec<NetworkOutput>,
    pub fan_in: Vec<FanIn>,
    /// Generator-style nodes, kept so the topology can be restored.
    pub generators: Vec<Node>,
    /// Disabled connections, kept for the same reason.
    pub disabled: Vec<Connection>,
    pub note_delta: i32,
    pub generation: u64,
    pub history: MutationHistory,
    pub weights: OperatorWeights,
}

impl AudioGraph {
    pub fn node(&self, key: &str) -> Option<&GraphNode> {
        self.nodes.get(key)
    }

    /// Network outputs bound to `target` (optionally a specific parameter).
    pub fn outputs_into<'a>(
        &'a self,
        target: &'a str,
        param: Option<&'a str>,
    ) -> impl Iterator<Item = &'a NetworkOutput> + 'a {
        self.network_outputs
            .iter()
            .filter(move |o| o.target == target && o.param.as_deref() == param)
    }
}

// ── Compile ─────────────────────────────────────────────────

/// Frequency a generator is evaluated at for this connection.
fn generator_frequency(patch: &Patch, node: &Node, conn: &Connection, note_delta: i32) -> f64 {
    match &node.kind {
        NodeKind::Generator(p) => p.frequency,
        NodeKind::NoteGenerator(p) => transpose_semitones(midi_to_frequency(p.note), note_delta),
        NodeKind::PartialOutput(p) => {
            let fundamental = patch
                .node(conn.target)
                .and_then(|n| n.kind.base_frequency())
                .unwrap_or(0.0);
            transpose_semitones(fundamental, note_delta) * p.partial as f64
        }
        NodeKind::PartialEnvelope(p) => p.frequency,
        _ => 0.0,
    }
}

fn is_audio_rate(kind: &NodeKind) -> bool {
    match kind {
        NodeKind::Generator(p) => p.rate == Rate::Audio,
        NodeKind::NoteGenerator(_) | NodeKind::PartialOutput(_) => true,
        _ => false,
    }
}

/// Compile `patch` for a note `note_delta` semitones from its own pitch.
///
/// A weighted connection becomes a gain node in front of its target, except
/// when the target is the output sink: the sink sums its inputs at unit gain
/// and the weights of connections into it are not applied.
pub fn compile(patch: &Patch, note_delta: i32) -> AudioGraph {
    let mut graph = AudioGraph {
        nodes: BTreeMap::new(),
        network_outputs: Vec::new(),
        fan_in: Vec::new(),
        generators: Vec::new(),
        disabled: Vec::new(),
        note_delta,
        generation: patch.generation,
        history: patch.history.clone(),
        weights: patch.weights.clone(),
    };

    for node in &patch.nodes {
        if node.node_type().is_generator() {
            graph.generators.push(node.clone());
        } else {
            graph.nodes.insert(
                node_key(node.id),
                GraphNode {
                    kind: GraphNodeKind::Node(node.kind.clone()),
                    outputs: Vec::new(),
                },
            );
        }
    }

    for conn in &patch.connections {
        if !conn.enabled {
            graph.disabled.push(conn.clone());
            continue;
        }
        let Some(source) = patch.node(conn.source) else {
            continue;
        };
        let target_key = node_key(conn.target);

        if let Some(generator) = source.kind.generator_source() {
            graph.network_outputs.push(NetworkOutput {
                generator: source.id,
                source: generator,
                frequency: generator_frequency(patch, source, conn, note_delta),
                audio_rate: is_audio_rate(&source.kind),
                partial: source.kind.partial(),
                target: target_key,
                param: conn.target_param.clone(),
                range: conn.range,
                connection: conn.clone(),
            });
            continue;
        }

        let edge = if conn.target != NodeId::OUTPUT && conn.weight != 1.0 {
            let key = weight_key(conn.id);
            graph.nodes.insert(
                key.clone(),
                GraphNode {
                    kind: GraphNodeKind::WeightGain(conn.clone()),
                    outputs: vec![GraphTarget {
                        key: target_key,
                        param: conn.target_param.clone(),
                        connection: None,
                    }],
                },
            );
            GraphTarget {
                key,
                param: None,
                connection: None,
            }
        } else {
            GraphTarget {
                key: target_key,
                param: conn.target_param.clone(),
                connection: Some(conn.clone()),
            }
        };
        if let Some(node) = graph.nodes.get_mut(&node_key(conn.source)) {
            node.outputs.push(edge);
        }
    }

    graph.fan_in = collect_fan_in(&graph);
    graph
}

fn collect_fan_in(graph: &AudioGraph) -> Vec<FanIn> {
    let mut groups: BTreeMap<(String, Option<String>), Vec<usize>> = BTreeMap::new();
    for (i, out) in graph.network_outputs.iter().enumerate() {
        groups
            .entry((out.target.clone(), out.param.clone()))
            .or_default()
            .push(i);
    }
    groups
        .into_iter()
        .filter(|(_, outputs)| outputs.len() > 1)
        .filter(|((target, param), _)| {
            let Some(param) = param.as_deref() else {
                return true;
            };
            let blended = graph.node(target).is_some_and(|n| match &n.kind {
                GraphNodeKind::Node(kind) => blends_many(kind.node_type(), param),
                GraphNodeKind::WeightGain(_) => false,
            });
            !blended && param != PARTIAL_BUFFER && param != PARTIAL_GAIN_ENVELOPE
        })
        .map(|((target, param), outputs)| FanIn {
            target,
            param,
            outputs,
        })
        .collect()
}

// ── Decompile ───────────────────────────────────────────────

/// Rebuild the patch a graph was compiled from. Weight gains collapse back
/// into connection weights; generators and disabled connections are
/// restored from the side lists.
pub fn decompile(graph: &AudioGraph) -> Result<Patch, RecordError> {
    let mut nodes = Vec::new();
    let mut connections = Vec::new();

    for (key, node) in &graph.nodes {
        match &node.kind {
            GraphNodeKind::Node(kind) => nodes.push(Node::new(parse_node_key(key)?, kind.clone())),
            GraphNodeKind::WeightGain(conn) => {
                if *key != weight_key(conn.id) {
                    return Err(RecordError::UnknownGraphKey(key.clone()));
                }
                connections.push(conn.clone());
            }
        }
        connections.extend(node.outputs.iter().filter_map(|t| t.connection.clone()));
    }
    nodes.extend(graph.generators.iter().cloned());
    connections.extend(graph.network_outputs.iter().map(|o| o.connection.clone()));
    connections.extend(graph.disabled.iter().cloned());

    nodes.sort_by_key(|n| n.id);
    connections.sort_by_key(|c| c.id);

    let patch = Patch {
        nodes,
        connections,
        generation: graph.generation,
        history: graph.history.clone(),
        weights: graph.weights.clone(),
        last_mutation: None,
    };
    patch.validate()?;
    Ok(patch)
}
