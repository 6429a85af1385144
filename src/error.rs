use thiserror::Error;

use crate::patch::{ConnectionId, NodeId};

/// Any failure surfaced by the crate's public pipeline.
#[derive(Debug, Error)]
pub enum GenomeError {
    #[error("Record error: {0}")]
    Record(#[from] RecordError),
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Evolution error: {0}")]
    Evolve(#[from] EvolveError),
}

/// A serialized patch or genome that cannot be reconstructed.
///
/// Malformed input is never partially recovered.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),
    #[error("duplicate connection id {0}")]
    DuplicateConnection(ConnectionId),
    #[error("connection {connection} references unknown node {node}")]
    UnknownNode { connection: ConnectionId, node: NodeId },
    #[error("connection {0} is a self loop")]
    SelfLoop(ConnectionId),
    #[error("expected exactly one output node with id {expected}, found {found}")]
    OutputNode { expected: NodeId, found: usize },
    #[error("node {node} has no parameter '{param}'")]
    UnknownParam { node: NodeId, param: String },
    #[error("nodes {a} and {b} are joined by more than one enabled connection")]
    DuplicatePair { a: NodeId, b: NodeId },
    #[error("enabled connection {0} closes a cycle")]
    Cycle(ConnectionId),
    #[error("graph key '{0}' cannot be decompiled")]
    UnknownGraphKey(String),
}

/// Failures while evaluating pattern-generator outputs.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("no pattern network available for {frequency} Hz")]
    MissingFrequencyNetwork { frequency: f64 },
    #[error("output index {index} out of range (network has {available} outputs)")]
    OutputOutOfRange { index: usize, available: usize },
    #[error("requested range {offset}..{end} exceeds {total} samples")]
    RangeOutOfBounds { offset: usize, end: usize, total: usize },
    #[error("kernel build failed: {0}")]
    Kernel(#[from] KernelError),
}

/// The batched backend could not flatten the network.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    #[error("network contains a cycle through neuron {0}")]
    Cycle(u64),
    #[error("connection references unknown neuron {0}")]
    UnknownNeuron(u64),
}

/// Failures while binding signals or executing a render graph.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render graph has a cycle without a delay through '{0}'")]
    Cycle(String),
    #[error("render graph references unknown node '{0}'")]
    UnknownNode(String),
    #[error("missing evaluated output for generator {0}")]
    MissingOutput(NodeId),
    #[error("invalid render request: {0}")]
    InvalidRequest(String),
}

/// The offspring loop gave up.
#[derive(Debug, Error)]
pub enum EvolveError {
    #[error("offspring rejected after {attempts} attempts")]
    Rejected { attempts: usize },
}
