//! Graph genome — the evolvable DSP routing topology.
//!
//! A [`Patch`] is an arena of typed nodes plus weighted connections referring
//! to nodes by id. Mutation operators edit it in place; the bridge compiles it
//! into an engine description.

pub mod connection;
pub mod node;
pub mod record;
pub mod schema;

use std::collections::{BTreeSet, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

pub use connection::{Connection, ConnectionId};
pub use node::{GeneratorSource, Node, NodeId, NodeKind, NodeType, NoiseKind, Rate};
pub use record::PatchRecord;

use crate::config::OperatorWeights;
use crate::error::RecordError;
use schema::MutationSchema;

/// Entries kept in a patch's mutation history before it collapses to
/// [`MutationHistory::Truncated`].
pub const HISTORY_CAP: usize = 1000;

/// Fresh ids stay below 2^53 so they survive a trip through a JavaScript
/// number.
pub const MAX_ID: u64 = 1 << 53;

// ── Mutation history ────────────────────────────────────────

/// Append-only log of mutation descriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationHistory {
    Entries(Vec<String>),
    /// The log grew past [`HISTORY_CAP`] and is no longer tracked.
    Truncated,
}

impl Default for MutationHistory {
    fn default() -> Self {
        MutationHistory::Entries(Vec::new())
    }
}

impl MutationHistory {
    pub fn push(&mut self, entry: String) {
        if let MutationHistory::Entries(entries) = self {
            if entries.len() >= HISTORY_CAP {
                *self = MutationHistory::Truncated;
            } else {
                entries.push(entry);
            }
        }
    }

    /// Concatenate two histories, as crossover does.
    pub fn merged(&self, other: &MutationHistory) -> MutationHistory {
        let mut out = self.clone();
        if let MutationHistory::Entries(entries) = other {
            for e in entries {
                out.push(e.clone());
            }
        } else {
            out = MutationHistory::Truncated;
        }
        out
    }

    pub fn entries(&self) -> Option<&[String]> {
        match self {
            MutationHistory::Entries(e) => Some(e),
            MutationHistory::Truncated => None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, MutationHistory::Truncated)
    }
}

// ── Mutation outcomes ───────────────────────────────────────

/// An element touched by a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Changed {
    Node(NodeId),
    Connection(ConnectionId),
}

/// What a single mutation operator did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub changed: Vec<Changed>,
    pub description: String,
}

impl MutationOutcome {
    /// An operator that found nothing legal to do.
    pub fn noop(description: impl Into<String>) -> Self {
        MutationOutcome {
            changed: Vec::new(),
            description: description.into(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

// ── Patch ───────────────────────────────────────────────────

/// The graph genome.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    pub generation: u64,
    pub history: MutationHistory,
    pub weights: OperatorWeights,
    pub last_mutation: Option<MutationOutcome>,
}

impl Default for Patch {
    fn default() -> Self {
        Self::new()
    }
}

impl Patch {
    /// A patch containing only the output sink.
    pub fn new() -> Self {
        Patch {
            nodes: vec![Node::new(NodeId::OUTPUT, NodeKind::Output)],
            connections: Vec::new(),
            generation: 0,
            history: MutationHistory::default(),
            weights: OperatorWeights::default(),
            last_mutation: None,
        }
    }

    /// The minimal audible patch: note generator (network output 0, A4)
    /// → gain(1.0) → output.
    pub fn seeded<R: Rng + ?Sized>(weights: OperatorWeights, rng: &mut R) -> Self {
        let mut patch = Patch::new();
        patch.weights = weights;
        let generator = patch.add_node(NodeKind::default_for(NodeType::NoteGenerator), rng);
        let gain = patch.add_node(NodeKind::default_for(NodeType::Gain), rng);
        patch.connect(generator, gain, None, 1.0, rng);
        patch.connect(gain, NodeId::OUTPUT, None, 1.0, rng);
        patch
    }

    // ── Lookup ──

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.id == id)
    }

    pub fn enabled_connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(|c| c.enabled)
    }

    /// Enabled connections arriving at `id`.
    pub fn incoming(&self, id: NodeId) -> impl Iterator<Item = &Connection> {
        self.enabled_connections().filter(move |c| c.target == id)
    }

    /// Enabled connections leaving `id`.
    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &Connection> {
        self.enabled_connections().filter(move |c| c.source == id)
    }

    /// Whether an enabled connection joins `a` and `b` in either direction.
    pub fn has_enabled_between(&self, a: NodeId, b: NodeId) -> bool {
        self.enabled_connections().any(|c| c.joins(a, b))
    }

    /// Whether `to` is reachable from `from` along enabled connections.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.outgoing(id).map(|c| c.target));
        }
        false
    }

    /// Network output indices referenced by generator-style nodes.
    pub fn output_indices(&self) -> BTreeSet<usize> {
        self.nodes
            .iter()
            .filter_map(|n| n.kind.generator_source())
            .filter_map(|s| s.output_index())
            .collect()
    }

    // ── Editing ──

    /// A random node id not yet used in this patch (never the sink id).
    pub fn fresh_node_id<R: Rng + ?Sized>(&self, rng: &mut R) -> NodeId {
        loop {
            let id = NodeId(rng.gen_range(1..MAX_ID));
            if self.node(id).is_none() {
                return id;
            }
        }
    }

    pub fn fresh_connection_id<R: Rng + ?Sized>(&self, rng: &mut R) -> ConnectionId {
        loop {
            let id = ConnectionId(rng.gen_range(1..MAX_ID));
            if self.connection(id).is_none() {
                return id;
            }
        }
    }

    pub fn add_node<R: Rng + ?Sized>(&mut self, kind: NodeKind, rng: &mut R) -> NodeId {
        let id = self.fresh_node_id(rng);
        self.nodes.push(Node::new(id, kind));
        id
    }

    /// Add an enabled connection. A parameter-targeting connection copies the
    /// target parameter's mutation schema and legal range. Legality is the
    /// caller's concern.
    pub fn connect<R: Rng + ?Sized>(
        &mut self,
        source: NodeId,
        target: NodeId,
        param: Option<&str>,
        weight: f64,
        rng: &mut R,
    ) -> ConnectionId {
        let id = self.fresh_connection_id(rng);
        let mut conn = Connection::new(id, source, target, weight);
        if let Some(name) = param {
            let target_kind = self.node(target).map(|n| &n.kind);
            conn.target_param = Some(name.to_string());
            conn.range = target_kind
                .and_then(|k| k.connectable_param(name))
                .and_then(|c| c.range);
            conn.schema = target_kind
                .and_then(|k| k.mutatable_param(name))
                .map(|p| p.schema)
                .unwrap_or(MutationSchema::WEIGHT);
        }
        self.connections.push(conn);
        id
    }

    /// Log a mutation: append its description and remember it as the latest.
    pub fn record_mutation(&mut self, outcome: MutationOutcome) {
        self.history.push(outcome.description.clone());
        self.last_mutation = Some(outcome);
    }

    // ── Validation ──

    /// Check the structural invariants: unique ids, exactly one sink with the
    /// reserved id, connection endpoints exist, no self loops, and every
    /// parameter-targeting connection names a connectable parameter. Among
    /// enabled connections, each node pair is joined at most once and no
    /// path leads back to where it started.
    pub fn validate(&self) -> Result<(), RecordError> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(RecordError::DuplicateNode(node.id));
            }
        }
        let outputs: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| n.node_type() == NodeType::Output)
            .collect();
        if outputs.len() != 1 || outputs[0].id != NodeId::OUTPUT {
            return Err(RecordError::OutputNode {
                expected: NodeId::OUTPUT,
                found: outputs.len(),
            });
        }

        let mut conn_ids = HashSet::new();
        for conn in &self.connections {
            if !conn_ids.insert(conn.id) {
                return Err(RecordError::DuplicateConnection(conn.id));
            }
            if conn.source == conn.target {
                return Err(RecordError::SelfLoop(conn.id));
            }
            for end in [conn.source, conn.target] {
                if !ids.contains(&end) {
                    return Err(RecordError::UnknownNode {
                        connection: conn.id,
                        node: end,
                    });
                }
            }
            if let Some(param) = conn.param() {
                let known = self
                    .node(conn.target)
                    .is_some_and(|n| n.kind.connectable_param(param).is_some());
                if !known {
                    return Err(RecordError::UnknownParam {
                        node: conn.target,
                        param: param.to_string(),
                    });
                }
            }
        }

        let mut pairs = HashSet::new();
        for conn in self.enabled_connections() {
            let pair = (conn.source.min(conn.target), conn.source.max(conn.target));
            if !pairs.insert(pair) {
                return Err(RecordError::DuplicatePair {
                    a: pair.0,
                    b: pair.1,
                });
            }
            if self.reaches(conn.target, conn.source) {
                return Err(RecordError::Cycle(conn.id));
            }
        }
        Ok(())
    }

    // ── Serialization ──

    pub fn to_json(&self) -> Result<String, RecordError> {
        PatchRecord::from(self).to_json()
    }

    pub fn from_json(json: &str) -> Result<Patch, RecordError> {
        PatchRecord::from_json(json)?.into_patch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn new_patch_has_only_the_sink() {
        let patch = Patch::new();
        assert_eq!(patch.nodes.len(), 1);
        assert_eq!(patch.nodes[0].id, NodeId::OUTPUT);
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn seeded_patch_is_a_three_node_chain() {
        let mut rng = StdRng::seed_from_u64(1);
        let patch = Patch::seeded(OperatorWeights::default(), &mut rng);
        assert_eq!(patch.nodes.len(), 3);
        assert_eq!(patch.connections.len(), 2);
        assert!(patch.validate().is_ok());
        let generator = patch
            .nodes
            .iter()
            .find(|n| n.node_type() == NodeType::NoteGenerator)
            .unwrap();
        assert!(patch.reaches(generator.id, NodeId::OUTPUT));
        assert!(!patch.reaches(NodeId::OUTPUT, generator.id));
        assert_eq!(patch.output_indices().into_iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn param_connection_copies_schema_and_range() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut patch = Patch::new();
        let filter = patch.add_node(NodeKind::default_for(NodeType::Filter), &mut rng);
        let generator = patch.add_node(NodeKind::default_for(NodeType::Generator), &mut rng);
        let id = patch.connect(generator, filter, Some("q"), 1.0, &mut rng);
        let conn = patch.connection(id).unwrap();
        assert_eq!(conn.range, Some([0.1, 20.0]));
        assert_eq!(conn.schema.clamp, Some([0.1, 20.0]));
    }

    #[test]
    fn history_truncates_past_cap() {
        let mut history = MutationHistory::default();
        for i in 0..HISTORY_CAP {
            history.push(format!("m{i}"));
        }
        assert_eq!(history.entries().unwrap().len(), HISTORY_CAP);
        history.push("one more".into());
        assert!(history.is_truncated());
        history.push("ignored".into());
        assert!(history.is_truncated());
    }

    #[test]
    fn validate_rejects_broken_structure() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut patch = Patch::seeded(OperatorWeights::default(), &mut rng);
        let mut dangling = patch.clone();
        dangling.connections[0].target = NodeId(12345);
        assert!(matches!(dangling.validate(), Err(RecordError::UnknownNode { .. })));

        let mut looped = patch.clone();
        looped.connections[0].target = looped.connections[0].source;
        assert!(matches!(looped.validate(), Err(RecordError::SelfLoop(_))));

        patch.nodes.retain(|n| n.id != NodeId::OUTPUT);
        assert!(matches!(patch.validate(), Err(RecordError::OutputNode { found: 0, .. })));
    }

    #[test]
    fn validate_rejects_doubled_pairs_and_cycles() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut patch = Patch::new();
        let x = patch.add_node(NodeKind::default_for(NodeType::Gain), &mut rng);
        let y = patch.add_node(NodeKind::default_for(NodeType::Gain), &mut rng);
        patch.connect(x, y, None, 1.0, &mut rng);
        patch.connect(y, NodeId::OUTPUT, None, 1.0, &mut rng);
        assert!(patch.validate().is_ok());

        let mut doubled = patch.clone();
        let again = doubled.connect(x, y, Some("gain"), 1.0, &mut rng);
        assert!(matches!(doubled.validate(), Err(RecordError::DuplicatePair { .. })));
        doubled.connection_mut(again).unwrap().enabled = false;
        assert!(doubled.validate().is_ok());

        let z = patch.add_node(NodeKind::default_for(NodeType::Gain), &mut rng);
        patch.connect(y, z, None, 1.0, &mut rng);
        patch.connect(z, x, None, 1.0, &mut rng);
        assert!(matches!(patch.validate(), Err(RecordError::Cycle(_))));
    }

    #[test]
    fn fresh_ids_fit_in_a_javascript_number() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut patch = Patch::new();
        for _ in 0..1000 {
            let node = patch.add_node(NodeKind::default_for(NodeType::Gain), &mut rng);
            let conn = patch.connect(node, NodeId::OUTPUT, None, 1.0, &mut rng);
            assert!(node.0 > 0 && node.0 < MAX_ID);
            assert!(conn.0 > 0 && conn.0 < MAX_ID);
        }
    }
}
