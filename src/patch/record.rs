//! Serialized patch record — the JSON form of a graph genome.
//!
//! Node records are `{ "id": .., "type": "..", ..fields }`; connection records
//! carry `source`, `target`, optional `targetParam`, `weight`, `enabled` and
//! the weight schema. Reconstruction validates the graph and fails hard on
//! malformed input.

use serde::{Deserialize, Serialize};

use super::{Connection, MutationHistory, Node, Patch};
use crate::config::OperatorWeights;
use crate::error::RecordError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRecord {
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub history: MutationHistory,
    #[serde(default)]
    pub operator_weights: OperatorWeights,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

impl PatchRecord {
    pub fn to_json(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<PatchRecord, RecordError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Rebuild the patch, checking every structural invariant.
    pub fn into_patch(self) -> Result<Patch, RecordError> {
        let patch = Patch {
            nodes: self.nodes,
            connections: self.connections,
            generation: self.generation,
            history: self.history,
            weights: self.operator_weights,
            last_mutation: None,
        };
        patch.validate()?;
        Ok(patch)
    }
}

impl From<&Patch> for PatchRecord {
    fn from(patch: &Patch) -> Self {
        PatchRecord {
            generation: patch.generation,
            history: patch.history.clone(),
            operator_weights: patch.weights.clone(),
            nodes: patch.nodes.clone(),
            connections: patch.connections.clone(),
        }
    }
}
