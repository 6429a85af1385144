//! Connections — weighted, optionally parameter-targeting edges between
//! nodes, referenced by id only.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::NodeId;
use super::schema::MutationSchema;

/// Stable connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed edge in the patch graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub source: NodeId,
    pub target: NodeId,
    /// Parameter of the target driven by this connection; `None` feeds the
    /// target's primary signal input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_param: Option<String>,
    pub weight: f64,
    /// Disabled connections are logically removed but kept for history.
    pub enabled: bool,
    /// How the weight mutates. Copied from the target parameter's schema
    /// when the connection is created.
    pub schema: MutationSchema,
    /// Legal range of the target parameter, copied at creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
}

impl Connection {
    /// A plain (primary input) connection with the default weight schema.
    pub fn new(id: ConnectionId, source: NodeId, target: NodeId, weight: f64) -> Self {
        Connection {
            id,
            source,
            target,
            target_param: None,
            weight,
            enabled: true,
            schema: MutationSchema::WEIGHT,
            range: None,
        }
    }

    pub fn targets_param(&self) -> bool {
        self.target_param.is_some()
    }

    pub fn param(&self) -> Option<&str> {
        self.target_param.as_deref()
    }

    /// Whether this connection joins the same unordered node pair.
    pub fn joins(&self, a: NodeId, b: NodeId) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }
}
