//! Crossover — identity-keyed merge of two patches.
//!
//! Elements are matched by id, never by position: shared ids pick either
//! parent's version with a fair coin, the rest are inherited from whichever
//! parent has them. A connection that clashes with one kept before it (same
//! node pair, a second generator on a parameter, or a cycle) is inherited
//! disabled.

use std::collections::HashSet;

use rand::Rng;

use crate::mutation::legality::clashes;
use crate::patch::{NodeId, Patch};

/// Combine `a` and `b` into a new patch.
///
/// The child's generation is the larger of its parents'; the history is A's
/// followed by B's; operator weights come from A.
pub fn crossover<R: Rng + ?Sized>(a: &Patch, b: &Patch, rng: &mut R) -> Patch {
    let mut child = Patch {
        nodes: a.nodes.clone(),
        connections: a.connections.clone(),
        generation: a.generation.max(b.generation),
        history: a.history.merged(&b.history),
        weights: a.weights.clone(),
        last_mutation: None,
    };

    for node in &b.nodes {
        match child.nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => {
                if rng.gen_bool(0.5) {
                    *existing = node.clone();
                }
            }
            None => child.nodes.push(node.clone()),
        }
    }
    for conn in &b.connections {
        match child.connections.iter_mut().find(|c| c.id == conn.id) {
            Some(existing) => {
                if rng.gen_bool(0.5) {
                    *existing = conn.clone();
                }
            }
            None => child.connections.push(conn.clone()),
        }
    }

    let ids: HashSet<NodeId> = child.nodes.iter().map(|n| n.id).collect();
    let merged = std::mem::take(&mut child.connections);
    for mut conn in merged {
        if !(ids.contains(&conn.source) && ids.contains(&conn.target)) {
            continue;
        }
        if conn.enabled && clashes(&child, conn.source, conn.target, conn.param()).is_err() {
            conn.enabled = false;
        }
        child.connections.push(conn);
    }
    child
}
