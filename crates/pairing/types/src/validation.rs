//! Edge-set invariants shared by the engine and every store adapter.

use crate::ids::{ParticipantId, RunId};
use crate::model::PairingEdge;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Ways an edge set can fail to be a valid assignment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdgeSetViolation {
    #[error("edge set is empty")]
    Empty,

    #[error("edge belongs to run {found}, expected {expected}")]
    ForeignEdge { expected: RunId, found: RunId },

    #[error("participant {0} is assigned to themselves")]
    SelfAssignment(ParticipantId),

    #[error("participant {0} gives more than once")]
    DuplicateGiver(ParticipantId),

    #[error("participant {0} receives more than once")]
    DuplicateReceiver(ParticipantId),

    #[error("givers and receivers do not cover the same participants")]
    NotBijective,
}

/// Check that `edges` form a total bijection with no fixed points, all owned
/// by `run_id`.
pub fn validate_edge_set(run_id: &RunId, edges: &[PairingEdge]) -> Result<(), EdgeSetViolation> {
    if edges.is_empty() {
        return Err(EdgeSetViolation::Empty);
    }

    let mut givers = BTreeSet::new();
    let mut receivers = BTreeSet::new();
    for edge in edges {
        if edge.run_id != *run_id {
            return Err(EdgeSetViolation::ForeignEdge {
                expected: *run_id,
                found: edge.run_id,
            });
        }
        if edge.giver_id == edge.receiver_id {
            return Err(EdgeSetViolation::SelfAssignment(edge.giver_id.clone()));
        }
        if !givers.insert(&edge.giver_id) {
            return Err(EdgeSetViolation::DuplicateGiver(edge.giver_id.clone()));
        }
        if !receivers.insert(&edge.receiver_id) {
            return Err(EdgeSetViolation::DuplicateReceiver(edge.receiver_id.clone()));
        }
    }

    if givers != receivers {
        return Err(EdgeSetViolation::NotBijective);
    }
    Ok(())
}

/// Lengths of the cycles formed by following receiver links, longest first.
///
/// Returns `None` when the edges are not a permutation (a link leads to a
/// participant that never gives).
pub fn cycle_lengths(edges: &[PairingEdge]) -> Option<Vec<usize>> {
    let next: BTreeMap<&ParticipantId, &ParticipantId> = edges
        .iter()
        .map(|edge| (&edge.giver_id, &edge.receiver_id))
        .collect();
    if next.len() != edges.len() {
        return None;
    }

    let mut seen: BTreeSet<&ParticipantId> = BTreeSet::new();
    let mut lengths = Vec::new();
    for start in next.keys() {
        if seen.contains(start) {
            continue;
        }
        let mut current = *start;
        let mut length = 0;
        loop {
            if !seen.insert(current) {
                // Re-entered a participant from another cycle.
                return None;
            }
            length += 1;
            current = *next.get(current)?;
            if current == *start {
                break;
            }
        }
        lengths.push(length);
    }

    lengths.sort_unstable_by(|a, b| b.cmp(a));
    Some(lengths)
}
